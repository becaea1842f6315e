use solana_sdk::pubkey::Pubkey;
use thiserror::Error;

/// Terminal failure of one transfer attempt.
///
/// Every variant ends the attempt; the caller retries by calling
/// `submit_transfer` again.
#[derive(Debug, Error)]
pub enum TransferError {
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("wallet is not connected")]
    WalletNotConnected,

    #[error("a transfer is already in flight for wallet {0}")]
    SubmissionInProgress(Pubkey),

    #[error("mint lookup failed: {0}")]
    MintLookup(String),

    #[error("amount {amount} scaled by 10^{decimals} overflows u64")]
    AmountOverflow { amount: u64, decimals: u8 },

    #[error("sender token account {0} does not exist")]
    SenderAccountMissing(Pubkey),

    #[error("signing rejected: {0}")]
    SigningRejected(String),

    #[error("transaction {signature} not confirmed before block height {last_valid_block_height}")]
    ConfirmationTimeout {
        signature: String,
        last_valid_block_height: u64,
    },

    #[error("transaction {signature} failed on chain: {reason}")]
    TransactionFailed { signature: String, reason: String },

    #[error("network error: {0}")]
    Network(String),
}

impl From<LedgerError> for TransferError {
    fn from(err: LedgerError) -> Self {
        TransferError::Network(err.to_string())
    }
}

/// Failures reading from or querying the ledger.
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("rpc error: {0}")]
    Rpc(String),

    #[error("account {0} not found")]
    AccountNotFound(Pubkey),

    #[error("account {account} is not a valid mint: {reason}")]
    InvalidMint { account: Pubkey, reason: String },
}

/// Failures reported by a wallet collaborator.
#[derive(Debug, Error)]
pub enum WalletError {
    #[error("wallet is not connected")]
    NotConnected,

    #[error("request rejected by wallet: {0}")]
    Rejected(String),

    #[error("wallet transport error: {0}")]
    Transport(String),
}

/// Failures talking to the story service. Independent of transfer success.
#[derive(Debug, Error)]
pub enum StoryError {
    #[error("story service returned {status}: {message}")]
    Service { status: u16, message: String },

    #[error("network error: {0}")]
    Network(String),

    #[error("no panel ready for wallet {wallet} after {attempts} attempts")]
    NotReady { wallet: String, attempts: u32 },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<reqwest::Error> for StoryError {
    fn from(err: reqwest::Error) -> Self {
        StoryError::Network(err.to_string())
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SelectionError {
    #[error("unknown character: {0}")]
    UnknownCharacter(String),

    #[error("at most {0} characters can be selected")]
    LimitReached(usize),

    #[error("select at least one character")]
    Empty,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required setting: {0}")]
    Missing(&'static str),

    #[error("invalid address for {field}: {reason}")]
    InvalidAddress { field: &'static str, reason: String },

    #[error("invalid setting {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}
