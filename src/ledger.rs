//! Read surface of the ledger consumed by the transfer submitter.

use std::sync::Arc;

use async_trait::async_trait;
use solana_client::nonblocking::rpc_client::RpcClient;
use solana_sdk::{
    commitment_config::CommitmentConfig, hash::Hash, pubkey::Pubkey, signature::Signature,
    transaction::TransactionError,
};
use solana_transaction_status::TransactionStatus;
use spl_token::solana_program::program_pack::Pack;
use spl_token::state::Mint;

use crate::error::LedgerError;

/// A recent blockhash together with the last block height at which a
/// transaction referencing it can still land.
///
/// The same anchor is attached to the transaction and bounds confirmation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FreshnessAnchor {
    pub blockhash: Hash,
    pub last_valid_block_height: u64,
}

/// Outcome of a signature lookup: `None` until the cluster reports the
/// signature at the configured commitment.
pub type SignatureOutcome = Option<Result<(), TransactionError>>;

#[async_trait]
pub trait Ledger: Send + Sync {
    /// Decimal precision recorded in the mint account.
    async fn mint_decimals(&self, mint: &Pubkey) -> Result<u8, LedgerError>;

    async fn account_exists(&self, address: &Pubkey) -> Result<bool, LedgerError>;

    async fn latest_anchor(&self) -> Result<FreshnessAnchor, LedgerError>;

    async fn block_height(&self) -> Result<u64, LedgerError>;

    async fn signature_outcome(&self, signature: &Signature)
        -> Result<SignatureOutcome, LedgerError>;
}

/// [`Ledger`] backed by a Solana JSON-RPC endpoint.
pub struct RpcLedger {
    client: Arc<RpcClient>,
    commitment: CommitmentConfig,
}

impl RpcLedger {
    pub fn new(rpc_url: &str, commitment: CommitmentConfig) -> Self {
        let client = RpcClient::new_with_commitment(rpc_url.to_string(), commitment);
        Self::with_client(Arc::new(client), commitment)
    }

    pub fn with_client(client: Arc<RpcClient>, commitment: CommitmentConfig) -> Self {
        Self { client, commitment }
    }

    pub fn client(&self) -> Arc<RpcClient> {
        Arc::clone(&self.client)
    }
}

fn rpc_error(err: impl std::fmt::Display) -> LedgerError {
    LedgerError::Rpc(err.to_string())
}

#[async_trait]
impl Ledger for RpcLedger {
    async fn mint_decimals(&self, mint: &Pubkey) -> Result<u8, LedgerError> {
        let account = self
            .client
            .get_account_with_commitment(mint, self.commitment)
            .await
            .map_err(rpc_error)?
            .value
            .ok_or(LedgerError::AccountNotFound(*mint))?;

        if account.owner != spl_token::id() {
            return Err(LedgerError::InvalidMint {
                account: *mint,
                reason: format!("owned by {}", account.owner),
            });
        }

        let state = Mint::unpack(&account.data).map_err(|e| LedgerError::InvalidMint {
            account: *mint,
            reason: e.to_string(),
        })?;
        log::debug!("mint {} has {} decimals", mint, state.decimals);
        Ok(state.decimals)
    }

    async fn account_exists(&self, address: &Pubkey) -> Result<bool, LedgerError> {
        let response = self
            .client
            .get_account_with_commitment(address, self.commitment)
            .await
            .map_err(rpc_error)?;
        Ok(response.value.is_some())
    }

    async fn latest_anchor(&self) -> Result<FreshnessAnchor, LedgerError> {
        let (blockhash, last_valid_block_height) = self
            .client
            .get_latest_blockhash_with_commitment(self.commitment)
            .await
            .map_err(rpc_error)?;
        Ok(FreshnessAnchor {
            blockhash,
            last_valid_block_height,
        })
    }

    async fn block_height(&self) -> Result<u64, LedgerError> {
        self.client
            .get_block_height_with_commitment(self.commitment)
            .await
            .map_err(rpc_error)
    }

    async fn signature_outcome(
        &self,
        signature: &Signature,
    ) -> Result<SignatureOutcome, LedgerError> {
        let response = self
            .client
            .get_signature_statuses(&[*signature])
            .await
            .map_err(rpc_error)?;

        let status: Option<TransactionStatus> = response.value.into_iter().next().flatten();
        Ok(status
            .filter(|s| s.satisfies_commitment(self.commitment))
            .map(|s| s.status))
    }
}
