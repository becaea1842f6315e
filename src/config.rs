//! Runtime settings: where to send tokens, which token, how many, and where
//! the story service lives.

use solana_sdk::{commitment_config::CommitmentConfig, pubkey::Pubkey};

use crate::error::ConfigError;
use crate::submitter::TransferRequest;

pub const DEFAULT_RPC_URL: &str = "https://api.mainnet-beta.solana.com";
pub const DEFAULT_AMOUNT: u64 = 100_000;
pub const DEFAULT_IMAGE_URL: &str = "{api}/image/{wallet}";

/// Settings as collected from flags, environment and `.env`, before
/// validation.
#[derive(Debug, Clone, Default)]
pub struct RawConfig {
    pub rpc_url: Option<String>,
    pub commitment: Option<String>,
    pub recipient: Option<String>,
    pub mint: Option<String>,
    pub amount: Option<u64>,
    pub api_url: Option<String>,
    pub api_key: Option<String>,
    pub image_url: Option<String>,
}

#[derive(Debug, Clone)]
pub struct StoryConfig {
    pub api_url: String,
    pub api_key: String,
    /// Image location, with `{wallet}` and optionally `{api}` placeholders.
    pub image_url: String,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub rpc_url: String,
    pub commitment: CommitmentConfig,
    pub recipient: Pubkey,
    pub mint: Pubkey,
    /// Whole tokens per purchase.
    pub amount: u64,
    pub story: StoryConfig,
}

impl AppConfig {
    pub fn from_raw(raw: RawConfig) -> Result<Self, ConfigError> {
        let recipient = parse_address(
            "recipient",
            raw.recipient.as_deref().ok_or(ConfigError::Missing("recipient"))?,
        )?;
        let mint = parse_address("mint", raw.mint.as_deref().ok_or(ConfigError::Missing("mint"))?)?;

        let amount = raw.amount.unwrap_or(DEFAULT_AMOUNT);
        if amount == 0 {
            return Err(ConfigError::Invalid {
                field: "amount",
                reason: "must be greater than zero".into(),
            });
        }

        let commitment = match raw.commitment.as_deref() {
            Some(value) => parse_commitment(value)?,
            None => CommitmentConfig::confirmed(),
        };

        Ok(Self {
            rpc_url: non_blank(raw.rpc_url).unwrap_or_else(|| DEFAULT_RPC_URL.to_string()),
            commitment,
            recipient,
            mint,
            amount,
            story: story_config(raw.api_url, raw.api_key, raw.image_url)?,
        })
    }

    pub fn transfer_request(&self) -> TransferRequest {
        TransferRequest {
            recipient: self.recipient,
            mint: self.mint,
            amount: self.amount,
        }
    }
}

/// Validate only the story-service settings, for commands that never touch
/// the ledger.
pub fn story_config(
    api_url: Option<String>,
    api_key: Option<String>,
    image_url: Option<String>,
) -> Result<StoryConfig, ConfigError> {
    let api_url = non_blank(api_url).ok_or(ConfigError::Missing("api_url"))?;
    if !(api_url.starts_with("http://") || api_url.starts_with("https://")) {
        return Err(ConfigError::Invalid {
            field: "api_url",
            reason: format!("not an http(s) url: {}", api_url),
        });
    }

    let image_url = non_blank(image_url).unwrap_or_else(|| DEFAULT_IMAGE_URL.to_string());
    if !image_url.contains("{wallet}") {
        return Err(ConfigError::Invalid {
            field: "image_url",
            reason: "must contain a {wallet} placeholder".into(),
        });
    }

    Ok(StoryConfig {
        api_url: api_url.trim_end_matches('/').to_string(),
        api_key: api_key.unwrap_or_default(),
        image_url,
    })
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

/// Parse a Base58 account address, requiring exactly 32 bytes.
pub fn parse_address(field: &'static str, value: &str) -> Result<Pubkey, ConfigError> {
    let bytes = bs58::decode(value.trim())
        .into_vec()
        .map_err(|e| ConfigError::InvalidAddress {
            field,
            reason: format!("base58 decode failed: {}", e),
        })?;

    let bytes: [u8; 32] = bytes
        .try_into()
        .map_err(|b: Vec<u8>| ConfigError::InvalidAddress {
            field,
            reason: format!("expected 32 bytes, got {}", b.len()),
        })?;

    Ok(Pubkey::new_from_array(bytes))
}

pub fn parse_commitment(value: &str) -> Result<CommitmentConfig, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "processed" => Ok(CommitmentConfig::processed()),
        "confirmed" => Ok(CommitmentConfig::confirmed()),
        "finalized" => Ok(CommitmentConfig::finalized()),
        other => Err(ConfigError::Invalid {
            field: "commitment",
            reason: format!("unknown commitment level: {}", other),
        }),
    }
}
