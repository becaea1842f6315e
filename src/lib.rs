//! Pay for a generated story panel with an SPL token transfer on Solana,
//! then fetch the panel once the story service has drawn it.

pub mod amount;
pub mod characters;
pub mod config;
pub mod error;
pub mod instructions;
pub mod ledger;
#[cfg(any(test, feature = "test-utils"))]
pub mod mock;
pub mod purchase;
pub mod status;
pub mod story;
pub mod submitter;
pub mod viewer;
pub mod wallet;

pub use characters::CharacterSelection;
pub use config::AppConfig;
pub use error::{StoryError, TransferError};
pub use ledger::{FreshnessAnchor, Ledger, RpcLedger};
pub use purchase::{PurchaseReceipt, StoryPurchase};
pub use status::{StatusSink, StoryStatus, SubmissionStatus};
pub use story::{HttpStoryClient, PanelData, StoryService};
pub use submitter::{SubmitterOptions, TransferRequest, TransferSubmitter};
pub use viewer::{PanelViewer, PollPolicy};
pub use wallet::{
    KeypairWallet, Reconnector, SessionTracker, Wallet, WalletEvent, WalletEventHandler,
};
