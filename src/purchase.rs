//! Pay for a story: token transfer first, story creation second.

use std::sync::Arc;

use solana_sdk::signature::Signature;

use crate::characters::CharacterSelection;
use crate::error::{StoryError, TransferError};
use crate::status::{StatusSink, StoryStatus};
use crate::story::StoryService;
use crate::submitter::{TransferRequest, TransferSubmitter};
use crate::wallet::Wallet;

/// Result of a confirmed payment. The story follow-up is reported
/// separately and never turns a confirmed transfer into a failure.
#[derive(Debug)]
pub struct PurchaseReceipt {
    pub signature: Signature,
    pub story: Result<(), StoryError>,
}

pub struct StoryPurchase {
    submitter: Arc<TransferSubmitter>,
    story: Arc<dyn StoryService>,
    request: TransferRequest,
}

impl StoryPurchase {
    pub fn new(
        submitter: Arc<TransferSubmitter>,
        story: Arc<dyn StoryService>,
        request: TransferRequest,
    ) -> Self {
        Self {
            submitter,
            story,
            request,
        }
    }

    pub fn request(&self) -> &TransferRequest {
        &self.request
    }

    pub async fn purchase(
        &self,
        wallet: &dyn Wallet,
        selection: &CharacterSelection,
        sink: &dyn StatusSink,
    ) -> Result<PurchaseReceipt, TransferError> {
        selection
            .ensure_not_empty()
            .map_err(|e| TransferError::InvalidRequest(e.to_string()))?;

        // The story is filed under the account that paid.
        let wallet_id = wallet
            .identity()
            .ok_or(TransferError::WalletNotConnected)?
            .to_string();

        let signature = self
            .submitter
            .submit_transfer(wallet, &self.request, sink)
            .await?;

        let story = self.create_story(&wallet_id, selection, sink).await;
        Ok(PurchaseReceipt { signature, story })
    }

    async fn create_story(
        &self,
        wallet_id: &str,
        selection: &CharacterSelection,
        sink: &dyn StatusSink,
    ) -> Result<(), StoryError> {
        sink.story(&StoryStatus::Creating);
        if let Err(err) = self
            .story
            .submit_characters(wallet_id, &selection.names())
            .await
        {
            log::warn!("story creation for {} failed: {}", wallet_id, err);
            sink.story(&StoryStatus::Failed(err.to_string()));
            return Err(err);
        }
        if let Err(err) = self.story.request_new_panel(wallet_id).await {
            log::warn!("panel request for {} failed: {}", wallet_id, err);
            sink.story(&StoryStatus::PanelRequestFailed(err.to_string()));
            return Err(err);
        }
        sink.story(&StoryStatus::PanelRequested);
        Ok(())
    }
}
