//! Token transfer submission: build, sign, send and confirm one SPL transfer.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use solana_sdk::{pubkey::Pubkey, signature::Signature};

use crate::amount::{format_base_units, scale_amount};
use crate::error::{LedgerError, TransferError};
use crate::instructions::{assemble_transaction, TransferPlan};
use crate::ledger::{FreshnessAnchor, Ledger};
use crate::status::{StatusSink, SubmissionStatus};
use crate::wallet::Wallet;

/// What to send: `amount` whole tokens of `mint` to `recipient`'s wallet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferRequest {
    pub recipient: Pubkey,
    pub mint: Pubkey,
    pub amount: u64,
}

#[derive(Debug, Clone)]
pub struct SubmitterOptions {
    /// Delay between signature status polls while confirming.
    pub poll_interval: Duration,
}

impl Default for SubmitterOptions {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(500),
        }
    }
}

pub struct TransferSubmitter {
    ledger: Arc<dyn Ledger>,
    options: SubmitterOptions,
    in_flight: Mutex<HashSet<Pubkey>>,
}

/// Releases the wallet's in-flight slot when the attempt ends or is dropped.
struct InFlightGuard<'a> {
    in_flight: &'a Mutex<HashSet<Pubkey>>,
    wallet: Pubkey,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.wallet);
    }
}

impl TransferSubmitter {
    pub fn new(ledger: Arc<dyn Ledger>, options: SubmitterOptions) -> Self {
        Self {
            ledger,
            options,
            in_flight: Mutex::new(HashSet::new()),
        }
    }

    pub fn is_in_flight(&self, wallet: &Pubkey) -> bool {
        self.in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(wallet)
    }

    // The set holds plain keys, so a panic elsewhere cannot leave it torn.
    fn claim(&self, wallet: Pubkey) -> Result<InFlightGuard<'_>, TransferError> {
        let mut set = self
            .in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if !set.insert(wallet) {
            return Err(TransferError::SubmissionInProgress(wallet));
        }
        Ok(InFlightGuard {
            in_flight: &self.in_flight,
            wallet,
        })
    }

    /// Run one transfer attempt to completion.
    ///
    /// Progress is reported to `sink`; any error is also reported as a
    /// terminal `Failed` status. Calls refused before the attempt starts
    /// (no connected wallet, zero amount, another attempt in flight for the
    /// wallet) return without touching `sink`, which may be showing the
    /// attempt already running. Nothing is retried. Dropping the returned
    /// future stops work that has not reached the wallet yet, but cannot
    /// recall a transaction already handed to it.
    pub async fn submit_transfer(
        &self,
        wallet: &dyn Wallet,
        request: &TransferRequest,
        sink: &dyn StatusSink,
    ) -> Result<Signature, TransferError> {
        let sender = wallet.identity().ok_or(TransferError::WalletNotConnected)?;
        if request.amount == 0 {
            return Err(TransferError::InvalidRequest(
                "amount must be greater than zero".into(),
            ));
        }
        let _guard = self.claim(sender)?;

        let result = self.run(sender, wallet, request, sink).await;
        if let Err(err) = &result {
            log::warn!("transfer to {} failed: {}", request.recipient, err);
            sink.transfer(&SubmissionStatus::Failed(err.to_string()));
        }
        result
    }

    async fn run(
        &self,
        sender: Pubkey,
        wallet: &dyn Wallet,
        request: &TransferRequest,
        sink: &dyn StatusSink,
    ) -> Result<Signature, TransferError> {
        sink.transfer(&SubmissionStatus::Preparing);
        let decimals = self
            .ledger
            .mint_decimals(&request.mint)
            .await
            .map_err(|e| match e {
                LedgerError::Rpc(_) => TransferError::from(e),
                other => TransferError::MintLookup(other.to_string()),
            })?;
        let amount = scale_amount(request.amount, decimals)?;
        log::info!(
            "transferring {} ({} base units) of {} from {} to {}",
            format_base_units(amount, decimals),
            amount,
            request.mint,
            sender,
            request.recipient
        );

        let mut plan = TransferPlan::new(sender, request.recipient, request.mint, amount);

        if !self.ledger.account_exists(&plan.sender_token_account).await? {
            return Err(TransferError::SenderAccountMissing(plan.sender_token_account));
        }

        if !self
            .ledger
            .account_exists(&plan.recipient_token_account)
            .await?
        {
            sink.transfer(&SubmissionStatus::CreatingRecipientAccount);
            plan.create_recipient_account = true;
        }

        let instructions = plan.instructions()?;
        let anchor = self.ledger.latest_anchor().await?;
        let transaction = assemble_transaction(&instructions, &sender, &anchor);

        sink.transfer(&SubmissionStatus::AwaitingSignature);
        let signature = wallet
            .sign_and_send_transaction(transaction)
            .await
            .map_err(|e| TransferError::SigningRejected(e.to_string()))?;
        sink.transfer(&SubmissionStatus::Submitted(signature));

        sink.transfer(&SubmissionStatus::Confirming);
        self.await_confirmation(&signature, &anchor).await?;

        log::info!("transfer {} confirmed", signature);
        sink.transfer(&SubmissionStatus::Confirmed(signature));
        Ok(signature)
    }

    /// Poll until `signature` lands or the cluster passes the anchor's last
    /// valid block height.
    pub async fn await_confirmation(
        &self,
        signature: &Signature,
        anchor: &FreshnessAnchor,
    ) -> Result<(), TransferError> {
        loop {
            if let Some(outcome) = self.ledger.signature_outcome(signature).await? {
                return outcome.map_err(|err| TransferError::TransactionFailed {
                    signature: signature.to_string(),
                    reason: err.to_string(),
                });
            }

            let height = self.ledger.block_height().await?;
            if height > anchor.last_valid_block_height {
                // The signature may have landed between the two queries.
                if let Some(outcome) = self.ledger.signature_outcome(signature).await? {
                    return outcome.map_err(|err| TransferError::TransactionFailed {
                        signature: signature.to_string(),
                        reason: err.to_string(),
                    });
                }
                return Err(TransferError::ConfirmationTimeout {
                    signature: signature.to_string(),
                    last_valid_block_height: anchor.last_valid_block_height,
                });
            }

            log::debug!(
                "waiting for {} at height {} (valid until {})",
                signature,
                height,
                anchor.last_valid_block_height
            );
            tokio::time::sleep(self.options.poll_interval).await;
        }
    }
}
