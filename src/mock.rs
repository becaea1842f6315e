//! In-memory collaborators for tests and dry runs.
//!
//! Each mock records what it was asked to do so tests can assert on side
//! effects (or their absence).

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use solana_sdk::{
    hash::Hash,
    pubkey::Pubkey,
    signature::Signature,
    transaction::{Transaction, TransactionError},
};
use tokio::sync::Notify;

use crate::error::{LedgerError, StoryError, WalletError};
use crate::ledger::{FreshnessAnchor, Ledger, SignatureOutcome};
use crate::status::{StatusSink, StoryStatus, SubmissionStatus};
use crate::story::{PanelData, StoryService};
use crate::wallet::{Wallet, WalletEvent, WalletEvents};

// ---------------------------------------------------------------------------
// Ledger
// ---------------------------------------------------------------------------

pub struct MockLedger {
    mints: Mutex<HashMap<Pubkey, u8>>,
    accounts: Mutex<HashSet<Pubkey>>,
    anchor: FreshnessAnchor,
    height: AtomicU64,
    /// Polls left before `outcome` is reported.
    outcome_delay: AtomicU32,
    outcome: Mutex<Option<Result<(), TransactionError>>>,
    network_down: AtomicBool,
    calls: Mutex<Vec<&'static str>>,
}

impl Default for MockLedger {
    fn default() -> Self {
        Self::new()
    }
}

impl MockLedger {
    /// Empty ledger at height 900 whose anchor stays valid through 1000.
    pub fn new() -> Self {
        Self {
            mints: Mutex::new(HashMap::new()),
            accounts: Mutex::new(HashSet::new()),
            anchor: FreshnessAnchor {
                blockhash: Hash::new_unique(),
                last_valid_block_height: 1_000,
            },
            height: AtomicU64::new(900),
            outcome_delay: AtomicU32::new(0),
            outcome: Mutex::new(None),
            network_down: AtomicBool::new(false),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn add_mint(&self, mint: Pubkey, decimals: u8) {
        self.mints.lock().unwrap().insert(mint, decimals);
    }

    pub fn add_account(&self, address: Pubkey) {
        self.accounts.lock().unwrap().insert(address);
    }

    pub fn anchor(&self) -> FreshnessAnchor {
        self.anchor
    }

    pub fn set_block_height(&self, height: u64) {
        self.height.store(height, Ordering::SeqCst);
    }

    pub fn block_height_now(&self) -> u64 {
        self.height.load(Ordering::SeqCst)
    }

    /// Report `outcome` for any signature after `polls` empty lookups.
    pub fn set_outcome_after(&self, polls: u32, outcome: Result<(), TransactionError>) {
        self.outcome_delay.store(polls, Ordering::SeqCst);
        *self.outcome.lock().unwrap() = Some(outcome);
    }

    pub fn set_network_down(&self, down: bool) {
        self.network_down.store(down, Ordering::SeqCst);
    }

    pub fn calls(&self) -> Vec<&'static str> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: &'static str) -> Result<(), LedgerError> {
        self.calls.lock().unwrap().push(call);
        if self.network_down.load(Ordering::SeqCst) {
            return Err(LedgerError::Rpc("connection refused".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl Ledger for MockLedger {
    async fn mint_decimals(&self, mint: &Pubkey) -> Result<u8, LedgerError> {
        self.record("mint_decimals")?;
        self.mints
            .lock()
            .unwrap()
            .get(mint)
            .copied()
            .ok_or(LedgerError::AccountNotFound(*mint))
    }

    async fn account_exists(&self, address: &Pubkey) -> Result<bool, LedgerError> {
        self.record("account_exists")?;
        Ok(self.accounts.lock().unwrap().contains(address))
    }

    async fn latest_anchor(&self) -> Result<FreshnessAnchor, LedgerError> {
        self.record("latest_anchor")?;
        Ok(self.anchor)
    }

    /// Each call advances the chain by one block.
    async fn block_height(&self) -> Result<u64, LedgerError> {
        self.record("block_height")?;
        Ok(self.height.fetch_add(1, Ordering::SeqCst) + 1)
    }

    async fn signature_outcome(
        &self,
        _signature: &Signature,
    ) -> Result<SignatureOutcome, LedgerError> {
        self.record("signature_outcome")?;
        let outcome = self.outcome.lock().unwrap().clone();
        if outcome.is_none() {
            return Ok(None);
        }
        let remaining = self.outcome_delay.load(Ordering::SeqCst);
        if remaining > 0 {
            self.outcome_delay.store(remaining - 1, Ordering::SeqCst);
            return Ok(None);
        }
        Ok(outcome)
    }
}

// ---------------------------------------------------------------------------
// Wallet
// ---------------------------------------------------------------------------

pub struct MockWallet {
    key: Pubkey,
    connected: AtomicBool,
    rejection: Mutex<Option<String>>,
    connect_failure: Mutex<Option<String>>,
    sent: Mutex<Vec<Transaction>>,
    sign_requested: Notify,
    gate: Option<Arc<Notify>>,
    events: WalletEvents,
}

impl MockWallet {
    pub fn connected(key: Pubkey) -> Self {
        let wallet = Self::disconnected(key);
        wallet.connected.store(true, Ordering::SeqCst);
        wallet
    }

    pub fn disconnected(key: Pubkey) -> Self {
        Self {
            key,
            connected: AtomicBool::new(false),
            rejection: Mutex::new(None),
            connect_failure: Mutex::new(None),
            sent: Mutex::new(Vec::new()),
            sign_requested: Notify::new(),
            gate: None,
            events: WalletEvents::new(),
        }
    }

    /// Hold every signing request until `gate` is notified.
    pub fn with_gate(mut self, gate: Arc<Notify>) -> Self {
        self.gate = Some(gate);
        self
    }

    pub fn reject_with(&self, reason: &str) {
        *self.rejection.lock().unwrap() = Some(reason.to_string());
    }

    pub fn fail_connect(&self, reason: &str) {
        *self.connect_failure.lock().unwrap() = Some(reason.to_string());
    }

    pub fn sent(&self) -> Vec<Transaction> {
        self.sent.lock().unwrap().clone()
    }

    /// Resolves once a signing request has arrived.
    pub async fn sign_requested(&self) {
        self.sign_requested.notified().await;
    }
}

#[async_trait]
impl Wallet for MockWallet {
    fn identity(&self) -> Option<Pubkey> {
        self.connected.load(Ordering::SeqCst).then_some(self.key)
    }

    async fn connect(&self) -> Result<Pubkey, WalletError> {
        if let Some(reason) = self.connect_failure.lock().unwrap().clone() {
            return Err(WalletError::Rejected(reason));
        }
        self.connected.store(true, Ordering::SeqCst);
        self.events.emit(&WalletEvent::Connected(self.key));
        Ok(self.key)
    }

    async fn disconnect(&self) -> Result<(), WalletError> {
        self.connected.store(false, Ordering::SeqCst);
        self.events.emit(&WalletEvent::Disconnected);
        Ok(())
    }

    async fn sign_and_send_transaction(
        &self,
        transaction: Transaction,
    ) -> Result<Signature, WalletError> {
        if !self.connected.load(Ordering::SeqCst) {
            return Err(WalletError::NotConnected);
        }
        self.sign_requested.notify_one();
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
        if let Some(reason) = self.rejection.lock().unwrap().clone() {
            return Err(WalletError::Rejected(reason));
        }
        self.sent.lock().unwrap().push(transaction);
        Ok(Signature::new_unique())
    }

    fn events(&self) -> &WalletEvents {
        &self.events
    }
}

// ---------------------------------------------------------------------------
// Story service
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoryCall {
    SubmitCharacters {
        wallet_id: String,
        characters: Vec<String>,
    },
    RequestNewPanel {
        wallet_id: String,
    },
    ListPanels,
    FetchImage {
        wallet_id: String,
    },
}

#[derive(Default)]
pub struct MockStoryService {
    calls: Mutex<Vec<StoryCall>>,
    submit_failure: Mutex<Option<(u16, String)>>,
    panel_failure: Mutex<Option<(u16, String)>>,
    panels: Mutex<Vec<PanelData>>,
    image_delay: AtomicU32,
    image: Mutex<Option<Vec<u8>>>,
}

impl MockStoryService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `submit_characters` answer with `status` and `{error: message}`.
    pub fn fail_submit(&self, status: u16, message: &str) {
        *self.submit_failure.lock().unwrap() = Some((status, message.to_string()));
    }

    /// Make `request_new_panel` answer with `status` and `{error: message}`.
    pub fn fail_panel_request(&self, status: u16, message: &str) {
        *self.panel_failure.lock().unwrap() = Some((status, message.to_string()));
    }

    pub fn add_panel(&self, panel: PanelData) {
        self.panels.lock().unwrap().push(panel);
    }

    /// Serve `image` after `misses` empty fetches.
    pub fn set_image_after(&self, misses: u32, image: Vec<u8>) {
        self.image_delay.store(misses, Ordering::SeqCst);
        *self.image.lock().unwrap() = Some(image);
    }

    pub fn calls(&self) -> Vec<StoryCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn image_fetches(&self) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|c| matches!(c, StoryCall::FetchImage { .. }))
            .count()
    }
}

#[async_trait]
impl StoryService for MockStoryService {
    async fn submit_characters(
        &self,
        wallet_id: &str,
        characters: &[String],
    ) -> Result<(), StoryError> {
        self.calls.lock().unwrap().push(StoryCall::SubmitCharacters {
            wallet_id: wallet_id.to_string(),
            characters: characters.to_vec(),
        });
        match self.submit_failure.lock().unwrap().clone() {
            Some((status, message)) => Err(StoryError::Service { status, message }),
            None => Ok(()),
        }
    }

    async fn request_new_panel(&self, wallet_id: &str) -> Result<(), StoryError> {
        self.calls.lock().unwrap().push(StoryCall::RequestNewPanel {
            wallet_id: wallet_id.to_string(),
        });
        match self.panel_failure.lock().unwrap().clone() {
            Some((status, message)) => Err(StoryError::Service { status, message }),
            None => Ok(()),
        }
    }

    async fn list_panels(&self) -> Result<Vec<PanelData>, StoryError> {
        self.calls.lock().unwrap().push(StoryCall::ListPanels);
        Ok(self.panels.lock().unwrap().clone())
    }

    async fn fetch_image(&self, wallet_id: &str) -> Result<Option<Vec<u8>>, StoryError> {
        self.calls.lock().unwrap().push(StoryCall::FetchImage {
            wallet_id: wallet_id.to_string(),
        });
        let remaining = self.image_delay.load(Ordering::SeqCst);
        if remaining > 0 {
            self.image_delay.store(remaining - 1, Ordering::SeqCst);
            return Ok(None);
        }
        Ok(self.image.lock().unwrap().clone())
    }
}

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct RecordingSink {
    transfer: Mutex<Vec<SubmissionStatus>>,
    story: Mutex<Vec<StoryStatus>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn transfer_updates(&self) -> Vec<SubmissionStatus> {
        self.transfer.lock().unwrap().clone()
    }

    pub fn story_updates(&self) -> Vec<StoryStatus> {
        self.story.lock().unwrap().clone()
    }

    pub fn labels(&self) -> Vec<&'static str> {
        self.transfer
            .lock()
            .unwrap()
            .iter()
            .map(SubmissionStatus::label)
            .collect()
    }
}

impl StatusSink for RecordingSink {
    fn transfer(&self, status: &SubmissionStatus) {
        self.transfer.lock().unwrap().push(status.clone());
    }

    fn story(&self, status: &StoryStatus) {
        self.story.lock().unwrap().push(status.clone());
    }
}
