//! Wallet collaborator: identity, sign-and-send, and connection events.
//!
//! Connection changes are delivered to handler objects registered on a
//! [`WalletEvents`] registry instead of ambient callbacks.

use std::sync::{Arc, Mutex, Weak};

use async_trait::async_trait;
use solana_client::nonblocking::rpc_client::RpcClient;
use solana_sdk::{
    pubkey::Pubkey,
    signature::{Keypair, Signature},
    signer::Signer,
    transaction::Transaction,
};

use crate::error::WalletError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WalletEvent {
    Connected(Pubkey),
    Disconnected,
    /// `None` means the wallet switched to an account it has not exposed yet.
    AccountChanged(Option<Pubkey>),
}

pub trait WalletEventHandler: Send + Sync {
    fn on_event(&self, event: &WalletEvent);
}

/// Subscriber registry owned by a wallet implementation.
#[derive(Default)]
pub struct WalletEvents {
    handlers: Mutex<Vec<Arc<dyn WalletEventHandler>>>,
}

impl WalletEvents {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, handler: Arc<dyn WalletEventHandler>) {
        if let Ok(mut handlers) = self.handlers.lock() {
            handlers.push(handler);
        }
    }

    pub fn clear(&self) {
        if let Ok(mut handlers) = self.handlers.lock() {
            handlers.clear();
        }
    }

    pub fn emit(&self, event: &WalletEvent) {
        // Clone out so a handler may subscribe without deadlocking.
        let handlers = match self.handlers.lock() {
            Ok(handlers) => handlers.clone(),
            Err(_) => return,
        };
        for handler in handlers {
            handler.on_event(event);
        }
    }
}

#[async_trait]
pub trait Wallet: Send + Sync {
    /// Currently connected account, `None` while disconnected.
    fn identity(&self) -> Option<Pubkey>;

    async fn connect(&self) -> Result<Pubkey, WalletError>;

    async fn disconnect(&self) -> Result<(), WalletError>;

    /// Sign `transaction` and submit it in one round trip.
    async fn sign_and_send_transaction(
        &self,
        transaction: Transaction,
    ) -> Result<Signature, WalletError>;

    fn events(&self) -> &WalletEvents;
}

/// Tracks the connected identity and a human-readable line describing the
/// last connection change.
pub struct SessionTracker {
    state: Mutex<SessionState>,
}

impl Default for SessionTracker {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionState {
    pub identity: Option<Pubkey>,
    pub message: String,
    /// Set when the wallet reported an account change without a key and a
    /// reconnect should be attempted.
    pub needs_reconnect: bool,
}

impl SessionTracker {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(SessionState {
                identity: None,
                message: "Not connected.".to_string(),
                needs_reconnect: false,
            }),
        }
    }

    pub fn snapshot(&self) -> SessionState {
        self.state
            .lock()
            .map(|state| state.clone())
            .unwrap_or_default()
    }

    /// Record that the reconnect after a keyless account change failed.
    pub fn reconnect_failed(&self, reason: &str) {
        if let Ok(mut state) = self.state.lock() {
            state.message = format!("Reconnection failed: {}", reason);
        }
    }
}

impl WalletEventHandler for SessionTracker {
    fn on_event(&self, event: &WalletEvent) {
        let Ok(mut state) = self.state.lock() else {
            return;
        };
        match event {
            WalletEvent::Connected(key) => {
                state.identity = Some(*key);
                state.message = "Wallet connected!".to_string();
                state.needs_reconnect = false;
            }
            WalletEvent::Disconnected => {
                state.identity = None;
                state.message = "Wallet disconnected.".to_string();
                state.needs_reconnect = false;
            }
            WalletEvent::AccountChanged(Some(key)) => {
                state.identity = Some(*key);
                state.message = format!("Switched to account {}", key);
                state.needs_reconnect = false;
            }
            WalletEvent::AccountChanged(None) => {
                state.message = "Account changed, reconnecting...".to_string();
                state.needs_reconnect = true;
            }
        }
        log::info!("wallet session: {:?} -> {}", event, state.message);
    }
}

/// Reconnects the wallet when it reports an account change without a key.
///
/// Handlers run synchronously, so the reconnect is spawned on the current
/// tokio runtime. Holds the wallet weakly since the wallet owns its handlers.
pub struct Reconnector {
    wallet: Weak<dyn Wallet>,
    session: Option<Arc<SessionTracker>>,
}

impl Reconnector {
    pub fn new<W: Wallet + 'static>(wallet: &Arc<W>) -> Self {
        let wallet: Weak<dyn Wallet> = Arc::<W>::downgrade(wallet);
        Self {
            wallet,
            session: None,
        }
    }

    /// Report reconnect failures to `session`.
    pub fn with_session(mut self, session: Arc<SessionTracker>) -> Self {
        self.session = Some(session);
        self
    }
}

impl WalletEventHandler for Reconnector {
    fn on_event(&self, event: &WalletEvent) {
        if *event != WalletEvent::AccountChanged(None) {
            return;
        }
        let Some(wallet) = self.wallet.upgrade() else {
            return;
        };
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            log::warn!("account changed outside a runtime, not reconnecting");
            return;
        };
        let session = self.session.clone();
        runtime.spawn(async move {
            match wallet.connect().await {
                Ok(key) => log::info!("reconnected as {}", key),
                Err(err) => {
                    log::warn!("reconnection failed: {}", err);
                    if let Some(session) = session {
                        session.reconnect_failed(&err.to_string());
                    }
                }
            }
        });
    }
}

/// Wallet holding a local keypair and submitting through RPC.
pub struct KeypairWallet {
    keypair: Mutex<Arc<Keypair>>,
    client: Arc<RpcClient>,
    connected: Mutex<bool>,
    events: WalletEvents,
}

impl KeypairWallet {
    pub fn new(keypair: Keypair, client: Arc<RpcClient>) -> Self {
        Self {
            keypair: Mutex::new(Arc::new(keypair)),
            client,
            connected: Mutex::new(false),
            events: WalletEvents::new(),
        }
    }

    fn current_keypair(&self) -> Result<Arc<Keypair>, WalletError> {
        self.keypair
            .lock()
            .map(|k| Arc::clone(&*k))
            .map_err(|_| WalletError::Transport("keypair lock poisoned".into()))
    }

    fn is_connected(&self) -> bool {
        self.connected.lock().map(|c| *c).unwrap_or(false)
    }

    fn set_connected(&self, value: bool) {
        if let Ok(mut connected) = self.connected.lock() {
            *connected = value;
        }
    }

    /// Replace the signing account and announce the change to subscribers.
    pub fn switch_account(&self, keypair: Keypair) {
        let key = keypair.pubkey();
        if let Ok(mut current) = self.keypair.lock() {
            *current = Arc::new(keypair);
        }
        if self.is_connected() {
            self.events.emit(&WalletEvent::AccountChanged(Some(key)));
        }
    }
}

#[async_trait]
impl Wallet for KeypairWallet {
    fn identity(&self) -> Option<Pubkey> {
        if !self.is_connected() {
            return None;
        }
        self.current_keypair().ok().map(|k| k.pubkey())
    }

    async fn connect(&self) -> Result<Pubkey, WalletError> {
        let key = self.current_keypair()?.pubkey();
        self.set_connected(true);
        self.events.emit(&WalletEvent::Connected(key));
        Ok(key)
    }

    async fn disconnect(&self) -> Result<(), WalletError> {
        self.set_connected(false);
        self.events.emit(&WalletEvent::Disconnected);
        Ok(())
    }

    async fn sign_and_send_transaction(
        &self,
        mut transaction: Transaction,
    ) -> Result<Signature, WalletError> {
        if !self.is_connected() {
            return Err(WalletError::NotConnected);
        }
        let keypair = self.current_keypair()?;
        let blockhash = transaction.message.recent_blockhash;
        transaction
            .try_sign(&[&*keypair], blockhash)
            .map_err(|e| WalletError::Rejected(e.to_string()))?;

        self.client
            .send_transaction(&transaction)
            .await
            .map_err(|e| WalletError::Transport(e.to_string()))
    }

    fn events(&self) -> &WalletEvents {
        &self.events
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockWallet;
    use std::time::Duration;

    #[derive(Default)]
    struct EventLog(Mutex<Vec<WalletEvent>>);

    impl WalletEventHandler for EventLog {
        fn on_event(&self, event: &WalletEvent) {
            self.0.lock().unwrap().push(event.clone());
        }
    }

    impl EventLog {
        fn events(&self) -> Vec<WalletEvent> {
            self.0.lock().unwrap().clone()
        }
    }

    #[test]
    fn tracker_follows_connection_events() {
        let tracker = SessionTracker::new();
        assert_eq!(tracker.snapshot().message, "Not connected.");

        let key = Pubkey::new_unique();
        tracker.on_event(&WalletEvent::Connected(key));
        assert_eq!(tracker.snapshot().identity, Some(key));

        let next = Pubkey::new_unique();
        tracker.on_event(&WalletEvent::AccountChanged(Some(next)));
        let state = tracker.snapshot();
        assert_eq!(state.identity, Some(next));
        assert_eq!(state.message, format!("Switched to account {}", next));

        tracker.on_event(&WalletEvent::Disconnected);
        let state = tracker.snapshot();
        assert_eq!(state.identity, None);
        assert_eq!(state.message, "Wallet disconnected.");
    }

    #[test]
    fn keyless_account_change_requests_reconnect() {
        let tracker = SessionTracker::new();
        let key = Pubkey::new_unique();
        tracker.on_event(&WalletEvent::Connected(key));
        tracker.on_event(&WalletEvent::AccountChanged(None));

        let state = tracker.snapshot();
        assert!(state.needs_reconnect);
        assert_eq!(state.identity, Some(key));
    }

    #[tokio::test]
    async fn keypair_wallet_emits_events_to_subscribers() {
        let client = Arc::new(RpcClient::new("http://127.0.0.1:8899".to_string()));
        let keypair = Keypair::new();
        let key = keypair.pubkey();
        let wallet = KeypairWallet::new(keypair, client);
        let tracker = Arc::new(SessionTracker::new());
        wallet.events().subscribe(tracker.clone());

        assert_eq!(wallet.identity(), None);
        assert_eq!(wallet.connect().await.unwrap(), key);
        assert_eq!(wallet.identity(), Some(key));
        assert_eq!(tracker.snapshot().identity, Some(key));

        let replacement = Keypair::new();
        let replacement_key = replacement.pubkey();
        wallet.switch_account(replacement);
        assert_eq!(wallet.identity(), Some(replacement_key));
        assert_eq!(tracker.snapshot().identity, Some(replacement_key));

        wallet.disconnect().await.unwrap();
        assert_eq!(wallet.identity(), None);
        assert_eq!(tracker.snapshot().identity, None);

        wallet.events().clear();
        wallet.connect().await.unwrap();
        assert_eq!(tracker.snapshot().identity, None);
    }

    #[tokio::test]
    async fn disconnected_keypair_wallet_refuses_to_sign() {
        let client = Arc::new(RpcClient::new("http://127.0.0.1:8899".to_string()));
        let wallet = KeypairWallet::new(Keypair::new(), client);
        let result = wallet
            .sign_and_send_transaction(Transaction::default())
            .await;
        assert!(matches!(result, Err(WalletError::NotConnected)));
    }

    #[tokio::test]
    async fn keyless_account_change_reconnects_the_wallet() {
        let key = Pubkey::new_unique();
        let wallet = Arc::new(MockWallet::disconnected(key));
        let tracker = Arc::new(SessionTracker::new());
        let log = Arc::new(EventLog::default());
        wallet.events().subscribe(tracker.clone());
        wallet.events().subscribe(log.clone());
        wallet
            .events()
            .subscribe(Arc::new(Reconnector::new(&wallet).with_session(tracker.clone())));

        wallet.events().emit(&WalletEvent::AccountChanged(None));
        tokio::time::timeout(Duration::from_secs(1), async {
            while log.events().len() < 2 {
                tokio::task::yield_now().await;
            }
        })
        .await
        .unwrap();

        assert_eq!(
            log.events(),
            vec![WalletEvent::AccountChanged(None), WalletEvent::Connected(key)]
        );
        assert_eq!(wallet.identity(), Some(key));
        let state = tracker.snapshot();
        assert_eq!(state.identity, Some(key));
        assert!(!state.needs_reconnect);
        assert_eq!(state.message, "Wallet connected!");
    }

    #[tokio::test]
    async fn failed_reconnect_is_recorded_on_the_session() {
        let wallet = Arc::new(MockWallet::disconnected(Pubkey::new_unique()));
        wallet.fail_connect("wallet locked");
        let tracker = Arc::new(SessionTracker::new());
        wallet.events().subscribe(tracker.clone());
        wallet
            .events()
            .subscribe(Arc::new(Reconnector::new(&wallet).with_session(tracker.clone())));

        wallet.events().emit(&WalletEvent::AccountChanged(None));
        tokio::time::timeout(Duration::from_secs(1), async {
            while !tracker.snapshot().message.starts_with("Reconnection failed") {
                tokio::task::yield_now().await;
            }
        })
        .await
        .unwrap();

        let state = tracker.snapshot();
        assert_eq!(
            state.message,
            "Reconnection failed: request rejected by wallet: wallet locked"
        );
        assert!(state.needs_reconnect);
        assert_eq!(wallet.identity(), None);
    }

    #[test]
    fn reconnector_ignores_other_events_and_dropped_wallets() {
        let wallet = Arc::new(MockWallet::disconnected(Pubkey::new_unique()));
        let reconnector = Reconnector::new(&wallet);
        // No runtime here; only the keyless change would need one.
        reconnector.on_event(&WalletEvent::Disconnected);
        drop(wallet);
        reconnector.on_event(&WalletEvent::AccountChanged(None));
    }
}
