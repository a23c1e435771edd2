use super::subscription::{ActiveSubscription, SubscriptionManager};
use super::Tracker;
use crate::{
    domain::{
        address::parse_address,
        classifier::to_record,
        errors::TrackerError,
        models::{
            AccountSnapshot, ConnectionStatus, FetchState, SignatureInfo, TransactionDetail,
            TransactionRecord,
        },
    },
    infrastructure::{
        account_notifier::{AccountListener, AccountNotifier},
        ledger_client::LedgerClient,
        token_index::TokenIndex,
    },
};
use chrono::Utc;
use futures::future::join_all;
use solana_sdk::{pubkey::Pubkey, signature::Signature};
use std::{
    str::FromStr,
    sync::{Arc, Mutex, MutexGuard, PoisonError, Weak},
};
use tokio::sync::{mpsc, watch};
use typed_builder::TypedBuilder;

/// Number of most recent signatures resolved on every fetch.
pub const DEFAULT_HISTORY_LIMIT: usize = 10;

/// Collaborators of an [`AccountTracker`].
#[derive(TypedBuilder)]
pub struct TrackerParts<L, T, N> {
    ledger: L,
    token_index: T,
    notifier: N,
    #[builder(default = DEFAULT_HISTORY_LIMIT)]
    history_limit: usize,
}

/// Tracks one account at a time and keeps its snapshot in sync with the ledger.
///
/// Every `track` starts a new session generation. Fetches are tagged with the
/// generation and a sequence number; a result is committed only while the
/// session still tracks the same account in the same generation and no newer
/// fetch has committed already. Results of fetches outliving their session are
/// dropped.
///
/// Must be created inside a Tokio runtime: account-change notifications are
/// consumed by a background task spawned on construction.
pub struct AccountTracker<L, T, N>
where
    N: AccountNotifier + Send + Sync,
{
    inner: Arc<Inner<L, T, N>>,
}

impl<L, T, N> Clone for AccountTracker<L, T, N>
where
    N: AccountNotifier + Send + Sync,
{
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

struct Inner<L, T, N>
where
    N: AccountNotifier + Send + Sync,
{
    ledger: L,
    token_index: T,
    subscriptions: SubscriptionManager<N>,
    history_limit: usize,
    session: Mutex<Session>,
    snapshot: watch::Sender<AccountSnapshot>,
    status: watch::Sender<ConnectionStatus>,
    events: mpsc::UnboundedSender<TrackerEvent>,
}

#[derive(Debug, Clone, Copy)]
enum TrackerEvent {
    AccountChanged { address: Pubkey, generation: u64 },
    SubscriptionClosed { address: Pubkey, generation: u64 },
}

#[derive(Debug, Default)]
struct Session {
    address: Option<Pubkey>,
    generation: u64,
    issued: u64,
    committed: u64,
    // generation whose notification-driven refresh is in flight
    refreshing: Option<u64>,
    refresh_requested: bool,
}

#[derive(Debug, Clone, Copy)]
struct FetchTicket {
    address: Pubkey,
    generation: u64,
    sequence: u64,
}

impl Session {
    /// Starts a new generation for `address`, reporting whether the account changed.
    fn begin(&mut self, address: Pubkey) -> (u64, bool) {
        let replaced = self.address != Some(address);
        self.address = Some(address);
        self.generation += 1;
        (self.generation, replaced)
    }

    fn end(&mut self) {
        self.address = None;
        self.generation += 1;
    }

    fn is_current(&self, address: Pubkey, generation: u64) -> bool {
        self.address == Some(address) && self.generation == generation
    }

    fn issue(&mut self, address: Pubkey, generation: u64) -> Option<FetchTicket> {
        if !self.is_current(address, generation) {
            return None;
        }
        self.issued += 1;
        Some(FetchTicket {
            address,
            generation,
            sequence: self.issued,
        })
    }

    fn accepts(&self, ticket: &FetchTicket) -> bool {
        self.is_current(ticket.address, ticket.generation) && ticket.sequence > self.committed
    }

    /// Claims the notification-driven refresh of `generation`. Returns false when
    /// one is already running; it will then run once more after finishing.
    fn claim_refresh(&mut self, generation: u64) -> bool {
        if self.refreshing == Some(generation) {
            self.refresh_requested = true;
            return false;
        }
        self.refreshing = Some(generation);
        self.refresh_requested = false;
        true
    }

    /// Called when a claimed refresh finished; true means run it again.
    fn finish_refresh(&mut self, address: Pubkey, generation: u64) -> bool {
        if self.refreshing != Some(generation) {
            return false;
        }
        if self.refresh_requested && self.is_current(address, generation) {
            self.refresh_requested = false;
            return true;
        }
        self.refreshing = None;
        self.refresh_requested = false;
        false
    }
}

impl<L, T, N> AccountTracker<L, T, N>
where
    L: LedgerClient + Send + Sync + 'static,
    T: TokenIndex + Send + Sync + 'static,
    N: AccountNotifier + Send + Sync + 'static,
{
    pub fn new(parts: TrackerParts<L, T, N>) -> Self {
        let (events, events_rx) = mpsc::unbounded_channel();
        let (snapshot, _) = watch::channel(AccountSnapshot::default());
        let (status, _) = watch::channel(ConnectionStatus::default());
        let inner = Arc::new(Inner {
            ledger: parts.ledger,
            token_index: parts.token_index,
            subscriptions: SubscriptionManager::new(parts.notifier),
            history_limit: parts.history_limit,
            session: Mutex::new(Session::default()),
            snapshot,
            status,
            events,
        });

        spawn_event_loop(Arc::downgrade(&inner), events_rx);
        Self { inner }
    }

    /// The subscription currently kept alive for the tracked account.
    pub fn subscription(&self) -> Option<ActiveSubscription> {
        self.inner.subscriptions.active()
    }
}

#[async_trait::async_trait]
impl<L, T, N> Tracker for AccountTracker<L, T, N>
where
    L: LedgerClient + Send + Sync + 'static,
    T: TokenIndex + Send + Sync + 'static,
    N: AccountNotifier + Send + Sync + 'static,
{
    async fn track(&self, address: &str) {
        self.inner.track(address).await
    }

    async fn refresh(&self) {
        let current = {
            let session = self.inner.lock_session();
            session.address.map(|address| (address, session.generation))
        };

        match current {
            Some((address, generation)) => {
                tracing::info!("Refreshing {}", address);
                let _ = self.inner.fetch_and_commit(address, generation).await;
            }
            None => tracing::debug!("No account tracked, nothing to refresh"),
        }
    }

    fn stop(&self) {
        self.inner.stop()
    }

    fn snapshot(&self) -> AccountSnapshot {
        self.inner.snapshot.borrow().clone()
    }

    fn status(&self) -> ConnectionStatus {
        self.inner.status.borrow().clone()
    }

    fn watch_snapshot(&self) -> watch::Receiver<AccountSnapshot> {
        self.inner.snapshot.subscribe()
    }

    fn watch_status(&self) -> watch::Receiver<ConnectionStatus> {
        self.inner.status.subscribe()
    }
}

fn spawn_event_loop<L, T, N>(
    inner: Weak<Inner<L, T, N>>,
    mut events: mpsc::UnboundedReceiver<TrackerEvent>,
) where
    L: LedgerClient + Send + Sync + 'static,
    T: TokenIndex + Send + Sync + 'static,
    N: AccountNotifier + Send + Sync + 'static,
{
    tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            let Some(tracker) = inner.upgrade() else {
                break;
            };

            match event {
                TrackerEvent::AccountChanged {
                    address,
                    generation,
                } => {
                    let claimed = {
                        let mut session = tracker.lock_session();
                        if !session.is_current(address, generation) {
                            tracing::debug!("Ignoring change notification for stale session of {}", address);
                            continue;
                        }
                        session.claim_refresh(generation)
                    };
                    if !claimed {
                        tracing::debug!("Refresh of {} already running, coalescing", address);
                        continue;
                    }
                    tracing::info!("Account {} changed, refreshing", address);
                    tokio::spawn(async move {
                        loop {
                            let _ = tracker.fetch_and_commit(address, generation).await;
                            if !tracker.lock_session().finish_refresh(address, generation) {
                                break;
                            }
                        }
                    });
                }
                TrackerEvent::SubscriptionClosed {
                    address,
                    generation,
                } => {
                    let session = tracker.lock_session();
                    if !session.is_current(address, generation) {
                        continue;
                    }
                    tracing::warn!("Live updates for {} lost", address);
                    tracker.subscriptions.unsubscribe_current();
                    tracker.status.send_modify(|status| status.is_subscribed = false);
                }
            }
        }
        tracing::debug!("Tracker event loop stopped");
    });
}

impl<L, T, N> Inner<L, T, N>
where
    L: LedgerClient + Send + Sync + 'static,
    T: TokenIndex + Send + Sync + 'static,
    N: AccountNotifier + Send + Sync + 'static,
{
    async fn track(&self, address: &str) {
        let address = match parse_address(address) {
            Ok(address) => address,
            Err(e) => {
                tracing::warn!("Refusing to track {:?}: {}", address, e);
                self.snapshot.send_modify(|snapshot| {
                    snapshot.fetch_state = FetchState::Error;
                    snapshot.error_message = Some(e.to_string());
                });
                return;
            }
        };

        let (generation, replaced) = self.lock_session().begin(address);
        if replaced {
            if let Some(handle) = self.subscriptions.unsubscribe_current() {
                tracing::info!("Dropped subscription {} of previous account", handle.id());
            }
            self.status.send_modify(|status| status.is_subscribed = false);
            self.snapshot.send_replace(AccountSnapshot {
                address: address.to_string(),
                ..Default::default()
            });
        }

        tracing::info!("Tracking {}", address);
        if self.fetch_and_commit(address, generation).await.is_ok() {
            self.subscribe(address, generation).await;
        }
    }

    fn stop(&self) {
        let mut session = self.lock_session();
        if let Some(address) = session.address {
            tracing::info!("Stopped tracking {}", address);
        }
        session.end();
        self.subscriptions.unsubscribe_current();
        self.snapshot.send_replace(AccountSnapshot::default());
        self.status.send_replace(ConnectionStatus::default());
    }

    /// Fetches the three views of `address` concurrently and commits them if still relevant.
    async fn fetch_and_commit(&self, address: Pubkey, generation: u64) -> Result<(), TrackerError> {
        let ticket = {
            let mut session = self.lock_session();
            let Some(ticket) = session.issue(address, generation) else {
                tracing::debug!("Session of {} ended before fetching", address);
                return Ok(());
            };
            self.snapshot.send_modify(|snapshot| {
                snapshot.fetch_state = FetchState::Loading;
                snapshot.error_message = None;
            });
            ticket
        };

        let fetched = self.fetch(&address).await;

        let mut session = self.lock_session();
        if !session.accepts(&ticket) {
            tracing::debug!(
                "Discarding stale fetch {} for {}",
                ticket.sequence,
                address
            );
            return Ok(());
        }
        session.committed = ticket.sequence;

        match fetched {
            Ok(snapshot) => {
                tracing::info!(
                    "Committed snapshot of {}: {} SOL, {} tokens, {} transactions",
                    address,
                    snapshot.native_balance,
                    snapshot.tokens.len(),
                    snapshot.transactions.len()
                );
                self.snapshot.send_replace(snapshot);
                self.status.send_modify(|status| {
                    status.is_connected = true;
                    status.last_update_at = Some(Utc::now());
                });
                Ok(())
            }
            Err(e) => {
                tracing::error!("Failed to fetch {}: {}", address, e);
                let message = e.to_string();
                self.snapshot.send_modify(|snapshot| {
                    snapshot.fetch_state = FetchState::Error;
                    snapshot.error_message = Some(message);
                });
                self.status.send_modify(|status| status.is_connected = false);
                Err(e)
            }
        }
    }

    async fn fetch(&self, address: &Pubkey) -> Result<AccountSnapshot, TrackerError> {
        let (native_balance, tokens, transactions) = tokio::try_join!(
            self.ledger.get_native_balance(address),
            self.token_index.get_token_holdings(address),
            self.transaction_history(address),
        )?;

        Ok(AccountSnapshot {
            address: address.to_string(),
            native_balance,
            tokens,
            transactions,
            fetch_state: FetchState::Ready,
            error_message: None,
        })
    }

    async fn transaction_history(
        &self,
        address: &Pubkey,
    ) -> Result<Vec<TransactionRecord>, TrackerError> {
        let signatures = self
            .ledger
            .get_signature_history(address, self.history_limit)
            .await?;

        let details = join_all(signatures.iter().map(|info| self.transaction_detail(info))).await;

        Ok(signatures
            .iter()
            .zip(details)
            .filter_map(|(info, detail)| detail.map(|detail| to_record(info, &detail, address)))
            .collect())
    }

    /// Resolves one signature. Failures only drop this entry from the history.
    async fn transaction_detail(&self, info: &SignatureInfo) -> Option<TransactionDetail> {
        let signature = match Signature::from_str(&info.signature) {
            Ok(signature) => signature,
            Err(e) => {
                tracing::warn!("Skipping malformed signature {}: {}", info.signature, e);
                return None;
            }
        };

        match self.ledger.get_transaction_detail(&signature).await {
            Ok(Some(detail)) => Some(detail),
            Ok(None) => {
                tracing::debug!("{}", TrackerError::NotFound(info.signature.clone()));
                None
            }
            Err(e) => {
                tracing::warn!("Skipping transaction {}: {}", info.signature, e);
                None
            }
        }
    }

    async fn subscribe(&self, address: Pubkey, generation: u64) {
        if !self.lock_session().is_current(address, generation) {
            return;
        }

        let changed = self.events.clone();
        let closed = self.events.clone();
        let listener = AccountListener::new(
            Arc::new(move || {
                let _ = changed.send(TrackerEvent::AccountChanged {
                    address,
                    generation,
                });
            }),
            Arc::new(move || {
                let _ = closed.send(TrackerEvent::SubscriptionClosed {
                    address,
                    generation,
                });
            }),
        );

        let result = self.subscriptions.subscribe(address, listener).await;

        let session = self.lock_session();
        let current = session.is_current(address, generation);
        match result {
            Ok(_) if current => {
                self.status.send_modify(|status| status.is_subscribed = true);
            }
            Ok(handle) => {
                tracing::debug!("Session of {} ended while subscribing", address);
                self.subscriptions.unsubscribe(handle);
            }
            Err(e) => {
                tracing::warn!("Live updates unavailable for {}: {}", address, e);
                if current {
                    self.status.send_modify(|status| status.is_subscribed = false);
                }
            }
        }
    }
}

impl<L, T, N> Inner<L, T, N>
where
    N: AccountNotifier + Send + Sync,
{
    fn lock_session(&self) -> MutexGuard<'_, Session> {
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<L, T, N> Drop for Inner<L, T, N>
where
    N: AccountNotifier + Send + Sync,
{
    fn drop(&mut self) {
        self.subscriptions.unsubscribe_current();
    }
}
