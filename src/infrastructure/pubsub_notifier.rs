use futures::StreamExt;
use solana_client::{nonblocking::pubsub_client::PubsubClient, rpc_config::RpcAccountInfoConfig};
use solana_sdk::{commitment_config::CommitmentConfig, pubkey::Pubkey};
use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, Mutex, PoisonError,
    },
};
use tokio::sync::{oneshot, Mutex as AsyncMutex};

use crate::domain::{errors::TrackerError, models::SubscriptionHandle};

use super::account_notifier::{AccountListener, AccountNotifier};

/// Account-change notifications over the ledger's websocket endpoint.
///
/// A single websocket connection is opened lazily and shared by every
/// subscription. Each subscription is driven by its own task which forwards
/// notifications until it is cancelled, then unsubscribes on the ledger side.
/// When the server ends a stream the task forgets the handle, drops the dead
/// connection and fires the listener's `on_closed`.
pub struct PubsubNotifier {
    shared: Arc<Shared>,
    next_id: AtomicU64,
}

struct Shared {
    ws_url: String,
    connection: AsyncMutex<Option<Arc<PubsubClient>>>,
    // handle -> cancellation of the task driving it
    active: Mutex<HashMap<SubscriptionHandle, oneshot::Sender<()>>>,
}

impl Shared {
    async fn connection(&self) -> Result<Arc<PubsubClient>, TrackerError> {
        let mut connection = self.connection.lock().await;
        if let Some(client) = connection.as_ref() {
            return Ok(client.clone());
        }

        tracing::info!("Connecting to notification endpoint {}", self.ws_url);
        let client = Arc::new(PubsubClient::new(&self.ws_url).await?);
        *connection = Some(client.clone());
        Ok(client)
    }

    async fn reset_connection(&self) {
        self.connection.lock().await.take();
    }

    /// Drops the cached connection only if it is still `client`.
    async fn discard_connection(&self, client: &Arc<PubsubClient>) {
        let mut connection = self.connection.lock().await;
        if connection
            .as_ref()
            .is_some_and(|cached| Arc::ptr_eq(cached, client))
        {
            connection.take();
        }
    }

    fn register(&self, handle: SubscriptionHandle, cancel: oneshot::Sender<()>) {
        self.lock_active().insert(handle, cancel);
    }

    fn forget(&self, handle: SubscriptionHandle) -> Option<oneshot::Sender<()>> {
        self.lock_active().remove(&handle)
    }

    fn lock_active(
        &self,
    ) -> std::sync::MutexGuard<'_, HashMap<SubscriptionHandle, oneshot::Sender<()>>> {
        self.active.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl PubsubNotifier {
    pub fn new(ws_url: impl Into<String>) -> Self {
        Self {
            shared: Arc::new(Shared {
                ws_url: ws_url.into(),
                connection: AsyncMutex::new(None),
                active: Mutex::new(HashMap::new()),
            }),
            next_id: AtomicU64::new(1),
        }
    }
}

#[async_trait::async_trait]
impl AccountNotifier for PubsubNotifier {
    async fn subscribe(
        &self,
        address: Pubkey,
        listener: AccountListener,
    ) -> Result<SubscriptionHandle, TrackerError> {
        let client = self.shared.connection().await?;
        let handle = SubscriptionHandle::new(self.next_id.fetch_add(1, Ordering::Relaxed));
        let (ready_tx, ready_rx) = oneshot::channel::<Result<(), TrackerError>>();
        let (cancel_tx, mut cancel_rx) = oneshot::channel::<()>();
        // registered before the task runs so a stream closing early still finds it
        self.shared.register(handle, cancel_tx);
        let shared = self.shared.clone();

        tokio::spawn(async move {
            let config = RpcAccountInfoConfig {
                commitment: Some(CommitmentConfig::confirmed()),
                ..Default::default()
            };
            let (mut notifications, unsubscribe) =
                match client.account_subscribe(&address, Some(config)).await {
                    Ok(subscription) => subscription,
                    Err(e) => {
                        let _ = ready_tx.send(Err(e.into()));
                        return;
                    }
                };

            if ready_tx.send(Ok(())).is_err() {
                unsubscribe().await;
                return;
            }

            let closed = loop {
                tokio::select! {
                    _ = &mut cancel_rx => break false,
                    notification = notifications.next() => match notification {
                        Some(_) => (listener.on_change)(),
                        None => break true,
                    }
                }
            };
            drop(notifications);

            if closed {
                tracing::warn!("Notification stream for {} closed", address);
                shared.forget(handle);
                shared.discard_connection(&client).await;
                (listener.on_closed)();
            } else {
                unsubscribe().await;
                tracing::debug!("Subscription {} for {} torn down", handle.id(), address);
            }
        });

        let failure = match ready_rx.await {
            Ok(Ok(())) => None,
            Ok(Err(e)) => Some(e),
            Err(_) => Some(TrackerError::Network(
                "subscription task ended before confirming".to_string(),
            )),
        };
        if let Some(e) = failure {
            self.shared.forget(handle);
            if e.is_transient() {
                self.shared.reset_connection().await;
            }
            return Err(e);
        }

        tracing::info!("Subscribed to account changes of {} ({})", address, handle.id());
        Ok(handle)
    }

    fn unsubscribe(&self, handle: SubscriptionHandle) {
        match self.shared.forget(handle) {
            Some(cancel) => {
                let _ = cancel.send(());
            }
            None => tracing::debug!("Subscription {} already removed", handle.id()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn silent() -> AccountListener {
        AccountListener::new(Arc::new(|| {}), Arc::new(|| {}))
    }

    #[tokio::test]
    async fn unsubscribing_an_unknown_handle_is_a_no_op() {
        let notifier = PubsubNotifier::new("ws://127.0.0.1:9");
        notifier.unsubscribe(SubscriptionHandle::new(7));
        notifier.unsubscribe(SubscriptionHandle::new(7));
        assert!(notifier.shared.lock_active().is_empty());
    }

    #[tokio::test]
    async fn unsubscribe_cancels_the_driving_task() {
        let notifier = PubsubNotifier::new("ws://127.0.0.1:9");
        let handle = SubscriptionHandle::new(3);
        let (cancel_tx, cancel_rx) = oneshot::channel();
        notifier.shared.register(handle, cancel_tx);

        notifier.unsubscribe(handle);

        assert_eq!(cancel_rx.await, Ok(()));
        assert!(notifier.shared.lock_active().is_empty());
    }

    #[tokio::test]
    async fn closed_stream_forgets_its_handle() {
        let notifier = PubsubNotifier::new("ws://127.0.0.1:9");
        let handle = SubscriptionHandle::new(4);
        let (cancel_tx, _cancel_rx) = oneshot::channel();
        notifier.shared.register(handle, cancel_tx);

        assert!(notifier.shared.forget(handle).is_some());
        // a later teardown of the same handle finds nothing to cancel
        notifier.unsubscribe(handle);
        assert!(notifier.shared.lock_active().is_empty());
    }

    #[tokio::test]
    async fn unreachable_endpoint_fails_without_registering() {
        let notifier = PubsubNotifier::new("ws://127.0.0.1:9");
        let result = notifier.subscribe(Pubkey::new_unique(), silent()).await;
        assert!(matches!(result, Err(TrackerError::Network(_))));
        assert!(notifier.shared.lock_active().is_empty());
        assert!(notifier.shared.connection.lock().await.is_none());
    }
}
