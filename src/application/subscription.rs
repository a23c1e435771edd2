use crate::{
    domain::{errors::TrackerError, models::SubscriptionHandle},
    infrastructure::account_notifier::{AccountListener, AccountNotifier},
};
use solana_sdk::pubkey::Pubkey;
use std::sync::{Mutex, PoisonError};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ActiveSubscription {
    pub address: Pubkey,
    pub handle: SubscriptionHandle,
}

/// Owns at most one live account-change subscription.
pub struct SubscriptionManager<N> {
    notifier: N,
    active: Mutex<Option<ActiveSubscription>>,
    // serializes subscribe calls so a replacement can never interleave with another
    establishing: tokio::sync::Mutex<()>,
}

impl<N> SubscriptionManager<N>
where
    N: AccountNotifier + Send + Sync,
{
    pub fn new(notifier: N) -> Self {
        Self {
            notifier,
            active: Mutex::new(None),
            establishing: tokio::sync::Mutex::new(()),
        }
    }

    /// Replaces the current subscription, if any, with one for `address`.
    ///
    /// The previous handle is torn down before the new one is requested, so at
    /// most one handle is live at any time. On failure no subscription remains.
    pub async fn subscribe(
        &self,
        address: Pubkey,
        listener: AccountListener,
    ) -> Result<SubscriptionHandle, TrackerError> {
        let _establishing = self.establishing.lock().await;

        if let Some(previous) = self.take_active() {
            tracing::info!(
                "Replacing subscription {} for {}",
                previous.handle.id(),
                previous.address
            );
            self.notifier.unsubscribe(previous.handle);
        }

        let handle = self.notifier.subscribe(address, listener).await?;
        *self.lock_active() = Some(ActiveSubscription { address, handle });
        Ok(handle)
    }

    /// Tears `handle` down if it is still the active subscription. Stale handles are ignored.
    pub fn unsubscribe(&self, handle: SubscriptionHandle) {
        let removed = {
            let mut active = self.lock_active();
            match *active {
                Some(current) if current.handle == handle => active.take(),
                _ => None,
            }
        };

        match removed {
            Some(subscription) => self.notifier.unsubscribe(subscription.handle),
            None => tracing::debug!("Subscription {} is not active", handle.id()),
        }
    }

    /// Tears down whatever subscription is active and returns its handle.
    pub fn unsubscribe_current(&self) -> Option<SubscriptionHandle> {
        let subscription = self.take_active()?;
        self.notifier.unsubscribe(subscription.handle);
        Some(subscription.handle)
    }

    pub fn active(&self) -> Option<ActiveSubscription> {
        *self.lock_active()
    }

    fn take_active(&self) -> Option<ActiveSubscription> {
        self.lock_active().take()
    }

    fn lock_active(&self) -> std::sync::MutexGuard<'_, Option<ActiveSubscription>> {
        self.active.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::account_notifier::MockAccountNotifier;
    use mockall::{predicate::eq, Sequence};
    use std::sync::Arc;

    fn noop() -> AccountListener {
        AccountListener::new(Arc::new(|| {}), Arc::new(|| {}))
    }

    #[tokio::test]
    async fn resubscribing_tears_down_the_previous_handle_first() {
        let first = Pubkey::new_unique();
        let second = Pubkey::new_unique();
        let mut notifier = MockAccountNotifier::new();
        let mut seq = Sequence::new();

        notifier
            .expect_subscribe()
            .withf(move |address, _| *address == first)
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| Ok(SubscriptionHandle::new(1)));
        notifier
            .expect_unsubscribe()
            .with(eq(SubscriptionHandle::new(1)))
            .times(1)
            .in_sequence(&mut seq)
            .return_const(());
        notifier
            .expect_subscribe()
            .withf(move |address, _| *address == second)
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| Ok(SubscriptionHandle::new(2)));

        let manager = SubscriptionManager::new(notifier);
        tokio_test::assert_ok!(manager.subscribe(first, noop()).await);
        let handle = tokio_test::assert_ok!(manager.subscribe(second, noop()).await);

        assert_eq!(handle, SubscriptionHandle::new(2));
        assert_eq!(
            manager.active(),
            Some(ActiveSubscription {
                address: second,
                handle
            })
        );
    }

    #[tokio::test]
    async fn resubscribing_the_same_address_replaces_it() {
        let address = Pubkey::new_unique();
        let mut notifier = MockAccountNotifier::new();
        let mut next = 0;
        notifier.expect_subscribe().times(2).returning(move |_, _| {
            next += 1;
            Ok(SubscriptionHandle::new(next))
        });
        notifier
            .expect_unsubscribe()
            .with(eq(SubscriptionHandle::new(1)))
            .times(1)
            .return_const(());

        let manager = SubscriptionManager::new(notifier);
        manager.subscribe(address, noop()).await.unwrap();
        manager.subscribe(address, noop()).await.unwrap();

        assert_eq!(manager.active().map(|a| a.handle), Some(SubscriptionHandle::new(2)));
    }

    #[tokio::test]
    async fn unsubscribe_is_idempotent() {
        let mut notifier = MockAccountNotifier::new();
        notifier
            .expect_subscribe()
            .returning(|_, _| Ok(SubscriptionHandle::new(9)));
        notifier
            .expect_unsubscribe()
            .with(eq(SubscriptionHandle::new(9)))
            .times(1)
            .return_const(());

        let manager = SubscriptionManager::new(notifier);
        let handle = manager.subscribe(Pubkey::new_unique(), noop()).await.unwrap();
        manager.unsubscribe(handle);
        manager.unsubscribe(handle);
        assert_eq!(manager.unsubscribe_current(), None);
        assert_eq!(manager.active(), None);
    }

    #[tokio::test]
    async fn failed_subscribe_leaves_nothing_active() {
        let mut notifier = MockAccountNotifier::new();
        notifier
            .expect_subscribe()
            .returning(|_, _| Err(TrackerError::Network("connection refused".to_string())));

        let manager = SubscriptionManager::new(notifier);
        let result = manager.subscribe(Pubkey::new_unique(), noop()).await;

        assert_eq!(
            result,
            Err(TrackerError::Network("connection refused".to_string()))
        );
        assert_eq!(manager.active(), None);
    }
}
