use crate::domain::{errors::TrackerError, models::SubscriptionHandle};
use solana_sdk::pubkey::Pubkey;
use std::sync::Arc;

/// Callback fired on every account-change notification. Carries no payload: the
/// receiver is expected to re-read the account rather than trust pushed data.
pub type OnChange = Arc<dyn Fn() + Send + Sync>;

/// Callbacks attached to one subscription.
#[derive(Clone)]
pub struct AccountListener {
    pub on_change: OnChange,
    /// Fired once if the notification stream ends without being unsubscribed
    pub on_closed: OnChange,
}

impl AccountListener {
    pub fn new(on_change: OnChange, on_closed: OnChange) -> Self {
        Self {
            on_change,
            on_closed,
        }
    }
}

/// Source of push notifications for account changes.
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait AccountNotifier {
    /// Registers interest in changes of `address`.
    ///
    /// # Returns
    ///
    /// * `Result<SubscriptionHandle, TrackerError>` - The handle of the new live subscription.
    async fn subscribe(
        &self,
        address: Pubkey,
        listener: AccountListener,
    ) -> Result<SubscriptionHandle, TrackerError>;

    /// Tears the subscription down. Unknown or already removed handles are ignored.
    fn unsubscribe(&self, handle: SubscriptionHandle);
}
