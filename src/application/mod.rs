use crate::domain::models::{AccountSnapshot, ConnectionStatus};
use tokio::sync::watch;

pub mod app;
pub mod subscription;
pub mod tracker;

/// The `Tracker` trait is the surface a UI layer drives to follow one account.
///
/// Implementors validate the address, fetch balance, token holdings and recent
/// history concurrently, and keep the result fresh through an account-change
/// subscription. Failures never escape as errors: they are reported through the
/// snapshot's fetch state and the connection status.
///
/// # Examples
///
/// ```no_run
/// use sol_account_tracker::application::Tracker;
///
/// async fn follow(tracker: &impl Tracker) {
///     tracker.track("vines1vzrYbzLMRdu58ou5XTby4qAqVRLmqo36NKPTg").await;
///     let mut updates = tracker.watch_snapshot();
///     while updates.changed().await.is_ok() {
///         println!("{:?}", updates.borrow().fetch_state);
///     }
/// }
/// ```
#[async_trait::async_trait]
pub trait Tracker {
    /// Starts tracking `address`, replacing whatever was tracked before.
    async fn track(&self, address: &str);

    /// Re-fetches the tracked account without touching its subscription.
    async fn refresh(&self);

    /// Tears the subscription down and resets all state.
    fn stop(&self);

    fn snapshot(&self) -> AccountSnapshot;

    fn status(&self) -> ConnectionStatus;

    fn watch_snapshot(&self) -> watch::Receiver<AccountSnapshot>;

    fn watch_status(&self) -> watch::Receiver<ConnectionStatus>;
}
