use super::tracker::{AccountTracker, TrackerParts};
use crate::config::TrackerConfig;
use crate::domain::errors::ConfigError;
use crate::infrastructure::pubsub_notifier::PubsubNotifier;
use crate::infrastructure::solana_client::SolanaClient;
use crate::infrastructure::token_index::{DisabledTokenIndex, HeliusTokenIndex, TokenIndex};

/// Tracker wired against a live cluster.
pub type App = AccountTracker<SolanaClient, Box<dyn TokenIndex + Send + Sync>, PubsubNotifier>;

/// Builds a tracker for the configured network. Must run inside a Tokio runtime.
pub fn build_tracker(config: &TrackerConfig) -> Result<App, ConfigError> {
    let endpoints = config.endpoints()?;
    tracing::info!("Using {} RPC endpoint {}", config.network, redact(&endpoints.rpc_url));

    let token_index: Box<dyn TokenIndex + Send + Sync> = match endpoints.token_index_url {
        Some(url) => Box::new(HeliusTokenIndex::new(url)),
        None => {
            tracing::warn!("No API key configured, token holdings will not be indexed");
            Box::new(DisabledTokenIndex)
        }
    };

    Ok(AccountTracker::new(
        TrackerParts::builder()
            .ledger(SolanaClient::from_url(&endpoints.rpc_url, config.num_retries))
            .token_index(token_index)
            .notifier(PubsubNotifier::new(endpoints.ws_url))
            .history_limit(config.history_limit)
            .build(),
    ))
}

/// Hides the credential carried in endpoint query strings.
fn redact(url: &str) -> String {
    match url.split_once("api-key=") {
        Some((base, _)) => format!("{base}api-key=***"),
        None => url.to_string(),
    }
}
