use anyhow::Result;
use clap::Parser;
use sol_account_tracker::application::app;
use sol_account_tracker::application::tracker::DEFAULT_HISTORY_LIMIT;
use sol_account_tracker::application::Tracker;
use sol_account_tracker::config::{Network, TrackerConfig};
use sol_account_tracker::domain::address::parse_address;
use sol_account_tracker::service;
use std::sync::Arc;
use tokio::signal;
use tokio::sync::broadcast;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(
    version,
    about,
    long_about = "Solana account tracker with live updates and REST API"
)]
struct TrackerProgram {
    /// Account to start tracking right away
    address: Option<String>,

    /// Cluster to connect to
    #[arg(long, value_enum, default_value_t = Network::Devnet)]
    network: Network,

    /// Helius API key, required on mainnet
    #[arg(long, env = "HELIUS_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// Number of recent transactions to fetch
    #[arg(long, default_value_t = DEFAULT_HISTORY_LIMIT)]
    history_limit: usize,

    /// Number of retries
    #[arg(short, long, default_value_t = 3)]
    num_retries: usize,

    /// Listen port REST API
    #[arg(short, long, default_value_t = 3000)]
    listen_port: u16,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let args = TrackerProgram::parse();

    let config = TrackerConfig {
        network: args.network,
        api_key: args.api_key,
        history_limit: args.history_limit,
        num_retries: args.num_retries,
    };
    let tracker = Arc::new(app::build_tracker(&config)?);

    if let Some(address) = args.address.as_deref() {
        parse_address(address)?;
        tracker.track(address).await;
    }

    let (shutdown_sender, _) = broadcast::channel(1);

    // Log every published snapshot until shutdown
    let mut snapshots = tracker.watch_snapshot();
    let mut shutdown_rx = shutdown_sender.subscribe();
    let reporter_handle = tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = shutdown_rx.recv() => break,
                changed = snapshots.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let snapshot = snapshots.borrow_and_update().clone();
                    tracing::info!(
                        "{} [{:?}] {} SOL, {} tokens, {} transactions",
                        snapshot.address,
                        snapshot.fetch_state,
                        snapshot.native_balance,
                        snapshot.tokens.len(),
                        snapshot.transactions.len()
                    );
                    if let Some(message) = snapshot.error_message {
                        tracing::error!("Fetch failed: {}", message);
                    }
                }
            }
        }
    });

    let server_handle = tokio::spawn(service::api::start_server(
        shutdown_sender.clone(),
        tracker.clone(),
        args.listen_port,
    ));

    signal::ctrl_c().await?;
    tracing::warn!("Received Ctrl+C, shutting down...");

    tracker.stop();
    let _ = shutdown_sender.send(());

    let (_, server_result) = tokio::join!(reporter_handle, server_handle);
    if let Ok(Err(e)) = server_result {
        tracing::error!("API server error: {:?}", e);
    }

    tracing::info!("Shutdown complete");
    Ok(())
}
