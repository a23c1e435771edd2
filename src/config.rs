use crate::domain::errors::ConfigError;
use std::fmt;

const DEVNET_RPC: &str = "https://api.devnet.solana.com";
const DEVNET_WS: &str = "wss://api.devnet.solana.com";
const HELIUS_DEVNET: &str = "devnet.helius-rpc.com";
const HELIUS_MAINNET: &str = "mainnet.helius-rpc.com";

/// Ledger cluster to track accounts on.
#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum Network {
    /// Public test cluster, no credential needed
    Devnet,
    /// Metered production endpoint, needs an API key
    Mainnet,
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Network::Devnet => write!(f, "devnet"),
            Network::Mainnet => write!(f, "mainnet"),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Endpoints {
    pub rpc_url: String,
    pub ws_url: String,
    /// Absent when no credential is available for the token index
    pub token_index_url: Option<String>,
}

impl Network {
    pub fn endpoints(&self, api_key: Option<&str>) -> Result<Endpoints, ConfigError> {
        let api_key = api_key.filter(|key| !key.is_empty());
        match (self, api_key) {
            (Network::Devnet, key) => Ok(Endpoints {
                rpc_url: DEVNET_RPC.to_string(),
                ws_url: DEVNET_WS.to_string(),
                token_index_url: key.map(|key| helius_url("https", HELIUS_DEVNET, key)),
            }),
            (Network::Mainnet, Some(key)) => Ok(Endpoints {
                rpc_url: helius_url("https", HELIUS_MAINNET, key),
                ws_url: helius_url("wss", HELIUS_MAINNET, key),
                token_index_url: Some(helius_url("https", HELIUS_MAINNET, key)),
            }),
            (Network::Mainnet, None) => Err(ConfigError::MissingApiKey(self.to_string())),
        }
    }
}

fn helius_url(scheme: &str, host: &str, api_key: &str) -> String {
    format!("{scheme}://{host}/?api-key={api_key}")
}

/// Everything needed to wire a tracker against a live cluster.
#[derive(Clone, Debug)]
pub struct TrackerConfig {
    pub network: Network,
    pub api_key: Option<String>,
    pub history_limit: usize,
    pub num_retries: usize,
}

impl TrackerConfig {
    pub fn endpoints(&self) -> Result<Endpoints, ConfigError> {
        if self.history_limit == 0 {
            return Err(ConfigError::InvalidHistoryLimit);
        }
        self.network.endpoints(self.api_key.as_deref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(network: Network, api_key: Option<&str>, history_limit: usize) -> TrackerConfig {
        TrackerConfig {
            network,
            api_key: api_key.map(str::to_string),
            history_limit,
            num_retries: 3,
        }
    }

    #[test]
    fn devnet_without_key_has_no_token_index() {
        let endpoints = config(Network::Devnet, None, 10).endpoints().unwrap();
        assert_eq!(endpoints.rpc_url, "https://api.devnet.solana.com");
        assert_eq!(endpoints.ws_url, "wss://api.devnet.solana.com");
        assert_eq!(endpoints.token_index_url, None);
    }

    #[test]
    fn devnet_with_key_indexes_tokens() {
        let endpoints = config(Network::Devnet, Some("k"), 10).endpoints().unwrap();
        assert_eq!(
            endpoints.token_index_url.as_deref(),
            Some("https://devnet.helius-rpc.com/?api-key=k")
        );
    }

    #[test]
    fn mainnet_uses_the_credential_everywhere() {
        let endpoints = config(Network::Mainnet, Some("secret"), 10)
            .endpoints()
            .unwrap();
        assert_eq!(
            endpoints.rpc_url,
            "https://mainnet.helius-rpc.com/?api-key=secret"
        );
        assert_eq!(endpoints.ws_url, "wss://mainnet.helius-rpc.com/?api-key=secret");
        assert_eq!(endpoints.token_index_url, Some(endpoints.rpc_url.clone()));
    }

    #[test]
    fn mainnet_requires_a_key() {
        for key in [None, Some("")] {
            assert!(matches!(
                config(Network::Mainnet, key, 10).endpoints(),
                Err(ConfigError::MissingApiKey(network)) if network == "mainnet"
            ));
        }
    }

    #[test]
    fn zero_history_limit_is_rejected() {
        assert!(matches!(
            config(Network::Devnet, None, 0).endpoints(),
            Err(ConfigError::InvalidHistoryLimit)
        ));
    }
}
