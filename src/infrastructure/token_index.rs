use crate::domain::{errors::TrackerError, models::TokenHolding};
use serde::Deserialize;
use solana_sdk::pubkey::Pubkey;

const UNKNOWN_TOKEN: &str = "Unknown Token";
const MINT_PREFIX_LEN: usize = 4;

/// Resolves the fungible token holdings of an account.
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait TokenIndex {
    /// Returns every fungible token `owner` holds with a non-zero balance.
    async fn get_token_holdings(&self, owner: &Pubkey) -> Result<Vec<TokenHolding>, TrackerError>;
}

/// Token index backed by the Helius DAS `searchAssets` method.
#[derive(Clone)]
pub struct HeliusTokenIndex {
    client: reqwest::Client,
    url: String,
}

impl HeliusTokenIndex {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.into(),
        }
    }
}

#[async_trait::async_trait]
impl TokenIndex for HeliusTokenIndex {
    async fn get_token_holdings(&self, owner: &Pubkey) -> Result<Vec<TokenHolding>, TrackerError> {
        let request = serde_json::json!({
            "jsonrpc": "2.0",
            "id": "token-balances",
            "method": "searchAssets",
            "params": {
                "ownerAddress": owner.to_string(),
                "tokenType": "fungible",
                "displayOptions": { "showNativeBalance": false },
            },
        });

        let response: SearchAssetsResponse = self
            .client
            .post(&self.url)
            .json(&request)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let holdings = holdings_from_response(response)?;
        tracing::debug!("Found {} fungible tokens for {}", holdings.len(), owner);
        Ok(holdings)
    }
}

#[async_trait::async_trait]
impl TokenIndex for Box<dyn TokenIndex + Send + Sync> {
    async fn get_token_holdings(&self, owner: &Pubkey) -> Result<Vec<TokenHolding>, TrackerError> {
        self.as_ref().get_token_holdings(owner).await
    }
}

/// Stand-in used when no index credential is configured.
#[derive(Clone, Copy, Default)]
pub struct DisabledTokenIndex;

#[async_trait::async_trait]
impl TokenIndex for DisabledTokenIndex {
    async fn get_token_holdings(&self, owner: &Pubkey) -> Result<Vec<TokenHolding>, TrackerError> {
        tracing::warn!("Token index disabled, skipping token holdings for {}", owner);
        Ok(Vec::new())
    }
}

#[derive(Deserialize, Debug)]
struct SearchAssetsResponse {
    result: Option<AssetPage>,
    error: Option<JsonRpcError>,
}

#[derive(Deserialize, Debug)]
struct JsonRpcError {
    message: String,
}

#[derive(Deserialize, Debug)]
struct AssetPage {
    #[serde(default)]
    items: Vec<Asset>,
}

#[derive(Deserialize, Debug)]
struct Asset {
    id: String,
    token_info: Option<AssetTokenInfo>,
    content: Option<AssetContent>,
}

#[derive(Deserialize, Debug)]
struct AssetTokenInfo {
    balance: Option<u64>,
    decimals: Option<u8>,
    symbol: Option<String>,
}

#[derive(Deserialize, Debug)]
struct AssetContent {
    metadata: Option<AssetMetadata>,
}

#[derive(Deserialize, Debug)]
struct AssetMetadata {
    name: Option<String>,
    symbol: Option<String>,
}

fn holdings_from_response(response: SearchAssetsResponse) -> Result<Vec<TokenHolding>, TrackerError> {
    if let Some(error) = response.error {
        return Err(TrackerError::Rpc(error.message));
    }

    Ok(response
        .result
        .map(|page| page.items)
        .unwrap_or_default()
        .into_iter()
        .filter_map(to_holding)
        .collect())
}

fn non_empty(value: Option<&String>) -> Option<&str> {
    value.map(String::as_str).filter(|s| !s.is_empty())
}

fn to_holding(asset: Asset) -> Option<TokenHolding> {
    let token_info = asset.token_info.as_ref();
    let raw_balance = token_info.and_then(|info| info.balance).unwrap_or(0);
    if raw_balance == 0 {
        return None;
    }
    let decimals = token_info.and_then(|info| info.decimals).unwrap_or(0);

    let metadata = asset.content.as_ref().and_then(|c| c.metadata.as_ref());
    let index_symbol = non_empty(token_info.and_then(|info| info.symbol.as_ref()));
    let metadata_symbol = non_empty(metadata.and_then(|m| m.symbol.as_ref()));
    let metadata_name = non_empty(metadata.and_then(|m| m.name.as_ref()));

    let symbol = index_symbol
        .or(metadata_symbol)
        .map(str::to_string)
        .unwrap_or_else(|| {
            let prefix: String = asset.id.chars().take(MINT_PREFIX_LEN).collect();
            format!("{prefix}...")
        });
    let name = metadata_name
        .or(index_symbol)
        .unwrap_or(UNKNOWN_TOKEN)
        .to_string();

    Some(TokenHolding {
        display_balance: format_token_amount(raw_balance, decimals),
        mint: asset.id,
        symbol,
        name,
        raw_balance,
        decimals,
    })
}

/// Renders `raw / 10^decimals` exactly, grouping thousands and trimming trailing zeros.
pub fn format_token_amount(raw: u64, decimals: u8) -> String {
    let digits = raw.to_string();
    let decimals = usize::from(decimals);

    let (whole, fraction) = if digits.len() > decimals {
        let (whole, fraction) = digits.split_at(digits.len() - decimals);
        (whole.to_string(), fraction.to_string())
    } else {
        ("0".to_string(), format!("{digits:0>decimals$}"))
    };

    let mut grouped = String::with_capacity(whole.len() + whole.len() / 3);
    for (idx, ch) in whole.chars().enumerate() {
        if idx > 0 && (whole.len() - idx) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }

    let fraction = fraction.trim_end_matches('0');
    if fraction.is_empty() {
        grouped
    } else {
        format!("{grouped}.{fraction}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn response(items: serde_json::Value) -> SearchAssetsResponse {
        serde_json::from_value(json!({
            "jsonrpc": "2.0",
            "id": "token-balances",
            "result": { "total": 1, "limit": 1000, "page": 1, "items": items }
        }))
        .unwrap()
    }

    #[test]
    fn formats_amounts_with_decimal_precision() {
        assert_eq!(format_token_amount(1_500_000, 6), "1.5");
        assert_eq!(format_token_amount(1, 6), "0.000001");
        assert_eq!(format_token_amount(1_234_567_890_000, 6), "1,234,567.89");
        assert_eq!(format_token_amount(42, 0), "42");
        assert_eq!(format_token_amount(1_000, 3), "1");
        assert_eq!(format_token_amount(999_999, 0), "999,999");
    }

    #[test]
    fn uses_index_symbol_and_metadata_name() {
        let holdings = holdings_from_response(response(json!([{
            "id": "EPjFWdd5AufqSSqeM2qN1xzybapC8G4wEGGkZwyTDt1v",
            "content": { "metadata": { "name": "USD Coin", "symbol": "USDC-META" } },
            "token_info": { "balance": 2_500_000u64, "decimals": 6, "symbol": "USDC" }
        }])))
        .unwrap();

        assert_eq!(
            holdings,
            vec![TokenHolding {
                mint: "EPjFWdd5AufqSSqeM2qN1xzybapC8G4wEGGkZwyTDt1v".to_string(),
                symbol: "USDC".to_string(),
                name: "USD Coin".to_string(),
                raw_balance: 2_500_000,
                decimals: 6,
                display_balance: "2.5".to_string(),
            }]
        );
    }

    #[test]
    fn falls_back_when_metadata_is_missing() {
        let holdings = holdings_from_response(response(json!([
            {
                "id": "MetaSymbolMint1111111111111111111111111111",
                "content": { "metadata": { "symbol": "META" } },
                "token_info": { "balance": 10u64, "decimals": 0 }
            },
            {
                "id": "NoMetadataMint11111111111111111111111111111",
                "token_info": { "balance": 7u64, "decimals": 1, "symbol": "" }
            },
            {
                "id": "IndexSymbolMint111111111111111111111111111",
                "content": { "metadata": { "name": "" } },
                "token_info": { "balance": 3u64, "decimals": 0, "symbol": "IDX" }
            }
        ])))
        .unwrap();

        assert_eq!(holdings[0].symbol, "META");
        assert_eq!(holdings[0].name, UNKNOWN_TOKEN);
        assert_eq!(holdings[1].symbol, "NoMe...");
        assert_eq!(holdings[1].name, UNKNOWN_TOKEN);
        assert_eq!(holdings[1].display_balance, "0.7");
        assert_eq!(holdings[2].symbol, "IDX");
        assert_eq!(holdings[2].name, "IDX");
    }

    #[test]
    fn zero_balances_are_filtered_for_any_precision() {
        for decimals in [0u8, 6, 9, 18] {
            let holdings = holdings_from_response(response(json!([
                { "id": "EmptyMint", "token_info": { "balance": 0u64, "decimals": decimals, "symbol": "ZERO" } },
                { "id": "NoBalanceMint", "token_info": { "decimals": decimals } },
                { "id": "HeldMint", "token_info": { "balance": 1u64, "decimals": decimals, "symbol": "ONE" } }
            ])))
            .unwrap();
            let mints: Vec<_> = holdings.iter().map(|h| h.mint.as_str()).collect();
            assert_eq!(mints, vec!["HeldMint"]);
        }
    }

    #[test]
    fn empty_result_is_not_an_error() {
        let empty: SearchAssetsResponse =
            serde_json::from_value(json!({ "jsonrpc": "2.0", "id": "token-balances" })).unwrap();
        assert!(holdings_from_response(empty).unwrap().is_empty());
        assert!(holdings_from_response(response(json!([]))).unwrap().is_empty());
    }

    #[test]
    fn service_error_maps_to_rpc_error() {
        let failed: SearchAssetsResponse = serde_json::from_value(json!({
            "jsonrpc": "2.0",
            "id": "token-balances",
            "error": { "code": -32602, "message": "invalid owner" }
        }))
        .unwrap();
        assert_eq!(
            holdings_from_response(failed),
            Err(TrackerError::Rpc("invalid owner".to_string()))
        );
    }

    #[tokio::test]
    async fn disabled_index_returns_no_holdings() {
        let holdings = DisabledTokenIndex
            .get_token_holdings(&Pubkey::new_unique())
            .await;
        assert_eq!(holdings, Ok(Vec::new()));
    }
}
