use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use solana_sdk::pubkey::Pubkey;

/// Where the tracked account's snapshot currently stands.
#[derive(Clone, Copy, Serialize, Deserialize, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum FetchState {
    #[default]
    Idle,
    Loading,
    Ready,
    Error,
}

/// Consolidated view of the tracked account.
#[derive(Clone, Serialize, Deserialize, Debug, Default, PartialEq)]
pub struct AccountSnapshot {
    /// Base58 address of the tracked account, empty when nothing is tracked
    pub address: String,
    /// Native balance in SOL
    pub native_balance: f64,
    /// Fungible token holdings with a non-zero balance
    pub tokens: Vec<TokenHolding>,
    /// Most recent transactions, newest first
    pub transactions: Vec<TransactionRecord>,
    pub fetch_state: FetchState,
    pub error_message: Option<String>,
}

impl AccountSnapshot {
    pub fn is_tracking(&self) -> bool {
        !self.address.is_empty()
    }
}

/// A fungible token held by the tracked account.
#[derive(Clone, Serialize, Deserialize, Debug, PartialEq, Eq)]
pub struct TokenHolding {
    /// Mint address, unique per holding
    pub mint: String,
    pub symbol: String,
    pub name: String,
    /// Balance in the token's smallest unit
    pub raw_balance: u64,
    pub decimals: u8,
    /// `raw_balance` scaled by `decimals`, ready for display
    pub display_balance: String,
}

#[derive(Clone, Copy, Serialize, Deserialize, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Send,
    Receive,
    Unknown,
}

#[derive(Clone, Copy, Serialize, Deserialize, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TransactionStatus {
    Success,
    Failed,
}

/// A transaction involving the tracked account, classified relative to it.
#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
pub struct TransactionRecord {
    /// Transaction signature
    pub signature: String,
    /// Unix timestamp of the block, when the ledger still knows it
    pub block_time: Option<i64>,
    /// Slot number in which the transaction was processed
    pub slot: u64,
    pub direction: Direction,
    /// SOL moved in `direction`; absent when the direction is unknown
    pub amount: Option<f64>,
    pub status: TransactionStatus,
    /// Fee paid in SOL
    pub fee: f64,
}

/// One entry of the signature history of an address.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SignatureInfo {
    pub signature: String,
    pub block_time: Option<i64>,
    pub slot: u64,
    pub failed: bool,
}

/// The parts of a confirmed transaction needed to classify it.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TransactionDetail {
    /// All accounts referenced by the transaction, lookup-table loads included
    pub account_keys: Vec<Pubkey>,
    /// Lamport balances before execution, indexed like `account_keys`
    pub pre_balances: Vec<u64>,
    /// Lamport balances after execution, indexed like `account_keys`
    pub post_balances: Vec<u64>,
    /// Fee in lamports
    pub fee: u64,
    /// Whether the ledger reported an execution error
    pub failed: bool,
}

/// Observational connection state, rebuilt from the latest fetch and subscribe outcomes.
#[derive(Clone, Serialize, Deserialize, Debug, Default, PartialEq, Eq)]
pub struct ConnectionStatus {
    pub is_connected: bool,
    pub is_subscribed: bool,
    pub last_update_at: Option<DateTime<Utc>>,
}

/// Opaque identifier of one live account-change subscription.
#[derive(Clone, Copy, Serialize, Deserialize, Debug, PartialEq, Eq, Hash)]
pub struct SubscriptionHandle(u64);

impl SubscriptionHandle {
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn id(&self) -> u64 {
        self.0
    }
}
