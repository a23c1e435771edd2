pub mod account_notifier;
pub mod ledger_client;
pub mod pubsub_notifier;
pub mod solana_client;
pub mod token_index;
