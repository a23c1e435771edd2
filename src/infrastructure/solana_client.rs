use solana_client::{
    nonblocking::rpc_client::RpcClient,
    rpc_client::GetConfirmedSignaturesForAddress2Config,
    rpc_config::RpcTransactionConfig,
    rpc_request::RpcRequest,
};
use solana_sdk::{commitment_config::CommitmentConfig, pubkey::Pubkey, signature::Signature};
use solana_transaction_status::{
    option_serializer::OptionSerializer, EncodedConfirmedTransactionWithStatusMeta,
    EncodedTransaction, UiMessage, UiTransactionEncoding, UiTransactionStatusMeta,
};
use std::{str::FromStr, sync::Arc, time::Duration};
use tokio_retry::{
    strategy::{jitter, ExponentialBackoff},
    RetryIf,
};

use crate::domain::{
    classifier::lamports_to_sol,
    errors::TrackerError,
    models::{SignatureInfo, TransactionDetail},
};

use super::ledger_client::LedgerClient;

/// A client for reading account state from the Solana RPC.
#[derive(Clone)]
pub struct SolanaClient {
    rpc_client: Arc<RpcClient>,
    num_retries: usize,
}

impl SolanaClient {
    /// Creates a new `SolanaClient` instance from the given RPC URL.
    ///
    /// # Arguments
    ///
    /// * `rpc_url` - The URL of the Solana RPC endpoint.
    /// * `num_retries` - How many times a transport failure is retried.
    ///
    /// # Returns
    ///
    /// A new `SolanaClient` instance.
    pub fn from_url(rpc_url: &str, num_retries: usize) -> Self {
        Self {
            rpc_client: Arc::new(RpcClient::new_with_commitment(
                rpc_url.to_string(),
                CommitmentConfig::confirmed(),
            )),
            num_retries,
        }
    }

    fn retry_strategy(&self) -> impl Iterator<Item = Duration> {
        ExponentialBackoff::from_millis(500)
            .map(jitter)
            .take(self.num_retries)
    }
}

#[async_trait::async_trait]
impl LedgerClient for SolanaClient {
    async fn get_native_balance(&self, address: &Pubkey) -> Result<f64, TrackerError> {
        let client = &self.rpc_client;
        let lamports = RetryIf::spawn(
            self.retry_strategy(),
            || async move { client.get_balance(address).await.map_err(TrackerError::from) },
            TrackerError::is_transient,
        )
        .await?;
        Ok(lamports_to_sol(lamports))
    }

    async fn get_signature_history(
        &self,
        address: &Pubkey,
        limit: usize,
    ) -> Result<Vec<SignatureInfo>, TrackerError> {
        if limit == 0 {
            return Err(TrackerError::Validation(
                "history limit must be a positive integer".to_string(),
            ));
        }

        let client = &self.rpc_client;
        let statuses = RetryIf::spawn(
            self.retry_strategy(),
            || async move {
                client
                    .get_signatures_for_address_with_config(
                        address,
                        GetConfirmedSignaturesForAddress2Config {
                            limit: Some(limit),
                            commitment: Some(CommitmentConfig::confirmed()),
                            ..Default::default()
                        },
                    )
                    .await
                    .map_err(TrackerError::from)
            },
            TrackerError::is_transient,
        )
        .await?;

        Ok(statuses
            .into_iter()
            .take(limit)
            .map(|status| SignatureInfo {
                signature: status.signature,
                block_time: status.block_time,
                slot: status.slot,
                failed: status.err.is_some(),
            })
            .collect())
    }

    async fn get_transaction_detail(
        &self,
        signature: &Signature,
    ) -> Result<Option<TransactionDetail>, TrackerError> {
        let params = serde_json::json!([
            signature.to_string(),
            RpcTransactionConfig {
                encoding: Some(UiTransactionEncoding::JsonParsed),
                commitment: Some(CommitmentConfig::confirmed()),
                max_supported_transaction_version: Some(0),
            }
        ]);

        let client = &self.rpc_client;
        let params = &params;
        let transaction = RetryIf::spawn(
            self.retry_strategy(),
            || async move {
                client
                    .send::<Option<EncodedConfirmedTransactionWithStatusMeta>>(
                        RpcRequest::GetTransaction,
                        params.clone(),
                    )
                    .await
                    .map_err(TrackerError::from)
            },
            TrackerError::is_transient,
        )
        .await?;

        transaction.map(into_detail).transpose()
    }
}

fn into_detail(
    transaction: EncodedConfirmedTransactionWithStatusMeta,
) -> Result<TransactionDetail, TrackerError> {
    let meta = transaction.transaction.meta;
    let keys = account_keys(transaction.transaction.transaction, meta.as_ref())?;
    let account_keys = keys
        .iter()
        .map(|key| Pubkey::from_str(key))
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| TrackerError::Rpc(format!("malformed account key: {e}")))?;

    // Without status metadata there is nothing to diff; the transfer stays unclassified.
    let Some(meta) = meta else {
        return Ok(TransactionDetail {
            account_keys,
            ..Default::default()
        });
    };

    Ok(TransactionDetail {
        account_keys,
        pre_balances: meta.pre_balances,
        post_balances: meta.post_balances,
        fee: meta.fee,
        failed: meta.err.is_some(),
    })
}

fn account_keys(
    transaction: EncodedTransaction,
    meta: Option<&UiTransactionStatusMeta>,
) -> Result<Vec<String>, TrackerError> {
    match transaction {
        EncodedTransaction::Json(ui_transaction) => match ui_transaction.message {
            UiMessage::Parsed(message) => Ok(message
                .account_keys
                .into_iter()
                .map(|account| account.pubkey)
                .collect()),
            UiMessage::Raw(message) => {
                let mut keys = message.account_keys;
                // v0 messages reference lookup-table accounts after the static keys
                if let Some(OptionSerializer::Some(loaded)) = meta.map(|m| &m.loaded_addresses) {
                    keys.extend(loaded.writable.iter().cloned());
                    keys.extend(loaded.readonly.iter().cloned());
                }
                Ok(keys)
            }
        },
        EncodedTransaction::Accounts(list) => Ok(list
            .account_keys
            .into_iter()
            .map(|account| account.pubkey)
            .collect()),
        _ => Err(TrackerError::Rpc(
            "unsupported transaction encoding".to_string(),
        )),
    }
}
