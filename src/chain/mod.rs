//! Thin facade over the Solana RPC surface the resolver consumes.
//!
//! The resolver only asks five questions of the chain, so they live behind
//! one trait; tests script the answers, production uses the nonblocking
//! RPC client.

use async_trait::async_trait;
use solana_client::nonblocking::rpc_client::RpcClient;
use solana_client::rpc_config::{RpcBlockConfig, RpcTransactionConfig};
use solana_sdk::commitment_config::CommitmentConfig;
use solana_sdk::signature::Signature;
use solana_sdk::transaction::VersionedTransaction;
use solana_transaction_status::{
    EncodedTransactionWithStatusMeta, TransactionDetails, UiTransactionEncoding,
    UiTransactionStatusMeta,
};
use std::sync::Arc;
use tracing::debug;

use crate::error::{PriceError, Result};

/// One transaction of a block, decoded as far as the RPC allows.
#[derive(Debug, Clone)]
pub struct TxWithMeta {
    pub transaction: Option<VersionedTransaction>,
    pub meta: Option<UiTransactionStatusMeta>,
    /// Set on single-transaction fetches; block transactions inherit the
    /// block's time instead.
    pub block_time: Option<i64>,
}

/// A block with full transaction details.
#[derive(Debug, Clone, Default)]
pub struct BlockData {
    pub block_time: Option<i64>,
    pub transactions: Vec<TxWithMeta>,
}

/// Recent cluster throughput sample.
#[derive(Debug, Clone, Copy)]
pub struct PerfSample {
    pub num_slots: u64,
    pub sample_period_secs: u64,
}

#[async_trait]
pub trait ChainClient: Send + Sync {
    /// Latest finalized slot.
    async fn latest_finalized_slot(&self) -> Result<u64>;

    /// Block time of `slot`, or `None` when the slot was skipped, pruned,
    /// or the probe failed. Probes treat every failure as "unknown".
    async fn block_time(&self, slot: u64) -> Option<i64>;

    /// Full block at finalized commitment, rewards suppressed.
    /// `Ok(None)` when the RPC has no block for the slot.
    async fn block(&self, slot: u64) -> Result<Option<BlockData>>;

    /// A single confirmed transaction with metadata, `Ok(None)` if unknown.
    async fn transaction(&self, signature: &Signature) -> Result<Option<TxWithMeta>>;

    /// Recent performance samples, newest first.
    async fn performance_samples(&self, limit: usize) -> Result<Vec<PerfSample>>;
}

/// Production implementation over the nonblocking Solana RPC client.
pub struct RpcChain {
    rpc: Arc<RpcClient>,
}

impl RpcChain {
    pub fn new(rpc_url: impl Into<String>) -> Self {
        Self {
            rpc: Arc::new(RpcClient::new(rpc_url.into())),
        }
    }

    pub fn from_client(rpc: Arc<RpcClient>) -> Self {
        Self { rpc }
    }
}

/// RPC failures that mean "this slot has no block", as opposed to a broken
/// endpoint. Providers phrase these several ways.
fn is_block_absent_message(message: &str) -> bool {
    let lower = message.to_ascii_lowercase();
    [
        "block not available",
        "slot skipped",
        "was skipped",
        "cleaned up",
        "-32004",
        "-32007",
        "-32009",
    ]
    .iter()
    .any(|needle| lower.contains(needle))
}

fn is_not_found_message(message: &str) -> bool {
    let lower = message.to_ascii_lowercase();
    lower.contains("not found") || lower.contains("invalid param: missing")
}

fn decode_tx(encoded: EncodedTransactionWithStatusMeta, block_time: Option<i64>) -> TxWithMeta {
    TxWithMeta {
        transaction: encoded.transaction.decode(),
        meta: encoded.meta,
        block_time,
    }
}

#[async_trait]
impl ChainClient for RpcChain {
    async fn latest_finalized_slot(&self) -> Result<u64> {
        self.rpc
            .get_slot_with_commitment(CommitmentConfig::finalized())
            .await
            .map_err(|e| PriceError::rpc(format!("getSlot: {}", e)))
    }

    async fn block_time(&self, slot: u64) -> Option<i64> {
        match self.rpc.get_block_time(slot).await {
            Ok(t) => Some(t),
            Err(e) => {
                debug!(slot, error = %e, "block time unavailable");
                None
            }
        }
    }

    async fn block(&self, slot: u64) -> Result<Option<BlockData>> {
        let cfg = RpcBlockConfig {
            encoding: Some(UiTransactionEncoding::Base64),
            transaction_details: Some(TransactionDetails::Full),
            rewards: Some(false),
            commitment: Some(CommitmentConfig::finalized()),
            max_supported_transaction_version: Some(0),
        };
        match self.rpc.get_block_with_config(slot, cfg).await {
            Ok(block) => Ok(Some(BlockData {
                block_time: block.block_time,
                transactions: block
                    .transactions
                    .unwrap_or_default()
                    .into_iter()
                    .map(|tx| decode_tx(tx, None))
                    .collect(),
            })),
            Err(e) if is_block_absent_message(&e.to_string()) => Ok(None),
            Err(e) => Err(PriceError::rpc(format!("getBlock({}): {}", slot, e))),
        }
    }

    async fn transaction(&self, signature: &Signature) -> Result<Option<TxWithMeta>> {
        let cfg = RpcTransactionConfig {
            encoding: Some(UiTransactionEncoding::Base64),
            commitment: Some(CommitmentConfig::confirmed()),
            max_supported_transaction_version: Some(0),
        };
        match self.rpc.get_transaction_with_config(signature, cfg).await {
            Ok(tx) => Ok(Some(decode_tx(tx.transaction, tx.block_time))),
            Err(e) if is_not_found_message(&e.to_string()) => Ok(None),
            Err(e) => Err(PriceError::rpc(format!(
                "getTransaction({}): {}",
                signature, e
            ))),
        }
    }

    async fn performance_samples(&self, limit: usize) -> Result<Vec<PerfSample>> {
        let samples = self
            .rpc
            .get_recent_performance_samples(Some(limit))
            .await
            .map_err(|e| PriceError::rpc(format!("getRecentPerformanceSamples: {}", e)))?;
        Ok(samples
            .into_iter()
            .map(|s| PerfSample {
                num_slots: s.num_slots,
                sample_period_secs: s.sample_period_secs as u64,
            })
            .collect())
    }
}

/// Estimates slots-per-second from recent performance samples; falls back
/// to ~2.5 when the endpoint has no usable samples.
pub async fn estimate_slots_per_second(chain: &dyn ChainClient) -> f64 {
    const FALLBACK_SPS: f64 = 2.5;
    match chain.performance_samples(60).await {
        Ok(samples) => {
            let (slots, secs) = samples.iter().fold((0u64, 0u64), |(sl, se), s| {
                (sl + s.num_slots, se + s.sample_period_secs)
            });
            if slots > 0 && secs > 0 {
                slots as f64 / secs as f64
            } else {
                FALLBACK_SPS
            }
        }
        Err(e) => {
            debug!(error = %e, "performance samples unavailable, using fallback sps");
            FALLBACK_SPS
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_block_absent_detection() {
        assert!(is_block_absent_message(
            "RPC response error -32007: Slot 12345 was skipped, or missing due to ledger jump"
        ));
        assert!(is_block_absent_message("Block not available for slot 42"));
        assert!(!is_block_absent_message("connection refused"));
    }

    #[test]
    fn test_not_found_detection() {
        assert!(is_not_found_message("Transaction not found"));
        assert!(!is_not_found_message("rate limit exceeded"));
    }
}
