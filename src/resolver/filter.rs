//! Block/mint pre-filter: finds the transactions in one block that changed
//! balances of the target mint, using pre/post token-balance deltas so the
//! scan works across inner instructions and routers.

use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::Signature;
use std::collections::HashMap;
use tracing::{debug, instrument};

use crate::chain::ChainClient;
use crate::error::Result;
use crate::swap::message::{TokenBalanceRow, TxEnvelope};

/// A token-balance row of the target mint that the transaction touched.
#[derive(Debug, Clone)]
pub struct BalanceTouch {
    pub account_index: u8,
    /// Resolved from the account-key list; `None` for unresolvable lookups.
    pub account_key: Option<Pubkey>,
    pub owner: Option<Pubkey>,
    /// Raw base units.
    pub pre_amount: u64,
    pub post_amount: u64,
    /// post - pre, widened so the difference of two u64 amounts is exact.
    pub delta: i128,
}

/// A transaction kept by the filter, with evidence of the match.
#[derive(Debug, Clone)]
pub struct FilteredTx {
    pub slot: u64,
    pub block_time: i64,
    /// First signature; its absence disables the per-candidate re-fetch
    /// downstream but is not an error here.
    pub signature: Option<Signature>,
    pub per_account_delta: HashMap<u8, i128>,
    pub total_delta: i128,
    pub accounts: Vec<Pubkey>,
    pub touches: Vec<BalanceTouch>,
}

/// Pure pairing core: joins pre/post rows of `target_mint` by account
/// index and produces touches. Returns `None` when no row mentions the
/// mint or every delta is zero.
pub fn touches_for_mint(
    env: &TxEnvelope,
    target_mint: &Pubkey,
) -> Option<(HashMap<u8, i128>, i128, Vec<BalanceTouch>)> {
    let mut pre_by_index: HashMap<u8, &TokenBalanceRow> = HashMap::new();
    let mut post_by_index: HashMap<u8, &TokenBalanceRow> = HashMap::new();
    for row in &env.pre_token_balances {
        if row.mint == *target_mint {
            pre_by_index.insert(row.account_index, row);
        }
    }
    for row in &env.post_token_balances {
        if row.mint == *target_mint {
            post_by_index.insert(row.account_index, row);
        }
    }
    if pre_by_index.is_empty() && post_by_index.is_empty() {
        return None;
    }

    let mut indices: Vec<u8> = pre_by_index
        .keys()
        .chain(post_by_index.keys())
        .copied()
        .collect();
    indices.sort_unstable();
    indices.dedup();

    let mut per_account = HashMap::with_capacity(indices.len());
    let mut total: i128 = 0;
    let mut touches = Vec::with_capacity(indices.len());
    let mut any_nonzero = false;

    for index in indices {
        let pre = pre_by_index.get(&index);
        let post = post_by_index.get(&index);
        let pre_amount = pre.map_or(0, |row| row.amount);
        let post_amount = post.map_or(0, |row| row.amount);
        // Owner best-effort: prefer the post row's, fall back to pre.
        let owner = post
            .and_then(|row| row.owner)
            .or_else(|| pre.and_then(|row| row.owner));

        let delta = post_amount as i128 - pre_amount as i128;
        per_account.insert(index, delta);
        total += delta;
        if delta != 0 {
            any_nonzero = true;
        }

        touches.push(BalanceTouch {
            account_index: index,
            account_key: env.key_at(index).copied(),
            owner,
            pre_amount,
            post_amount,
            delta,
        });
    }

    // A tx that merely holds the mint steady is not a change.
    if !any_nonzero {
        return None;
    }
    Some((per_account, total, touches))
}

/// Scans the block at `slot` and keeps the transactions that changed
/// `target_mint` balances. A missing block yields an empty list.
#[instrument(skip(chain))]
pub async fn filter_txs_by_mint(
    chain: &dyn ChainClient,
    slot: u64,
    target_mint: &Pubkey,
) -> Result<Vec<FilteredTx>> {
    let block = match chain.block(slot).await? {
        Some(block) => block,
        None => {
            debug!(slot, "no block at slot");
            return Ok(Vec::new());
        }
    };

    let mut kept = Vec::new();
    for tx in &block.transactions {
        let (transaction, meta) = match (&tx.transaction, &tx.meta) {
            (Some(transaction), Some(meta)) => (transaction, meta),
            _ => continue,
        };
        let env = match TxEnvelope::from_parts(transaction, meta) {
            Ok(env) => env,
            Err(e) => {
                debug!(slot, error = %e, "skipping undecodable transaction");
                continue;
            }
        };
        let (per_account_delta, total_delta, touches) = match touches_for_mint(&env, target_mint)
        {
            Some(parts) => parts,
            None => continue,
        };

        kept.push(FilteredTx {
            slot,
            block_time: block.block_time.unwrap_or(0),
            signature: env.signatures.first().copied(),
            per_account_delta,
            total_delta,
            accounts: env.account_keys.clone(),
            touches,
        });
    }

    debug!(slot, kept = kept.len(), "filtered block for target mint");
    Ok(kept)
}
