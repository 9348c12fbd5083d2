//! OKX aggregation-router decoding. The router logs authoritative totals
//! (`source_token_change` / `destination_token_change`); the mints come
//! from fixed positions of the outer instruction's account list.

use regex::Regex;
use solana_sdk::pubkey::Pubkey;
use std::collections::HashMap;
use std::sync::OnceLock;
use tracing::debug;

use super::message::TxEnvelope;
use super::programs::{OKX_SWAP_DISCRIMINATORS, WRAPPED_SOL_MINT};
use super::SidePair;

/// Router-level aggregate: authoritative net in/out, optional commission.
#[derive(Debug, Clone)]
pub struct OkxAggregate {
    pub pair: SidePair,
    pub commission_amount: u64,
}

fn change_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"after_source_balance:\s*\d+.*?source_token_change:\s*(\d+),\s*destination_token_change:\s*(\d+)",
        )
        .expect("static regex compiles")
    })
}

fn commission_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"commission_amount:\s*(\d+)").expect("static regex compiles"))
}

/// Whether the outer instruction data starts with a known OKX swap
/// discriminator. Unknown prefixes still get leg-extraction treatment.
pub fn has_known_swap_discriminator(data: &[u8]) -> bool {
    data.len() >= 8 && OKX_SWAP_DISCRIMINATORS.iter().any(|d| data[..8] == *d)
}

/// Parses the authoritative aggregate from program logs. Returns `None`
/// when the log lines or the mint accounts cannot be resolved; the caller
/// then falls back to collecting legs.
pub fn aggregate_from_logs(
    env: &TxEnvelope,
    outer_index: u8,
    decimals_by_mint: &HashMap<Pubkey, u8>,
) -> Option<OkxAggregate> {
    let ix = env.outer.get(outer_index as usize)?;
    // Router account layout: [0] payer, [1] source token account,
    // [2] destination token account, [3] source mint, [4] destination mint.
    if ix.accounts.len() < 5 {
        return None;
    }
    let src_mint = *env.key_at(ix.accounts[3])?;
    let dst_mint = *env.key_at(ix.accounts[4])?;
    if src_mint == Pubkey::default() || dst_mint == Pubkey::default() {
        return None;
    }

    let mut src_change = 0u64;
    let mut dst_change = 0u64;
    let mut commission = 0u64;

    for line in &env.log_messages {
        if !line.contains("Program log:") {
            continue;
        }
        if let Some(caps) = change_re().captures(line) {
            if let Ok(v) = caps[1].parse::<u64>() {
                src_change = v;
            }
            if let Ok(v) = caps[2].parse::<u64>() {
                dst_change = v;
            }
        }
        if let Some(caps) = commission_re().captures(line) {
            if let Ok(v) = caps[1].parse::<u64>() {
                commission = v;
            }
        }
    }

    if src_change == 0 && dst_change == 0 {
        return None;
    }

    let dec = |mint: &Pubkey| -> u8 {
        if let Some(d) = decimals_by_mint.get(mint) {
            return *d;
        }
        if *mint == WRAPPED_SOL_MINT {
            return 9;
        }
        0
    };

    debug!(
        %src_mint, %dst_mint, src_change, dst_change, commission,
        "parsed okx aggregate from logs"
    );
    Some(OkxAggregate {
        pair: SidePair {
            in_mint: src_mint,
            in_amount: src_change,
            in_decimals: dec(&src_mint),
            out_mint: dst_mint,
            out_amount: dst_change,
            out_decimals: dec(&dst_mint),
        },
        commission_amount: commission,
    })
}
