//! Liquidity-operation detection. Add/remove-liquidity transactions move
//! token balances exactly like swaps do, so they must be screened out
//! before leg extraction; misclassifying one as a swap would emit a
//! meaningless price.

use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::sync::OnceLock;

use super::message::{Ix, TxEnvelope};
use super::programs::{is_amm_program, is_meteora_program, is_token_program};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LiquidityOp {
    Add,
    Remove,
}

// Token opcodes: 7=MintTo, 14=MintToChecked, 8=Burn, 15=BurnChecked.
const MINT_OPCODES: [u8; 2] = [7, 14];
const BURN_OPCODES: [u8; 2] = [8, 15];

const ADD_LIQUIDITY_NAMES: &[&str] = &[
    "add_liquidity_by_strategy2",
    "add_liquidity_by_strategy",
    "add_liquidity_with_slippage",
    "add_liquidity",
    "increase_liquidity",
    "increase_liquidity_v2",
];

const REMOVE_LIQUIDITY_NAMES: &[&str] = &[
    "remove_liquidity",
    "remove_liquidity_by_strategy",
    "remove_liquidity_by_strategy2",
    "decrease_liquidity",
    "decrease_liquidity_v2",
    "close_position",
    "withdraw",
    "withdraw_liquidity",
    "withdraw_one",
    "withdraw_one_token",
    "claim_and_withdraw",
];

/// First 8 bytes of sha256("global:<name>").
pub fn anchor_discriminator(name: &str) -> [u8; 8] {
    let digest = Sha256::digest(format!("global:{}", name).as_bytes());
    let mut out = [0u8; 8];
    out.copy_from_slice(&digest[..8]);
    out
}

fn add_discriminators() -> &'static HashSet<[u8; 8]> {
    static SET: OnceLock<HashSet<[u8; 8]>> = OnceLock::new();
    SET.get_or_init(|| ADD_LIQUIDITY_NAMES.iter().map(|n| anchor_discriminator(n)).collect())
}

fn remove_discriminators() -> &'static HashSet<[u8; 8]> {
    static SET: OnceLock<HashSet<[u8; 8]>> = OnceLock::new();
    SET.get_or_init(|| {
        REMOVE_LIQUIDITY_NAMES
            .iter()
            .map(|n| anchor_discriminator(n))
            .collect()
    })
}

fn data_prefix8(ix: &Ix) -> Option<[u8; 8]> {
    if ix.data.len() < 8 {
        return None;
    }
    let mut prefix = [0u8; 8];
    prefix.copy_from_slice(&ix.data[..8]);
    Some(prefix)
}

fn any_amm_present(env: &TxEnvelope) -> bool {
    env.all_instructions()
        .any(|ix| env.program_of(ix).is_some_and(is_amm_program))
}

fn has_token_opcode(env: &TxEnvelope, opcodes: &[u8]) -> bool {
    env.all_instructions().any(|ix| {
        env.program_of(ix).is_some_and(is_token_program)
            && ix.data.first().is_some_and(|op| opcodes.contains(op))
    })
}

fn has_anchor_prefix(env: &TxEnvelope, set: &HashSet<[u8; 8]>) -> bool {
    env.all_instructions().any(|ix| {
        env.program_of(ix).is_some_and(is_amm_program)
            && data_prefix8(ix).is_some_and(|p| set.contains(&p))
    })
}

fn any_meteora_present(env: &TxEnvelope) -> bool {
    env.all_instructions()
        .any(|ix| env.program_of(ix).is_some_and(is_meteora_program))
}

/// Classifies the transaction as a liquidity operation, or `None` when it
/// shows no liquidity signal.
///
/// Burn/mint opcodes are hard signals; Anchor instruction names on AMM
/// programs are strong signals; bare Meteora-family presence is a weak
/// remove signal kept for parity with the upstream heuristics.
pub fn detect(env: &TxEnvelope) -> Option<LiquidityOp> {
    if !any_amm_present(env) {
        return None;
    }
    if has_token_opcode(env, &BURN_OPCODES) {
        return Some(LiquidityOp::Remove);
    }
    if has_token_opcode(env, &MINT_OPCODES) {
        return Some(LiquidityOp::Add);
    }
    if has_anchor_prefix(env, add_discriminators()) {
        return Some(LiquidityOp::Add);
    }
    if has_anchor_prefix(env, remove_discriminators()) {
        return Some(LiquidityOp::Remove);
    }
    if any_meteora_present(env) {
        return Some(LiquidityOp::Remove);
    }
    None
}
