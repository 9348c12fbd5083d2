//! SPL transfer / transfer-checked leg extraction.

use solana_sdk::pubkey::Pubkey;
use std::collections::HashMap;

use super::message::{Ix, TxEnvelope};
use super::programs::{is_token_program, TOKEN_PROGRAM_ID};

/// What is known about a token account mentioned by the transaction.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokenAccountInfo {
    pub mint: Option<Pubkey>,
    pub decimals: u8,
}

/// One elementary token move inside a swap.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferLeg {
    /// `None` when no balance row or checked transfer ever named the mint.
    pub mint: Option<Pubkey>,
    /// Raw base units.
    pub amount: u64,
    pub decimals: u8,
    pub source: Pubkey,
    pub destination: Pubkey,
    pub authority: Pubkey,
}

impl TransferLeg {
    /// Key for exact-duplicate elimination across decode paths.
    pub fn dedup_key(&self) -> (Option<Pubkey>, u64, Pubkey, Pubkey) {
        (self.mint, self.amount, self.source, self.destination)
    }
}

/// Token Program `Transfer` (opcode 3): accounts `[source, destination,
/// authority]`, amount LE u64 at data[1..9].
pub fn is_transfer(env: &TxEnvelope, ix: &Ix) -> bool {
    match env.program_of(ix) {
        Some(program) if *program == TOKEN_PROGRAM_ID => {}
        _ => return false,
    }
    if ix.accounts.len() < 3 || ix.data.len() < 9 || ix.data[0] != 3 {
        return false;
    }
    ix.accounts[..3]
        .iter()
        .all(|&i| (i as usize) < env.account_keys.len())
}

/// Token / Token-2022 `TransferChecked` (opcode 12): accounts `[source,
/// mint, destination, authority]`.
pub fn is_transfer_checked(env: &TxEnvelope, ix: &Ix) -> bool {
    match env.program_of(ix) {
        Some(program) if is_token_program(program) => {}
        _ => return false,
    }
    if ix.accounts.len() < 4 || ix.data.len() < 9 || ix.data[0] != 12 {
        return false;
    }
    ix.accounts[..4]
        .iter()
        .all(|&i| (i as usize) < env.account_keys.len())
}

pub fn decode_transfer(
    env: &TxEnvelope,
    ix: &Ix,
    token_accounts: &HashMap<Pubkey, TokenAccountInfo>,
    decimals_by_mint: &HashMap<Pubkey, u8>,
) -> Option<TransferLeg> {
    if !is_transfer(env, ix) {
        return None;
    }
    let amount = u64::from_le_bytes(ix.data[1..9].try_into().ok()?);
    let source = *env.key_at(ix.accounts[0])?;
    let destination = *env.key_at(ix.accounts[1])?;
    let authority = *env.key_at(ix.accounts[2])?;

    // A plain transfer does not carry the mint; prefer the destination
    // account's known mint, then the source's.
    let mint = token_accounts
        .get(&destination)
        .and_then(|info| info.mint)
        .or_else(|| token_accounts.get(&source).and_then(|info| info.mint));
    let decimals = mint
        .and_then(|m| decimals_by_mint.get(&m).copied())
        .unwrap_or(0);

    Some(TransferLeg {
        mint,
        amount,
        decimals,
        source,
        destination,
        authority,
    })
}

pub fn decode_transfer_checked(
    env: &TxEnvelope,
    ix: &Ix,
    decimals_by_mint: &HashMap<Pubkey, u8>,
) -> Option<TransferLeg> {
    if !is_transfer_checked(env, ix) {
        return None;
    }
    let amount = u64::from_le_bytes(ix.data[1..9].try_into().ok()?);
    let source = *env.key_at(ix.accounts[0])?;
    let mint = *env.key_at(ix.accounts[1])?;
    let destination = *env.key_at(ix.accounts[2])?;
    let authority = *env.key_at(ix.accounts[3])?;

    // Decimals come from the balance-derived map; unknown mints stay zero.
    let decimals = decimals_by_mint.get(&mint).copied().unwrap_or(0);

    Some(TransferLeg {
        mint: Some(mint),
        amount,
        decimals,
        source,
        destination,
        authority,
    })
}

/// Decodes either transfer form.
pub fn decode_any_transfer(
    env: &TxEnvelope,
    ix: &Ix,
    token_accounts: &HashMap<Pubkey, TokenAccountInfo>,
    decimals_by_mint: &HashMap<Pubkey, u8>,
) -> Option<TransferLeg> {
    decode_transfer_checked(env, ix, decimals_by_mint)
        .or_else(|| decode_transfer(env, ix, token_accounts, decimals_by_mint))
}
