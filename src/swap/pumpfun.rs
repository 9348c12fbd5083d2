//! Pump.fun decoding: the bonding-curve program emits a trade event CPI
//! with explicit direction; older transactions only carry the buy/sell
//! instruction discriminator.

use borsh::BorshDeserialize;
use solana_sdk::pubkey::Pubkey;
use tracing::debug;

use super::message::{Ix, TxEnvelope};
use super::programs::{
    PUMPFUN_BUY_DISCRIMINATOR, PUMPFUN_PROGRAM_ID, PUMPFUN_SELL_DISCRIMINATOR,
    PUMPFUN_TRADE_EVENT_DISCRIMINATOR,
};
use crate::error::{PriceError, Result};

/// Decoded trade event.
#[derive(Debug, Clone)]
pub struct PumpfunTradeEvent {
    pub mint: Pubkey,
    pub sol_amount: u64,
    pub token_amount: u64,
    pub is_buy: bool,
    pub user: Pubkey,
    pub timestamp: i64,
}

#[derive(BorshDeserialize)]
struct TradeEventWire {
    mint: [u8; 32],
    sol_amount: u64,
    token_amount: u64,
    is_buy: bool,
    user: [u8; 32],
    timestamp: i64,
}

pub fn is_trade_event(env: &TxEnvelope, ix: &Ix) -> bool {
    match env.program_of(ix) {
        Some(program) if *program == PUMPFUN_PROGRAM_ID => {}
        _ => return false,
    }
    ix.data.len() >= 16 && ix.data[..16] == PUMPFUN_TRADE_EVENT_DISCRIMINATOR
}

pub fn decode_trade_event(ix: &Ix) -> Result<PumpfunTradeEvent> {
    let mut payload = &ix.data[16..];
    let wire = TradeEventWire::deserialize(&mut payload)
        .map_err(|e| PriceError::parse(format!("pumpfun trade event: {}", e)))?;
    Ok(PumpfunTradeEvent {
        mint: Pubkey::new_from_array(wire.mint),
        sol_amount: wire.sol_amount,
        token_amount: wire.token_amount,
        is_buy: wire.is_buy,
        user: Pubkey::new_from_array(wire.user),
        timestamp: wire.timestamp,
    })
}

/// Collects trade events in the inner set at `outer_index`.
pub fn collect_trade_events(env: &TxEnvelope, outer_index: u8) -> Vec<PumpfunTradeEvent> {
    let mut events = Vec::new();
    if let Some(set) = env.inner.get(&outer_index) {
        for ix in set {
            if is_trade_event(env, ix) {
                match decode_trade_event(ix) {
                    Ok(event) => events.push(event),
                    Err(e) => debug!(error = %e, "skipping undecodable pumpfun event"),
                }
            }
        }
    }
    events
}

/// Scans outer instructions for the Pump.fun buy/sell discriminators.
/// Returns `Some(is_buy)` when found.
pub fn detect_buy_sell(env: &TxEnvelope) -> Option<bool> {
    for ix in &env.outer {
        match env.program_of(ix) {
            Some(program) if *program == PUMPFUN_PROGRAM_ID => {}
            _ => continue,
        }
        if ix.data.len() >= 8 {
            if ix.data[..8] == PUMPFUN_BUY_DISCRIMINATOR {
                return Some(true);
            }
            if ix.data[..8] == PUMPFUN_SELL_DISCRIMINATOR {
                return Some(false);
            }
        }
    }
    None
}
