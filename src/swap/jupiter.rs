//! Jupiter route-event decoding. The aggregator emits one Anchor event CPI
//! per route leg; multi-hop routes are reduced to a single (in, out) pair by
//! netting per-mint flows.

use borsh::BorshDeserialize;
use solana_sdk::pubkey::Pubkey;
use std::collections::HashMap;
use tracing::debug;

use super::message::{Ix, TxEnvelope};
use super::programs::{JUPITER_PROGRAM_ID, JUPITER_ROUTE_EVENT_DISCRIMINATOR};
use super::SidePair;
use crate::error::{PriceError, Result};

/// One decoded route leg.
#[derive(Debug, Clone)]
pub struct JupiterRouteEvent {
    pub amm: Pubkey,
    pub input_mint: Pubkey,
    pub input_amount: u64,
    pub output_mint: Pubkey,
    pub output_amount: u64,
}

/// Borsh wire shape of the event payload (after the 16-byte discriminator).
#[derive(BorshDeserialize)]
struct RouteEventWire {
    amm: [u8; 32],
    input_mint: [u8; 32],
    input_amount: u64,
    output_mint: [u8; 32],
    output_amount: u64,
}

pub fn is_route_event(env: &TxEnvelope, ix: &Ix) -> bool {
    match env.program_of(ix) {
        Some(program) if *program == JUPITER_PROGRAM_ID => {}
        _ => return false,
    }
    ix.data.len() >= 16 && ix.data[..16] == JUPITER_ROUTE_EVENT_DISCRIMINATOR
}

pub fn decode_route_event(ix: &Ix) -> Result<JupiterRouteEvent> {
    let mut payload = &ix.data[16..];
    let wire = RouteEventWire::deserialize(&mut payload)
        .map_err(|e| PriceError::parse(format!("jupiter route event: {}", e)))?;
    Ok(JupiterRouteEvent {
        amm: Pubkey::new_from_array(wire.amm),
        input_mint: Pubkey::new_from_array(wire.input_mint),
        input_amount: wire.input_amount,
        output_mint: Pubkey::new_from_array(wire.output_mint),
        output_amount: wire.output_amount,
    })
}

/// Collects every route event in the inner set at `outer_index`.
pub fn collect_route_events(env: &TxEnvelope, outer_index: u8) -> Vec<JupiterRouteEvent> {
    let mut events = Vec::new();
    if let Some(set) = env.inner.get(&outer_index) {
        for ix in set {
            if is_route_event(env, ix) {
                match decode_route_event(ix) {
                    Ok(event) => events.push(event),
                    Err(e) => debug!(error = %e, "skipping undecodable jupiter event"),
                }
            }
        }
    }
    events
}

/// Reduces route legs to one pair: the mint with the most negative
/// `out - in` net is the route input, the most positive is the output.
/// Amounts are the per-direction sums of the chosen mints.
pub fn aggregate_route_events(
    events: &[JupiterRouteEvent],
    decimals_by_mint: &HashMap<Pubkey, u8>,
) -> Option<SidePair> {
    if events.is_empty() {
        return None;
    }

    #[derive(Default)]
    struct Flow {
        in_sum: u64,
        out_sum: u64,
    }

    // Insertion order doubles as the first-seen tie-break.
    let mut order: Vec<Pubkey> = Vec::new();
    let mut flows: HashMap<Pubkey, Flow> = HashMap::new();
    fn touch(flows: &mut HashMap<Pubkey, Flow>, order: &mut Vec<Pubkey>, mint: Pubkey) {
        if !flows.contains_key(&mint) {
            flows.insert(mint, Flow::default());
            order.push(mint);
        }
    }

    for event in events {
        touch(&mut flows, &mut order, event.input_mint);
        touch(&mut flows, &mut order, event.output_mint);
        flows.get_mut(&event.input_mint).unwrap().in_sum += event.input_amount;
        flows.get_mut(&event.output_mint).unwrap().out_sum += event.output_amount;
    }

    if order.len() < 2 {
        return None;
    }

    let net = |mint: &Pubkey| -> i128 {
        let flow = &flows[mint];
        flow.out_sum as i128 - flow.in_sum as i128
    };

    let in_mint = *order.iter().min_by_key(|m| net(m))?;
    let out_mint = *order.iter().max_by_key(|m| net(m))?;
    if in_mint == out_mint {
        return None;
    }

    let dec = |mint: &Pubkey| decimals_by_mint.get(mint).copied().unwrap_or(0);
    Some(SidePair {
        in_mint,
        in_amount: flows[&in_mint].in_sum,
        in_decimals: dec(&in_mint),
        out_mint,
        out_amount: flows[&out_mint].out_sum,
        out_decimals: dec(&out_mint),
    })
}
