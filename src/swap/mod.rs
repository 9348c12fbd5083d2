//! Multi-DEX swap decoder: turns one transaction into a canonical
//! `(token-in, token-out)` summary, or reports that it is not a swap.
//!
//! Detection runs aggregator-first (Jupiter events, OKX log aggregates,
//! known router programs), then falls back to direct AMM leg extraction.
//! Liquidity operations are screened out before anything else.

pub mod jupiter;
pub mod liquidity;
pub mod message;
pub mod okx;
pub mod programs;
pub mod pumpfun;
pub mod transfer;

use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::Signature;
use solana_sdk::transaction::VersionedTransaction;
use solana_transaction_status::UiTransactionStatusMeta;
use std::collections::HashMap;
use std::fmt;
use tracing::debug;

use crate::error::Result;
use jupiter::JupiterRouteEvent;
use message::{Ix, TxEnvelope};
use okx::OkxAggregate;
use programs::{
    is_amm_program, is_meteora_program, is_raydium_program, is_router_program, is_token_program,
    JUPITER_DCA_PROGRAM_ID, JUPITER_PROGRAM_ID, OKX_DEX_ROUTER_PROGRAM_ID,
    ORCA_WHIRLPOOL_PROGRAM_ID, PUMPFUN_AMM_PROGRAM_ID, PUMPFUN_PROGRAM_ID, WRAPPED_SOL_MINT,
};
use pumpfun::PumpfunTradeEvent;
use transfer::{decode_any_transfer, TokenAccountInfo, TransferLeg};

/// Venues a swap can be attributed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Amm {
    Jupiter,
    Okx,
    Raydium,
    Orca,
    Meteora,
    Pumpfun,
    PumpfunAmm,
    Unknown,
}

impl fmt::Display for Amm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Amm::Jupiter => write!(f, "jupiter"),
            Amm::Okx => write!(f, "okx"),
            Amm::Raydium => write!(f, "raydium"),
            Amm::Orca => write!(f, "orca"),
            Amm::Meteora => write!(f, "meteora"),
            Amm::Pumpfun => write!(f, "pumpfun"),
            Amm::PumpfunAmm => write!(f, "pumpfun-amm"),
            Amm::Unknown => write!(f, "unknown"),
        }
    }
}

/// A resolved (in, out) pair in raw base units.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SidePair {
    pub in_mint: Pubkey,
    pub in_amount: u64,
    pub in_decimals: u8,
    pub out_mint: Pubkey,
    pub out_amount: u64,
    pub out_decimals: u8,
}

/// Everything a transaction can decode into, as a closed sum.
#[derive(Debug, Clone)]
pub enum DecodedSwap {
    JupiterEvent(JupiterRouteEvent),
    OkxAggregate(OkxAggregate),
    PumpfunTrade(PumpfunTradeEvent),
    Leg { amm: Amm, leg: TransferLeg },
}

/// Canonical swap summary.
#[derive(Debug, Clone)]
pub struct SwapSummary {
    pub signers: Vec<Pubkey>,
    pub signatures: Vec<Signature>,
    pub amms: Vec<String>,
    /// Unix seconds when the decoded form carried one (Pump.fun events do).
    pub timestamp: Option<i64>,
    pub token_in_mint: Pubkey,
    pub token_in_amount: u64,
    pub token_in_decimals: u8,
    pub token_out_mint: Pubkey,
    pub token_out_amount: u64,
    pub token_out_decimals: u8,
}

pub struct SwapParser {
    env: TxEnvelope,
    token_accounts: HashMap<Pubkey, TokenAccountInfo>,
    decimals_by_mint: HashMap<Pubkey, u8>,
}

impl SwapParser {
    pub fn new(tx: &VersionedTransaction, meta: &UiTransactionStatusMeta) -> Result<Self> {
        Ok(Self::from_envelope(TxEnvelope::from_parts(tx, meta)?))
    }

    /// Builds a parser over an already-normalized transaction.
    pub fn from_envelope(env: TxEnvelope) -> Self {
        let (token_accounts, decimals_by_mint) = build_token_maps(&env);
        Self {
            env,
            token_accounts,
            decimals_by_mint,
        }
    }

    pub fn envelope(&self) -> &TxEnvelope {
        &self.env
    }

    /// Fee payer, except for Jupiter DCA transactions where the real user
    /// sits at account index 2.
    pub fn signer(&self) -> Option<Pubkey> {
        if self.env.account_keys.contains(&JUPITER_DCA_PROGRAM_ID) {
            self.env.account_keys.get(2).copied()
        } else {
            self.env.account_keys.first().copied()
        }
    }

    /// Decodes the transaction into a canonical swap, `Ok(None)` when it is
    /// a transfer, a liquidity operation, or otherwise not a swap.
    pub fn parse(&self) -> Result<Option<SwapSummary>> {
        if let Some(op) = liquidity::detect(&self.env) {
            debug!(?op, "transaction classified as liquidity operation");
            return Ok(None);
        }
        let swaps = self.collect();
        if swaps.is_empty() {
            return Ok(None);
        }
        Ok(self.summarize(&swaps))
    }

    /// Detection passes: aggregators and routers first, then direct AMMs.
    fn collect(&self) -> Vec<DecodedSwap> {
        let mut swaps = Vec::new();
        let mut handled = false;

        for (i, ix) in self.env.outer.iter().enumerate() {
            let index = i as u8;
            let program = match self.env.program_of(ix) {
                Some(p) => *p,
                None => continue,
            };

            if program == JUPITER_PROGRAM_ID {
                let events = jupiter::collect_route_events(&self.env, index);
                if !events.is_empty() {
                    swaps.extend(events.into_iter().map(DecodedSwap::JupiterEvent));
                    handled = true;
                    continue;
                }
                // No route event: the route executed as plain CPIs, so fall
                // back to treating this instruction like a router.
                let legs = self.legs_under(index, None);
                if !legs.is_empty() {
                    swaps.extend(legs);
                    handled = true;
                }
            } else if program == OKX_DEX_ROUTER_PROGRAM_ID {
                if !okx::has_known_swap_discriminator(&ix.data) {
                    debug!(index, "unknown okx discriminator, extracting legs anyway");
                }
                if let Some(agg) =
                    okx::aggregate_from_logs(&self.env, index, &self.decimals_by_mint)
                {
                    swaps.push(DecodedSwap::OkxAggregate(agg));
                    handled = true;
                }
                let legs = self.legs_under(index, None);
                if !legs.is_empty() {
                    swaps.extend(legs);
                    handled = true;
                }
            } else if is_router_program(&program) {
                let legs = self.legs_under(index, None);
                if !legs.is_empty() {
                    swaps.extend(legs);
                    handled = true;
                }
            }
        }

        if handled {
            return dedup_legs(swaps);
        }

        // Second pass: direct AMM outer instructions.
        for (i, ix) in self.env.outer.iter().enumerate() {
            let index = i as u8;
            let program = match self.env.program_of(ix) {
                Some(p) => *p,
                None => continue,
            };

            if is_raydium_program(&program) {
                swaps.extend(self.legs_under(index, Some(Amm::Raydium)));
            } else if program == ORCA_WHIRLPOOL_PROGRAM_ID {
                swaps.extend(self.legs_under(index, Some(Amm::Orca)));
            } else if is_meteora_program(&program) {
                swaps.extend(self.legs_under(index, Some(Amm::Meteora)));
            } else if program == PUMPFUN_AMM_PROGRAM_ID {
                swaps.extend(self.legs_under(index, Some(Amm::PumpfunAmm)));
            } else if program == PUMPFUN_PROGRAM_ID {
                let events = pumpfun::collect_trade_events(&self.env, index);
                if events.is_empty() {
                    swaps.extend(self.legs_under(index, Some(Amm::Pumpfun)));
                } else {
                    swaps.extend(events.into_iter().map(DecodedSwap::PumpfunTrade));
                }
            }
        }

        dedup_legs(swaps)
    }

    /// Collects every transfer-shaped inner instruction at `outer_index`.
    /// With `amm = None` the venue is inferred from the AMM programs seen
    /// in the same inner set.
    fn legs_under(&self, outer_index: u8, amm: Option<Amm>) -> Vec<DecodedSwap> {
        let set = match self.env.inner.get(&outer_index) {
            Some(set) => set,
            None => return Vec::new(),
        };

        let venue = amm.unwrap_or_else(|| {
            set.iter()
                .filter_map(|ix| self.env.program_of(ix))
                .find(|p| is_amm_program(p))
                .map(|p| amm_of_program(p))
                .unwrap_or(Amm::Unknown)
        });

        // Under a router, only harvest legs when the inner set actually
        // touches an AMM or the caller pinned the venue.
        if amm.is_none() && venue == Amm::Unknown {
            let any_transfer = set.iter().any(|ix| {
                self.env.program_of(ix).is_some_and(is_token_program)
            });
            if !any_transfer {
                return Vec::new();
            }
        }

        set.iter()
            .filter_map(|ix| {
                decode_any_transfer(&self.env, ix, &self.token_accounts, &self.decimals_by_mint)
            })
            .map(|leg| DecodedSwap::Leg { amm: venue, leg })
            .collect()
    }

    /// Synthesis priority: Jupiter events, OKX aggregate, Pump.fun event,
    /// Pump.fun direction discriminators, then generic leg attribution.
    fn summarize(&self, swaps: &[DecodedSwap]) -> Option<SwapSummary> {
        let signer = self.signer()?;

        let jupiter_events: Vec<JupiterRouteEvent> = swaps
            .iter()
            .filter_map(|s| match s {
                DecodedSwap::JupiterEvent(e) => Some(e.clone()),
                _ => None,
            })
            .collect();
        if !jupiter_events.is_empty() {
            if let Some(pair) =
                jupiter::aggregate_route_events(&jupiter_events, &self.decimals_by_mint)
            {
                return Some(self.finish(signer, pair, vec![Amm::Jupiter], None));
            }
            // Undecodable in aggregate: fall through to legs below.
        }

        if let Some(agg) = swaps.iter().find_map(|s| match s {
            DecodedSwap::OkxAggregate(a) => Some(a),
            _ => None,
        }) {
            return Some(self.finish(signer, agg.pair, vec![Amm::Okx], None));
        }

        if let Some(event) = swaps.iter().find_map(|s| match s {
            DecodedSwap::PumpfunTrade(e) => Some(e),
            _ => None,
        }) {
            let token_decimals = self
                .decimals_by_mint
                .get(&event.mint)
                .copied()
                .unwrap_or(0);
            let pair = if event.is_buy {
                SidePair {
                    in_mint: WRAPPED_SOL_MINT,
                    in_amount: event.sol_amount,
                    in_decimals: 9,
                    out_mint: event.mint,
                    out_amount: event.token_amount,
                    out_decimals: token_decimals,
                }
            } else {
                SidePair {
                    in_mint: event.mint,
                    in_amount: event.token_amount,
                    in_decimals: token_decimals,
                    out_mint: WRAPPED_SOL_MINT,
                    out_amount: event.sol_amount,
                    out_decimals: 9,
                }
            };
            return Some(self.finish(signer, pair, vec![Amm::Pumpfun], Some(event.timestamp)));
        }

        if let Some(is_buy) = pumpfun::detect_buy_sell(&self.env) {
            if let Some(pair) = self.pumpfun_pair_from_transfers(signer, is_buy) {
                return Some(self.finish(signer, pair, vec![Amm::Pumpfun], None));
            }
        }

        let legs: Vec<(Amm, &TransferLeg)> = swaps
            .iter()
            .filter_map(|s| match s {
                DecodedSwap::Leg { amm, leg } => Some((*amm, leg)),
                _ => None,
            })
            .collect();
        if legs.is_empty() {
            return None;
        }
        let pair = self.pair_from_legs(signer, &legs)?;
        let mut amms: Vec<Amm> = Vec::new();
        for (amm, _) in &legs {
            if !amms.contains(amm) {
                amms.push(*amm);
            }
        }
        Some(self.finish(signer, pair, amms, None))
    }

    /// Older Pump.fun transactions: direction from the instruction
    /// discriminator, amounts from the inner transfer-checked moves. The
    /// signer's authorized moves are what the signer spent; the largest
    /// observed move per mint separates the main leg from dust.
    fn pumpfun_pair_from_transfers(&self, signer: Pubkey, is_buy: bool) -> Option<SidePair> {
        let mut largest_any: HashMap<Pubkey, u64> = HashMap::new();
        let mut sent_by_signer: HashMap<Pubkey, u64> = HashMap::new();

        for set in self.env.inner.values() {
            for ix in set {
                let leg = match transfer::decode_transfer_checked(
                    &self.env,
                    ix,
                    &self.decimals_by_mint,
                ) {
                    Some(leg) => leg,
                    None => continue,
                };
                let mint = match leg.mint {
                    Some(mint) => mint,
                    None => continue,
                };
                let slot = largest_any.entry(mint).or_insert(0);
                if leg.amount > *slot {
                    *slot = leg.amount;
                }
                if leg.authority == signer {
                    *sent_by_signer.entry(mint).or_insert(0) += leg.amount;
                }
            }
        }

        let dec = |mint: &Pubkey| self.decimals_by_mint.get(mint).copied().unwrap_or(0);

        if is_buy {
            let in_amount = *sent_by_signer.get(&WRAPPED_SOL_MINT)?;
            let (out_mint, out_amount) = largest_any
                .iter()
                .filter(|(m, _)| **m != WRAPPED_SOL_MINT)
                .max_by_key(|(_, a)| **a)
                .map(|(m, a)| (*m, *a))?;
            if in_amount == 0 || out_amount == 0 {
                return None;
            }
            Some(SidePair {
                in_mint: WRAPPED_SOL_MINT,
                in_amount,
                in_decimals: 9,
                out_mint,
                out_amount,
                out_decimals: dec(&out_mint),
            })
        } else {
            let (in_mint, in_amount) = sent_by_signer
                .iter()
                .filter(|(m, _)| **m != WRAPPED_SOL_MINT)
                .max_by_key(|(_, a)| **a)
                .map(|(m, a)| (*m, *a))?;
            let out_amount = *largest_any.get(&WRAPPED_SOL_MINT)?;
            if in_amount == 0 || out_amount == 0 {
                return None;
            }
            Some(SidePair {
                in_mint,
                in_amount,
                in_decimals: dec(&in_mint),
                out_mint: WRAPPED_SOL_MINT,
                out_amount,
                out_decimals: 9,
            })
        }
    }

    /// Generic leg attribution: what the signer sent is input, what landed
    /// in the signer's token accounts is output; the dominant mint wins on
    /// each side, first-seen order breaking ties.
    fn pair_from_legs(&self, signer: Pubkey, legs: &[(Amm, &TransferLeg)]) -> Option<SidePair> {
        let signer_accounts: Vec<Pubkey> = self
            .env
            .pre_token_balances
            .iter()
            .chain(self.env.post_token_balances.iter())
            .filter(|row| row.owner == Some(signer))
            .filter_map(|row| self.env.key_at(row.account_index).copied())
            .collect();

        let mut in_order: Vec<Pubkey> = Vec::new();
        let mut out_order: Vec<Pubkey> = Vec::new();
        let mut in_sums: HashMap<Pubkey, u64> = HashMap::new();
        let mut out_sums: HashMap<Pubkey, u64> = HashMap::new();

        for (_, leg) in legs {
            let mint = match leg.mint {
                Some(mint) => mint,
                None => continue,
            };
            if leg.authority == signer || signer_accounts.contains(&leg.source) {
                if !in_sums.contains_key(&mint) {
                    in_order.push(mint);
                }
                *in_sums.entry(mint).or_insert(0) += leg.amount;
            }
            if signer_accounts.contains(&leg.destination) {
                if !out_sums.contains_key(&mint) {
                    out_order.push(mint);
                }
                *out_sums.entry(mint).or_insert(0) += leg.amount;
            }
        }

        let dominant = |order: &[Pubkey], sums: &HashMap<Pubkey, u64>, skip: Option<Pubkey>| {
            order
                .iter()
                .filter(|m| Some(**m) != skip)
                .max_by_key(|m| sums[*m])
                .copied()
        };

        let in_mint = dominant(&in_order, &in_sums, None)?;
        let out_mint = dominant(&out_order, &out_sums, Some(in_mint))?;

        let dec = |mint: &Pubkey| self.decimals_by_mint.get(mint).copied().unwrap_or(0);
        let pair = SidePair {
            in_mint,
            in_amount: in_sums[&in_mint],
            in_decimals: dec(&in_mint),
            out_mint,
            out_amount: out_sums[&out_mint],
            out_decimals: dec(&out_mint),
        };
        if pair.in_amount == 0 || pair.out_amount == 0 {
            return None;
        }
        Some(pair)
    }

    fn finish(
        &self,
        signer: Pubkey,
        pair: SidePair,
        amms: Vec<Amm>,
        timestamp: Option<i64>,
    ) -> SwapSummary {
        let mut summary = SwapSummary {
            signers: vec![signer],
            signatures: self.env.signatures.clone(),
            amms: amms.iter().map(|a| a.to_string()).collect(),
            timestamp,
            token_in_mint: pair.in_mint,
            token_in_amount: pair.in_amount,
            token_in_decimals: pair.in_decimals,
            token_out_mint: pair.out_mint,
            token_out_amount: pair.out_amount,
            token_out_decimals: pair.out_decimals,
        };
        self.adjust_by_sol_delta(&mut summary);
        summary
    }

    /// Direction sanity: a strictly positive signer lamport delta means the
    /// signer net-received SOL, so SOL must sit on the output side. The
    /// reverse is never enforced - fees make a small negative delta
    /// indistinguishable from a small buy.
    fn adjust_by_sol_delta(&self, summary: &mut SwapSummary) {
        let sol_in = summary.token_in_mint == WRAPPED_SOL_MINT;
        let sol_out = summary.token_out_mint == WRAPPED_SOL_MINT;
        if !(sol_in || sol_out) {
            return;
        }
        let signer = match summary.signers.first() {
            Some(s) => *s,
            None => return,
        };
        let delta = match self.env.lamport_delta_for(&signer) {
            Some(d) => d,
            None => return,
        };
        if delta > 0 && sol_in {
            std::mem::swap(&mut summary.token_in_mint, &mut summary.token_out_mint);
            std::mem::swap(&mut summary.token_in_amount, &mut summary.token_out_amount);
            std::mem::swap(
                &mut summary.token_in_decimals,
                &mut summary.token_out_decimals,
            );
        }
    }
}

fn amm_of_program(program: &Pubkey) -> Amm {
    if is_raydium_program(program) {
        Amm::Raydium
    } else if *program == ORCA_WHIRLPOOL_PROGRAM_ID {
        Amm::Orca
    } else if is_meteora_program(program) {
        Amm::Meteora
    } else if *program == PUMPFUN_AMM_PROGRAM_ID {
        Amm::PumpfunAmm
    } else if *program == PUMPFUN_PROGRAM_ID {
        Amm::Pumpfun
    } else {
        Amm::Unknown
    }
}

/// Exact-duplicate legs appear when the same inner set is walked through
/// more than one detection path.
fn dedup_legs(swaps: Vec<DecodedSwap>) -> Vec<DecodedSwap> {
    let mut seen = std::collections::HashSet::new();
    let mut out = Vec::with_capacity(swaps.len());
    for swap in swaps {
        match &swap {
            DecodedSwap::Leg { leg, .. } => {
                if seen.insert(leg.dedup_key()) {
                    out.push(swap);
                }
            }
            _ => out.push(swap),
        }
    }
    out
}

/// Builds the token-account and decimals maps: seeded from pre/post token
/// balances, then extended instruction-by-instruction. TransferChecked
/// names its mint explicitly; a plain Transfer shares one mint across both
/// sides, so a known side fills in an unknown one.
fn build_token_maps(
    env: &TxEnvelope,
) -> (HashMap<Pubkey, TokenAccountInfo>, HashMap<Pubkey, u8>) {
    let mut token_accounts: HashMap<Pubkey, TokenAccountInfo> = HashMap::new();
    let mut decimals_by_mint: HashMap<Pubkey, u8> = HashMap::new();

    for row in env
        .pre_token_balances
        .iter()
        .chain(env.post_token_balances.iter())
    {
        if let Some(key) = env.key_at(row.account_index) {
            token_accounts.insert(
                *key,
                TokenAccountInfo {
                    mint: Some(row.mint),
                    decimals: row.decimals,
                },
            );
        }
        decimals_by_mint.insert(row.mint, row.decimals);
    }

    let instructions: Vec<&Ix> = env.all_instructions().collect();
    for ix in instructions {
        let program = match env.program_of(ix) {
            Some(p) => p,
            None => continue,
        };
        if !is_token_program(program) || ix.data.is_empty() || ix.accounts.len() < 2 {
            continue;
        }
        let opcode = ix.data[0];
        let source = match env.key_at(ix.accounts[0]) {
            Some(k) => *k,
            None => continue,
        };

        if opcode == 12 && ix.accounts.len() >= 3 {
            let mint = match env.key_at(ix.accounts[1]) {
                Some(k) => *k,
                None => continue,
            };
            let destination = match env.key_at(ix.accounts[2]) {
                Some(k) => *k,
                None => continue,
            };
            for account in [source, destination] {
                let entry = token_accounts.entry(account).or_default();
                if entry.mint.is_none() {
                    entry.mint = Some(mint);
                }
            }
            if !decimals_by_mint.contains_key(&mint) {
                // Mint seen only via TransferChecked: decimals stay unknown.
                decimals_by_mint.insert(mint, 0);
            }
        } else if opcode == 3 {
            let destination = match env.key_at(ix.accounts[1]) {
                Some(k) => *k,
                None => continue,
            };
            let source_mint = token_accounts.get(&source).and_then(|i| i.mint);
            let dest_mint = token_accounts.get(&destination).and_then(|i| i.mint);
            match (source_mint, dest_mint) {
                (Some(mint), None) => {
                    token_accounts.entry(destination).or_default().mint = Some(mint);
                }
                (None, Some(mint)) => {
                    token_accounts.entry(source).or_default().mint = Some(mint);
                }
                _ => {}
            }
        }
    }

    decimals_by_mint.entry(WRAPPED_SOL_MINT).or_insert(9);

    (token_accounts, decimals_by_mint)
}
