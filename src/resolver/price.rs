//! Per-swap pricing: one canonical swap becomes at most one USD price
//! observation for the target mint.

use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::Signature;
use std::collections::HashMap;
use tokio::sync::Mutex;
use tracing::debug;

use crate::config::Settings;
use crate::error::Result;
use crate::market::SolUsdSource;
use crate::swap::programs::WRAPPED_SOL_MINT;
use crate::swap::SwapSummary;

const LAMPORTS_PER_SOL: u128 = 1_000_000_000;

/// Exact non-negative rational. Products and quotients of u64-scale chain
/// amounts with bounded decimal exponents fit comfortably in u128; the
/// value only becomes a float at the aggregator boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ratio {
    num: u128,
    den: u128,
}

impl Ratio {
    pub const ZERO: Ratio = Ratio { num: 0, den: 1 };

    pub fn new(num: u128, den: u128) -> Option<Ratio> {
        if den == 0 {
            return None;
        }
        Some(Ratio { num, den })
    }

    pub fn is_zero(&self) -> bool {
        self.num == 0
    }

    pub fn to_f64(&self) -> f64 {
        self.num as f64 / self.den as f64
    }
}

/// 10^dec, or `None` for absurd exponents.
fn pow10(dec: u8) -> Option<u128> {
    10u128.checked_pow(dec as u32)
}

/// How the counter leg converts to USD.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CounterClass {
    Sol,
    Stable,
    Other,
}

/// The configured ground-truth USD mints.
#[derive(Debug, Clone, Copy)]
pub struct StableMints {
    pub usdc: Pubkey,
    pub usdt: Pubkey,
}

impl StableMints {
    pub fn from_settings(settings: &Settings) -> Self {
        StableMints {
            usdc: settings.usdc_mint,
            usdt: settings.usdt_mint,
        }
    }

    pub fn classify(&self, mint: &Pubkey) -> CounterClass {
        if *mint == WRAPPED_SOL_MINT {
            CounterClass::Sol
        } else if *mint == self.usdc || *mint == self.usdt {
            CounterClass::Stable
        } else {
            CounterClass::Other
        }
    }
}

/// One price observation derived from one swap.
#[derive(Debug, Clone)]
pub struct PricePoint {
    pub signature: Option<Signature>,
    pub slot: u64,
    pub block_time: i64,
    pub target_mint: Pubkey,
    pub counter_mint: Pubkey,
    pub counter_class: CounterClass,
    /// SOL per 1 target token, exact; zero for stable-paired observations.
    pub price_sol_per_token: Ratio,
    pub price_usd: f64,
    /// Target quantity in UI units.
    pub target_qty: f64,
    pub counter_amount_raw: u64,
    pub counter_decimals: u8,
}

impl PricePoint {
    /// USD notional used as the aggregation weight: the stable leg's face
    /// value for stable pairs, the target leg's USD value for SOL pairs
    /// (consistent with how the USD price itself was derived).
    pub fn weight_usd(&self) -> Option<f64> {
        let w = match self.counter_class {
            CounterClass::Stable => {
                let scale = pow10(self.counter_decimals)? as f64;
                self.counter_amount_raw as f64 / scale
            }
            CounterClass::Sol => self.price_usd * self.target_qty,
            CounterClass::Other => return None,
        };
        if w.is_finite() && w > 0.0 {
            Some(w)
        } else {
            None
        }
    }
}

/// Request-scoped cache of SOL/USD minute closes, keyed by minute start.
/// Lookups are serialized; a miss holds the lock across the fetch so a
/// burst of same-minute observations costs one upstream call.
pub struct MinuteCloseCache<'a> {
    source: &'a dyn SolUsdSource,
    closes: Mutex<HashMap<i64, f64>>,
}

impl<'a> MinuteCloseCache<'a> {
    pub fn new(source: &'a dyn SolUsdSource) -> Self {
        Self {
            source,
            closes: Mutex::new(HashMap::new()),
        }
    }

    pub async fn close_at(&self, unix_sec: i64) -> Result<f64> {
        let minute = unix_sec.div_euclid(60);
        let mut closes = self.closes.lock().await;
        if let Some(close) = closes.get(&minute) {
            return Ok(*close);
        }
        let close = self.source.sol_usd_minute_close(unix_sec * 1000).await?;
        closes.insert(minute, close);
        Ok(close)
    }
}

/// Converts one swap into a price observation for `target_mint`.
///
/// Returns `Ok(None)` when the swap cannot be priced: the target is only a
/// routing hop, the counter is neither SOL nor a configured stable, or a
/// quantity degenerates to zero.
pub async fn price_point(
    summary: &SwapSummary,
    target_mint: &Pubkey,
    stables: &StableMints,
    slot: u64,
    block_time: i64,
    sol_usd: &MinuteCloseCache<'_>,
) -> Result<Option<PricePoint>> {
    // Which side is the target?
    let (target_amount, target_decimals, counter_mint, counter_amount, counter_decimals) =
        if summary.token_in_mint == *target_mint {
            (
                summary.token_in_amount,
                summary.token_in_decimals,
                summary.token_out_mint,
                summary.token_out_amount,
                summary.token_out_decimals,
            )
        } else if summary.token_out_mint == *target_mint {
            (
                summary.token_out_amount,
                summary.token_out_decimals,
                summary.token_in_mint,
                summary.token_in_amount,
                summary.token_in_decimals,
            )
        } else {
            return Ok(None);
        };

    let counter_class = stables.classify(&counter_mint);
    if counter_class == CounterClass::Other {
        return Ok(None);
    }
    if target_amount == 0 || counter_amount == 0 {
        return Ok(None);
    }

    let target_scale = match pow10(target_decimals) {
        Some(scale) => scale,
        None => return Ok(None),
    };
    let target_qty = match Ratio::new(target_amount as u128, target_scale) {
        Some(qty) => qty.to_f64(),
        None => return Ok(None),
    };
    if target_qty <= 0.0 {
        return Ok(None);
    }

    let (price_sol_per_token, price_usd) = match counter_class {
        CounterClass::Sol => {
            // (lamports / 1e9) / (raw / 10^dec) = lamports * 10^dec / (raw * 1e9)
            let num = (counter_amount as u128).checked_mul(target_scale);
            let den = (target_amount as u128).checked_mul(LAMPORTS_PER_SOL);
            let ratio = match (num, den) {
                (Some(num), Some(den)) => match Ratio::new(num, den) {
                    Some(r) => r,
                    None => return Ok(None),
                },
                _ => return Ok(None),
            };
            let close = match sol_usd.close_at(block_time).await {
                Ok(close) => close,
                Err(e) => {
                    // Policy: a failed minute-close lookup drops this
                    // observation only; stable-paired ones stay eligible.
                    debug!(block_time, error = %e, "minute close unavailable, dropping observation");
                    return Ok(None);
                }
            };
            (ratio, ratio.to_f64() * close)
        }
        CounterClass::Stable => {
            // (counter / 10^cd) / (target / 10^td) = counter * 10^td / (target * 10^cd)
            let counter_scale = match pow10(counter_decimals) {
                Some(scale) => scale,
                None => return Ok(None),
            };
            let num = (counter_amount as u128).checked_mul(target_scale);
            let den = (target_amount as u128).checked_mul(counter_scale);
            let price = match (num, den) {
                (Some(num), Some(den)) => match Ratio::new(num, den) {
                    Some(r) => r.to_f64(),
                    None => return Ok(None),
                },
                _ => return Ok(None),
            };
            (Ratio::ZERO, price)
        }
        CounterClass::Other => unreachable!("screened above"),
    };

    if !price_usd.is_finite() || price_usd <= 0.0 {
        return Ok(None);
    }

    Ok(Some(PricePoint {
        signature: summary.signatures.first().copied(),
        slot,
        block_time,
        target_mint: *target_mint,
        counter_mint,
        counter_class,
        price_sol_per_token,
        price_usd,
        target_qty,
        counter_amount_raw: counter_amount,
        counter_decimals,
    }))
}
