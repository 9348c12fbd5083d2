//! Resolver orchestration: `(mint, t)` in, robust USD price out.
//!
//! Drives the pipeline slot-search -> block filter -> swap decode ->
//! per-swap pricing -> log-fence VWAP, walking earlier slots when the
//! closest slot carries no priceable evidence.

pub mod filter;
pub mod price;
pub mod slot;
pub mod vwap;

use solana_sdk::pubkey::Pubkey;
use std::sync::Arc;
use std::time::Instant;
use tokio::time::Duration;
use tracing::{debug, info, instrument, warn};

use crate::chain::{estimate_slots_per_second, ChainClient, RpcChain};
use crate::config::Settings;
use crate::error::{PriceError, Result};
use crate::market::{BinanceClient, SolUsdSource};
use crate::swap::SwapParser;
use price::{MinuteCloseCache, PricePoint, StableMints};
use vwap::{vwap_with_log_fence, DEFAULT_FENCE_R, DEFAULT_MIN_WEIGHT_USD};

const DEFAULT_PROBE_BUDGET: u32 = 4096;
const DEFAULT_BACKOFF_DAYS: f64 = 8.0;

/// Per-request knobs; zero/invalid values fall back to defaults downstream.
#[derive(Debug, Clone)]
pub struct ResolverConfig {
    /// Backoff horizon in slots; `None` derives it from `backoff_days` at
    /// the live slots-per-second rate.
    pub backoff_slots: Option<u64>,
    pub backoff_days: f64,
    pub fence_r: f64,
    pub min_weight_usd: f64,
    pub slot_probe_budget: u32,
    /// Request deadline, honored at every suspension point.
    pub deadline: Option<Instant>,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        ResolverConfig {
            backoff_slots: None,
            backoff_days: DEFAULT_BACKOFF_DAYS,
            fence_r: DEFAULT_FENCE_R,
            min_weight_usd: DEFAULT_MIN_WEIGHT_USD,
            slot_probe_budget: DEFAULT_PROBE_BUDGET,
            deadline: None,
        }
    }
}

impl ResolverConfig {
    pub fn from_settings(settings: &Settings) -> Self {
        ResolverConfig {
            backoff_slots: None,
            backoff_days: settings.backoff_days,
            fence_r: settings.fence_r,
            min_weight_usd: settings.min_weight_usd,
            slot_probe_budget: settings.slot_probe_budget,
            deadline: None,
        }
    }

    pub fn with_deadline(mut self, timeout: Duration) -> Self {
        self.deadline = Some(Instant::now() + timeout);
        self
    }
}

/// Final answer for one `(mint, t)` query.
#[derive(Debug, Clone, Copy)]
pub struct PriceResolution {
    pub price_usd: f64,
    pub kept: usize,
    pub sum_weight: f64,
    pub ok: bool,
    /// Slot the observations came from.
    pub slot: u64,
    /// Earlier slots walked before evidence was found.
    pub scanned_slots: u64,
}

pub struct Resolver {
    chain: Arc<dyn ChainClient>,
    sol_usd: Arc<dyn SolUsdSource>,
    stables: StableMints,
    config: ResolverConfig,
}

impl Resolver {
    pub fn new(
        chain: Arc<dyn ChainClient>,
        sol_usd: Arc<dyn SolUsdSource>,
        stables: StableMints,
        config: ResolverConfig,
    ) -> Self {
        Self {
            chain,
            sol_usd,
            stables,
            config,
        }
    }

    /// Production wiring from environment settings.
    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(
            Arc::new(RpcChain::new(settings.rpc_url.clone())),
            Arc::new(BinanceClient::from_settings(settings)),
            StableMints::from_settings(settings),
            ResolverConfig::from_settings(settings),
        )
    }

    fn check_deadline(&self) -> Result<()> {
        if let Some(deadline) = self.config.deadline {
            if Instant::now() >= deadline {
                return Err(PriceError::Cancelled("request deadline exceeded".into()));
            }
        }
        Ok(())
    }

    async fn backoff_cap(&self) -> u64 {
        if let Some(cap) = self.config.backoff_slots {
            return cap.max(1);
        }
        let days = if self.config.backoff_days > 0.0 {
            self.config.backoff_days
        } else {
            DEFAULT_BACKOFF_DAYS
        };
        let sps = estimate_slots_per_second(self.chain.as_ref()).await;
        ((sps * days * 24.0 * 60.0 * 60.0).ceil() as u64).max(1)
    }

    /// Resolves the USD price of `mint` at unix second `t_unix`.
    #[instrument(skip(self), fields(mint = %mint))]
    pub async fn resolve(&self, mint: Pubkey, t_unix: i64) -> Result<PriceResolution> {
        if mint == Pubkey::default() {
            return Err(PriceError::bad_input("mint is the zero address"));
        }
        if t_unix <= 0 {
            return Err(PriceError::bad_input(format!(
                "timestamp must be positive, got {}",
                t_unix
            )));
        }
        self.check_deadline()?;

        let best = slot::closest_slot(
            self.chain.as_ref(),
            t_unix,
            self.config.slot_probe_budget,
        )
        .await?
        .best;
        debug!(slot = best, "resolved closest slot");

        let cache = MinuteCloseCache::new(self.sol_usd.as_ref());

        // The closest slot: a bulk block-fetch failure here is surfaced.
        self.check_deadline()?;
        let mut observations = self.eligible_points_at(best, &mint, &cache).await?;
        let mut used_slot = best;
        let mut scanned: u64 = 0;

        if observations.is_empty() {
            let cap = self.backoff_cap().await;
            let mut current = best;
            while observations.is_empty() && scanned < cap && current > 0 {
                self.check_deadline()?;
                current -= 1;
                scanned += 1;
                match self.eligible_points_at(current, &mint, &cache).await {
                    Ok(points) => {
                        if !points.is_empty() {
                            used_slot = current;
                            observations = points;
                        }
                    }
                    Err(e) if matches!(e, PriceError::Cancelled(_)) => return Err(e),
                    Err(e) => {
                        // Pruned or failing slots are walked over silently.
                        debug!(slot = current, error = %e, "skipping slot during backoff");
                    }
                }
            }
        }

        if observations.is_empty() {
            warn!(%mint, t_unix, scanned, "no priceable swaps in the search window");
            return Err(PriceError::NoObservations {
                mint: mint.to_string(),
                t: t_unix,
                scanned_slots: scanned,
            });
        }

        let (values, weights): (Vec<f64>, Vec<f64>) = observations
            .iter()
            .map(|(point, weight)| (point.price_usd, *weight))
            .unzip();
        let agg = vwap_with_log_fence(
            &values,
            &weights,
            self.config.fence_r,
            self.config.min_weight_usd,
        );
        info!(
            %mint, t_unix, slot = used_slot, scanned,
            vwap = agg.vwap, kept = agg.kept, ok = agg.ok,
            "price resolved"
        );
        Ok(PriceResolution {
            price_usd: agg.vwap,
            kept: agg.kept,
            sum_weight: agg.sum_weight,
            ok: agg.ok,
            slot: used_slot,
            scanned_slots: scanned,
        })
    }

    /// Collects priced observations (with their USD weights) for one slot.
    /// Per-candidate failures are logged and skipped; only the block fetch
    /// itself can error.
    async fn eligible_points_at(
        &self,
        slot_number: u64,
        mint: &Pubkey,
        cache: &MinuteCloseCache<'_>,
    ) -> Result<Vec<(PricePoint, f64)>> {
        let candidates = filter::filter_txs_by_mint(self.chain.as_ref(), slot_number, mint).await?;
        if candidates.is_empty() {
            return Ok(Vec::new());
        }
        debug!(slot = slot_number, candidates = candidates.len(), "scanning candidates");

        let mut observations = Vec::new();
        for candidate in &candidates {
            self.check_deadline()?;
            let signature = match candidate.signature {
                Some(signature) => signature,
                // Without a signature the candidate cannot be re-fetched.
                None => continue,
            };
            let fetched = match self.chain.transaction(&signature).await {
                Ok(Some(tx)) => tx,
                Ok(None) => continue,
                Err(e) => {
                    debug!(%signature, error = %e, "candidate fetch failed, skipping");
                    continue;
                }
            };
            let (transaction, meta) = match (&fetched.transaction, &fetched.meta) {
                (Some(transaction), Some(meta)) => (transaction, meta),
                _ => continue,
            };
            let summary = match SwapParser::new(transaction, meta).and_then(|p| p.parse()) {
                Ok(Some(summary)) => summary,
                Ok(None) => continue,
                Err(e) => {
                    debug!(%signature, error = %e, "candidate decode failed, skipping");
                    continue;
                }
            };
            let block_time = fetched.block_time.unwrap_or(candidate.block_time);
            let point = match price::price_point(
                &summary,
                mint,
                &self.stables,
                slot_number,
                block_time,
                cache,
            )
            .await
            {
                Ok(Some(point)) => point,
                Ok(None) => continue,
                Err(e) => {
                    debug!(%signature, error = %e, "candidate pricing failed, skipping");
                    continue;
                }
            };
            match point.weight_usd() {
                Some(weight) => observations.push((point, weight)),
                None => continue,
            }
        }
        Ok(observations)
    }
}
