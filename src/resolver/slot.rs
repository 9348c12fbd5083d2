//! Time-to-slot search: finds the slot whose block time is closest to a
//! target wall-clock second, under a hard probe budget.
//!
//! Block times are monotonic but sparsely observable (skipped and pruned
//! slots answer "unknown"), so the search brackets an estimated guess with
//! an adaptive window and then bisects, nudging around unknown slots.

use tracing::{debug, instrument};

use crate::chain::{estimate_slots_per_second, ChainClient};
use crate::error::{PriceError, Result};

/// Minute-level slack: downstream pricing only ever needs the minute of the
/// block, so any probe landing within this distance is accepted outright.
pub const EARLY_ACCEPT_SLACK_SECS: i64 = 60;

const DEFAULT_PROBE_BUDGET: u32 = 1024;
const MAX_BRACKET_ROUNDS: u32 = 32;
const MAX_BISECT_ITERATIONS: u32 = 64;

/// Search result; `tie` is set iff a second, distinct slot sits at exactly
/// the same time distance as `best`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotMatch {
    pub best: u64,
    pub tie: Option<u64>,
}

impl SlotMatch {
    fn single(best: u64) -> Self {
        SlotMatch { best, tie: None }
    }
}

/// Budgeted block-time prober.
struct Prober<'a> {
    chain: &'a dyn ChainClient,
    remaining: u32,
}

impl<'a> Prober<'a> {
    async fn time(&mut self, slot: u64) -> Option<i64> {
        if self.remaining == 0 {
            return None;
        }
        self.remaining -= 1;
        self.chain.block_time(slot).await
    }

    fn exhausted(&self) -> bool {
        self.remaining == 0
    }
}

/// Finds the slot whose block time is closest to `target_unix`.
#[instrument(skip(chain))]
pub async fn closest_slot(
    chain: &dyn ChainClient,
    target_unix: i64,
    max_probes: u32,
) -> Result<SlotMatch> {
    let max_probes = if max_probes == 0 {
        DEFAULT_PROBE_BUDGET
    } else {
        max_probes
    };

    let now_slot = chain.latest_finalized_slot().await?;
    let bt_now = chain
        .block_time(now_slot)
        .await
        .ok_or(PriceError::SlotUnresolvable { target_unix })?;

    // Future (or degenerate) targets resolve to the tip without probing.
    if target_unix <= 0 || target_unix >= bt_now {
        return Ok(SlotMatch::single(now_slot));
    }

    let sps = estimate_slots_per_second(chain).await;
    let lookback_secs = (bt_now - target_unix) as f64;
    let mut guess = ((now_slot as f64 - sps * lookback_secs).round().max(0.0) as u64).min(now_slot);

    let mut prober = Prober {
        chain,
        remaining: max_probes,
    };

    // Resolve a time at or near the guess.
    let mut guess_time = prober.time(guess).await;
    if guess_time.is_none() {
        for step in [50u64, 200, 1_000, 5_000] {
            if guess >= step {
                if let Some(t) = prober.time(guess - step).await {
                    guess -= step;
                    guess_time = Some(t);
                    break;
                }
            }
            if guess.saturating_add(step) <= now_slot {
                if let Some(t) = prober.time(guess + step).await {
                    guess += step;
                    guess_time = Some(t);
                    break;
                }
            }
        }
    }

    if let Some(t) = guess_time {
        if (t - target_unix).abs() <= EARLY_ACCEPT_SLACK_SECS {
            debug!(guess, guess_time = t, "early accept at the initial guess");
            return Ok(SlotMatch::single(guess));
        }
    }

    // Adaptive bracketing around the guess.
    let window_secs = (lookback_secs * 0.05).max(5.0);
    let mut span = ((sps * window_secs).round() as u64).clamp(200, now_slot.max(200));
    let mut center = guess;
    let mut lo_known: Option<(u64, i64)> = None;
    let mut hi_known: Option<(u64, i64)> = None;
    match guess_time {
        Some(t) if t < target_unix => lo_known = Some((guess, t)),
        Some(t) => hi_known = Some((guess, t)),
        None => {}
    }

    let mut bracketed = false;
    for round in 0..MAX_BRACKET_ROUNDS {
        if prober.exhausted() {
            break;
        }
        let lo = center.saturating_sub(span);
        let hi = center.saturating_add(span).min(now_slot);

        if lo_known.map_or(true, |(s, _)| s != lo) {
            if let Some((slot, t)) = probe_near(&mut prober, lo, lo, hi, true).await {
                if (t - target_unix).abs() <= EARLY_ACCEPT_SLACK_SECS {
                    return Ok(SlotMatch::single(slot));
                }
                if t <= target_unix {
                    lo_known = Some((slot, t));
                } else {
                    hi_known = Some((slot, t));
                }
            }
        }
        if hi_known.map_or(true, |(s, _)| s != hi) {
            if let Some((slot, t)) = probe_near(&mut prober, hi, lo, hi, false).await {
                if (t - target_unix).abs() <= EARLY_ACCEPT_SLACK_SECS {
                    return Ok(SlotMatch::single(slot));
                }
                if t <= target_unix {
                    lo_known = Some((slot, t));
                } else {
                    hi_known = Some((slot, t));
                }
            }
        }

        match (lo_known, hi_known) {
            (Some((ls, lt)), Some((hs, ht))) if lt <= target_unix && target_unix <= ht && ls < hs => {
                bracketed = true;
                break;
            }
            (Some((ls, lt)), _) if lt < target_unix => {
                // Everything known sits before the target; push the window up.
                center = ls;
                span = span.saturating_mul(2);
            }
            (_, Some((hs, ht))) if ht > target_unix => {
                center = hs;
                span = span.saturating_mul(2);
            }
            _ => {
                span = span.saturating_mul(2);
            }
        }
        debug!(round, center, span, "expanding bracket window");
    }

    let (mut lo_slot, mut lo_time, mut hi_slot, mut hi_time) = match (lo_known, hi_known) {
        (Some((ls, lt)), Some((hs, ht))) if bracketed => (ls, lt, hs, ht),
        // Partial success: only one side ever produced a time.
        (Some((slot, _)), None) | (None, Some((slot, _))) => {
            return Ok(SlotMatch::single(slot));
        }
        (Some((ls, lt)), Some((hs, ht))) => {
            // Both known but never bracketed (budget ran dry); pick closer.
            return Ok(closest_of(ls, lt, hs, ht, target_unix));
        }
        (None, None) => {
            return if guess_time.is_some() {
                Ok(SlotMatch::single(guess))
            } else {
                Err(PriceError::SlotUnresolvable { target_unix })
            };
        }
    };

    // Bisection. The working bounds may move onto unknown slots, but the
    // (slot, time) pairs only ever hold successfully probed slots, so the
    // final answer is always a slot with an observed block time.
    let (mut lo_bound, mut hi_bound) = (lo_slot, hi_slot);
    let mut iterations = 0;
    while lo_bound + 1 < hi_bound && iterations < MAX_BISECT_ITERATIONS && !prober.exhausted() {
        iterations += 1;
        let mid = lo_bound + (hi_bound - lo_bound) / 2;
        match prober.time(mid).await {
            Some(t) => {
                if (t - target_unix).abs() <= EARLY_ACCEPT_SLACK_SECS {
                    debug!(mid, mid_time = t, iterations, "early accept during bisection");
                    return Ok(SlotMatch::single(mid));
                }
                if t < target_unix {
                    lo_bound = mid;
                    lo_slot = mid;
                    lo_time = t;
                } else {
                    hi_bound = mid;
                    hi_slot = mid;
                    hi_time = t;
                }
            }
            None => {
                // Unknown mid: shrink toward the nearer endpoint without
                // touching the known times.
                if mid - lo_bound <= hi_bound - mid {
                    hi_bound = mid;
                } else {
                    lo_bound = mid;
                }
            }
        }
    }

    Ok(closest_of(lo_slot, lo_time, hi_slot, hi_time, target_unix))
}

/// Probes `slot`; on unknown answers nudges inward within `[lo, hi]`
/// (forward from the low end, backward from the high end).
async fn probe_near(
    prober: &mut Prober<'_>,
    slot: u64,
    lo: u64,
    hi: u64,
    forward: bool,
) -> Option<(u64, i64)> {
    if let Some(t) = prober.time(slot).await {
        return Some((slot, t));
    }
    for step in [1_000u64, 5_000, 25_000] {
        let candidate = if forward {
            slot.saturating_add(step)
        } else {
            slot.saturating_sub(step)
        };
        if candidate < lo || candidate > hi {
            continue;
        }
        if let Some(t) = prober.time(candidate).await {
            return Some((candidate, t));
        }
    }
    None
}

fn closest_of(lo_slot: u64, lo_time: i64, hi_slot: u64, hi_time: i64, target: i64) -> SlotMatch {
    let d_lo = (lo_time - target).abs();
    let d_hi = (hi_time - target).abs();
    if d_lo < d_hi {
        SlotMatch::single(lo_slot)
    } else if d_hi < d_lo {
        SlotMatch::single(hi_slot)
    } else if lo_slot == hi_slot {
        SlotMatch::single(lo_slot)
    } else {
        SlotMatch {
            best: lo_slot,
            tie: Some(hi_slot),
        }
    }
}
