use serde::Deserialize;
use solana_sdk::pubkey::Pubkey;
use std::str::FromStr;
use tracing::warn;

use crate::error::{PriceError, Result};

/// Default mainnet stablecoin mints, used when the environment is missing
/// or carries an invalid value.
pub const MAINNET_USDC: &str = "EPjFWdd5AufqSSqeM2qN1xzybapC8G4wEGGkZwyTDt1v";
pub const MAINNET_USDT: &str = "Es9vMFrzaCERmJfrF4H2FYD4KCoNkY11McCe8BenwNYB";

const DEFAULT_BINANCE_BASE: &str = "https://api.binance.com";

/// Environment-backed settings, read once at startup and immutable after.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Base URL of the external spot market (kline endpoint).
    pub binance_base: String,
    /// Stablecoin mints treated as ground-truth USD legs.
    pub usdc_mint: Pubkey,
    pub usdt_mint: Pubkey,
    /// RPC endpoint used by the price resolver.
    pub rpc_url: String,
    /// Dedicated RPC endpoint for the holder counter, when set.
    pub holder_rpc_url: Option<String>,
    /// Log fence ratio for the aggregator.
    pub fence_r: f64,
    /// Dust threshold on observation weights (USD notional).
    pub min_weight_usd: f64,
    /// Probe budget for the time-to-slot search.
    pub slot_probe_budget: u32,
    /// Backoff horizon, expressed in days of chain history.
    pub backoff_days: f64,
}

/// Raw shape deserialized by the `config` crate before validation.
#[derive(Debug, Deserialize)]
struct RawSettings {
    binance_base: String,
    solana_usdc_contract_address: Option<String>,
    solana_usdt_contract_address: Option<String>,
    solana_rpc_url_for_price: Option<String>,
    solana_rpc_url: Option<String>,
    helius_rpc: Option<String>,
    solana_rpc_url_for_counter: Option<String>,
    fence_r: f64,
    min_weight_usd: f64,
    slot_probe_budget: u32,
    backoff_days: f64,
}

impl Settings {
    /// Loads settings from the process environment (an optional `.env` file
    /// is honored). Invalid stablecoin overrides fall back to the known
    /// mainnet mints rather than failing startup.
    pub fn from_env() -> Result<Self> {
        if dotenv::dotenv().is_ok() {
            tracing::debug!("loaded configuration from .env file");
        }

        let raw: RawSettings = config::Config::builder()
            .add_source(config::Environment::default())
            .set_default("binance_base", DEFAULT_BINANCE_BASE)?
            .set_default("fence_r", 1.5)?
            .set_default("min_weight_usd", 1e-6)?
            .set_default("slot_probe_budget", 4096)?
            .set_default("backoff_days", 8.0)?
            .build()?
            .try_deserialize()
            .map_err(PriceError::Config)?;

        let rpc_url = raw
            .solana_rpc_url_for_price
            .or(raw.solana_rpc_url)
            .or(raw.helius_rpc)
            .ok_or_else(|| {
                PriceError::bad_input(
                    "no RPC endpoint configured (expected SOLANA_RPC_URL_FOR_PRICE, \
                     SOLANA_RPC_URL or HELIUS_RPC)",
                )
            })?;

        Ok(Settings {
            binance_base: raw.binance_base,
            usdc_mint: mint_or_default(raw.solana_usdc_contract_address.as_deref(), MAINNET_USDC),
            usdt_mint: mint_or_default(raw.solana_usdt_contract_address.as_deref(), MAINNET_USDT),
            rpc_url,
            holder_rpc_url: raw.solana_rpc_url_for_counter,
            fence_r: raw.fence_r,
            min_weight_usd: raw.min_weight_usd,
            slot_probe_budget: raw.slot_probe_budget,
            backoff_days: raw.backoff_days,
        })
    }
}

fn mint_or_default(configured: Option<&str>, fallback: &str) -> Pubkey {
    if let Some(value) = configured {
        match Pubkey::from_str(value.trim()) {
            Ok(pk) => return pk,
            Err(e) => {
                warn!(value, error = %e, "invalid stablecoin mint override, using default");
            }
        }
    }
    Pubkey::from_str(fallback).expect("default mint is a valid base58 pubkey")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mint_fallback_on_garbage() {
        let usdc = mint_or_default(Some("not-a-pubkey"), MAINNET_USDC);
        assert_eq!(usdc.to_string(), MAINNET_USDC);
    }

    #[test]
    fn test_mint_override_accepted() {
        let custom = "So11111111111111111111111111111111111111112";
        let mint = mint_or_default(Some(custom), MAINNET_USDC);
        assert_eq!(mint.to_string(), custom);
    }

    #[test]
    fn test_mint_default_when_unset() {
        let usdt = mint_or_default(None, MAINNET_USDT);
        assert_eq!(usdt.to_string(), MAINNET_USDT);
    }
}
