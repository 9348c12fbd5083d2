use anyhow::{anyhow, Context, Result};
use serde::Serialize;
use solana_sdk::pubkey::Pubkey;
use std::str::FromStr;
use tracing::info;

use retroprice::market::parse_user_time_to_ms;
use retroprice::monitoring::init_logging;
use retroprice::{PriceError, Resolver, Settings};

#[derive(Serialize)]
struct PriceOutput {
    mint: String,
    t: i64,
    #[serde(rename = "priceUSD")]
    price_usd: f64,
    kept: usize,
    #[serde(rename = "sumW")]
    sum_weight: f64,
    ok: bool,
    slot: u64,
    #[serde(rename = "scannedSlots")]
    scanned_slots: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let _guard = init_logging("./logs", "debug", "info").context("logging init")?;

    let mut args = std::env::args().skip(1);
    let (mint_arg, time_arg) = match (args.next(), args.next()) {
        (Some(mint), Some(time)) => (mint, time),
        _ => {
            eprintln!("usage: retroprice <mint-base58> <time>");
            eprintln!("  time: unix seconds, unix ms, RFC 3339, or YYYY-MM-DD[ HH:MM:SS]");
            std::process::exit(2);
        }
    };

    let settings = Settings::from_env().context("loading settings")?;
    let mint = Pubkey::from_str(mint_arg.trim()).map_err(|e| anyhow!("invalid mint: {}", e))?;
    let t_unix = parse_user_time_to_ms(&time_arg)? / 1000;

    info!(%mint, t_unix, "resolving historical price");
    let resolver = Resolver::from_settings(&settings);

    let output = match resolver.resolve(mint, t_unix).await {
        Ok(res) => PriceOutput {
            mint: mint.to_string(),
            t: t_unix,
            price_usd: res.price_usd,
            kept: res.kept,
            sum_weight: res.sum_weight,
            ok: res.ok,
            slot: res.slot,
            scanned_slots: res.scanned_slots,
            error: None,
        },
        Err(e @ PriceError::NoObservations { .. }) => PriceOutput {
            mint: mint.to_string(),
            t: t_unix,
            price_usd: 0.0,
            kept: 0,
            sum_weight: 0.0,
            ok: false,
            slot: 0,
            scanned_slots: 0,
            error: Some(e.to_string()),
        },
        Err(e) => return Err(e.into()),
    };

    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}
