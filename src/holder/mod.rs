//! Distinct-holder counting for a mint: filtered program-account scans
//! against the classic token program, then Token-2022, first non-empty
//! result wins. Rate-limit-shaped failures are retried with capped
//! exponential backoff for up to an hour; anything else surfaces at once.

use rand::Rng;
use solana_account_decoder::UiAccountEncoding;
use solana_client::nonblocking::rpc_client::RpcClient;
use solana_client::rpc_config::{RpcAccountInfoConfig, RpcProgramAccountsConfig};
use solana_client::rpc_filter::{Memcmp, MemcmpEncodedBytes, RpcFilterType};
use solana_sdk::pubkey::Pubkey;
use std::collections::HashSet;
use std::str::FromStr;
use std::time::{Duration, Instant};
use tokio::time::sleep;
use tracing::{debug, info, instrument, warn};

use crate::config::Settings;
use crate::error::{is_rate_limit_message, is_scan_unavailable_message, PriceError, Result};
use crate::swap::programs::{TOKEN_2022_PROGRAM_ID, TOKEN_PROGRAM_ID};

/// SPL token account layout size; the filter keys on it.
const TOKEN_ACCOUNT_SIZE: u64 = 165;
/// Owner pubkey offset within the token account layout.
const OWNER_OFFSET: usize = 32;
/// Amount (LE u64) offset within the token account layout.
const AMOUNT_OFFSET: usize = 64;

const RETRY_BASE: Duration = Duration::from_millis(250);
const RETRY_CAP: Duration = Duration::from_secs(30);
const RETRY_WINDOW: Duration = Duration::from_secs(60 * 60);

/// Scan outcome.
#[derive(Debug, Clone, Copy)]
pub struct HolderCount {
    /// Distinct owners with a non-zero balance.
    pub holders: usize,
    /// Token accounts scanned, including empty ones.
    pub total_accounts: usize,
    /// Which token program served the scan; `None` when both came up empty.
    pub program_used: Option<Pubkey>,
}

/// Counts distinct holders of `mint_b58`.
#[instrument(skip(settings))]
pub async fn count_holders(settings: &Settings, mint_b58: &str) -> Result<HolderCount> {
    let mint = Pubkey::from_str(mint_b58.trim())
        .map_err(|e| PriceError::bad_input(format!("invalid mint: {}", e)))?;
    let rpc_url = settings
        .holder_rpc_url
        .clone()
        .unwrap_or_else(|| settings.rpc_url.clone());
    let client = RpcClient::new(rpc_url);

    for program in [TOKEN_PROGRAM_ID, TOKEN_2022_PROGRAM_ID] {
        match scan_program(&client, &mint, &program).await {
            Ok(count) if count.total_accounts > 0 => {
                info!(
                    %mint, %program,
                    holders = count.holders,
                    total = count.total_accounts,
                    "holder scan complete"
                );
                return Ok(HolderCount {
                    program_used: Some(program),
                    ..count
                });
            }
            Ok(_) => continue,
            Err(e) if is_scan_unavailable_message(&e.to_string()) => {
                // Provider cannot serve filtered scans; try the next program
                // (matches the zero-result contract rather than failing).
                warn!(%program, error = %e, "filtered scan unavailable");
                continue;
            }
            Err(e) => return Err(e),
        }
    }

    Ok(HolderCount {
        holders: 0,
        total_accounts: 0,
        program_used: None,
    })
}

async fn scan_program(
    client: &RpcClient,
    mint: &Pubkey,
    program: &Pubkey,
) -> Result<HolderCount> {
    let started = Instant::now();
    let mut attempt: u32 = 0;

    loop {
        let config = RpcProgramAccountsConfig {
            filters: Some(vec![
                RpcFilterType::DataSize(TOKEN_ACCOUNT_SIZE),
                RpcFilterType::Memcmp(Memcmp::new(
                    0, // token account starts with its mint
                    MemcmpEncodedBytes::Base58(mint.to_string()),
                )),
            ]),
            // Base58 account data is capped at 128 bytes server-side; token
            // accounts are 165, so base64 is required.
            account_config: RpcAccountInfoConfig {
                encoding: Some(UiAccountEncoding::Base64),
                ..Default::default()
            },
            ..Default::default()
        };

        match client.get_program_accounts_with_config(program, config).await {
            Ok(accounts) => {
                let total_accounts = accounts.len();
                let mut owners: HashSet<Pubkey> = HashSet::new();
                for (_, account) in &accounts {
                    if let Some((owner, amount)) = parse_token_account(&account.data) {
                        if amount > 0 {
                            owners.insert(owner);
                        }
                    }
                }
                return Ok(HolderCount {
                    holders: owners.len(),
                    total_accounts,
                    program_used: Some(*program),
                });
            }
            Err(e) => {
                let message = e.to_string();
                if !is_rate_limit_message(&message) {
                    return Err(PriceError::rpc(format!(
                        "getProgramAccounts({}): {}",
                        program, message
                    )));
                }
                if started.elapsed() >= RETRY_WINDOW {
                    return Err(PriceError::rpc(format!(
                        "getProgramAccounts({}): rate-limited past the retry window: {}",
                        program, message
                    )));
                }
                let backoff = retry_backoff(attempt);
                let jitter_ms = rand::thread_rng().gen_range(0..=backoff.as_millis() as u64 / 3);
                debug!(
                    attempt,
                    backoff_ms = backoff.as_millis() as u64,
                    "rate limited, backing off"
                );
                sleep(backoff + Duration::from_millis(jitter_ms)).await;
                attempt = attempt.saturating_add(1);
            }
        }
    }
}

/// Exponential backoff with a hard cap: 250ms, 500ms, 1s, ... 30s.
fn retry_backoff(attempt: u32) -> Duration {
    let factor = 1u64 << attempt.min(20);
    RETRY_BASE.saturating_mul(factor as u32).min(RETRY_CAP)
}

/// Reads (owner, amount) out of a raw 165-byte SPL token account.
fn parse_token_account(data: &[u8]) -> Option<(Pubkey, u64)> {
    if data.len() < TOKEN_ACCOUNT_SIZE as usize {
        return None;
    }
    let owner = Pubkey::try_from(&data[OWNER_OFFSET..OWNER_OFFSET + 32]).ok()?;
    let amount = u64::from_le_bytes(data[AMOUNT_OFFSET..AMOUNT_OFFSET + 8].try_into().ok()?);
    Some((owner, amount))
}
