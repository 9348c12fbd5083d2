//! External spot-market client: SOL/USDT minute-close lookups with retry,
//! plus the user-facing time parsing helpers.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use serde_json::Value;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};

use crate::config::Settings;
use crate::error::{MarketErrorKind, PriceError, Result};

const BINANCE_SYMBOL: &str = "SOLUSDT";
const BINANCE_INTERVAL: &str = "1m";
const MAX_ATTEMPTS: u32 = 3;
const ATTEMPT_TIMEOUT: Duration = Duration::from_secs(10);
const ONE_MINUTE_MS: i64 = 60 * 1000;

/// Rounds ms down to the start of its 1-minute window.
pub fn minute_floor(ms: i64) -> i64 {
    (ms / ONE_MINUTE_MS) * ONE_MINUTE_MS
}

/// Converts commonly used time inputs to ms since epoch.
///
/// Accepts UNIX seconds, UNIX ms (>= 1e12), RFC 3339 with optional
/// fractional seconds, `YYYY-MM-DD HH:MM:SS[ ZZZ]` and `YYYY-MM-DD`.
/// Bare timestamps and abbreviation-suffixed ones are read as UTC.
pub fn parse_user_time_to_ms(input: &str) -> Result<i64> {
    let s = input.trim();
    if s.is_empty() {
        return Err(PriceError::bad_input("empty time"));
    }

    if let Ok(n) = s.parse::<i64>() {
        // Heuristic: >= 1e12 means the caller already passed milliseconds.
        if n >= 1_000_000_000_000 {
            return Ok(n);
        }
        return Ok(n * 1000);
    }

    if let Ok(t) = DateTime::parse_from_rfc3339(s) {
        return Ok(t.timestamp_millis());
    }

    // `YYYY-MM-DD HH:MM:SS MST` - chrono cannot parse abbreviated zone
    // names, so strip a trailing alphabetic token and read the rest as UTC.
    let mut naive_candidate = s.to_string();
    if let Some((head, tail)) = s.rsplit_once(' ') {
        if !tail.is_empty() && tail.chars().all(|c| c.is_ascii_alphabetic()) {
            naive_candidate = head.to_string();
        }
    }
    if let Ok(t) = NaiveDateTime::parse_from_str(&naive_candidate, "%Y-%m-%d %H:%M:%S") {
        return Ok(Utc.from_utc_datetime(&t).timestamp_millis());
    }
    if let Ok(d) = NaiveDate::parse_from_str(&naive_candidate, "%Y-%m-%d") {
        let t = d.and_hms_opt(0, 0, 0).expect("midnight is always valid");
        return Ok(Utc.from_utc_datetime(&t).timestamp_millis());
    }

    Err(PriceError::bad_input(format!("cannot parse time: {:?}", input)))
}

/// Source of SOL/USD minute closes. The resolver only needs this one
/// question answered, so the seam is a single-method trait.
#[async_trait]
pub trait SolUsdSource: Send + Sync {
    /// Close price of the 1-minute window containing `unix_ms`.
    async fn sol_usd_minute_close(&self, unix_ms: i64) -> Result<f64>;
}

/// Kline client for a Binance-compatible spot API.
pub struct BinanceClient {
    http: reqwest::Client,
    base: String,
}

impl BinanceClient {
    pub fn new(base: impl Into<String>) -> Self {
        let http = reqwest::Client::builder()
            .timeout(ATTEMPT_TIMEOUT)
            .build()
            .expect("reqwest client construction cannot fail with static options");
        Self {
            http,
            base: base.into(),
        }
    }

    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(settings.binance_base.clone())
    }

    /// Parses a user time string, then fetches the close for its minute.
    pub async fn sol_usd_at_input(&self, input: &str) -> Result<f64> {
        let ms = parse_user_time_to_ms(input)?;
        self.sol_usd_minute_close(ms).await
    }

    async fn fetch_kline_close(&self, start_ms: i64, end_ms: i64) -> Result<f64> {
        let url = format!(
            "{}/api/v3/klines?symbol={}&interval={}&startTime={}&endTime={}&limit=1",
            self.base, BINANCE_SYMBOL, BINANCE_INTERVAL, start_ms, end_ms
        );

        let mut last_err: Option<PriceError> = None;
        for attempt in 1..=MAX_ATTEMPTS {
            match self.http.get(&url).send().await {
                Ok(resp) => {
                    let status = resp.status();
                    if status.is_success() {
                        let rows: Vec<Vec<Value>> = resp.json().await.map_err(|e| {
                            PriceError::market(
                                MarketErrorKind::Malformed,
                                format!("kline body: {}", e),
                            )
                        })?;
                        return parse_close(&rows, start_ms, end_ms);
                    }
                    if status.as_u16() == 429 || status.is_server_error() {
                        warn!(%status, attempt, "spot market throttled or failing, backing off");
                        last_err = Some(PriceError::market(
                            MarketErrorKind::Unavailable,
                            format!("http {}", status),
                        ));
                    } else {
                        // Client-side statuses do not improve on retry.
                        return Err(PriceError::market(
                            MarketErrorKind::Unavailable,
                            format!("http {}", status),
                        ));
                    }
                }
                Err(e) => {
                    warn!(error = %e, attempt, "spot market request failed");
                    last_err = Some(PriceError::market(
                        MarketErrorKind::Unavailable,
                        e.to_string(),
                    ));
                }
            }
            if attempt < MAX_ATTEMPTS {
                sleep(Duration::from_millis(500 * attempt as u64)).await;
            }
        }

        Err(last_err.unwrap_or_else(|| {
            PriceError::market(MarketErrorKind::Unavailable, "retries exhausted")
        }))
    }
}

fn parse_close(rows: &[Vec<Value>], start_ms: i64, end_ms: i64) -> Result<f64> {
    let first = rows.first().ok_or_else(|| {
        PriceError::market(
            MarketErrorKind::NoData,
            format!("no kline for window [{}, {}]", start_ms, end_ms),
        )
    })?;
    // Index 4 of a kline row is the close; string on Binance proper, but
    // tolerate numeric for compatible APIs.
    let close = first.get(4).ok_or_else(|| {
        PriceError::market(MarketErrorKind::Malformed, "kline row shorter than 5 fields")
    })?;
    match close {
        Value::String(s) => s.parse::<f64>().map_err(|e| {
            PriceError::market(MarketErrorKind::Malformed, format!("close field: {}", e))
        }),
        Value::Number(n) => n.as_f64().ok_or_else(|| {
            PriceError::market(MarketErrorKind::Malformed, "close field is not an f64")
        }),
        other => Err(PriceError::market(
            MarketErrorKind::Malformed,
            format!("unexpected close type: {}", other),
        )),
    }
}

#[async_trait]
impl SolUsdSource for BinanceClient {
    async fn sol_usd_minute_close(&self, unix_ms: i64) -> Result<f64> {
        let start = minute_floor(unix_ms);
        let end = start + ONE_MINUTE_MS - 1;
        let close = self.fetch_kline_close(start, end).await?;
        debug!(start, close, "fetched SOL/USDT minute close");
        Ok(close)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_minute_floor_seed() {
        // 2025-01-02T12:34:56.789Z -> 2025-01-02T12:34:00Z
        assert_eq!(minute_floor(1_735_821_296_789), 1_735_821_240_000);
    }

    #[test]
    fn test_minute_floor_window_and_idempotence() {
        for ms in [0_i64, 59_999, 60_000, 1_735_821_296_789] {
            let floored = minute_floor(ms);
            assert!(floored <= ms && ms < floored + ONE_MINUTE_MS);
            assert_eq!(minute_floor(floored), floored);
        }
    }

    #[test]
    fn test_parse_user_time_variants() {
        assert_eq!(
            parse_user_time_to_ms("2024-11-07T12:00:00Z").unwrap(),
            1_731_009_600_000
        );
        assert_eq!(parse_user_time_to_ms("1731009600").unwrap(), 1_731_009_600_000);
        assert_eq!(
            parse_user_time_to_ms("1731009600000").unwrap(),
            1_731_009_600_000
        );
        assert_eq!(
            parse_user_time_to_ms("2024-11-07 12:00:00").unwrap(),
            1_731_009_600_000
        );
        assert_eq!(
            parse_user_time_to_ms("2024-11-07 12:00:00 UTC").unwrap(),
            1_731_009_600_000
        );
        assert_eq!(
            parse_user_time_to_ms("2024-11-07").unwrap(),
            1_730_937_600_000
        );
    }

    #[test]
    fn test_parse_user_time_round_trip_rfc3339() {
        let unix = 1_731_009_600_i64;
        let iso = Utc.timestamp_opt(unix, 0).unwrap().to_rfc3339();
        assert_eq!(parse_user_time_to_ms(&iso).unwrap(), unix * 1000);
    }

    #[test]
    fn test_parse_user_time_rejects_garbage() {
        assert!(parse_user_time_to_ms("").is_err());
        assert!(parse_user_time_to_ms("yesterday").is_err());
    }

    #[test]
    fn test_parse_close_shapes() {
        let rows = vec![vec![
            json!(1_731_009_600_000_i64),
            json!("1.0"),
            json!("2.0"),
            json!("0.5"),
            json!("199.87"),
        ]];
        assert_eq!(parse_close(&rows, 0, 0).unwrap(), 199.87);

        let rows = vec![vec![json!(0), json!(0), json!(0), json!(0), json!(200.5)]];
        assert_eq!(parse_close(&rows, 0, 0).unwrap(), 200.5);

        let empty: Vec<Vec<Value>> = vec![];
        assert!(matches!(
            parse_close(&empty, 0, 0),
            Err(PriceError::Market {
                kind: MarketErrorKind::NoData,
                ..
            })
        ));

        let bad = vec![vec![json!(0), json!(0), json!(0), json!(0), json!(null)]];
        assert!(matches!(
            parse_close(&bad, 0, 0),
            Err(PriceError::Market {
                kind: MarketErrorKind::Malformed,
                ..
            })
        ));
    }
}
