use thiserror::Error;
use std::fmt;

#[derive(Error, Debug)]
pub enum PriceError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Bad input: {0}")]
    BadInput(String),

    #[error("Solana RPC error: {0}")]
    Rpc(String),

    #[error("External market error: {kind} - {message}")]
    Market {
        kind: MarketErrorKind,
        message: String,
    },

    #[error("Slot search failed: no block time obtained near target {target_unix}")]
    SlotUnresolvable { target_unix: i64 },

    #[error("No USD-priceable swaps for {mint} at t={t} ({scanned_slots} slot(s) scanned)")]
    NoObservations {
        mint: String,
        t: i64,
        scanned_slots: u64,
    },

    #[error("Swap parse error: {0}")]
    Parse(String),

    #[error("Cancelled: {0}")]
    Cancelled(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("HTTP client error: {0}")]
    HttpClient(#[from] reqwest::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Failure modes of the external minute-close API.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarketErrorKind {
    /// All retries exhausted (transport failure, 429 or 5xx every attempt).
    Unavailable,
    /// The API answered with an empty kline array for the window.
    NoData,
    /// The close field had an unexpected shape.
    Malformed,
}

impl fmt::Display for MarketErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unavailable => write!(f, "unavailable"),
            Self::NoData => write!(f, "no data"),
            Self::Malformed => write!(f, "malformed response"),
        }
    }
}

pub type Result<T> = std::result::Result<T, PriceError>;

impl PriceError {
    pub fn bad_input(message: impl Into<String>) -> Self {
        PriceError::BadInput(message.into())
    }

    pub fn rpc(message: impl Into<String>) -> Self {
        PriceError::Rpc(message.into())
    }

    pub fn market(kind: MarketErrorKind, message: impl Into<String>) -> Self {
        PriceError::Market {
            kind,
            message: message.into(),
        }
    }

    pub fn parse(message: impl Into<String>) -> Self {
        PriceError::Parse(message.into())
    }

    /// Whether the error is a per-candidate condition that evidence
    /// collection should skip rather than surface. A single unparseable or
    /// unpriceable transaction never fails the whole request.
    pub fn is_candidate_local(&self) -> bool {
        matches!(self, PriceError::Parse(_) | PriceError::Market { .. })
    }

    pub fn is_retryable(&self) -> bool {
        match self {
            PriceError::Market { kind, .. } => *kind == MarketErrorKind::Unavailable,
            PriceError::Rpc(msg) => is_rate_limit_message(msg),
            _ => false,
        }
    }
}

/// Broad detector for throttling-shaped RPC failures; providers phrase
/// these many different ways.
pub fn is_rate_limit_message(message: &str) -> bool {
    let lower = message.to_ascii_lowercase();
    [
        "rate limit",
        "rate-limited",
        "429",
        "too many requests",
        "server busy",
        "try again later",
        "overloaded",
    ]
    .iter()
    .any(|needle| lower.contains(needle))
}

/// Responses that mean the provider cannot serve a filtered program-account
/// scan at all (secondary indexes disabled, method missing on the plan).
pub fn is_scan_unavailable_message(message: &str) -> bool {
    let lower = message.to_ascii_lowercase();
    [
        "method not found",
        "-32601",
        "excluded from account secondary indexes",
        "secondary indexes are disabled",
        "account indexes disabled",
        "unsupported filters on this plan",
    ]
    .iter()
    .any(|needle| lower.contains(needle))
}

impl From<String> for PriceError {
    fn from(s: String) -> Self {
        PriceError::Internal(s)
    }
}

impl From<&str> for PriceError {
    fn from(s: &str) -> Self {
        PriceError::Internal(s.to_string())
    }
}
