// Public modules that are part of the API
pub mod chain;
pub mod config;
pub mod error;
pub mod holder;
pub mod market;
pub mod monitoring;
pub mod resolver;
pub mod swap;

// Re-export common types
pub use chain::{ChainClient, RpcChain};
pub use config::Settings;
pub use error::{PriceError, Result};
pub use holder::{count_holders, HolderCount};
pub use market::{minute_floor, parse_user_time_to_ms, BinanceClient, SolUsdSource};
pub use resolver::price::{PricePoint, StableMints};
pub use resolver::slot::{closest_slot, SlotMatch};
pub use resolver::vwap::{vwap_with_log_fence, Aggregate};
pub use resolver::{PriceResolution, Resolver, ResolverConfig};
pub use swap::{SwapParser, SwapSummary};
