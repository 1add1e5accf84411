// perps-engine: perpetual futures matching core.
// central limit order book per instrument, isolated-margin position ledger,
// periodic funding, and an RFQ channel that falls back to a constant-product pool.
//
// file map (search X.0 for structs, X.1+ for logic):
//   1.x  types.rs: ids, Side, Price, Amount, Leverage, Bps, Timestamp, clocks
//   1.9  error.rs: EngineError, one enum for every fallible operation
//   2.x  order.rs: orders and the price-time priority book
//   2.5  matching.rs: self-trade check and the matching walk
//   2.8  trade.rs: executed trades from the book or an accepted quote
//   3.x  margin.rs: IM/MM calculation, leverage tiers
//   4.x  position.rs: position struct, PnL, increase/reduce/flip
//   4.5  ledger.rs: positions per instrument, funding transfer, margin alerts
//   5.x  funding.rs: premium index, rate clamp, premium sampling
//   6.x  rfq/: quote requests, providers, AMM fallback
//   7.x  config.rs: instrument specs, settings, env presets
//   8.x  engine/: core engine: orders, positions, prices, funding, quotes
//   11.x events.rs: state transition events for audit
//   13.x logging.rs: tracing subscriber setup

// core trading modules
pub mod error;
pub mod matching;
pub mod order;
pub mod trade;
pub mod types;

// risk and settlement modules
pub mod funding;
pub mod ledger;
pub mod margin;
pub mod position;

// integration modules
pub mod config;
pub mod engine;
pub mod events;
pub mod logging;
pub mod rfq;

// re exports for convenience
pub use config::{ConfigError, EngineSettings, Environment, InstrumentSpec};
pub use engine::*;
pub use error::EngineError;
pub use events::{Event, EventId, EventPayload};
pub use funding::{FundingParams, FundingRate};
pub use ledger::{FundingSummary, LiquidationPolicy, LogOnlyPolicy, MarginAlert, PositionLedger};
pub use margin::{MarginParams, MarginStatus};
pub use matching::{match_order, MatchResult};
pub use order::*;
pub use position::{FillEffect, Position};
pub use rfq::{AmmPool, PoolConfig, Quote, QuoteProvider, QuoteRequest, QuoteSource, RfqConfig, RfqEngine, SpreadProvider};
pub use trade::*;
pub use types::*;
