// 8.0: core trading engine. coordinates order execution, ledger updates,
// price updates, funding settlement, margin checks and the RFQ channel.
// each instrument serializes on its own lock; instruments run in parallel.

mod config;
mod core;
mod funding;
mod orders;
mod positions;
mod pricing;
mod quotes;
mod results;

pub use config::EngineConfig;
pub use self::core::{Engine, Market};
pub use funding::{FundingController, FundingPhase};
pub use orders::OrderRequest;
pub use pricing::PricePoint;
pub use results::{BookSnapshot, FundingOutcome, FundingReport, SubmitResult};
