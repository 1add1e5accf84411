//! Error kinds returned by the order book, ledger, funding and RFQ paths.
//!
//! Every rejected request leaves book and ledger state untouched. Only
//! [`EngineError::InsufficientLiquidity`] and [`EngineError::Expired`] are
//! recoverable by the caller (resubmit, or ask for a fresh quote).

use crate::config::ConfigError;
use crate::types::{AccountId, InstrumentId, OrderId, QuoteId, Timestamp};
use rust_decimal::Decimal;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EngineError {
    #[error("invalid order: {reason}")]
    InvalidOrder { reason: String },

    #[error("order {0:?} not found")]
    OrderNotFound(OrderId),

    #[error("quote {0:?} not found")]
    QuoteNotFound(QuoteId),

    #[error("{0} not found")]
    InstrumentNotFound(InstrumentId),

    #[error("no position for {account} on {instrument}")]
    PositionNotFound {
        account: AccountId,
        instrument: InstrumentId,
    },

    #[error("{0} already registered")]
    InstrumentExists(InstrumentId),

    #[error("self trade prevented: {account} would match its own resting order {resting_order:?}")]
    SelfTradePrevention {
        account: AccountId,
        resting_order: OrderId,
    },

    #[error("insufficient liquidity: {unfilled} of {requested} left unfilled")]
    InsufficientLiquidity { requested: Decimal, unfilled: Decimal },

    #[error("quote {quote_id:?} expired at {expired_at}")]
    Expired {
        quote_id: QuoteId,
        expired_at: Timestamp,
    },

    #[error("margin breach: {account} on {instrument} at ratio {margin_ratio}, maintenance {maintenance}")]
    MarginBreach {
        account: AccountId,
        instrument: InstrumentId,
        margin_ratio: Decimal,
        maintenance: Decimal,
    },

    #[error("funding application failed on {instrument}: {reason}")]
    FundingApplicationFailure {
        instrument: InstrumentId,
        reason: String,
    },

    #[error("no price available for {0}")]
    NoPrice(InstrumentId),

    #[error("invalid price {price} for {instrument}")]
    InvalidPrice { instrument: InstrumentId, price: Decimal },

    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl EngineError {
    pub fn invalid_order(reason: impl Into<String>) -> Self {
        Self::InvalidOrder {
            reason: reason.into(),
        }
    }

    /// Caller may retry: resubmit the order or request a fresh quote.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            EngineError::InsufficientLiquidity { .. } | EngineError::Expired { .. }
        )
    }

    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            EngineError::OrderNotFound(_)
                | EngineError::QuoteNotFound(_)
                | EngineError::InstrumentNotFound(_)
                | EngineError::PositionNotFound { .. }
        )
    }
}
