// 8.0.2: result types for engine operations.

use crate::error::EngineError;
use crate::funding::FundingRate;
use crate::ledger::{FundingSummary, MarginAlert};
use crate::order::{Order, PriceLevel};
use crate::trade::Trade;
use crate::types::{InstrumentId, Price};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitResult {
    /// Final state of the submitted order.
    pub order: Order,
    pub trades: Vec<Trade>,
    /// Limit remainder now resting on the book.
    pub remainder: Option<Order>,
    /// Market remainder that found no liquidity.
    pub unfilled: Decimal,
    /// Positions touched by this order that ended below maintenance.
    pub margin_alerts: Vec<MarginAlert>,
}

impl SubmitResult {
    pub fn filled_size(&self) -> Decimal {
        self.trades.iter().map(|t| t.size).sum()
    }

    pub fn average_price(&self) -> Option<Price> {
        let filled = self.filled_size();
        if filled.is_zero() {
            return None;
        }
        let notional: Decimal = self.trades.iter().map(|t| t.notional()).sum();
        Price::new(notional / filled)
    }

    /// Err(InsufficientLiquidity) when part of a market order was dropped.
    /// Trades in this result stand either way.
    pub fn check_liquidity(&self) -> Result<(), EngineError> {
        if self.unfilled > Decimal::ZERO {
            return Err(EngineError::InsufficientLiquidity {
                requested: self.order.size,
                unfilled: self.unfilled,
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FundingOutcome {
    Applied {
        rate: FundingRate,
        summary: FundingSummary,
    },
    /// This interval was already funded.
    AlreadyApplied,
    /// Left for the next tick.
    Failed(EngineError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FundingReport {
    pub instrument_id: InstrumentId,
    pub outcome: FundingOutcome,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookSnapshot {
    pub instrument_id: InstrumentId,
    pub bids: Vec<PriceLevel>,
    pub asks: Vec<PriceLevel>,
}

impl BookSnapshot {
    pub fn best_bid(&self) -> Option<Price> {
        self.bids.first().map(|l| l.price)
    }

    pub fn best_ask(&self) -> Option<Price> {
        self.asks.first().map(|l| l.price)
    }
}
