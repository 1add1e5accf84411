// 9.1: quote request and issued quote. a quote is immutable once issued and
// only acceptable while now < expires_at.

use crate::error::EngineError;
use crate::types::{AccountId, InstrumentId, Price, QuoteId, Side, Timestamp};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Who priced the quote.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuoteSource {
    Rfq { provider: String },
    Amm,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuoteRequest {
    pub requester: AccountId,
    pub instrument_id: InstrumentId,
    pub side: Side,
    pub size: Decimal,
}

impl QuoteRequest {
    pub fn new(requester: AccountId, instrument_id: InstrumentId, side: Side, size: Decimal) -> Self {
        Self {
            requester,
            instrument_id,
            side,
            size,
        }
    }

    pub fn validate(&self) -> Result<(), EngineError> {
        if self.size <= Decimal::ZERO {
            return Err(EngineError::invalid_order("quote size must be positive"));
        }
        Ok(())
    }

    /// Lower is better for buyers, higher for sellers.
    pub fn is_better(&self, candidate: Price, current: Price) -> bool {
        match self.side {
            Side::Buy => candidate < current,
            Side::Sell => candidate > current,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Quote {
    pub id: QuoteId,
    pub requester: AccountId,
    /// Account on the other side of the trade if accepted.
    pub counterparty: AccountId,
    pub instrument_id: InstrumentId,
    pub side: Side,
    pub size: Decimal,
    pub price: Price,
    pub created_at: Timestamp,
    pub expires_at: Timestamp,
    pub source: QuoteSource,
}

impl Quote {
    pub fn is_live(&self, now: Timestamp) -> bool {
        now < self.expires_at
    }

    pub fn notional(&self) -> Decimal {
        self.size * self.price.value()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn liveness_is_strict() {
        let quote = Quote {
            id: QuoteId(1),
            requester: AccountId(1),
            counterparty: AccountId(2),
            instrument_id: InstrumentId(1),
            side: Side::Buy,
            size: dec!(2),
            price: Price::new_unchecked(dec!(100)),
            created_at: Timestamp::from_millis(0),
            expires_at: Timestamp::from_millis(1_000),
            source: QuoteSource::Amm,
        };
        assert!(quote.is_live(Timestamp::from_millis(999)));
        assert!(!quote.is_live(Timestamp::from_millis(1_000)));
        assert_eq!(quote.notional(), dec!(200));
    }

    #[test]
    fn better_price_depends_on_side() {
        let low = Price::new_unchecked(dec!(99));
        let high = Price::new_unchecked(dec!(101));
        let buy = QuoteRequest::new(AccountId(1), InstrumentId(1), Side::Buy, dec!(1));
        let sell = QuoteRequest::new(AccountId(1), InstrumentId(1), Side::Sell, dec!(1));
        assert!(buy.is_better(low, high));
        assert!(sell.is_better(high, low));
    }

    #[test]
    fn zero_size_request_rejected() {
        let req = QuoteRequest::new(AccountId(1), InstrumentId(1), Side::Buy, dec!(0));
        assert!(matches!(req.validate(), Err(EngineError::InvalidOrder { .. })));
    }
}
