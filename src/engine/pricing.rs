//! Price update operations.
//!
//! Mark and index prices arrive from an external feed. Each update records a
//! premium sample for funding, re-anchors the RFQ AMM on the index, and
//! re-checks margin for every open position on the instrument.

use super::core::Engine;
use crate::error::EngineError;
use crate::events::{EventPayload, MarginBreachEvent};
use crate::ledger::MarginAlert;
use crate::types::{InstrumentId, Price, Timestamp};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PricePoint {
    pub price: Price,
    pub timestamp: Timestamp,
}

impl PricePoint {
    pub fn new(price: Price, timestamp: Timestamp) -> Self {
        Self { price, timestamp }
    }
}

// a point older than what we hold is dropped
fn newer(current: Option<PricePoint>, incoming: PricePoint) -> bool {
    current.map_or(true, |c| incoming.timestamp >= c.timestamp)
}

impl Engine {
    /// Push the latest mark and index prices for an instrument.
    ///
    /// Returns every open position now below maintenance; each one has
    /// already been handed to the liquidation policy.
    pub async fn update_prices(
        &self,
        instrument_id: InstrumentId,
        mark: PricePoint,
        index: PricePoint,
    ) -> Result<Vec<MarginAlert>, EngineError> {
        for point in [mark, index] {
            if point.price.value() <= Decimal::ZERO {
                return Err(EngineError::InvalidPrice {
                    instrument: instrument_id,
                    price: point.price.value(),
                });
            }
        }
        let handle = self.market(instrument_id)?;
        let mut market = handle.lock().await;

        if newer(market.mark_price, mark) {
            market.mark_price = Some(mark);
        } else {
            debug!(instrument = %instrument_id, ts = %mark.timestamp, "stale mark price ignored");
        }
        if newer(market.index_price, index) {
            market.index_price = Some(index);
            self.rfq.update_reference(instrument_id, index.price)?;
        } else {
            debug!(instrument = %instrument_id, ts = %index.timestamp, "stale index price ignored");
        }

        let (Some(mark), Some(index)) = (market.mark_price, market.index_price) else {
            return Ok(Vec::new());
        };
        let sampled_at = mark.timestamp.max(index.timestamp);
        let premium = market.premiums.record(mark.price, index.price, sampled_at);
        trace!(instrument = %instrument_id, %premium, mark = %mark.price, index = %index.price, "premium sampled");

        let now = self.clock.now();
        let alerts = market.ledger.at_risk(mark.price, now);
        for alert in &alerts {
            self.report_breach(alert);
        }
        Ok(alerts)
    }

    pub async fn mark_price(&self, instrument_id: InstrumentId) -> Result<Option<Price>, EngineError> {
        let handle = self.market(instrument_id)?;
        let market = handle.lock().await;
        Ok(market.mark_price.map(|p| p.price))
    }

    pub async fn index_price(&self, instrument_id: InstrumentId) -> Result<Option<Price>, EngineError> {
        let handle = self.market(instrument_id)?;
        let market = handle.lock().await;
        Ok(market.index_price.map(|p| p.price))
    }

    pub(super) fn report_breach(&self, alert: &MarginAlert) {
        self.liquidation.on_breach(alert);
        self.emit_event(
            alert.detected_at,
            EventPayload::MarginBreach(MarginBreachEvent {
                instrument_id: alert.instrument_id,
                account_id: alert.account_id,
                margin_ratio: alert.margin_ratio,
                maintenance: alert.maintenance,
            }),
        );
    }
}
