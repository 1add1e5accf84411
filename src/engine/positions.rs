//! Position queries, margin transfers and margin checks.

use super::core::Engine;
use crate::error::EngineError;
use crate::events::{EventPayload, MarginEvent};
use crate::ledger::MarginAlert;
use crate::position::Position;
use crate::types::{AccountId, Amount, InstrumentId};
use rust_decimal::Decimal;

impl Engine {
    pub async fn position(&self, instrument_id: InstrumentId, account_id: AccountId) -> Result<Position, EngineError> {
        let handle = self.market(instrument_id)?;
        let market = handle.lock().await;
        market
            .ledger
            .position(account_id)
            .cloned()
            .ok_or(EngineError::PositionNotFound {
                account: account_id,
                instrument: instrument_id,
            })
    }

    /// Every position the account holds, flat ones included, ordered by instrument.
    pub async fn positions_for(&self, account_id: AccountId) -> Vec<Position> {
        let mut positions = Vec::new();
        for instrument_id in self.instruments() {
            if let Ok(position) = self.position(instrument_id, account_id).await {
                positions.push(position);
            }
        }
        positions
    }

    pub async fn deposit_margin(
        &self,
        instrument_id: InstrumentId,
        account_id: AccountId,
        amount: Amount,
    ) -> Result<Amount, EngineError> {
        let handle = self.market(instrument_id)?;
        let mut market = handle.lock().await;
        let now = self.clock.now();
        let new_margin = market.ledger.deposit_margin(account_id, amount, now)?;
        self.emit_event(
            now,
            EventPayload::MarginDeposited(MarginEvent {
                instrument_id,
                account_id,
                amount,
                new_margin,
            }),
        );
        Ok(new_margin)
    }

    pub async fn withdraw_margin(
        &self,
        instrument_id: InstrumentId,
        account_id: AccountId,
        amount: Amount,
    ) -> Result<Amount, EngineError> {
        let handle = self.market(instrument_id)?;
        let mut market = handle.lock().await;
        let now = self.clock.now();
        let price = market.risk_price().ok_or(EngineError::NoPrice(instrument_id))?;
        let new_margin = market.ledger.withdraw_margin(account_id, amount, price, now)?;
        self.emit_event(
            now,
            EventPayload::MarginWithdrawn(MarginEvent {
                instrument_id,
                account_id,
                amount,
                new_margin,
            }),
        );
        Ok(new_margin)
    }

    /// (margin + unrealized pnl) / notional at the current mark.
    pub async fn margin_ratio(&self, instrument_id: InstrumentId, account_id: AccountId) -> Result<Decimal, EngineError> {
        let handle = self.market(instrument_id)?;
        let market = handle.lock().await;
        let price = market.risk_price().ok_or(EngineError::NoPrice(instrument_id))?;
        market.ledger.margin_ratio(account_id, price)
    }

    pub async fn check_margin(&self, instrument_id: InstrumentId, account_id: AccountId) -> Result<(), EngineError> {
        let handle = self.market(instrument_id)?;
        let market = handle.lock().await;
        let price = market.risk_price().ok_or(EngineError::NoPrice(instrument_id))?;
        market.ledger.check_margin(account_id, price, self.clock.now())
    }

    /// Sweep one instrument for positions below maintenance and hand each to
    /// the liquidation policy.
    pub async fn sweep_margin(&self, instrument_id: InstrumentId) -> Result<Vec<MarginAlert>, EngineError> {
        let handle = self.market(instrument_id)?;
        let market = handle.lock().await;
        let Some(price) = market.risk_price() else {
            return Ok(Vec::new());
        };
        let alerts = market.ledger.at_risk(price, self.clock.now());
        for alert in &alerts {
            self.report_breach(alert);
        }
        Ok(alerts)
    }

    pub async fn open_interest(&self, instrument_id: InstrumentId) -> Result<Decimal, EngineError> {
        let handle = self.market(instrument_id)?;
        let market = handle.lock().await;
        Ok(market.ledger.open_interest())
    }
}
