//! Per-instrument position ledger.
//!
//! The ledger is the only owner of [`Position`] records. Positions change
//! through three paths: trade application, funding application, and margin
//! deposits/withdrawals. Flat positions stay in the ledger with zero size so
//! their realized pnl and margin remain queryable.

use crate::error::EngineError;
use crate::funding::FundingRate;
use crate::margin::{calculate_margin_requirement, maintenance_fraction, MarginParams};
use crate::matching::PlannedFill;
use crate::position::{FillEffect, Position};
use crate::trade::Trade;
use crate::types::{AccountId, Amount, InstrumentId, Price, Side, Timestamp};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;
use tracing::{debug, info, warn};

/// A position whose margin ratio fell below maintenance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarginAlert {
    pub account_id: AccountId,
    pub instrument_id: InstrumentId,
    pub margin_ratio: Decimal,
    pub maintenance: Decimal,
    pub equity: Amount,
    pub notional: Amount,
    pub detected_at: Timestamp,
}

impl MarginAlert {
    pub fn into_error(self) -> EngineError {
        EngineError::MarginBreach {
            account: self.account_id,
            instrument: self.instrument_id,
            margin_ratio: self.margin_ratio,
            maintenance: self.maintenance,
        }
    }
}

/// Hook invoked for every position detected below maintenance.
///
/// Resolution (closing, auctioning, socializing losses) lives behind this
/// trait. The engine only detects and reports.
pub trait LiquidationPolicy: Send + Sync + fmt::Debug {
    fn on_breach(&self, alert: &MarginAlert);
}

/// Default policy: record the breach in the log and leave the position alone.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogOnlyPolicy;

impl LiquidationPolicy for LogOnlyPolicy {
    fn on_breach(&self, alert: &MarginAlert) {
        warn!(
            account = %alert.account_id,
            instrument = %alert.instrument_id,
            margin_ratio = %alert.margin_ratio,
            maintenance = %alert.maintenance,
            "position below maintenance margin"
        );
    }
}

/// Outcome of one funding application across the ledger.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FundingSummary {
    pub positions_funded: usize,
    /// Sum of payments made by payers.
    pub total_paid: Amount,
    /// Sum of payments received, as a positive amount.
    pub total_received: Amount,
}

#[derive(Debug, Clone)]
pub struct PositionLedger {
    instrument_id: InstrumentId,
    margin_params: MarginParams,
    positions: HashMap<AccountId, Position>,
    /// Accounts never reported below maintenance (the AMM counterparty).
    exempt: HashSet<AccountId>,
}

impl PositionLedger {
    pub fn new(instrument_id: InstrumentId, margin_params: MarginParams) -> Self {
        Self {
            instrument_id,
            margin_params,
            positions: HashMap::new(),
            exempt: HashSet::new(),
        }
    }

    /// Stop raising margin alerts for `account_id`.
    pub fn exempt_from_margin(&mut self, account_id: AccountId) {
        self.exempt.insert(account_id);
    }

    pub fn instrument_id(&self) -> InstrumentId {
        self.instrument_id
    }

    pub fn margin_params(&self) -> &MarginParams {
        &self.margin_params
    }

    pub fn position(&self, account_id: AccountId) -> Option<&Position> {
        self.positions.get(&account_id)
    }

    pub fn positions(&self) -> impl Iterator<Item = &Position> {
        self.positions.values()
    }

    pub fn open_positions(&self) -> impl Iterator<Item = &Position> {
        self.positions.values().filter(|p| !p.is_flat())
    }

    /// Total long size. Equals total short size for book and RFQ trades.
    pub fn open_interest(&self) -> Decimal {
        self.positions
            .values()
            .filter(|p| p.net_size.is_long())
            .map(|p| p.net_size.value())
            .sum()
    }

    /// Apply both legs of a trade: the taker on its side, the maker on the opposite.
    /// Both legs are computed on copies first, so an error leaves the ledger as it was.
    pub fn apply_trade(&mut self, trade: &Trade) -> Result<[FillEffect; 2], EngineError> {
        debug_assert_eq!(trade.instrument_id, self.instrument_id);
        let mut taker = self.position_or_new(trade.taker_account, trade.timestamp);
        let taker_effect = taker.apply_fill(trade.taker_side, trade.size, trade.price, trade.timestamp)?;

        // a book trade never pairs an account with itself, but an rfq trade could
        let mut maker = if trade.maker_account == trade.taker_account {
            taker.clone()
        } else {
            self.position_or_new(trade.maker_account, trade.timestamp)
        };
        let maker_effect = maker.apply_fill(trade.maker_side(), trade.size, trade.price, trade.timestamp)?;

        for position in [taker, maker] {
            debug!(
                account = %position.account_id,
                instrument = %self.instrument_id,
                price = %trade.price,
                size = %trade.size,
                net_size = %position.net_size,
                "fill applied"
            );
            self.positions.insert(position.account_id, position);
        }
        Ok([taker_effect, maker_effect])
    }

    pub fn apply_fill(
        &mut self,
        account_id: AccountId,
        side: Side,
        size: Decimal,
        price: Price,
        at: Timestamp,
    ) -> Result<FillEffect, EngineError> {
        let mut position = self.position_or_new(account_id, at);
        let effect = position.apply_fill(side, size, price, at)?;
        debug!(
            account = %account_id,
            instrument = %self.instrument_id,
            %side,
            %size,
            %price,
            net_size = %position.net_size,
            realized = %effect.realized_pnl,
            "fill applied"
        );
        self.positions.insert(account_id, position);
        Ok(effect)
    }

    /// Dry run of a taker walking `fills`. Every leg is applied to scratch
    /// copies in order; the ledger itself is never written.
    pub fn check_fills(
        &self,
        taker: AccountId,
        taker_side: Side,
        fills: &[PlannedFill],
        at: Timestamp,
    ) -> Result<(), EngineError> {
        let mut scratch: HashMap<AccountId, Position> = HashMap::new();
        for fill in fills {
            for (account, side) in [(taker, taker_side), (fill.maker_account, taker_side.opposite())] {
                let position = scratch
                    .entry(account)
                    .or_insert_with(|| self.position_or_new(account, at));
                position.apply_fill(side, fill.size, fill.price, at)?;
            }
        }
        Ok(())
    }

    fn position_or_new(&self, account_id: AccountId, at: Timestamp) -> Position {
        self.positions
            .get(&account_id)
            .cloned()
            .unwrap_or_else(|| Position::new(account_id, self.instrument_id, at))
    }

    /// Charge one funding interval to every open position that has not seen it yet.
    ///
    /// Payments are computed for every due position before any of them is
    /// written, so a failure leaves the ledger untouched. Positions already
    /// funded for `rate.effective_at` or later are skipped.
    pub fn apply_funding(&mut self, rate: &FundingRate) -> Result<FundingSummary, EngineError> {
        let failure = |reason: String| EngineError::FundingApplicationFailure {
            instrument: self.instrument_id,
            reason,
        };

        let mut staged: Vec<(AccountId, Amount, Amount)> = Vec::new();
        for position in self.positions.values() {
            if !position.funding_due(rate.effective_at) {
                continue;
            }
            let payment = position
                .funding_payment(rate.mark_price, rate.rate)
                .ok_or_else(|| failure(format!("payment overflow for {}", position.account_id)))?;
            let margin = position
                .margin
                .checked_sub(payment)
                .ok_or_else(|| failure(format!("margin overflow for {}", position.account_id)))?;
            staged.push((position.account_id, payment, margin));
        }

        let mut summary = FundingSummary::default();
        for (account_id, payment, margin) in staged {
            if let Some(position) = self.positions.get_mut(&account_id) {
                position.margin = margin;
                position.funding_paid = position.funding_paid.add(payment);
                position.last_funding_applied = Some(rate.effective_at);
                position.updated_at = rate.effective_at;
            }
            summary.positions_funded += 1;
            if payment.is_negative() {
                summary.total_received = summary.total_received.add(payment.abs());
            } else {
                summary.total_paid = summary.total_paid.add(payment);
            }
        }

        info!(
            instrument = %self.instrument_id,
            rate = %rate.rate,
            effective_at = %rate.effective_at,
            positions = summary.positions_funded,
            paid = %summary.total_paid,
            received = %summary.total_received,
            "funding applied"
        );
        Ok(summary)
    }

    pub fn margin_ratio(&self, account_id: AccountId, mark_price: Price) -> Result<Decimal, EngineError> {
        self.require(account_id)
            .map(|position| position.margin_ratio(mark_price))
    }

    /// Err(MarginBreach) when the position sits below maintenance.
    pub fn check_margin(&self, account_id: AccountId, mark_price: Price, at: Timestamp) -> Result<(), EngineError> {
        let position = self.require(account_id)?;
        match self.evaluate(position, mark_price, at) {
            Some(alert) => Err(alert.into_error()),
            None => Ok(()),
        }
    }

    /// Alert for one account if its position sits below maintenance.
    pub fn margin_alert(&self, account_id: AccountId, mark_price: Price, at: Timestamp) -> Option<MarginAlert> {
        self.positions
            .get(&account_id)
            .and_then(|p| self.evaluate(p, mark_price, at))
    }

    /// Every open position currently below maintenance.
    pub fn at_risk(&self, mark_price: Price, at: Timestamp) -> Vec<MarginAlert> {
        let mut alerts: Vec<MarginAlert> = self
            .open_positions()
            .filter_map(|p| self.evaluate(p, mark_price, at))
            .collect();
        alerts.sort_by_key(|a| a.account_id);
        alerts
    }

    pub fn deposit_margin(&mut self, account_id: AccountId, amount: Amount, at: Timestamp) -> Result<Amount, EngineError> {
        if amount.value() <= Decimal::ZERO {
            return Err(EngineError::invalid_order("deposit must be positive"));
        }
        let instrument_id = self.instrument_id;
        let position = self
            .positions
            .entry(account_id)
            .or_insert_with(|| Position::new(account_id, instrument_id, at));
        position.margin = position.margin.add(amount);
        position.updated_at = at;

        debug!(account = %account_id, instrument = %instrument_id, %amount, margin = %position.margin, "margin deposited");
        Ok(position.margin)
    }

    /// Withdraw margin unless the remaining equity would fall below initial margin.
    pub fn withdraw_margin(
        &mut self,
        account_id: AccountId,
        amount: Amount,
        mark_price: Price,
        at: Timestamp,
    ) -> Result<Amount, EngineError> {
        if amount.value() <= Decimal::ZERO {
            return Err(EngineError::invalid_order("withdrawal must be positive"));
        }
        let instrument_id = self.instrument_id;
        let params = self.margin_params.clone();
        let position = self
            .positions
            .get_mut(&account_id)
            .ok_or(EngineError::PositionNotFound {
                account: account_id,
                instrument: instrument_id,
            })?;
        if amount > position.margin {
            return Err(EngineError::invalid_order(format!(
                "withdrawal {} exceeds margin {}",
                amount, position.margin
            )));
        }

        let requirement = calculate_margin_requirement(position.net_size, mark_price, &params);
        let equity_after = position.equity(mark_price).sub(amount);
        if !position.is_flat() && equity_after < requirement.initial {
            let notional = position.notional_value(mark_price);
            return Err(EngineError::MarginBreach {
                account: account_id,
                instrument: instrument_id,
                margin_ratio: equity_after.value() / notional.value(),
                maintenance: maintenance_fraction(notional, &params),
            });
        }

        position.margin = position.margin.sub(amount);
        position.updated_at = at;
        debug!(account = %account_id, instrument = %instrument_id, %amount, margin = %position.margin, "margin withdrawn");
        Ok(position.margin)
    }

    fn require(&self, account_id: AccountId) -> Result<&Position, EngineError> {
        self.positions
            .get(&account_id)
            .ok_or(EngineError::PositionNotFound {
                account: account_id,
                instrument: self.instrument_id,
            })
    }

    fn evaluate(&self, position: &Position, mark_price: Price, at: Timestamp) -> Option<MarginAlert> {
        if position.is_flat() || self.exempt.contains(&position.account_id) {
            return None;
        }
        let notional = position.notional_value(mark_price);
        let maintenance = maintenance_fraction(notional, &self.margin_params);
        let ratio = position.margin_ratio(mark_price);
        if ratio >= maintenance {
            return None;
        }
        Some(MarginAlert {
            account_id: position.account_id,
            instrument_id: self.instrument_id,
            margin_ratio: ratio,
            maintenance,
            equity: position.equity(mark_price),
            notional,
            detected_at: at,
        })
    }
}
