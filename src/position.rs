// 4.0: open position tracking. pnl = size * (mark - entry).
// 4.1 has increase/reduce/flip logic in Position::apply_fill.

use crate::error::EngineError;
use crate::margin::{margin_ratio, notional_value};
use crate::types::{AccountId, Amount, InstrumentId, Price, Side, SignedSize, Timestamp};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Position {
    pub account_id: AccountId,
    pub instrument_id: InstrumentId,
    pub net_size: SignedSize,
    /// Volume weighted entry. None while flat.
    pub entry_price: Option<Price>,
    /// Isolated collateral backing this position. Realized pnl and funding land here.
    pub margin: Amount,
    pub realized_pnl: Amount,
    pub funding_paid: Amount,
    /// Start of the last funding interval applied to this position.
    pub last_funding_applied: Option<Timestamp>,
    pub updated_at: Timestamp,
}

/// What a single fill did to a position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FillEffect {
    pub closed_size: Decimal,
    pub realized_pnl: Amount,
    pub flipped: bool,
}

impl Position {
    pub fn new(account_id: AccountId, instrument_id: InstrumentId, timestamp: Timestamp) -> Self {
        Self {
            account_id,
            instrument_id,
            net_size: SignedSize::zero(),
            entry_price: None,
            margin: Amount::zero(),
            realized_pnl: Amount::zero(),
            funding_paid: Amount::zero(),
            last_funding_applied: None,
            updated_at: timestamp,
        }
    }

    pub fn is_flat(&self) -> bool {
        self.net_size.is_zero()
    }

    pub fn side(&self) -> Option<Side> {
        self.net_size.side()
    }

    // 4.1: grow, reduce, close or flip. realized pnl is credited to margin.
    // every value is computed before the first write; on overflow nothing changes.
    pub fn apply_fill(&mut self, side: Side, size: Decimal, price: Price, at: Timestamp) -> Result<FillEffect, EngineError> {
        if size <= Decimal::ZERO {
            return Err(EngineError::invalid_order(format!("fill size must be positive, got {size}")));
        }
        let overflow = || EngineError::invalid_order(format!("fill of {size} at {price} overflows the position"));

        let old_size = self.net_size.value();
        let delta = side.sign() * size;
        let new_size = old_size.checked_add(delta).ok_or_else(overflow)?;

        let same_direction = self.net_size.is_zero() || self.net_size.side() == Some(side);
        if same_direction {
            let added = size.checked_mul(price.value()).ok_or_else(overflow)?;
            let weighted = match self.entry_price {
                Some(entry) => old_size
                    .abs()
                    .checked_mul(entry.value())
                    .and_then(|held| held.checked_add(added))
                    .ok_or_else(overflow)?,
                None => added,
            };
            let entry = weighted.checked_div(new_size.abs()).ok_or_else(overflow)?;
            self.entry_price = Price::new(entry);
            self.net_size = SignedSize::new(new_size);
            self.updated_at = at;
            return Ok(FillEffect {
                closed_size: Decimal::ZERO,
                realized_pnl: Amount::zero(),
                flipped: false,
            });
        }

        let closed_size = size.min(old_size.abs());
        let realized = match self.entry_price {
            Some(entry) => {
                let closed = if old_size.is_sign_negative() { -closed_size } else { closed_size };
                checked_realized_pnl(closed, entry, price).ok_or_else(overflow)?
            }
            None => Amount::zero(),
        };
        let margin = self.margin.checked_add(realized).ok_or_else(overflow)?;
        let realized_total = self.realized_pnl.checked_add(realized).ok_or_else(overflow)?;

        self.margin = margin;
        self.realized_pnl = realized_total;
        self.net_size = SignedSize::new(new_size);
        self.updated_at = at;

        let flipped = size > old_size.abs();
        if new_size.is_zero() {
            self.entry_price = None;
        } else if flipped {
            // residual opposite size starts fresh at the fill price
            self.entry_price = Some(price);
        }

        Ok(FillEffect {
            closed_size,
            realized_pnl: realized,
            flipped,
        })
    }

    // paper gains/losses based on current price
    pub fn unrealized_pnl(&self, mark_price: Price) -> Amount {
        match self.entry_price {
            Some(entry) => calculate_unrealized_pnl(self.net_size, entry, mark_price),
            None => Amount::zero(),
        }
    }

    // 4.2: margin + pnl. this vs maintenance decides whether we flag the position
    pub fn equity(&self, mark_price: Price) -> Amount {
        self.margin.add(self.unrealized_pnl(mark_price))
    }

    pub fn notional_value(&self, mark_price: Price) -> Amount {
        notional_value(self.net_size, mark_price)
    }

    pub fn margin_ratio(&self, mark_price: Price) -> Decimal {
        margin_ratio(self.equity(mark_price), self.notional_value(mark_price))
    }

    /// Funding owed for one interval. Positive means the position pays.
    /// None on arithmetic overflow.
    pub fn funding_payment(&self, mark_price: Price, rate: Decimal) -> Option<Amount> {
        self.net_size
            .value()
            .checked_mul(mark_price.value())?
            .checked_mul(rate)
            .map(Amount::new)
    }

    pub fn funding_due(&self, interval_start: Timestamp) -> bool {
        !self.is_flat() && self.last_funding_applied.map_or(true, |last| last < interval_start)
    }
}

// 4.3: the pnl formula. size * (mark - entry)
pub fn calculate_unrealized_pnl(size: SignedSize, entry_price: Price, mark_price: Price) -> Amount {
    Amount::new(size.value() * (mark_price.value() - entry_price.value()))
}

// closing leg: closed size signed like the position it came from
fn checked_realized_pnl(close_size: Decimal, entry_price: Price, exit_price: Price) -> Option<Amount> {
    exit_price
        .value()
        .checked_sub(entry_price.value())?
        .checked_mul(close_size)
        .map(Amount::new)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn px(v: Decimal) -> Price {
        Price::new_unchecked(v)
    }

    fn ts(ms: i64) -> Timestamp {
        Timestamp::from_millis(ms)
    }

    fn long_one_at_50k() -> Position {
        let mut pos = Position::new(AccountId(1), InstrumentId(1), ts(0));
        pos.margin = Amount::new(dec!(5000));
        pos.apply_fill(Side::Buy, dec!(1), px(dec!(50000)), ts(0)).unwrap();
        pos
    }

    #[test]
    fn unrealized_pnl_long_and_short() {
        let pos = long_one_at_50k();
        assert_eq!(pos.unrealized_pnl(px(dec!(52000))).value(), dec!(2000));
        assert_eq!(pos.unrealized_pnl(px(dec!(48000))).value(), dec!(-2000));

        let mut short = Position::new(AccountId(1), InstrumentId(1), ts(0));
        short.apply_fill(Side::Sell, dec!(1), px(dec!(50000)), ts(0)).unwrap();
        assert_eq!(short.unrealized_pnl(px(dec!(48000))).value(), dec!(2000));
    }

    #[test]
    fn equity_includes_margin() {
        let pos = long_one_at_50k();
        assert_eq!(pos.equity(px(dec!(52000))).value(), dec!(7000));
    }

    #[test]
    fn increase_averages_entry() {
        let mut pos = long_one_at_50k();
        let effect = pos.apply_fill(Side::Buy, dec!(1), px(dec!(52000)), ts(1000)).unwrap();

        assert_eq!(effect.closed_size, Decimal::ZERO);
        assert_eq!(pos.net_size.value(), dec!(2));
        // (1 * 50000 + 1 * 52000) / 2
        assert_eq!(pos.entry_price.unwrap().value(), dec!(51000));
        assert_eq!(pos.updated_at, ts(1000));
    }

    #[test]
    fn partial_reduce_books_pnl_and_keeps_entry() {
        let mut pos = Position::new(AccountId(1), InstrumentId(1), ts(0));
        pos.apply_fill(Side::Buy, dec!(2), px(dec!(50000)), ts(0)).unwrap();

        let effect = pos.apply_fill(Side::Sell, dec!(1), px(dec!(52000)), ts(1)).unwrap();

        assert_eq!(effect.closed_size, dec!(1));
        assert_eq!(effect.realized_pnl.value(), dec!(2000));
        assert_eq!(pos.net_size.value(), dec!(1));
        assert_eq!(pos.entry_price.unwrap().value(), dec!(50000));
        assert_eq!(pos.margin.value(), dec!(2000));
    }

    #[test]
    fn full_close_goes_flat() {
        let mut pos = long_one_at_50k();
        let effect = pos.apply_fill(Side::Sell, dec!(1), px(dec!(51000)), ts(1)).unwrap();

        assert!(pos.is_flat());
        assert!(pos.entry_price.is_none());
        assert_eq!(effect.realized_pnl.value(), dec!(1000));
        assert_eq!(pos.margin.value(), dec!(6000));
        assert!(!effect.flipped);
    }

    #[test]
    fn short_close_realizes_inverted_pnl() {
        let mut pos = Position::new(AccountId(1), InstrumentId(1), ts(0));
        pos.apply_fill(Side::Sell, dec!(3), px(dec!(100)), ts(0)).unwrap();
        let effect = pos.apply_fill(Side::Buy, dec!(3), px(dec!(90)), ts(1)).unwrap();
        // short 3 from 100 to 90 earns 30
        assert_eq!(effect.realized_pnl.value(), dec!(30));
    }

    #[test]
    fn flip_resets_entry_to_fill_price() {
        let mut pos = long_one_at_50k();
        let effect = pos.apply_fill(Side::Sell, dec!(3), px(dec!(51000)), ts(1)).unwrap();

        assert!(effect.flipped);
        assert_eq!(effect.closed_size, dec!(1));
        assert_eq!(effect.realized_pnl.value(), dec!(1000));
        assert_eq!(pos.net_size.value(), dec!(-2));
        assert_eq!(pos.entry_price.unwrap().value(), dec!(51000));
    }

    #[test]
    fn funding_payment_sign() {
        let pos = long_one_at_50k();
        let pay = pos.funding_payment(px(dec!(50000)), dec!(0.001)).unwrap();
        assert_eq!(pay.value(), dec!(50)); // long pays on positive rate

        let mut short = Position::new(AccountId(2), InstrumentId(1), ts(0));
        short.apply_fill(Side::Sell, dec!(1), px(dec!(50000)), ts(0)).unwrap();
        let recv = short.funding_payment(px(dec!(50000)), dec!(0.001)).unwrap();
        assert_eq!(recv.value(), dec!(-50));
    }

    #[test]
    fn funding_due_respects_last_applied() {
        let mut pos = long_one_at_50k();
        assert!(pos.funding_due(ts(100)));
        pos.last_funding_applied = Some(ts(100));
        assert!(!pos.funding_due(ts(100)));
        assert!(!pos.funding_due(ts(50)));
        assert!(pos.funding_due(ts(200)));

        let flat = Position::new(AccountId(1), InstrumentId(1), ts(0));
        assert!(!flat.funding_due(ts(100)));
    }

    #[test]
    fn margin_ratio_of_position() {
        let pos = long_one_at_50k();
        // 5000 margin on 50000 notional
        assert_eq!(pos.margin_ratio(px(dec!(50000))), dec!(0.1));
    }

    #[test]
    fn overflowing_fill_leaves_position_unchanged() {
        let mut pos = long_one_at_50k();
        let before = pos.clone();

        let err = pos.apply_fill(Side::Buy, Decimal::MAX, px(dec!(2)), ts(5)).unwrap_err();

        assert!(matches!(err, EngineError::InvalidOrder { .. }));
        assert_eq!(pos, before);
    }

    #[test]
    fn short_partial_close_keeps_sign() {
        let mut pos = Position::new(AccountId(1), InstrumentId(1), ts(0));
        pos.apply_fill(Side::Sell, dec!(4), px(dec!(100)), ts(0)).unwrap();
        let effect = pos.apply_fill(Side::Buy, dec!(1), px(dec!(110)), ts(1)).unwrap();
        // short loses 10 on the closed unit
        assert_eq!(effect.realized_pnl.value(), dec!(-10));
        assert_eq!(pos.net_size.value(), dec!(-3));
    }
}
