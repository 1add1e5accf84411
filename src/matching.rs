//! Price-time priority matching against a single [`OrderBook`].
//!
//! Matching is synchronous and never partially applies: every check that can
//! reject the order (structure, duplicate id, self trade) runs before the book
//! is touched. Fills execute at the resting order's price.

use crate::error::EngineError;
use crate::order::{Order, OrderBook, OrderType};
use crate::trade::{Trade, TradeOrigin};
use crate::types::{AccountId, Price, Timestamp, TradeId};
use rust_decimal::Decimal;

/// Result of matching an incoming order against the book
#[derive(Debug, Clone)]
pub struct MatchResult {
    /// Final state of the incoming order.
    pub taker: Order,
    pub trades: Vec<Trade>,
    /// Limit remainder that now rests on the book.
    pub rested: Option<Order>,
    /// Market remainder that found no liquidity and was dropped.
    pub unfilled: Decimal,
}

impl MatchResult {
    pub fn filled_size(&self) -> Decimal {
        self.trades.iter().map(|t| t.size).sum()
    }
}

/// A fill the walk would produce, worked out without touching the book.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlannedFill {
    pub maker_account: AccountId,
    pub price: Price,
    pub size: Decimal,
}

/// The fills `order` would take from the book as it stands, in match order.
pub fn preview_fills(book: &OrderBook, order: &Order) -> Vec<PlannedFill> {
    let mut remaining = order.remaining_size;
    let mut fills = Vec::new();

    for resting in book.queue(order.side.opposite()) {
        if remaining <= Decimal::ZERO {
            break;
        }
        let Some(price) = resting.price else {
            break;
        };
        if !order.crosses(price) {
            break;
        }
        let size = remaining.min(resting.remaining_size);
        fills.push(PlannedFill {
            maker_account: resting.account_id,
            price,
            size,
        });
        remaining -= size;
    }

    fills
}

/// Walk the resting orders `order` would consume and refuse if any of them
/// belongs to the same account.
pub fn check_self_trade(book: &OrderBook, order: &Order) -> Result<(), EngineError> {
    let mut remaining = order.remaining_size;

    for resting in book.queue(order.side.opposite()) {
        if remaining <= Decimal::ZERO {
            break;
        }
        let Some(resting_price) = resting.price else {
            break;
        };
        if !order.crosses(resting_price) {
            break;
        }
        if resting.account_id == order.account_id {
            return Err(EngineError::SelfTradePrevention {
                account: order.account_id,
                resting_order: resting.id,
            });
        }
        remaining -= remaining.min(resting.remaining_size);
    }

    Ok(())
}

/// Match an incoming order against the order book.
///
/// Limit remainders are inserted as resting orders; market remainders are
/// discarded and reported through [`MatchResult::unfilled`].
pub fn match_order(
    book: &mut OrderBook,
    mut order: Order,
    now: Timestamp,
    mut next_trade_id: impl FnMut() -> TradeId,
) -> Result<MatchResult, EngineError> {
    order.validate()?;
    if order.instrument_id != book.instrument_id {
        return Err(EngineError::invalid_order(format!(
            "order for {} sent to book {}",
            order.instrument_id, book.instrument_id
        )));
    }
    if book.get(order.id).is_some() {
        return Err(EngineError::invalid_order(format!(
            "duplicate order id {:?}",
            order.id
        )));
    }
    check_self_trade(book, &order)?;

    let mut trades = Vec::new();
    let opposite = order.side.opposite();

    while !order.is_filled() {
        let Some(resting) = book.best_mut(opposite) else {
            break; // No liquidity
        };
        let Some(resting_price) = resting.price else {
            break;
        };
        if !order.crosses(resting_price) {
            break; // Price doesn't cross
        }

        let fill_size = order.remaining_size.min(resting.remaining_size);
        resting.fill(fill_size);
        order.fill(fill_size);

        // fill at the resting order's price
        trades.push(Trade {
            id: next_trade_id(),
            instrument_id: order.instrument_id,
            origin: TradeOrigin::Book {
                maker_order_id: resting.id,
                taker_order_id: order.id,
            },
            maker_account: resting.account_id,
            taker_account: order.account_id,
            taker_side: order.side,
            price: resting_price,
            size: fill_size,
            timestamp: now,
        });

        if resting.is_filled() {
            let resting_id = resting.id;
            book.remove(resting_id)?;
        }
    }

    let mut rested = None;
    let mut unfilled = Decimal::ZERO;

    if !order.is_filled() {
        match order.order_type {
            OrderType::Limit => {
                book.insert(order.clone())?;
                rested = book.get(order.id).cloned();
                if let Some(resting) = &rested {
                    order = resting.clone();
                }
            }
            OrderType::Market => {
                unfilled = order.remaining_size;
                order.cancel();
            }
        }
    }

    Ok(MatchResult {
        taker: order,
        trades,
        rested,
        unfilled,
    })
}
