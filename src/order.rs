//! Order types and the per-instrument order book.
//!
//! Both sides are kept best-first: bids by price descending, asks by price
//! ascending, and within a price level strictly by arrival sequence. The book
//! never matches on its own; see [`crate::matching`].

use crate::error::EngineError;
use crate::types::{AccountId, InstrumentId, OrderId, Price, Side, Timestamp};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};

/// Order type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderType {
    /// Limit order with specified price. Remainder rests on the book.
    Limit,
    /// Market order. Crosses unconditionally, remainder is discarded.
    Market,
}

/// Order lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Open,
    PartiallyFilled,
    Filled,
    Cancelled,
}

impl OrderStatus {
    pub fn is_live(&self) -> bool {
        matches!(self, OrderStatus::Open | OrderStatus::PartiallyFilled)
    }
}

/// A trading order
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub account_id: AccountId,
    pub instrument_id: InstrumentId,
    pub side: Side,
    pub order_type: OrderType,
    pub size: Decimal,
    pub remaining_size: Decimal,
    pub price: Option<Price>,
    pub status: OrderStatus,
    /// Arrival sequence inside the book. Assigned on insert.
    pub sequence: u64,
    pub created_at: Timestamp,
}

impl Order {
    pub fn new_limit(
        id: OrderId,
        account_id: AccountId,
        instrument_id: InstrumentId,
        side: Side,
        size: Decimal,
        price: Price,
        timestamp: Timestamp,
    ) -> Self {
        Self {
            id,
            account_id,
            instrument_id,
            side,
            order_type: OrderType::Limit,
            size,
            remaining_size: size,
            price: Some(price),
            status: OrderStatus::Open,
            sequence: 0,
            created_at: timestamp,
        }
    }

    pub fn new_market(
        id: OrderId,
        account_id: AccountId,
        instrument_id: InstrumentId,
        side: Side,
        size: Decimal,
        timestamp: Timestamp,
    ) -> Self {
        Self {
            id,
            account_id,
            instrument_id,
            side,
            order_type: OrderType::Market,
            size,
            remaining_size: size,
            price: None,
            status: OrderStatus::Open,
            sequence: 0,
            created_at: timestamp,
        }
    }

    /// Structural checks: positive size and price, price present iff limit.
    pub fn validate(&self) -> Result<(), EngineError> {
        if self.size <= Decimal::ZERO {
            return Err(EngineError::invalid_order(format!(
                "size must be positive, got {}",
                self.size
            )));
        }
        if self.remaining_size <= Decimal::ZERO || self.remaining_size > self.size {
            return Err(EngineError::invalid_order(format!(
                "remaining size {} outside (0, {}]",
                self.remaining_size, self.size
            )));
        }
        if let Some(price) = self.price {
            if price.value() <= Decimal::ZERO {
                return Err(EngineError::invalid_order(format!("price must be positive, got {price}")));
            }
        }
        match (self.order_type, self.price) {
            (OrderType::Limit, None) => Err(EngineError::invalid_order("limit order without price")),
            (OrderType::Market, Some(_)) => Err(EngineError::invalid_order("market order with price")),
            _ => Ok(()),
        }
    }

    pub fn is_filled(&self) -> bool {
        self.remaining_size.is_zero()
    }

    pub fn filled_size(&self) -> Decimal {
        self.size - self.remaining_size
    }

    /// Would this order trade against a resting order at `resting`?
    pub fn crosses(&self, resting: Price) -> bool {
        match (self.side, self.price) {
            (_, None) => true,
            (Side::Buy, Some(limit)) => limit >= resting,
            (Side::Sell, Some(limit)) => limit <= resting,
        }
    }

    pub fn fill(&mut self, size: Decimal) {
        debug_assert!(size <= self.remaining_size, "cannot fill more than remaining");
        self.remaining_size -= size;
        self.status = if self.remaining_size.is_zero() {
            OrderStatus::Filled
        } else {
            OrderStatus::PartiallyFilled
        };
    }

    pub fn cancel(&mut self) {
        self.status = OrderStatus::Cancelled;
    }
}

/// Priority key. Ordered best-first for its own side, then by arrival.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct OrderKey {
    side: Side,
    price: Price,
    sequence: u64,
}

impl OrderKey {
    fn new(side: Side, price: Price, sequence: u64) -> Self {
        Self {
            side,
            price,
            sequence,
        }
    }
}

impl PartialOrd for OrderKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for OrderKey {
    fn cmp(&self, other: &Self) -> Ordering {
        // a key only ever meets keys from the same side
        let by_price = match self.side {
            Side::Buy => other.price.cmp(&self.price),
            Side::Sell => self.price.cmp(&other.price),
        };
        by_price.then(self.sequence.cmp(&other.sequence))
    }
}

/// A single price level in the order book
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceLevel {
    pub price: Price,
    pub total_size: Decimal,
    pub order_count: usize,
}

/// Central Limit Order Book (CLOB)
#[derive(Debug, Clone)]
pub struct OrderBook {
    pub instrument_id: InstrumentId,
    bids: BTreeMap<OrderKey, Order>,
    asks: BTreeMap<OrderKey, Order>,
    order_index: HashMap<OrderId, OrderKey>,
    next_sequence: u64,
}

impl OrderBook {
    pub fn new(instrument_id: InstrumentId) -> Self {
        Self {
            instrument_id,
            bids: BTreeMap::new(),
            asks: BTreeMap::new(),
            order_index: HashMap::new(),
            next_sequence: 1,
        }
    }

    fn side(&self, side: Side) -> &BTreeMap<OrderKey, Order> {
        match side {
            Side::Buy => &self.bids,
            Side::Sell => &self.asks,
        }
    }

    fn side_mut(&mut self, side: Side) -> &mut BTreeMap<OrderKey, Order> {
        match side {
            Side::Buy => &mut self.bids,
            Side::Sell => &mut self.asks,
        }
    }

    /// Get the best bid price (highest buy order)
    pub fn best_bid(&self) -> Option<Price> {
        self.bids.first_key_value().map(|(k, _)| k.price)
    }

    /// Get the best ask price (lowest sell order)
    pub fn best_ask(&self) -> Option<Price> {
        self.asks.first_key_value().map(|(k, _)| k.price)
    }

    /// Get the mid price (average of best bid and ask)
    pub fn mid_price(&self) -> Option<Price> {
        match (self.best_bid(), self.best_ask()) {
            (Some(bid), Some(ask)) => Price::new((bid.value() + ask.value()) / Decimal::TWO),
            _ => None,
        }
    }

    /// Get the spread between best bid and ask
    pub fn spread(&self) -> Option<Decimal> {
        match (self.best_bid(), self.best_ask()) {
            (Some(bid), Some(ask)) => Some(ask.value() - bid.value()),
            _ => None,
        }
    }

    /// Rest a limit order. It joins the back of its price level.
    pub fn insert(&mut self, mut order: Order) -> Result<(), EngineError> {
        if order.instrument_id != self.instrument_id {
            return Err(EngineError::invalid_order(format!(
                "order for {} sent to book {}",
                order.instrument_id, self.instrument_id
            )));
        }
        if order.order_type == OrderType::Market {
            return Err(EngineError::invalid_order("market orders never rest"));
        }
        order.validate()?;
        if self.order_index.contains_key(&order.id) {
            return Err(EngineError::invalid_order(format!(
                "duplicate order id {:?}",
                order.id
            )));
        }
        let Some(price) = order.price else {
            return Err(EngineError::invalid_order("limit order without price"));
        };

        order.sequence = self.next_sequence;
        self.next_sequence += 1;
        order.status = if order.remaining_size < order.size {
            OrderStatus::PartiallyFilled
        } else {
            OrderStatus::Open
        };

        let key = OrderKey::new(order.side, price, order.sequence);
        self.order_index.insert(order.id, key);
        self.side_mut(order.side).insert(key, order);
        Ok(())
    }

    /// Remove an order from the book by ID
    pub fn remove(&mut self, order_id: OrderId) -> Result<Order, EngineError> {
        let key = self
            .order_index
            .remove(&order_id)
            .ok_or(EngineError::OrderNotFound(order_id))?;
        self.side_mut(key.side)
            .remove(&key)
            .ok_or(EngineError::OrderNotFound(order_id))
    }

    /// Get an order by ID
    pub fn get(&self, order_id: OrderId) -> Option<&Order> {
        let key = self.order_index.get(&order_id)?;
        self.side(key.side).get(key)
    }

    /// Best resting order on `side`, mutable so matching can fill it in place.
    pub(crate) fn best_mut(&mut self, side: Side) -> Option<&mut Order> {
        self.side_mut(side).first_entry().map(|e| e.into_mut())
    }

    /// Resting orders on `side` in the order they would be matched.
    pub fn queue(&self, side: Side) -> impl Iterator<Item = &Order> {
        self.side(side).values()
    }

    /// Total resting size at exactly `price`, across both sides.
    pub fn depth_at(&self, price: Price) -> Decimal {
        [Side::Buy, Side::Sell]
            .into_iter()
            .map(|side| {
                let lo = OrderKey::new(side, price, 0);
                let hi = OrderKey::new(side, price, u64::MAX);
                self.side(side)
                    .range(lo..=hi)
                    .map(|(_, o)| o.remaining_size)
                    .sum::<Decimal>()
            })
            .sum()
    }

    fn levels(&self, side: Side, max_levels: usize) -> Vec<PriceLevel> {
        let mut levels: Vec<PriceLevel> = Vec::new();

        for (key, order) in self.side(side) {
            if levels.last().map(|l| l.price) != Some(key.price) {
                if levels.len() >= max_levels {
                    break;
                }
                levels.push(PriceLevel {
                    price: key.price,
                    total_size: Decimal::ZERO,
                    order_count: 0,
                });
            }
            if let Some(level) = levels.last_mut() {
                level.total_size += order.remaining_size;
                level.order_count += 1;
            }
        }

        levels
    }

    /// Get bid depth at each price level, best first
    pub fn bid_levels(&self, max_levels: usize) -> Vec<PriceLevel> {
        self.levels(Side::Buy, max_levels)
    }

    /// Get ask depth at each price level, best first
    pub fn ask_levels(&self, max_levels: usize) -> Vec<PriceLevel> {
        self.levels(Side::Sell, max_levels)
    }

    pub fn orders_for(&self, account_id: AccountId) -> Vec<&Order> {
        self.bids
            .values()
            .chain(self.asks.values())
            .filter(|o| o.account_id == account_id)
            .collect()
    }

    /// Check if the book is crossed (best bid >= best ask)
    pub fn is_crossed(&self) -> bool {
        match (self.best_bid(), self.best_ask()) {
            (Some(bid), Some(ask)) => bid >= ask,
            _ => false,
        }
    }

    /// Total number of orders in the book
    pub fn order_count(&self) -> usize {
        self.bids.len() + self.asks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bids.is_empty() && self.asks.is_empty()
    }
}
