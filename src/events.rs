// 11.0: every state change produces an event. used for audit trails and
// notifying external systems. the EventPayload enum lists all event types.
// the log is bounded: oldest events are dropped once max_events is reached.

use crate::funding::FundingRate;
use crate::rfq::QuoteSource;
use crate::types::{AccountId, Amount, InstrumentId, OrderId, Price, QuoteId, Side, Timestamp, TradeId};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EventId(pub u64);

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub id: EventId,
    pub timestamp: Timestamp,
    pub payload: EventPayload,
}

impl Event {
    pub fn new(id: EventId, timestamp: Timestamp, payload: EventPayload) -> Self {
        Self {
            id,
            timestamp,
            payload,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventPayload {
    // Book events
    OrderPlaced(OrderPlacedEvent),
    OrderCancelled(OrderCancelledEvent),
    OrderRejected(OrderRejectedEvent),
    TradeExecuted(TradeExecutedEvent),

    // Ledger events
    FundingApplied(FundingAppliedEvent),
    MarginBreach(MarginBreachEvent),
    MarginDeposited(MarginEvent),
    MarginWithdrawn(MarginEvent),

    // RFQ events
    QuoteIssued(QuoteIssuedEvent),
    QuoteAccepted(QuoteAcceptedEvent),
    QuoteRejected(QuoteRejectedEvent),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderPlacedEvent {
    pub instrument_id: InstrumentId,
    pub order_id: OrderId,
    pub account_id: AccountId,
    pub side: Side,
    pub size: Decimal,
    pub price: Option<Price>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderCancelledEvent {
    pub instrument_id: InstrumentId,
    pub order_id: OrderId,
    pub account_id: AccountId,
    pub remaining_size: Decimal,
    pub reason: CancelReason,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CancelReason {
    UserRequested,
    /// Market order remainder with nothing left to match.
    NoLiquidity,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderRejectedEvent {
    pub instrument_id: InstrumentId,
    pub account_id: AccountId,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeExecutedEvent {
    pub instrument_id: InstrumentId,
    pub trade_id: TradeId,
    pub maker_account: AccountId,
    pub taker_account: AccountId,
    pub taker_side: Side,
    pub price: Price,
    pub size: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FundingAppliedEvent {
    pub rate: FundingRate,
    pub positions_funded: usize,
    pub total_paid: Amount,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarginBreachEvent {
    pub instrument_id: InstrumentId,
    pub account_id: AccountId,
    pub margin_ratio: Decimal,
    pub maintenance: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarginEvent {
    pub instrument_id: InstrumentId,
    pub account_id: AccountId,
    pub amount: Amount,
    pub new_margin: Amount,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuoteIssuedEvent {
    pub quote_id: QuoteId,
    pub instrument_id: InstrumentId,
    pub requester: AccountId,
    pub side: Side,
    pub size: Decimal,
    pub price: Price,
    pub source: QuoteSource,
    pub expires_at: Timestamp,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuoteAcceptedEvent {
    pub quote_id: QuoteId,
    pub trade_id: TradeId,
    pub instrument_id: InstrumentId,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuoteRejectedEvent {
    pub quote_id: QuoteId,
    pub reason: String,
}

/// Bounded in-memory audit log.
#[derive(Debug, Clone)]
pub struct EventLog {
    events: VecDeque<Event>,
    max_events: usize,
    next_id: u64,
}

impl EventLog {
    pub fn new(max_events: usize) -> Self {
        Self {
            events: VecDeque::new(),
            max_events,
            next_id: 1,
        }
    }

    pub fn emit(&mut self, timestamp: Timestamp, payload: EventPayload) -> EventId {
        let id = EventId(self.next_id);
        self.next_id += 1;

        if self.max_events == 0 {
            return id;
        }
        while self.events.len() >= self.max_events {
            self.events.pop_front();
        }
        self.events.push_back(Event::new(id, timestamp, payload));
        id
    }

    pub fn recent(&self, count: usize) -> Vec<Event> {
        let start = self.events.len().saturating_sub(count);
        self.events.iter().skip(start).cloned().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Event> {
        self.events.iter()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rejected(reason: &str) -> EventPayload {
        EventPayload::QuoteRejected(QuoteRejectedEvent {
            quote_id: QuoteId(1),
            reason: reason.to_string(),
        })
    }

    #[test]
    fn ids_are_sequential() {
        let mut log = EventLog::new(10);
        let a = log.emit(Timestamp::from_millis(1), rejected("a"));
        let b = log.emit(Timestamp::from_millis(2), rejected("b"));
        assert_eq!(a, EventId(1));
        assert_eq!(b, EventId(2));
        assert_eq!(log.len(), 2);
    }

    #[test]
    fn oldest_events_dropped_at_capacity() {
        let mut log = EventLog::new(2);
        for i in 0..5 {
            log.emit(Timestamp::from_millis(i), rejected("x"));
        }
        assert_eq!(log.len(), 2);
        let ids: Vec<EventId> = log.iter().map(|e| e.id).collect();
        assert_eq!(ids, vec![EventId(4), EventId(5)]);
        assert_eq!(log.recent(1)[0].id, EventId(5));
    }

    #[test]
    fn payload_serializes_with_type_tag() {
        let json = serde_json::to_string(&rejected("expired")).unwrap();
        assert!(json.contains("\"type\":\"quote_rejected\""));
    }
}
