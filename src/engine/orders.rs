//! Order submission and cancellation.
//!
//! Submission runs entirely under the instrument lock: instrument rules,
//! self-trade check, a dry run of the fills against the ledger, matching,
//! and ledger application. Nothing is written until every check has passed.

use super::core::{Engine, Market};
use super::results::SubmitResult;
use crate::error::EngineError;
use crate::events::{
    CancelReason, EventPayload, OrderCancelledEvent, OrderPlacedEvent, OrderRejectedEvent,
    TradeExecutedEvent,
};
use crate::ledger::MarginAlert;
use crate::matching::{check_self_trade, match_order, preview_fills};
use crate::order::{Order, OrderType};
use crate::trade::Trade;
use crate::types::{AccountId, InstrumentId, OrderId, Price, Side, Timestamp, TradeId};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use tracing::{debug, info};

/// Order as submitted by a caller. Ids and timestamps are assigned by the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderRequest {
    pub account_id: AccountId,
    pub instrument_id: InstrumentId,
    pub side: Side,
    pub order_type: OrderType,
    pub size: Decimal,
    pub price: Option<Price>,
}

impl OrderRequest {
    pub fn limit(account_id: AccountId, instrument_id: InstrumentId, side: Side, size: Decimal, price: Price) -> Self {
        Self {
            account_id,
            instrument_id,
            side,
            order_type: OrderType::Limit,
            size,
            price: Some(price),
        }
    }

    pub fn market(account_id: AccountId, instrument_id: InstrumentId, side: Side, size: Decimal) -> Self {
        Self {
            account_id,
            instrument_id,
            side,
            order_type: OrderType::Market,
            size,
            price: None,
        }
    }

    fn into_order(self, id: OrderId, now: Timestamp) -> Result<Order, EngineError> {
        match (self.order_type, self.price) {
            (OrderType::Limit, Some(price)) => Ok(Order::new_limit(
                id,
                self.account_id,
                self.instrument_id,
                self.side,
                self.size,
                price,
                now,
            )),
            (OrderType::Limit, None) => Err(EngineError::invalid_order("limit order without price")),
            (OrderType::Market, None) => Ok(Order::new_market(
                id,
                self.account_id,
                self.instrument_id,
                self.side,
                self.size,
                now,
            )),
            (OrderType::Market, Some(_)) => Err(EngineError::invalid_order("market order with price")),
        }
    }
}

impl Engine {
    /// Submit an order to its instrument's book.
    ///
    /// Market remainders are dropped and surfaced through
    /// [`SubmitResult::check_liquidity`]; limit remainders rest.
    pub async fn submit(&self, request: OrderRequest) -> Result<SubmitResult, EngineError> {
        let instrument_id = request.instrument_id;
        let account_id = request.account_id;
        let handle = self.market(instrument_id)?;
        let mut market = handle.lock().await;
        let now = self.clock.now();

        match self.execute(&mut market, request, now) {
            Ok(result) => Ok(result),
            Err(err) => {
                debug!(account = %account_id, instrument = %instrument_id, error = %err, "order rejected");
                self.emit_event(
                    now,
                    EventPayload::OrderRejected(OrderRejectedEvent {
                        instrument_id,
                        account_id,
                        reason: err.to_string(),
                    }),
                );
                Err(err)
            }
        }
    }

    fn execute(&self, market: &mut Market, request: OrderRequest, now: Timestamp) -> Result<SubmitResult, EngineError> {
        market.spec.validate_size(request.size)?;
        if let Some(price) = request.price {
            market.spec.validate_price(price)?;
        }
        let order = request.into_order(OrderId(self.order_ids.next()), now)?;
        order.validate()?;
        let (order_id, side, size, price) = (order.id, order.side, order.size, order.price);

        // every position the walk would touch must absorb its fills before the book moves
        check_self_trade(&market.book, &order)?;
        let planned = preview_fills(&market.book, &order);
        market.ledger.check_fills(order.account_id, side, &planned, now)?;

        let matched = match_order(&mut market.book, order, now, || TradeId(self.trade_ids.next()))?;

        self.emit_event(
            now,
            EventPayload::OrderPlaced(OrderPlacedEvent {
                instrument_id: market.spec.id,
                order_id,
                account_id: matched.taker.account_id,
                side,
                size,
                price,
            }),
        );
        for trade in &matched.trades {
            // same legs as the dry run above, so this cannot fail
            market.ledger.apply_trade(trade)?;
            market.last_trade_price = Some(trade.price);
            self.emit_trade(trade);
        }
        if matched.unfilled > Decimal::ZERO {
            self.emit_event(
                now,
                EventPayload::OrderCancelled(OrderCancelledEvent {
                    instrument_id: market.spec.id,
                    order_id,
                    account_id: matched.taker.account_id,
                    remaining_size: matched.unfilled,
                    reason: CancelReason::NoLiquidity,
                }),
            );
        }

        let margin_alerts = self.check_touched(market, &matched.trades, now);

        info!(
            order_id = order_id.0,
            instrument = %market.spec.id,
            %side,
            %size,
            trades = matched.trades.len(),
            filled = %matched.filled_size(),
            unfilled = %matched.unfilled,
            rested = matched.rested.is_some(),
            "order processed"
        );

        Ok(SubmitResult {
            order: matched.taker,
            trades: matched.trades,
            remainder: matched.rested,
            unfilled: matched.unfilled,
            margin_alerts,
        })
    }

    pub async fn cancel(&self, instrument_id: InstrumentId, order_id: OrderId) -> Result<Order, EngineError> {
        let handle = self.market(instrument_id)?;
        let mut market = handle.lock().await;
        let mut order = market.book.remove(order_id)?;
        order.cancel();

        self.emit_event(
            self.clock.now(),
            EventPayload::OrderCancelled(OrderCancelledEvent {
                instrument_id,
                order_id,
                account_id: order.account_id,
                remaining_size: order.remaining_size,
                reason: CancelReason::UserRequested,
            }),
        );
        debug!(order_id = order_id.0, instrument = %instrument_id, "order cancelled");
        Ok(order)
    }

    pub async fn open_orders(&self, instrument_id: InstrumentId, account_id: AccountId) -> Result<Vec<Order>, EngineError> {
        let handle = self.market(instrument_id)?;
        let market = handle.lock().await;
        Ok(market.book.orders_for(account_id).into_iter().cloned().collect())
    }

    pub async fn book(&self, instrument_id: InstrumentId, levels: usize) -> Result<super::BookSnapshot, EngineError> {
        let handle = self.market(instrument_id)?;
        let market = handle.lock().await;
        Ok(super::BookSnapshot {
            instrument_id,
            bids: market.book.bid_levels(levels),
            asks: market.book.ask_levels(levels),
        })
    }

    pub(super) fn emit_trade(&self, trade: &Trade) {
        self.emit_event(
            trade.timestamp,
            EventPayload::TradeExecuted(TradeExecutedEvent {
                instrument_id: trade.instrument_id,
                trade_id: trade.id,
                maker_account: trade.maker_account,
                taker_account: trade.taker_account,
                taker_side: trade.taker_side,
                price: trade.price,
                size: trade.size,
            }),
        );
    }

    /// Margin check for every account on either side of `trades`.
    pub(super) fn check_touched(&self, market: &Market, trades: &[Trade], now: Timestamp) -> Vec<MarginAlert> {
        let Some(price) = market.risk_price() else {
            return Vec::new();
        };
        let accounts: BTreeSet<AccountId> = trades
            .iter()
            .flat_map(|t| [t.maker_account, t.taker_account])
            .collect();

        let alerts: Vec<MarginAlert> = accounts
            .into_iter()
            .filter_map(|account| market.ledger.margin_alert(account, price, now))
            .collect();
        for alert in &alerts {
            self.report_breach(alert);
        }
        alerts
    }
}
