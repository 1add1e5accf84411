// 2.5: executed trades. immutable once created, one per maker/taker match
// or per accepted RFQ quote.

use crate::types::{AccountId, InstrumentId, OrderId, Price, QuoteId, Side, Timestamp, TradeId};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Where a trade came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TradeOrigin {
    Book {
        maker_order_id: OrderId,
        taker_order_id: OrderId,
    },
    Rfq {
        quote_id: QuoteId,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Trade {
    pub id: TradeId,
    pub instrument_id: InstrumentId,
    pub origin: TradeOrigin,
    pub maker_account: AccountId,
    pub taker_account: AccountId,
    pub taker_side: Side,
    pub price: Price,
    pub size: Decimal,
    pub timestamp: Timestamp,
}

impl Trade {
    pub fn maker_side(&self) -> Side {
        self.taker_side.opposite()
    }

    pub fn buyer(&self) -> AccountId {
        match self.taker_side {
            Side::Buy => self.taker_account,
            Side::Sell => self.maker_account,
        }
    }

    pub fn seller(&self) -> AccountId {
        match self.taker_side {
            Side::Buy => self.maker_account,
            Side::Sell => self.taker_account,
        }
    }

    pub fn maker_order_id(&self) -> Option<OrderId> {
        match self.origin {
            TradeOrigin::Book { maker_order_id, .. } => Some(maker_order_id),
            TradeOrigin::Rfq { .. } => None,
        }
    }

    pub fn taker_order_id(&self) -> Option<OrderId> {
        match self.origin {
            TradeOrigin::Book { taker_order_id, .. } => Some(taker_order_id),
            TradeOrigin::Rfq { .. } => None,
        }
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
    fn buyer_and_seller_follow_taker_side() {
        let trade = Trade {
            id: TradeId(1),
            instrument_id: InstrumentId(1),
            origin: TradeOrigin::Book {
                maker_order_id: OrderId(10),
                taker_order_id: OrderId(11),
            },
            maker_account: AccountId(1),
            taker_account: AccountId(2),
            taker_side: Side::Sell,
            price: Price::new_unchecked(dec!(100)),
            size: dec!(10),
            timestamp: Timestamp::from_millis(0),
        };

        assert_eq!(trade.buyer(), AccountId(1));
        assert_eq!(trade.seller(), AccountId(2));
        assert_eq!(trade.maker_side(), Side::Buy);
        assert_eq!(trade.maker_order_id(), Some(OrderId(10)));
        assert_eq!(trade.notional(), dec!(1000));
    }

    #[test]
    fn rfq_trades_have_no_order_ids() {
        let trade = Trade {
            id: TradeId(2),
            instrument_id: InstrumentId(1),
            origin: TradeOrigin::Rfq { quote_id: QuoteId(7) },
            maker_account: AccountId(9),
            taker_account: AccountId(2),
            taker_side: Side::Buy,
            price: Price::new_unchecked(dec!(100)),
            size: dec!(1),
            timestamp: Timestamp::from_millis(0),
        };
        assert!(trade.maker_order_id().is_none());
        assert!(trade.taker_order_id().is_none());
        assert_eq!(trade.buyer(), AccountId(2));
    }
}
