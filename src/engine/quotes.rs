//! RFQ entry points on the engine.
//!
//! Pricing and quote bookkeeping live in [`crate::rfq`]. The engine adds the
//! audit trail and books accepted quotes into the instrument's ledger under
//! the instrument lock, the same way book trades are booked.

use super::core::Engine;
use crate::error::EngineError;
use crate::events::{EventPayload, QuoteAcceptedEvent, QuoteIssuedEvent, QuoteRejectedEvent};
use crate::rfq::{Quote, QuoteRequest};
use crate::trade::Trade;
use crate::types::QuoteId;
use tracing::debug;

impl Engine {
    /// Solicit a quote. The size must satisfy the instrument's order rules.
    pub async fn request_quote(&self, request: QuoteRequest) -> Result<Quote, EngineError> {
        {
            let handle = self.market(request.instrument_id)?;
            let market = handle.lock().await;
            market.spec.validate_size(request.size)?;
        }
        let quote = self.rfq.request_quote(request).await?;
        self.emit_event(
            quote.created_at,
            EventPayload::QuoteIssued(QuoteIssuedEvent {
                quote_id: quote.id,
                instrument_id: quote.instrument_id,
                requester: quote.requester,
                side: quote.side,
                size: quote.size,
                price: quote.price,
                source: quote.source.clone(),
                expires_at: quote.expires_at,
            }),
        );
        Ok(quote)
    }

    /// Accept a live quote. Both legs land in the ledger before this returns.
    ///
    /// Positions pushed below maintenance are reported to the liquidation
    /// policy; the trade stands either way.
    pub async fn accept_quote(&self, quote_id: QuoteId) -> Result<Trade, EngineError> {
        let Some(quote) = self.rfq.quote(quote_id) else {
            let err = EngineError::QuoteNotFound(quote_id);
            self.reject_quote(quote_id, &err);
            return Err(err);
        };
        let handle = self.market(quote.instrument_id)?;
        let mut market = handle.lock().await;

        let trade = match self.rfq.accept_quote(quote_id) {
            Ok(trade) => trade,
            Err(err) => {
                self.reject_quote(quote_id, &err);
                return Err(err);
            }
        };

        // both legs or neither; the quote stays consumed either way
        if let Err(err) = market.ledger.apply_trade(&trade) {
            self.reject_quote(quote_id, &err);
            return Err(err);
        }
        market.last_trade_price = Some(trade.price);
        self.emit_trade(&trade);
        self.emit_event(
            trade.timestamp,
            EventPayload::QuoteAccepted(QuoteAcceptedEvent {
                quote_id,
                trade_id: trade.id,
                instrument_id: trade.instrument_id,
            }),
        );
        self.check_touched(&market, std::slice::from_ref(&trade), trade.timestamp);
        Ok(trade)
    }

    fn reject_quote(&self, quote_id: QuoteId, err: &EngineError) {
        debug!(quote_id = quote_id.0, error = %err, "quote not accepted");
        self.emit_event(
            self.clock.now(),
            EventPayload::QuoteRejected(QuoteRejectedEvent {
                quote_id,
                reason: err.to_string(),
            }),
        );
    }

    pub fn purge_expired_quotes(&self) -> usize {
        self.rfq.purge_expired()
    }
}
