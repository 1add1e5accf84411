// 9.2: liquidity providers answering quote requests. different implementations
// can model external market makers, internal desks, or test doubles.

use super::quote::QuoteRequest;
use crate::types::{AccountId, Bps, InstrumentId, Price, Side};
use async_trait::async_trait;
use parking_lot::RwLock;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::time::Duration;

#[async_trait]
pub trait QuoteProvider: Send + Sync {
    fn name(&self) -> &str;

    /// Account that takes the other side when a quote from this provider is accepted.
    fn account(&self) -> AccountId;

    /// Price for the request, or None to decline.
    async fn quote(&self, request: &QuoteRequest) -> Option<Price>;
}

/// Quotes a fixed spread around a mid it is told about, after an optional delay.
#[derive(Debug)]
pub struct SpreadProvider {
    name: String,
    account: AccountId,
    spread: Bps,
    latency: Duration,
    mids: RwLock<HashMap<InstrumentId, Price>>,
}

impl SpreadProvider {
    pub fn new(name: impl Into<String>, account: AccountId, spread: Bps) -> Self {
        Self {
            name: name.into(),
            account,
            spread,
            latency: Duration::ZERO,
            mids: RwLock::new(HashMap::new()),
        }
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn set_mid(&self, instrument_id: InstrumentId, mid: Price) {
        self.mids.write().insert(instrument_id, mid);
    }
}

#[async_trait]
impl QuoteProvider for SpreadProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn account(&self) -> AccountId {
        self.account
    }

    async fn quote(&self, request: &QuoteRequest) -> Option<Price> {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        let mid = self.mids.read().get(&request.instrument_id).copied()?;
        let skew = match request.side {
            Side::Buy => Decimal::ONE + self.spread.as_fraction(),
            Side::Sell => Decimal::ONE - self.spread.as_fraction(),
        };
        Price::new(mid.value() * skew)
    }
}
