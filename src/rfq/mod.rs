//! Request-for-quote channel.
//!
//! Quote requests fan out to every registered [`QuoteProvider`] at once. The
//! best price that arrives before the provider timeout wins; if nothing
//! arrives in time the instrument's [`AmmPool`] prices the request instead.
//! Issued quotes live here until accepted, expired, or purged. This module
//! never touches the order book.

mod amm;
mod provider;
mod quote;

pub use amm::{AmmPool, PoolConfig};
pub use provider::{QuoteProvider, SpreadProvider};
pub use quote::{Quote, QuoteRequest, QuoteSource};

use crate::error::EngineError;
use crate::trade::{Trade, TradeOrigin};
use crate::types::{AccountId, Bps, Clock, IdSequence, InstrumentId, Price, QuoteId, TradeId};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RfqConfig {
    /// How long providers get to answer.
    pub provider_timeout_ms: u64,
    /// Lifetime of an issued quote.
    pub quote_ttl_ms: i64,
    pub amm_fee_bps: Bps,
    /// Counterparty recorded on trades filled by the AMM.
    pub amm_account: AccountId,
}

impl Default for RfqConfig {
    fn default() -> Self {
        Self {
            provider_timeout_ms: 2_000,
            quote_ttl_ms: 10_000,
            amm_fee_bps: Bps::new(30),
            amm_account: AccountId(0),
        }
    }
}

impl RfqConfig {
    pub fn provider_timeout(&self) -> Duration {
        Duration::from_millis(self.provider_timeout_ms)
    }
}

struct ProviderResponse {
    provider: String,
    account: AccountId,
    price: Option<Price>,
}

struct PricedResponse {
    provider: String,
    account: AccountId,
    price: Price,
}

pub struct RfqEngine {
    config: RfqConfig,
    clock: Arc<dyn Clock>,
    providers: RwLock<Vec<Arc<dyn QuoteProvider>>>,
    pools: RwLock<HashMap<InstrumentId, AmmPool>>,
    quotes: Mutex<HashMap<QuoteId, Quote>>,
    quote_ids: IdSequence,
    trade_ids: Arc<IdSequence>,
}

impl std::fmt::Debug for RfqEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RfqEngine")
            .field("config", &self.config)
            .field("providers", &self.providers.read().len())
            .field("outstanding", &self.outstanding())
            .finish()
    }
}

impl RfqEngine {
    pub fn new(config: RfqConfig, clock: Arc<dyn Clock>) -> Self {
        Self::with_trade_ids(config, clock, Arc::new(IdSequence::default()))
    }

    /// Share the trade id sequence with the order book so ids never collide.
    pub fn with_trade_ids(config: RfqConfig, clock: Arc<dyn Clock>, trade_ids: Arc<IdSequence>) -> Self {
        Self {
            config,
            clock,
            providers: RwLock::new(Vec::new()),
            pools: RwLock::new(HashMap::new()),
            quotes: Mutex::new(HashMap::new()),
            quote_ids: IdSequence::default(),
            trade_ids,
        }
    }

    pub fn config(&self) -> &RfqConfig {
        &self.config
    }

    pub fn add_provider(&self, provider: Arc<dyn QuoteProvider>) {
        info!(provider = provider.name(), "rfq provider registered");
        self.providers.write().push(provider);
    }

    pub fn register_instrument(&self, instrument_id: InstrumentId, depth: rust_decimal::Decimal) {
        let pool = AmmPool::new(
            instrument_id,
            PoolConfig {
                depth,
                fee_bps: self.config.amm_fee_bps,
            },
        );
        self.pools.write().insert(instrument_id, pool);
    }

    /// Re-anchor the instrument's AMM curve on a new index price.
    pub fn update_reference(&self, instrument_id: InstrumentId, price: Price) -> Result<(), EngineError> {
        let mut pools = self.pools.write();
        let pool = pools
            .get_mut(&instrument_id)
            .ok_or(EngineError::InstrumentNotFound(instrument_id))?;
        pool.set_reference(price);
        Ok(())
    }

    pub fn reference(&self, instrument_id: InstrumentId) -> Option<Price> {
        self.pools.read().get(&instrument_id).and_then(|p| p.reference())
    }

    /// Price the request off the AMM curve alone.
    pub fn fallback_amm(&self, request: &QuoteRequest) -> Result<Price, EngineError> {
        request.validate()?;
        let pools = self.pools.read();
        let pool = pools
            .get(&request.instrument_id)
            .ok_or(EngineError::InstrumentNotFound(request.instrument_id))?;
        pool.price_for(request.side, request.size)
    }

    pub async fn request_quote(&self, request: QuoteRequest) -> Result<Quote, EngineError> {
        request.validate()?;
        if request.requester == self.config.amm_account {
            return Err(EngineError::invalid_order(format!(
                "{} is the amm counterparty and cannot request quotes",
                request.requester
            )));
        }
        if !self.pools.read().contains_key(&request.instrument_id) {
            return Err(EngineError::InstrumentNotFound(request.instrument_id));
        }

        let best = self.solicit(&request).await;
        let (price, counterparty, source) = match best {
            Some(response) => (
                response.price,
                response.account,
                QuoteSource::Rfq {
                    provider: response.provider,
                },
            ),
            None => {
                let price = self.fallback_amm(&request)?;
                (price, self.config.amm_account, QuoteSource::Amm)
            }
        };

        let now = self.clock.now();
        let quote = Quote {
            id: QuoteId(self.quote_ids.next()),
            requester: request.requester,
            counterparty,
            instrument_id: request.instrument_id,
            side: request.side,
            size: request.size,
            price,
            created_at: now,
            expires_at: now.plus_millis(self.config.quote_ttl_ms),
            source,
        };

        info!(
            quote_id = quote.id.0,
            instrument = %quote.instrument_id,
            side = %quote.side,
            size = %quote.size,
            price = %quote.price,
            source = ?quote.source,
            "quote issued"
        );
        self.quotes.lock().insert(quote.id, quote.clone());
        Ok(quote)
    }

    // ask every provider at once, keep whatever priced answers land before the deadline
    async fn solicit(&self, request: &QuoteRequest) -> Option<PricedResponse> {
        let providers: Vec<Arc<dyn QuoteProvider>> = self.providers.read().clone();
        if providers.is_empty() {
            return None;
        }

        let deadline = tokio::time::Instant::now() + self.config.provider_timeout();
        let mut tasks = JoinSet::new();
        for provider in providers {
            let request = request.clone();
            tasks.spawn(async move {
                let price = provider.quote(&request).await;
                ProviderResponse {
                    provider: provider.name().to_string(),
                    account: provider.account(),
                    price,
                }
            });
        }

        let mut best: Option<PricedResponse> = None;
        loop {
            match tokio::time::timeout_at(deadline, tasks.join_next()).await {
                Ok(Some(Ok(response))) => {
                    let Some(price) = response.price else {
                        debug!(provider = %response.provider, "provider declined");
                        continue;
                    };
                    if response.account == request.requester {
                        debug!(provider = %response.provider, "provider skipped, same account as requester");
                        continue;
                    }
                    let improves = match &best {
                        Some(current) => request.is_better(price, current.price),
                        None => true,
                    };
                    if improves {
                        best = Some(PricedResponse {
                            provider: response.provider,
                            account: response.account,
                            price,
                        });
                    }
                }
                Ok(Some(Err(e))) => warn!(error = %e, "provider task failed"),
                Ok(None) => break,
                Err(_) => {
                    debug!(pending = tasks.len(), "provider timeout reached");
                    tasks.abort_all();
                    break;
                }
            }
        }
        best
    }

    /// Consume a live quote and return the single trade it produces.
    pub fn accept_quote(&self, quote_id: QuoteId) -> Result<Trade, EngineError> {
        let now = self.clock.now();
        let quote = {
            let mut quotes = self.quotes.lock();
            let quote = quotes.remove(&quote_id).ok_or(EngineError::QuoteNotFound(quote_id))?;
            if !quote.is_live(now) {
                debug!(quote_id = quote_id.0, expired_at = %quote.expires_at, "stale quote discarded");
                return Err(EngineError::Expired {
                    quote_id,
                    expired_at: quote.expires_at,
                });
            }
            quote
        };

        let trade = Trade {
            id: TradeId(self.trade_ids.next()),
            instrument_id: quote.instrument_id,
            origin: TradeOrigin::Rfq { quote_id },
            maker_account: quote.counterparty,
            taker_account: quote.requester,
            taker_side: quote.side,
            price: quote.price,
            size: quote.size,
            timestamp: now,
        };
        info!(quote_id = quote_id.0, trade_id = trade.id.0, "quote accepted");
        Ok(trade)
    }

    pub fn quote(&self, quote_id: QuoteId) -> Option<Quote> {
        self.quotes.lock().get(&quote_id).cloned()
    }

    /// Drop every quote that can no longer be accepted. Returns how many went.
    pub fn purge_expired(&self) -> usize {
        let now = self.clock.now();
        let mut quotes = self.quotes.lock();
        let before = quotes.len();
        quotes.retain(|_, q| q.is_live(now));
        before - quotes.len()
    }

    pub fn outstanding(&self) -> usize {
        self.quotes.lock().len()
    }
}
