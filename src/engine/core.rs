// 8.0 engine/core.rs: main engine. holds all instruments, the rfq channel and the audit log.

use super::config::EngineConfig;
use super::pricing::PricePoint;
use crate::config::{EngineSettings, InstrumentSpec};
use crate::error::EngineError;
use crate::events::{Event, EventId, EventLog, EventPayload};
use crate::funding::{FundingParams, FundingRate, PremiumSampler};
use crate::ledger::{LiquidationPolicy, LogOnlyPolicy, PositionLedger};
use crate::margin::MarginParams;
use crate::order::OrderBook;
use crate::rfq::RfqEngine;
use crate::types::{Clock, IdSequence, InstrumentId, Price, Timestamp};
use parking_lot::{Mutex, RwLock};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tracing::info;

/** 8.1: everything one instrument owns. guarded by a single async lock */
#[derive(Debug)]
pub struct Market {
    pub spec: InstrumentSpec,
    pub book: OrderBook,
    pub ledger: PositionLedger,
    pub mark_price: Option<PricePoint>,
    pub index_price: Option<PricePoint>,
    pub last_trade_price: Option<Price>,
    pub(super) premiums: PremiumSampler,
    pub(super) funding_history: VecDeque<FundingRate>,
    /// Interval start of the last funding applied here.
    pub last_funding: Option<Timestamp>,
}

impl Market {
    fn new(spec: InstrumentSpec, margin: MarginParams, funding: &FundingParams, now: Timestamp) -> Self {
        Self {
            book: OrderBook::new(spec.id),
            ledger: PositionLedger::new(spec.id, margin),
            spec,
            mark_price: None,
            index_price: None,
            last_trade_price: None,
            premiums: PremiumSampler::new(funding.max_samples),
            funding_history: VecDeque::new(),
            // the interval in progress at registration is not charged
            last_funding: Some(now.align_down(funding.interval_ms)),
        }
    }

    /// Price used for margin checks: mark if known, else the last trade.
    pub fn risk_price(&self) -> Option<Price> {
        self.mark_price.map(|p| p.price).or(self.last_trade_price)
    }

    pub fn funding_history(&self) -> impl Iterator<Item = &FundingRate> {
        self.funding_history.iter()
    }

    pub fn latest_funding(&self) -> Option<&FundingRate> {
        self.funding_history.back()
    }
}

/** 8.2: main engine struct. shared behind an Arc by callers and the funding task */
pub struct Engine {
    pub(super) config: EngineConfig,
    pub(super) margin: MarginParams,
    pub(super) funding: FundingParams,
    pub(super) clock: Arc<dyn Clock>,
    pub(super) markets: RwLock<HashMap<InstrumentId, Arc<tokio::sync::Mutex<Market>>>>,
    pub(super) order_ids: IdSequence,
    pub(super) trade_ids: Arc<IdSequence>,
    pub(super) events: Mutex<EventLog>,
    pub(super) rfq: RfqEngine,
    pub(super) liquidation: Arc<dyn LiquidationPolicy>,
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("config", &self.config)
            .field("instruments", &self.markets.read().len())
            .field("rfq", &self.rfq)
            .finish()
    }
}

impl Engine {
    /// Build an engine and register every instrument in `settings`.
    /// Settings are validated first.
    pub fn new(settings: EngineSettings, clock: Arc<dyn Clock>) -> Result<Self, EngineError> {
        settings.validate()?;
        let trade_ids = Arc::new(IdSequence::default());
        let engine = Self {
            events: Mutex::new(EventLog::new(settings.engine.max_events)),
            config: settings.engine,
            margin: settings.margin,
            funding: settings.funding,
            rfq: RfqEngine::with_trade_ids(settings.rfq, clock.clone(), trade_ids.clone()),
            clock,
            markets: RwLock::new(HashMap::new()),
            order_ids: IdSequence::default(),
            trade_ids,
            liquidation: Arc::new(LogOnlyPolicy),
        };
        for spec in settings.instruments {
            engine.add_instrument(spec)?;
        }
        Ok(engine)
    }

    pub fn with_liquidation_policy(mut self, policy: Arc<dyn LiquidationPolicy>) -> Self {
        self.liquidation = policy;
        self
    }

    pub fn add_instrument(&self, spec: InstrumentSpec) -> Result<InstrumentId, EngineError> {
        spec.check()?;
        let id = spec.id;
        let mut markets = self.markets.write();
        if markets.contains_key(&id) {
            return Err(EngineError::InstrumentExists(id));
        }
        self.rfq.register_instrument(id, spec.amm_depth);
        info!(instrument = %id, symbol = %spec.symbol, "instrument registered");
        let mut market = Market::new(spec, self.margin.clone(), &self.funding, self.clock.now());
        // the pool is backed by the engine, not by posted margin
        market.ledger.exempt_from_margin(self.rfq.config().amm_account);
        markets.insert(id, Arc::new(tokio::sync::Mutex::new(market)));
        Ok(id)
    }

    pub fn instruments(&self) -> Vec<InstrumentId> {
        let mut ids: Vec<InstrumentId> = self.markets.read().keys().copied().collect();
        ids.sort();
        ids
    }

    /// Handle to one instrument's state. Lock it to read or mutate.
    pub fn market(&self, instrument_id: InstrumentId) -> Result<Arc<tokio::sync::Mutex<Market>>, EngineError> {
        self.markets
            .read()
            .get(&instrument_id)
            .cloned()
            .ok_or(EngineError::InstrumentNotFound(instrument_id))
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    pub fn now(&self) -> Timestamp {
        self.clock.now()
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn funding_params(&self) -> &FundingParams {
        &self.funding
    }

    pub fn rfq(&self) -> &RfqEngine {
        &self.rfq
    }

    pub fn recent_events(&self, count: usize) -> Vec<Event> {
        self.events.lock().recent(count)
    }

    pub fn event_count(&self) -> usize {
        self.events.lock().len()
    }

    pub(super) fn emit_event(&self, timestamp: Timestamp, payload: EventPayload) -> EventId {
        self.events.lock().emit(timestamp, payload)
    }
}
