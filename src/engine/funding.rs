//! Funding settlement and the controller that drives it on a timer.
//!
//! Each instrument cycles `Idle -> Computing -> Applied -> Idle` once per
//! funding interval. Interval boundaries are multiples of the interval length
//! since the epoch; funding for an interval is applied the first time a tick
//! lands at or after its end. A failed application leaves the instrument
//! unfunded for that interval and the next tick retries it. The ledger's
//! per-position guard makes repeated application a no-op.

use super::core::Engine;
use super::results::{FundingOutcome, FundingReport};
use crate::error::EngineError;
use crate::events::{EventPayload, FundingAppliedEvent};
use crate::funding::{calculate_funding_rate, calculate_premium_index, FundingRate};
use crate::types::{InstrumentId, Timestamp};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FundingPhase {
    Idle,
    Computing,
    Applied,
}

impl Engine {
    /// Compute and apply funding for the interval ending at or before `now`.
    ///
    /// The rate is the dampened average premium sampled during the interval
    /// plus interest, clamped to the configured maximum. With no samples the
    /// current mark/index premium is used.
    pub async fn settle_funding(&self, instrument_id: InstrumentId, now: Timestamp) -> Result<FundingOutcome, EngineError> {
        let params = &self.funding;
        let effective_at = now.align_down(params.interval_ms);
        let handle = self.market(instrument_id)?;
        let mut market = handle.lock().await;

        if market.last_funding.map_or(false, |last| last >= effective_at) {
            return Ok(FundingOutcome::AlreadyApplied);
        }

        let mark = market.mark_price.ok_or(EngineError::NoPrice(instrument_id))?;
        let premium = match market.premiums.average_before(effective_at) {
            Some(avg) => avg,
            None => {
                let index = market.index_price.ok_or(EngineError::NoPrice(instrument_id))?;
                calculate_premium_index(mark.price, index.price)
            }
        };
        let rate = FundingRate {
            instrument_id,
            rate: calculate_funding_rate(premium, params),
            premium,
            mark_price: mark.price,
            effective_at,
        };

        let summary = market.ledger.apply_funding(&rate)?;

        market.last_funding = Some(effective_at);
        market.premiums.discard_before(effective_at);
        market.funding_history.push_back(rate.clone());
        while market.funding_history.len() > self.config.max_funding_history {
            market.funding_history.pop_front();
        }

        self.emit_event(
            now,
            EventPayload::FundingApplied(FundingAppliedEvent {
                rate: rate.clone(),
                positions_funded: summary.positions_funded,
                total_paid: summary.total_paid,
            }),
        );
        Ok(FundingOutcome::Applied { rate, summary })
    }

    pub async fn funding_history(&self, instrument_id: InstrumentId) -> Result<Vec<FundingRate>, EngineError> {
        let handle = self.market(instrument_id)?;
        let market = handle.lock().await;
        Ok(market.funding_history().cloned().collect())
    }
}

/// Periodic funding task. One per engine.
#[derive(Debug)]
pub struct FundingController {
    engine: Arc<Engine>,
    phases: Mutex<HashMap<InstrumentId, FundingPhase>>,
}

impl FundingController {
    pub fn new(engine: Arc<Engine>) -> Self {
        Self {
            engine,
            phases: Mutex::new(HashMap::new()),
        }
    }

    pub fn phase(&self, instrument_id: InstrumentId) -> FundingPhase {
        self.phases
            .lock()
            .get(&instrument_id)
            .copied()
            .unwrap_or(FundingPhase::Idle)
    }

    fn transition(&self, instrument_id: InstrumentId, phase: FundingPhase) {
        debug!(instrument = %instrument_id, ?phase, "funding phase");
        self.phases.lock().insert(instrument_id, phase);
    }

    /// Run one funding pass over every instrument.
    pub async fn tick(&self, now: Timestamp) -> Vec<FundingReport> {
        let mut reports = Vec::new();
        for instrument_id in self.engine.instruments() {
            self.transition(instrument_id, FundingPhase::Computing);
            let outcome = match self.engine.settle_funding(instrument_id, now).await {
                Ok(outcome) => outcome,
                Err(err) => {
                    error!(instrument = %instrument_id, error = %err, "funding failed, retrying next tick");
                    FundingOutcome::Failed(err)
                }
            };
            if let FundingOutcome::Applied { rate, summary } = &outcome {
                self.transition(instrument_id, FundingPhase::Applied);
                info!(
                    instrument = %instrument_id,
                    rate = %rate.rate,
                    positions = summary.positions_funded,
                    "funding interval settled"
                );
            }
            self.transition(instrument_id, FundingPhase::Idle);
            reports.push(FundingReport {
                instrument_id,
                outcome,
            });
        }
        reports
    }

    /// Tick on `funding_tick_ms` until cancelled.
    pub async fn run(&self, cancel: CancellationToken) {
        let period = Duration::from_millis(self.engine.config().funding_tick_ms.max(1));
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        info!(?period, "funding controller started");

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("funding controller stopped");
                    break;
                }
                _ = ticker.tick() => {
                    let now = self.engine.now();
                    self.tick(now).await;
                }
            }
        }
    }
}
