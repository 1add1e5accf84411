// 5.0: funding rates. every interval longs pay shorts or vice versa to keep perp price near spot.
// 5.0 has the params and record structs. 5.1-5.3 have the rate math, 5.4 the premium sampler.

use crate::types::{InstrumentId, Price, Timestamp};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

pub const HOUR_MS: i64 = 3_600_000;
const YEAR_MS: i64 = 365 * 24 * HOUR_MS;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FundingParams {
    /// Interval length. Funding boundaries are multiples of this since the epoch.
    pub interval_ms: i64,
    pub max_rate: Decimal,
    pub interest_rate: Decimal,
    pub dampening_factor: Decimal,
    /// Premium samples kept per instrument between funding applications.
    pub max_samples: usize,
}

impl Default for FundingParams {
    fn default() -> Self {
        Self {
            interval_ms: 8 * HOUR_MS,
            max_rate: dec!(0.01),
            interest_rate: dec!(0.0001),
            dampening_factor: dec!(0.5),
            max_samples: 4_096,
        }
    }
}

impl FundingParams {
    pub fn periods_per_year(&self) -> Decimal {
        Decimal::from(YEAR_MS) / Decimal::from(self.interval_ms.max(1))
    }
}

/// The rate applied for one funding interval.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FundingRate {
    pub instrument_id: InstrumentId,
    pub rate: Decimal,
    /// Averaged premium the rate was derived from.
    pub premium: Decimal,
    pub mark_price: Price,
    /// Start of the interval this rate covers.
    pub effective_at: Timestamp,
}

impl FundingRate {
    pub fn annualized(&self, params: &FundingParams) -> Decimal {
        self.rate * params.periods_per_year()
    }
}

// 5.1: how far perp is from spot. positive = perp above spot
pub fn calculate_premium_index(mark_price: Price, index_price: Price) -> Decimal {
    (mark_price.value() - index_price.value()) / index_price.value()
}

// 5.2: dampens and clamps the rate to prevent wild swings
pub fn calculate_funding_rate(premium_index: Decimal, params: &FundingParams) -> Decimal {
    let dampened_premium = premium_index * params.dampening_factor;
    let rate = dampened_premium + params.interest_rate;
    rate.max(-params.max_rate).min(params.max_rate)
}

// 5.3: average premium over the window. None when nothing was sampled.
pub fn average_premium(samples: &[Decimal]) -> Option<Decimal> {
    if samples.is_empty() {
        return None;
    }
    let total: Decimal = samples.iter().sum();
    Some(total / Decimal::from(samples.len()))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PremiumSample {
    pub premium: Decimal,
    pub timestamp: Timestamp,
}

// 5.4: premium samples for one instrument, oldest dropped past capacity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PremiumSampler {
    samples: VecDeque<PremiumSample>,
    capacity: usize,
}

impl PremiumSampler {
    pub fn new(capacity: usize) -> Self {
        Self {
            samples: VecDeque::new(),
            capacity: capacity.max(1),
        }
    }

    pub fn record(&mut self, mark_price: Price, index_price: Price, timestamp: Timestamp) -> Decimal {
        let premium = calculate_premium_index(mark_price, index_price);
        if self.samples.len() >= self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(PremiumSample { premium, timestamp });
        premium
    }

    /// Average of samples taken before `until`.
    pub fn average_before(&self, until: Timestamp) -> Option<Decimal> {
        let window: Vec<Decimal> = self
            .samples
            .iter()
            .filter(|s| s.timestamp < until)
            .map(|s| s.premium)
            .collect();
        average_premium(&window)
    }

    /// Drop samples that belong to an interval already funded.
    pub fn discard_before(&mut self, until: Timestamp) {
        self.samples.retain(|s| s.timestamp >= until);
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}
