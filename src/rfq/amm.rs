// 9.3: fallback liquidity. a constant product curve x*y=k re-anchored on every
// reference price update: base reserve = depth, quote reserve = depth * reference.
// pricing is a pure function of (reference, depth, fee, side, size).

use crate::error::EngineError;
use crate::types::{Bps, InstrumentId, Price, Side};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolConfig {
    /// Virtual base reserve. Orders at or beyond this size cannot be priced.
    pub depth: Decimal,
    pub fee_bps: Bps,
}

#[derive(Debug, Clone)]
pub struct AmmPool {
    instrument_id: InstrumentId,
    config: PoolConfig,
    reference: Option<Price>,
}

impl AmmPool {
    pub fn new(instrument_id: InstrumentId, config: PoolConfig) -> Self {
        Self {
            instrument_id,
            config,
            reference: None,
        }
    }

    pub fn set_reference(&mut self, price: Price) {
        self.reference = Some(price);
    }

    pub fn reference(&self) -> Option<Price> {
        self.reference
    }

    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    /// (base_reserve, quote_reserve) for the current reference. None without
    /// a reference or when the quote reserve overflows.
    pub fn reserves(&self) -> Option<(Decimal, Decimal)> {
        let reference = self.reference?;
        let quote_reserve = self.config.depth.checked_mul(reference.value())?;
        Some((self.config.depth, quote_reserve))
    }

    /// Per unit execution price for `size`, fee included.
    pub fn price_for(&self, side: Side, size: Decimal) -> Result<Price, EngineError> {
        if size <= Decimal::ZERO {
            return Err(EngineError::invalid_order("amm size must be positive"));
        }
        if self.reference.is_none() {
            return Err(EngineError::NoPrice(self.instrument_id));
        }
        let overflow = || EngineError::invalid_order(format!("amm cannot price size {size}"));
        let (base_reserve, quote_reserve) = self.reserves().ok_or_else(overflow)?;

        let fee = self.config.fee_bps.as_fraction();
        let raw = match side {
            Side::Buy => {
                if size >= base_reserve {
                    return Err(EngineError::InsufficientLiquidity {
                        requested: size,
                        unfilled: size,
                    });
                }
                quote_reserve
                    .checked_div(base_reserve - size)
                    .and_then(|p| p.checked_mul(Decimal::ONE + fee))
            }
            Side::Sell => base_reserve
                .checked_add(size)
                .and_then(|reserve| quote_reserve.checked_div(reserve))
                .and_then(|p| p.checked_mul(Decimal::ONE - fee)),
        }
        .ok_or_else(overflow)?;

        Price::new(raw).ok_or_else(|| EngineError::invalid_order(format!("amm produced non-positive price {raw}")))
    }

    /// Relative distance of the execution price from the reference.
    pub fn price_impact(&self, side: Side, size: Decimal) -> Result<Decimal, EngineError> {
        let reference = self.reference.ok_or(EngineError::NoPrice(self.instrument_id))?;
        let execution = self.price_for(side, size)?;
        Ok(((execution.value() - reference.value()) / reference.value()).abs())
    }
}
