// 7.0 config.rs: all settings in one place. engine limits, margin, funding, rfq, instruments.
// 7.1 InstrumentSpec carries per-instrument order limits and AMM depth.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::engine::EngineConfig;
use crate::error::EngineError;
use crate::funding::FundingParams;
use crate::margin::MarginParams;
use crate::rfq::RfqConfig;
use crate::types::{InstrumentId, Leverage, Price};

// Static configuration for one perpetual instrument
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstrumentSpec {
    pub id: InstrumentId,
    // Market symbol (e.g. "BTC-PERP")
    pub symbol: String,
    pub base_asset: String,
    pub quote_asset: String,
    // Minimum order size
    pub min_order_size: Decimal,
    // Maximum order size
    pub max_order_size: Decimal,
    // Price tick size (minimum price increment)
    pub tick_size: Decimal,
    // Size step (minimum size increment)
    pub lot_size: Decimal,
    // Virtual base reserve of the fallback AMM
    pub amm_depth: Decimal,
}

impl InstrumentSpec {
    pub fn btc_perp() -> Self {
        Self {
            id: InstrumentId(1),
            symbol: "BTC-PERP".to_string(),
            base_asset: "BTC".to_string(),
            quote_asset: "USD".to_string(),
            min_order_size: Decimal::new(1, 4), // 0.0001 BTC
            max_order_size: Decimal::new(1000, 0), // 1000 BTC
            tick_size: Decimal::new(1, 1), // $0.10
            lot_size: Decimal::new(1, 4), // 0.0001 BTC
            amm_depth: Decimal::new(500, 0),
        }
    }

    pub fn eth_perp() -> Self {
        Self {
            id: InstrumentId(2),
            symbol: "ETH-PERP".to_string(),
            base_asset: "ETH".to_string(),
            quote_asset: "USD".to_string(),
            min_order_size: Decimal::new(1, 3),
            max_order_size: Decimal::new(10_000, 0),
            tick_size: Decimal::new(1, 2),
            lot_size: Decimal::new(1, 3),
            amm_depth: Decimal::new(5_000, 0),
        }
    }

    /// Permissive spec for tests and simulations: any positive size or price.
    pub fn unrestricted(id: InstrumentId, symbol: impl Into<String>) -> Self {
        Self {
            id,
            symbol: symbol.into(),
            base_asset: "BASE".to_string(),
            quote_asset: "USD".to_string(),
            min_order_size: Decimal::ZERO,
            max_order_size: Decimal::MAX,
            tick_size: Decimal::ZERO,
            lot_size: Decimal::ZERO,
            amm_depth: Decimal::new(1_000_000, 0),
        }
    }

    pub fn validate_size(&self, size: Decimal) -> Result<(), EngineError> {
        if size < self.min_order_size {
            return Err(EngineError::invalid_order(format!(
                "size {size} below minimum {}",
                self.min_order_size
            )));
        }
        if size > self.max_order_size {
            return Err(EngineError::invalid_order(format!(
                "size {size} above maximum {}",
                self.max_order_size
            )));
        }
        if !self.lot_size.is_zero() && !(size % self.lot_size).is_zero() {
            return Err(EngineError::invalid_order(format!(
                "size {size} not a multiple of lot {}",
                self.lot_size
            )));
        }
        Ok(())
    }

    // off-tick prices are rejected, not rounded
    pub fn validate_price(&self, price: Price) -> Result<(), EngineError> {
        if price.value() <= Decimal::ZERO {
            return Err(EngineError::invalid_order(format!("price must be positive, got {price}")));
        }
        if !self.tick_size.is_zero() && !(price.value() % self.tick_size).is_zero() {
            return Err(EngineError::invalid_order(format!(
                "price {price} not a multiple of tick {}",
                self.tick_size
            )));
        }
        Ok(())
    }

    pub(crate) fn check(&self) -> Result<(), ConfigError> {
        let invalid = |reason: &str| ConfigError::InvalidInstrument {
            symbol: self.symbol.clone(),
            reason: reason.to_string(),
        };
        if self.min_order_size < Decimal::ZERO || self.min_order_size >= self.max_order_size {
            return Err(invalid("min order must be non-negative and less than max"));
        }
        if self.tick_size < Decimal::ZERO || self.lot_size < Decimal::ZERO {
            return Err(invalid("tick and lot size cannot be negative"));
        }
        if self.amm_depth <= Decimal::ZERO {
            return Err(invalid("amm depth must be positive"));
        }
        Ok(())
    }
}

// The complete engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineSettings {
    pub engine: EngineConfig,
    pub margin: MarginParams,
    pub funding: FundingParams,
    pub rfq: RfqConfig,
    pub instruments: Vec<InstrumentSpec>,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            engine: EngineConfig::default(),
            margin: MarginParams::default(),
            funding: FundingParams::default(),
            rfq: RfqConfig::default(),
            instruments: vec![InstrumentSpec::btc_perp(), InstrumentSpec::eth_perp()],
        }
    }
}

impl EngineSettings {
    // Create a configuration preset for testnet: short funding interval, relaxed RFQ
    pub fn testnet() -> Self {
        let mut config = Self::default();
        config.funding.interval_ms = 3_600_000; // hourly
        config.rfq.provider_timeout_ms = 5_000;
        config.rfq.quote_ttl_ms = 30_000;
        config
    }

    // Create a configuration preset for mainnet with conservative settings
    pub fn mainnet_conservative() -> Self {
        let mut config = Self::default();
        if let Some(max) = Leverage::new(dec!(10)) {
            config.margin.max_leverage = max; // 10x max
        }
        config.margin.maintenance_margin_ratio = dec!(0.6);
        config.funding.max_rate = dec!(0.0075);
        config.rfq.provider_timeout_ms = 1_000;
        config.rfq.quote_ttl_ms = 5_000;
        config
    }

    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let settings: Self = serde_json::from_str(json).map_err(|e| ConfigError::Parse(e.to_string()))?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        Self::from_json_str(&raw)
    }

    // Validate the configuration for internal consistency
    pub fn validate(&self) -> Result<(), ConfigError> {
        // maintenance_margin_ratio is multiplied by initial margin (1/leverage)
        // so it must be in range (0, 1) meaning MM < IM
        if self.margin.maintenance_margin_ratio <= Decimal::ZERO
            || self.margin.maintenance_margin_ratio >= Decimal::ONE
        {
            return Err(ConfigError::InvalidMargin {
                reason: "MM ratio must be between 0 and 1".to_string(),
            });
        }
        if self.margin.leverage_tiers.is_empty() {
            return Err(ConfigError::InvalidMargin {
                reason: "at least one leverage tier required".to_string(),
            });
        }

        if self.funding.interval_ms <= 0 {
            return Err(ConfigError::InvalidFunding {
                reason: "interval must be positive".to_string(),
            });
        }
        if self.funding.max_rate <= Decimal::ZERO {
            return Err(ConfigError::InvalidFunding {
                reason: "max rate must be positive".to_string(),
            });
        }

        if self.rfq.provider_timeout_ms == 0 || self.rfq.quote_ttl_ms <= 0 {
            return Err(ConfigError::InvalidRfq {
                reason: "timeout and ttl must be positive".to_string(),
            });
        }
        if !(0..10_000).contains(&self.rfq.amm_fee_bps.value()) {
            return Err(ConfigError::InvalidRfq {
                reason: "amm fee must be in [0, 10000) bps".to_string(),
            });
        }

        if self.engine.max_events == 0 {
            return Err(ConfigError::InvalidEngine {
                reason: "max_events must be positive".to_string(),
            });
        }

        let mut seen = std::collections::HashSet::new();
        for instrument in &self.instruments {
            instrument.check()?;
            if !seen.insert(instrument.id) {
                return Err(ConfigError::InvalidInstrument {
                    symbol: instrument.symbol.clone(),
                    reason: format!("duplicate id {}", instrument.id),
                });
            }
        }

        Ok(())
    }

    pub fn max_leverage(&self) -> Decimal {
        self.margin.max_leverage.value()
    }
}

// Configuration validation errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid margin config: {reason}")]
    InvalidMargin { reason: String },
    #[error("invalid funding config: {reason}")]
    InvalidFunding { reason: String },
    #[error("invalid rfq config: {reason}")]
    InvalidRfq { reason: String },
    #[error("invalid engine config: {reason}")]
    InvalidEngine { reason: String },
    #[error("invalid instrument {symbol}: {reason}")]
    InvalidInstrument { symbol: String, reason: String },
    #[error("cannot read {path}: {reason}")]
    Io { path: String, reason: String },
    #[error("cannot parse config: {0}")]
    Parse(String),
}

// Environment presets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Environment {
    Development,
    Testnet,
    Mainnet,
}

impl Environment {
    pub fn config(&self) -> EngineSettings {
        match self {
            Environment::Development => EngineSettings::default(),
            Environment::Testnet => EngineSettings::testnet(),
            Environment::Mainnet => EngineSettings::mainnet_conservative(),
        }
    }
}

impl std::str::FromStr for Environment {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "development" | "dev" => Ok(Environment::Development),
            "testnet" => Ok(Environment::Testnet),
            "mainnet" => Ok(Environment::Mainnet),
            other => Err(ConfigError::Parse(format!("unknown environment {other}"))),
        }
    }
}
