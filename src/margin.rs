//! Margin calculation for initial and maintenance requirements.
//!
//! Initial margin (IM) is notional divided by leverage. Maintenance margin
//! (MM) is a fixed fraction of IM. A position's margin ratio is
//! `equity / notional`; once it drops below the maintenance fraction the
//! position is at risk.
//!
//! Leverage tiers reduce max leverage as position size grows to limit
//! protocol risk from large positions.

use crate::types::{Amount, Leverage, Price, SignedSize};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarginParams {
    pub max_leverage: Leverage,
    /// Maintenance margin as a fraction of initial margin, in (0, 1).
    pub maintenance_margin_ratio: Decimal,
    pub leverage_tiers: Vec<LeverageTier>,
}

impl Default for MarginParams {
    fn default() -> Self {
        Self {
            max_leverage: Leverage::new_unchecked(dec!(20)),
            maintenance_margin_ratio: dec!(0.5),
            leverage_tiers: vec![
                LeverageTier {
                    max_notional: Amount::new(dec!(100_000)),
                    max_leverage: Leverage::new_unchecked(dec!(20)),
                },
                LeverageTier {
                    max_notional: Amount::new(dec!(500_000)),
                    max_leverage: Leverage::new_unchecked(dec!(10)),
                },
                LeverageTier {
                    max_notional: Amount::new(dec!(2_000_000)),
                    max_leverage: Leverage::new_unchecked(dec!(5)),
                },
                LeverageTier {
                    max_notional: Amount::new(dec!(10_000_000)),
                    max_leverage: Leverage::new_unchecked(dec!(2)),
                },
            ],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeverageTier {
    pub max_notional: Amount,
    pub max_leverage: Leverage,
}

#[derive(Debug, Clone)]
pub struct MarginRequirement {
    pub initial: Amount,
    pub maintenance: Amount,
    pub effective_leverage: Leverage,
}

pub fn notional_value(size: SignedSize, price: Price) -> Amount {
    Amount::new(size.abs() * price.value())
}

pub fn effective_max_leverage(notional: Amount, params: &MarginParams) -> Leverage {
    let tiered = params
        .leverage_tiers
        .iter()
        .find(|tier| notional <= tier.max_notional)
        .or(params.leverage_tiers.last())
        .map(|t| t.max_leverage)
        .unwrap_or(params.max_leverage);

    if tiered.value() > params.max_leverage.value() {
        params.max_leverage
    } else {
        tiered
    }
}

pub fn calculate_margin_requirement(
    size: SignedSize,
    mark_price: Price,
    params: &MarginParams,
) -> MarginRequirement {
    let notional = notional_value(size, mark_price);
    let effective_leverage = effective_max_leverage(notional, params);

    let im_fraction = effective_leverage.initial_margin_fraction();
    let initial = notional.mul(im_fraction);
    let maintenance = initial.mul(params.maintenance_margin_ratio);

    MarginRequirement {
        initial,
        maintenance,
        effective_leverage,
    }
}

/// Margin ratio below which a position of this notional is at risk.
pub fn maintenance_fraction(notional: Amount, params: &MarginParams) -> Decimal {
    effective_max_leverage(notional, params).initial_margin_fraction() * params.maintenance_margin_ratio
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MarginStatus {
    Healthy,
    Warning,
    AtRisk,
}

pub fn evaluate_margin_status(equity: Amount, margin_req: &MarginRequirement) -> MarginStatus {
    if equity >= margin_req.initial {
        MarginStatus::Healthy
    } else if equity >= margin_req.maintenance {
        MarginStatus::Warning
    } else {
        MarginStatus::AtRisk
    }
}

pub fn margin_ratio(equity: Amount, notional: Amount) -> Decimal {
    if notional.value().is_zero() {
        return Decimal::MAX;
    }
    equity.value() / notional.value()
}

/// Equity available above initial margin.
pub fn free_margin(equity: Amount, margin_used: Amount) -> Amount {
    equity.sub(margin_used)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn test_params() -> MarginParams {
        MarginParams::default()
    }

    #[test]
    fn notional_calculation() {
        let size = SignedSize::new(dec!(-1));
        let price = Price::new_unchecked(dec!(50000));
        assert_eq!(notional_value(size, price).value(), dec!(50000));
    }

    #[test]
    fn margin_in_first_tier() {
        let size = SignedSize::new(dec!(1));
        let price = Price::new_unchecked(dec!(50000));

        let req = calculate_margin_requirement(size, price, &test_params());

        // 50k notional / 20x = 2.5k initial margin
        assert_eq!(req.initial.value(), dec!(2500));
        // 2.5k * 0.5 = 1.25k maintenance
        assert_eq!(req.maintenance.value(), dec!(1250));
        assert_eq!(req.effective_leverage.value(), dec!(20));
    }

    #[test]
    fn leverage_capped_by_tier() {
        let size = SignedSize::new(dec!(100));
        let price = Price::new_unchecked(dec!(50000)); // $5M notional

        let req = calculate_margin_requirement(size, price, &test_params());

        // $5M falls in the 2M-10M tier, max 2x
        assert_eq!(req.effective_leverage.value(), dec!(2));
        assert_eq!(req.initial.value(), dec!(2_500_000));
    }

    #[test]
    fn beyond_last_tier_uses_last_tier() {
        let notional = Amount::new(dec!(50_000_000));
        assert_eq!(effective_max_leverage(notional, &test_params()).value(), dec!(2));
    }

    #[test]
    fn maintenance_fraction_scales_with_tier() {
        let params = test_params();
        assert_eq!(maintenance_fraction(Amount::new(dec!(1000)), &params), dec!(0.025));
        assert_eq!(maintenance_fraction(Amount::new(dec!(200_000)), &params), dec!(0.05));
    }

    #[test]
    fn margin_status_levels() {
        let size = SignedSize::new(dec!(1));
        let price = Price::new_unchecked(dec!(50000));
        let req = calculate_margin_requirement(size, price, &test_params());

        assert_eq!(evaluate_margin_status(Amount::new(dec!(5000)), &req), MarginStatus::Healthy);
        assert_eq!(evaluate_margin_status(Amount::new(dec!(2000)), &req), MarginStatus::Warning);
        assert_eq!(evaluate_margin_status(Amount::new(dec!(1000)), &req), MarginStatus::AtRisk);
    }

    #[test]
    fn margin_ratio_calculation() {
        let ratio = margin_ratio(Amount::new(dec!(5000)), Amount::new(dec!(50000)));
        assert_eq!(ratio, dec!(0.1));
        assert_eq!(margin_ratio(Amount::new(dec!(1)), Amount::zero()), Decimal::MAX);
    }

    #[test]
    fn free_margin_calculation() {
        let free = free_margin(Amount::new(dec!(10000)), Amount::new(dec!(5000)));
        assert_eq!(free.value(), dec!(5000));
    }
}
