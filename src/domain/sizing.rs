//! Default position sizing.

use super::signal::SignalStrength;
use crate::ports::risk_port::{RiskPort, SizingRejection, SizingRequest};

#[derive(Debug, Clone, PartialEq)]
pub struct SizingConfig {
    /// Total trading capital.
    pub capital: f64,
    /// Largest share of capital a single position may take, in percent.
    pub max_position_pct: f64,
    pub max_positions: usize,
    pub buy_scale: f64,
    pub strong_buy_scale: f64,
}

impl Default for SizingConfig {
    fn default() -> Self {
        SizingConfig {
            capital: 0.0,
            max_position_pct: 50.0,
            max_positions: 2,
            buy_scale: 0.75,
            strong_buy_scale: 1.0,
        }
    }
}

/// Sizes an entry as a fraction of capital, scaled by signal strength and
/// capped by what is still available.
#[derive(Debug, Clone)]
pub struct FractionalSizer {
    config: SizingConfig,
}

impl FractionalSizer {
    pub fn new(config: SizingConfig) -> Self {
        FractionalSizer { config }
    }

    pub fn config(&self) -> &SizingConfig {
        &self.config
    }

    fn scale(&self, strength: SignalStrength) -> f64 {
        match strength {
            SignalStrength::Buy => self.config.buy_scale,
            SignalStrength::StrongBuy => self.config.strong_buy_scale,
        }
    }
}

impl RiskPort for FractionalSizer {
    fn size_for(&self, request: &SizingRequest<'_>) -> Result<i64, SizingRejection> {
        if request.open_positions >= self.config.max_positions {
            return Err(SizingRejection::MaxPositions(self.config.max_positions));
        }
        if request.price.is_nan() || request.price <= 0.0 {
            return Err(SizingRejection::InvalidPrice(request.price));
        }
        if request.available_capital < request.price {
            return Err(SizingRejection::InsufficientCapital {
                available: request.available_capital,
                price: request.price,
            });
        }

        let per_position = self.config.capital * self.config.max_position_pct / 100.0;
        let budget = (per_position * self.scale(request.strength)).min(request.available_capital);
        let quantity = (budget / request.price).floor() as i64;

        // Capital covers one unit even if the scaled budget does not.
        Ok(quantity.max(1))
    }
}
