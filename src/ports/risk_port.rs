//! Risk / position sizing port trait.

use crate::domain::signal::SignalStrength;

#[derive(Debug, Clone, PartialEq)]
pub struct SizingRequest<'a> {
    pub symbol: &'a str,
    pub strength: SignalStrength,
    pub price: f64,
    pub available_capital: f64,
    /// Bot positions currently held or pending entry.
    pub open_positions: usize,
}

/// Why an entry was refused.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SizingRejection {
    #[error("max positions reached ({0})")]
    MaxPositions(usize),

    #[error("insufficient capital: {available:.2} available, one unit costs {price:.2}")]
    InsufficientCapital { available: f64, price: f64 },

    #[error("invalid price {0}")]
    InvalidPrice(f64),
}

pub trait RiskPort {
    fn size_for(&self, request: &SizingRequest<'_>) -> Result<i64, SizingRejection>;
}
