//! Brokerage port trait.
//!
//! Rejections come back as `OrderOutcome::Rejected`, not as errors. `Err` is
//! reserved for failures to talk to the broker at all.

use crate::domain::error::TradexError;
use crate::domain::order::{OrderOutcome, OrderRequest};

#[derive(Debug, Clone, PartialEq)]
pub struct Holding {
    pub symbol: String,
    pub quantity: i64,
    pub avg_price: f64,
}

pub trait BrokerPort {
    fn get_holdings(&self) -> Result<Vec<Holding>, TradexError>;

    fn place_order(&self, request: &OrderRequest) -> OrderOutcome;

    fn is_connected(&self) -> bool;
}
