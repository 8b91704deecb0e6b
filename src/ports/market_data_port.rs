//! Market-data feed port trait.

use crate::domain::error::TradexError;
use crate::domain::snapshot::IndicatorSnapshot;

pub trait MarketDataPort {
    /// Latest indicator snapshot for `symbol`.
    ///
    /// `TradexError::DataUnavailable` means "skip this symbol this cycle".
    /// Must be safe to call repeatedly.
    fn get_snapshot(&self, symbol: &str) -> Result<IndicatorSnapshot, TradexError>;
}
