//! Durable storage for the position ledger.

use crate::domain::error::TradexError;
use crate::domain::ledger::PositionLedger;

pub trait LedgerStorePort {
    /// Load the last saved ledger; an empty store yields an empty ledger.
    fn load(&self) -> Result<PositionLedger, TradexError>;

    /// Replace the stored snapshot with `ledger`.
    fn save(&self, ledger: &PositionLedger) -> Result<(), TradexError>;
}
