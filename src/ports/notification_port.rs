//! Notification sink port trait.

use crate::domain::error::TradexError;
use crate::domain::event::TradeEvent;

pub trait NotificationPort {
    /// Deliver one event. Callers log and drop any error.
    fn notify(&self, event: &TradeEvent) -> Result<(), TradexError>;
}
