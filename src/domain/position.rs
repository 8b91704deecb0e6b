//! Position tracking and lifecycle state.
//!
//! Identity fields (`entry_price`, `entry_time`, `bot_entered`) are private and
//! set only by the two constructors, so they cannot change after creation.
//! `highest_price_seen` and `realized_partial_quantity` are private too: the
//! only ways to move them are [`Position::refresh_price`] and
//! [`Position::apply_exit_fill`], which keep them monotonic.

use chrono::{DateTime, Utc};
use std::fmt;
use std::str::FromStr;

use super::error::TradexError;
use super::order::{BrokerErrorCode, ExitKind, ExitOrder};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PositionState {
    Open,
    PartiallyExited,
    PendingClose,
    Closed,
}

impl PositionState {
    pub fn as_str(self) -> &'static str {
        match self {
            PositionState::Open => "OPEN",
            PositionState::PartiallyExited => "PARTIALLY_EXITED",
            PositionState::PendingClose => "PENDING_CLOSE",
            PositionState::Closed => "CLOSED",
        }
    }

    /// Holding units and not waiting on an exit order.
    pub fn is_active(self) -> bool {
        matches!(self, PositionState::Open | PositionState::PartiallyExited)
    }
}

impl fmt::Display for PositionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PositionState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "OPEN" => Ok(PositionState::Open),
            "PARTIALLY_EXITED" => Ok(PositionState::PartiallyExited),
            "PENDING_CLOSE" => Ok(PositionState::PendingClose),
            "CLOSED" => Ok(PositionState::Closed),
            other => Err(format!("unknown position state '{other}'")),
        }
    }
}

/// An exit order submitted to the broker but not yet confirmed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InFlightExit {
    pub order: ExitOrder,
    pub prior_state: PositionState,
    pub cycles_waiting: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Position {
    pub symbol: String,
    pub quantity: i64,
    pub initial_quantity: i64,
    entry_price: f64,
    entry_time: DateTime<Utc>,
    bot_entered: bool,
    highest_price_seen: f64,
    pub last_price: f64,
    realized_partial_quantity: i64,
    pub realized_pnl: f64,
    pub state: PositionState,
    pub last_order_error: Option<BrokerErrorCode>,
    pub in_flight: Option<InFlightExit>,
    /// Exit rejected with a retry-verbatim code, to be resubmitted unchanged.
    pub deferred: Option<ExitOrder>,
}

/// Flat persisted form of a [`Position`].
#[derive(Debug, Clone, PartialEq)]
pub struct PositionRecord {
    pub symbol: String,
    pub quantity: i64,
    pub initial_quantity: i64,
    pub entry_price: f64,
    pub entry_time: DateTime<Utc>,
    pub bot_entered: bool,
    pub highest_price_seen: f64,
    pub last_price: f64,
    pub realized_partial_quantity: i64,
    pub realized_pnl: f64,
    pub state: PositionState,
    pub last_order_error: Option<BrokerErrorCode>,
    pub in_flight: Option<InFlightExit>,
    pub deferred: Option<ExitOrder>,
}

impl Position {
    /// A position opened by a confirmed fill of this bot's own order.
    pub fn bot_entered(symbol: &str, quantity: i64, price: f64, time: DateTime<Utc>) -> Self {
        Self::new(symbol, quantity, price, time, true)
    }

    /// A holding the bot found at the broker but did not place.
    pub fn external(symbol: &str, quantity: i64, avg_price: f64, time: DateTime<Utc>) -> Self {
        Self::new(symbol, quantity, avg_price, time, false)
    }

    fn new(symbol: &str, quantity: i64, price: f64, time: DateTime<Utc>, bot: bool) -> Self {
        Position {
            symbol: symbol.to_string(),
            quantity,
            initial_quantity: quantity,
            entry_price: price,
            entry_time: time,
            bot_entered: bot,
            highest_price_seen: price,
            last_price: price,
            realized_partial_quantity: 0,
            realized_pnl: 0.0,
            state: PositionState::Open,
            last_order_error: None,
            in_flight: None,
            deferred: None,
        }
    }

    pub fn from_record(record: PositionRecord) -> Self {
        Position {
            symbol: record.symbol,
            quantity: record.quantity,
            initial_quantity: record.initial_quantity,
            entry_price: record.entry_price,
            entry_time: record.entry_time,
            bot_entered: record.bot_entered,
            highest_price_seen: record.highest_price_seen,
            last_price: record.last_price,
            realized_partial_quantity: record.realized_partial_quantity,
            realized_pnl: record.realized_pnl,
            state: record.state,
            last_order_error: record.last_order_error,
            in_flight: record.in_flight,
            deferred: record.deferred,
        }
    }

    pub fn to_record(&self) -> PositionRecord {
        PositionRecord {
            symbol: self.symbol.clone(),
            quantity: self.quantity,
            initial_quantity: self.initial_quantity,
            entry_price: self.entry_price,
            entry_time: self.entry_time,
            bot_entered: self.bot_entered,
            highest_price_seen: self.highest_price_seen,
            last_price: self.last_price,
            realized_partial_quantity: self.realized_partial_quantity,
            realized_pnl: self.realized_pnl,
            state: self.state,
            last_order_error: self.last_order_error.clone(),
            in_flight: self.in_flight,
            deferred: self.deferred,
        }
    }

    pub fn entry_price(&self) -> f64 {
        self.entry_price
    }

    pub fn entry_time(&self) -> DateTime<Utc> {
        self.entry_time
    }

    pub fn is_bot_entered(&self) -> bool {
        self.bot_entered
    }

    pub fn highest_price_seen(&self) -> f64 {
        self.highest_price_seen
    }

    pub fn realized_partial_quantity(&self) -> i64 {
        self.realized_partial_quantity
    }

    pub fn has_partial_exit(&self) -> bool {
        self.realized_partial_quantity > 0
    }

    pub fn market_value(&self) -> f64 {
        self.quantity as f64 * self.last_price
    }

    pub fn cost_basis(&self) -> f64 {
        self.quantity as f64 * self.entry_price
    }

    pub fn unrealized_pnl(&self) -> f64 {
        self.quantity as f64 * (self.last_price - self.entry_price)
    }

    /// Unrealized gain as a percentage of entry price.
    pub fn unrealized_pct(&self) -> f64 {
        if self.entry_price == 0.0 {
            return 0.0;
        }
        (self.last_price - self.entry_price) / self.entry_price * 100.0
    }

    /// Record the latest observed price. The high-water mark only moves up,
    /// and stops moving once the position is closed.
    pub fn refresh_price(&mut self, price: f64) {
        self.last_price = price;
        if self.state != PositionState::Closed && price > self.highest_price_seen {
            self.highest_price_seen = price;
        }
    }

    /// Issue the capability the executor requires for any sell. Only
    /// bot-entered positions holding enough units can get one.
    pub fn exit_ticket(&self, order: ExitOrder) -> Result<ExitTicket, TradexError> {
        if !self.bot_entered {
            return Err(TradexError::InvariantViolation {
                symbol: self.symbol.clone(),
                reason: "exit requested for an externally held position".into(),
            });
        }
        if order.quantity <= 0 || order.quantity > self.quantity {
            return Err(TradexError::InvariantViolation {
                symbol: self.symbol.clone(),
                reason: format!(
                    "exit quantity {} outside held quantity {}",
                    order.quantity, self.quantity
                ),
            });
        }
        Ok(ExitTicket {
            symbol: self.symbol.clone(),
            order,
        })
    }

    /// Apply a confirmed sell fill.
    pub fn apply_exit_fill(
        &mut self,
        order: &ExitOrder,
        price: f64,
        filled: i64,
    ) -> Result<(), TradexError> {
        if filled <= 0 || filled > self.quantity {
            return Err(TradexError::InvariantViolation {
                symbol: self.symbol.clone(),
                reason: format!("fill of {filled} against held quantity {}", self.quantity),
            });
        }

        self.quantity -= filled;
        self.realized_pnl += filled as f64 * (price - self.entry_price);
        self.last_price = price;
        self.in_flight = None;
        self.deferred = None;
        self.last_order_error = None;

        if self.quantity == 0 {
            self.state = PositionState::Closed;
            return Ok(());
        }

        match order.kind {
            ExitKind::Partial => {
                self.realized_partial_quantity += filled;
                self.state = PositionState::PartiallyExited;
            }
            ExitKind::Full => {
                // Short fill on a full exit: keep the remainder in its prior lifecycle state.
                self.state = if self.has_partial_exit() {
                    PositionState::PartiallyExited
                } else {
                    PositionState::Open
                };
            }
        }
        Ok(())
    }

    pub fn begin_pending_exit(&mut self, order: ExitOrder) {
        self.in_flight = Some(InFlightExit {
            order,
            prior_state: self.state,
            cycles_waiting: 0,
        });
        self.deferred = None;
        self.state = PositionState::PendingClose;
    }

    /// Undo a pending exit that never confirmed.
    pub fn revert_pending_exit(&mut self, error: BrokerErrorCode) {
        if let Some(in_flight) = self.in_flight.take() {
            self.state = in_flight.prior_state;
        }
        self.last_order_error = Some(error);
    }

    pub fn record_rejection(&mut self, error: BrokerErrorCode, deferred: Option<ExitOrder>) {
        self.last_order_error = Some(error);
        self.deferred = deferred;
    }
}

/// Permission to sell, held only for bot-entered positions.
///
/// The executor's exit path takes a ticket rather than a bare symbol, so an
/// order for an external holding cannot be expressed.
#[derive(Debug, Clone, PartialEq)]
pub struct ExitTicket {
    symbol: String,
    order: ExitOrder,
}

impl ExitTicket {
    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn order(&self) -> &ExitOrder {
        &self.order
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::order::ExitReason;
    use chrono::TimeZone;

    fn entry_time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 2, 4, 0, 0).unwrap()
    }

    fn sample_position() -> Position {
        Position::bot_entered("GOLDBEES-EQ", 10, 100.0, entry_time())
    }

    fn partial(quantity: i64) -> ExitOrder {
        ExitOrder {
            kind: ExitKind::Partial,
            quantity,
            reason: ExitReason::PartialTarget,
        }
    }

    fn full(quantity: i64) -> ExitOrder {
        ExitOrder {
            kind: ExitKind::Full,
            quantity,
            reason: ExitReason::TargetHit,
        }
    }

    #[test]
    fn new_position_starts_open_at_entry() {
        let pos = sample_position();
        assert_eq!(pos.state, PositionState::Open);
        assert!(pos.is_bot_entered());
        assert_eq!(pos.highest_price_seen(), 100.0);
        assert_eq!(pos.realized_partial_quantity(), 0);
    }

    #[test]
    fn highest_price_never_decreases() {
        let mut pos = sample_position();
        pos.refresh_price(105.0);
        pos.refresh_price(102.0);
        assert_eq!(pos.highest_price_seen(), 105.0);
        assert_eq!(pos.last_price, 102.0);
    }

    #[test]
    fn unrealized_pnl_and_pct() {
        let mut pos = sample_position();
        pos.refresh_price(104.0);
        assert!((pos.unrealized_pnl() - 40.0).abs() < 1e-9);
        assert!((pos.unrealized_pct() - 4.0).abs() < 1e-9);
    }

    #[test]
    fn external_position_cannot_get_ticket() {
        let pos = Position::external("NIFTYBEES-EQ", 5, 250.0, entry_time());
        let err = pos.exit_ticket(full(5)).unwrap_err();
        assert!(err.is_fatal());
    }

    #[test]
    fn ticket_rejects_oversized_exit() {
        let pos = sample_position();
        assert!(pos.exit_ticket(full(11)).is_err());
        let ticket = pos.exit_ticket(full(10)).unwrap();
        assert_eq!(ticket.symbol(), "GOLDBEES-EQ");
        assert_eq!(ticket.order().quantity, 10);
    }

    #[test]
    fn partial_fill_moves_to_partially_exited() {
        let mut pos = sample_position();
        pos.apply_exit_fill(&partial(5), 104.0, 5).unwrap();
        assert_eq!(pos.quantity, 5);
        assert_eq!(pos.realized_partial_quantity(), 5);
        assert_eq!(pos.state, PositionState::PartiallyExited);
        assert!((pos.realized_pnl - 20.0).abs() < 1e-9);
    }

    #[test]
    fn full_fill_closes_with_zero_quantity() {
        let mut pos = sample_position();
        pos.apply_exit_fill(&full(10), 108.0, 10).unwrap();
        assert_eq!(pos.quantity, 0);
        assert_eq!(pos.state, PositionState::Closed);
    }

    #[test]
    fn overfill_is_an_invariant_violation() {
        let mut pos = sample_position();
        assert!(pos.apply_exit_fill(&full(10), 108.0, 11).is_err());
        assert_eq!(pos.quantity, 10);
    }

    #[test]
    fn pending_exit_reverts_to_prior_state() {
        let mut pos = sample_position();
        pos.apply_exit_fill(&partial(5), 104.0, 5).unwrap();
        pos.begin_pending_exit(full(5));
        assert_eq!(pos.state, PositionState::PendingClose);
        pos.revert_pending_exit(BrokerErrorCode::Unconfirmed);
        assert_eq!(pos.state, PositionState::PartiallyExited);
        assert_eq!(pos.last_order_error, Some(BrokerErrorCode::Unconfirmed));
        assert!(pos.in_flight.is_none());
    }

    #[test]
    fn closed_position_stops_tracking_highs() {
        let mut pos = sample_position();
        pos.apply_exit_fill(&full(10), 108.0, 10).unwrap();
        pos.refresh_price(120.0);
        assert_eq!(pos.highest_price_seen(), 100.0);
    }

    #[test]
    fn record_round_trip_preserves_identity() {
        let mut pos = sample_position();
        pos.refresh_price(107.0);
        pos.record_rejection(BrokerErrorCode::AuthorizationPending, Some(full(10)));
        assert_eq!(Position::from_record(pos.to_record()), pos);
    }

    #[test]
    fn state_names_parse() {
        for state in [
            PositionState::Open,
            PositionState::PartiallyExited,
            PositionState::PendingClose,
            PositionState::Closed,
        ] {
            assert_eq!(state.as_str().parse::<PositionState>(), Ok(state));
        }
    }
}
