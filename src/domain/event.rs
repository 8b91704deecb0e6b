//! Trade lifecycle events published to notification sinks.

use chrono::{DateTime, Utc};
use std::fmt;

use super::order::{BrokerErrorCode, ExitReason, OrderAction};
use super::signal::SignalStrength;

#[derive(Debug, Clone, PartialEq)]
pub enum TradeEvent {
    Entered {
        symbol: String,
        quantity: i64,
        price: f64,
        strength: SignalStrength,
        reasons: Vec<String>,
    },
    PartialExit {
        symbol: String,
        quantity: i64,
        price: f64,
        remaining: i64,
        pnl: f64,
    },
    Closed {
        symbol: String,
        quantity: i64,
        price: f64,
        reason: ExitReason,
        pnl: f64,
    },
    OrderPending {
        symbol: String,
        action: OrderAction,
        quantity: i64,
    },
    OrderRejected {
        symbol: String,
        action: OrderAction,
        code: BrokerErrorCode,
        message: String,
    },
    AuthorizationPending {
        symbol: String,
        quantity: i64,
    },
    ExternalDetected {
        symbol: String,
        quantity: i64,
        avg_price: f64,
    },
    PositionRemoved {
        symbol: String,
    },
    MarketOpened {
        at: DateTime<Utc>,
    },
    MarketClosed {
        at: DateTime<Utc>,
    },
    CycleCompleted {
        cycle: u64,
        evaluated: usize,
        skipped: usize,
        orders: usize,
    },
}

impl TradeEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            TradeEvent::Entered { .. } => "ENTERED",
            TradeEvent::PartialExit { .. } => "PARTIAL_EXIT",
            TradeEvent::Closed { .. } => "CLOSED",
            TradeEvent::OrderPending { .. } => "ORDER_PENDING",
            TradeEvent::OrderRejected { .. } => "ORDER_REJECTED",
            TradeEvent::AuthorizationPending { .. } => "AUTHORIZATION_PENDING",
            TradeEvent::ExternalDetected { .. } => "EXTERNAL_DETECTED",
            TradeEvent::PositionRemoved { .. } => "POSITION_REMOVED",
            TradeEvent::MarketOpened { .. } => "MARKET_OPENED",
            TradeEvent::MarketClosed { .. } => "MARKET_CLOSED",
            TradeEvent::CycleCompleted { .. } => "CYCLE_COMPLETED",
        }
    }

    pub fn symbol(&self) -> Option<&str> {
        match self {
            TradeEvent::Entered { symbol, .. }
            | TradeEvent::PartialExit { symbol, .. }
            | TradeEvent::Closed { symbol, .. }
            | TradeEvent::OrderPending { symbol, .. }
            | TradeEvent::OrderRejected { symbol, .. }
            | TradeEvent::AuthorizationPending { symbol, .. }
            | TradeEvent::ExternalDetected { symbol, .. }
            | TradeEvent::PositionRemoved { symbol } => Some(symbol),
            TradeEvent::MarketOpened { .. }
            | TradeEvent::MarketClosed { .. }
            | TradeEvent::CycleCompleted { .. } => None,
        }
    }

    /// Fills and rejections: the events worth keeping in a trade journal.
    pub fn is_trade(&self) -> bool {
        matches!(
            self,
            TradeEvent::Entered { .. }
                | TradeEvent::PartialExit { .. }
                | TradeEvent::Closed { .. }
                | TradeEvent::OrderRejected { .. }
                | TradeEvent::AuthorizationPending { .. }
        )
    }
}

impl fmt::Display for TradeEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TradeEvent::Entered {
                symbol,
                quantity,
                price,
                strength,
                reasons,
            } => write!(
                f,
                "{strength} {symbol}: bought {quantity} @ {price:.2} ({})",
                reasons.join(", ")
            ),
            TradeEvent::PartialExit {
                symbol,
                quantity,
                price,
                remaining,
                pnl,
            } => write!(
                f,
                "partial exit {symbol}: sold {quantity} @ {price:.2}, {remaining} left, P&L {pnl:+.2}"
            ),
            TradeEvent::Closed {
                symbol,
                quantity,
                price,
                reason,
                pnl,
            } => write!(
                f,
                "closed {symbol} ({reason}): sold {quantity} @ {price:.2}, P&L {pnl:+.2}"
            ),
            TradeEvent::OrderPending {
                symbol,
                action,
                quantity,
            } => write!(f, "{action} {symbol} x{quantity} pending confirmation"),
            TradeEvent::OrderRejected {
                symbol,
                action,
                code,
                message,
            } => write!(
                f,
                "{action} {symbol} rejected [{code}] {}: {message}",
                code.explanation()
            ),
            TradeEvent::AuthorizationPending { symbol, quantity } => write!(
                f,
                "sell {symbol} x{quantity} waiting on delivery authorization; retrying next cycle"
            ),
            TradeEvent::ExternalDetected {
                symbol,
                quantity,
                avg_price,
            } => write!(
                f,
                "external holding {symbol} x{quantity} @ {avg_price:.2} (monitor only)"
            ),
            TradeEvent::PositionRemoved { symbol } => {
                write!(f, "{symbol} no longer held at broker; removed from ledger")
            }
            TradeEvent::MarketOpened { at } => write!(f, "market opened ({at})"),
            TradeEvent::MarketClosed { at } => write!(f, "market closed ({at})"),
            TradeEvent::CycleCompleted {
                cycle,
                evaluated,
                skipped,
                orders,
            } => write!(
                f,
                "cycle {cycle}: {evaluated} evaluated, {skipped} skipped, {orders} orders"
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejection_text_names_code_and_explanation() {
        let event = TradeEvent::OrderRejected {
            symbol: "GOLDBEES-EQ".into(),
            action: OrderAction::FullExit,
            code: BrokerErrorCode::CautionaryListing,
            message: "RMS:Rule: market order not allowed".into(),
        };
        let text = event.to_string();
        assert!(text.contains("[AB4036]"));
        assert!(text.contains("cautionary"));
        assert_eq!(event.symbol(), Some("GOLDBEES-EQ"));
        assert!(event.is_trade());
    }

    #[test]
    fn cycle_event_has_no_symbol() {
        let event = TradeEvent::CycleCompleted {
            cycle: 3,
            evaluated: 2,
            skipped: 1,
            orders: 0,
        };
        assert_eq!(event.symbol(), None);
        assert_eq!(event.kind(), "CYCLE_COMPLETED");
        assert!(!event.is_trade());
    }
}
