//! Order vocabulary shared by the executor, the broker port and the ledger.
//!
//! Broker error codes form a closed set. Each code declares exactly one
//! [`Recovery`] action, matched exhaustively, so adding a code forces a
//! decision about how it is handled.

use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    pub fn as_str(self) -> &'static str {
        match self {
            Side::Buy => "BUY",
            Side::Sell => "SELL",
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OrderType {
    Market,
    Limit,
}

impl fmt::Display for OrderType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrderType::Market => f.write_str("MARKET"),
            OrderType::Limit => f.write_str("LIMIT"),
        }
    }
}

/// What the controller asks the executor to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OrderAction {
    Enter,
    PartialExit,
    FullExit,
}

impl OrderAction {
    pub fn side(self) -> Side {
        match self {
            OrderAction::Enter => Side::Buy,
            OrderAction::PartialExit | OrderAction::FullExit => Side::Sell,
        }
    }
}

impl fmt::Display for OrderAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrderAction::Enter => f.write_str("ENTER"),
            OrderAction::PartialExit => f.write_str("PARTIAL_EXIT"),
            OrderAction::FullExit => f.write_str("FULL_EXIT"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrderRequest {
    pub symbol: String,
    pub side: Side,
    pub quantity: i64,
    pub order_type: OrderType,
    pub limit_price: Option<f64>,
}

impl OrderRequest {
    pub fn market(symbol: &str, side: Side, quantity: i64) -> Self {
        OrderRequest {
            symbol: symbol.to_string(),
            side,
            quantity,
            order_type: OrderType::Market,
            limit_price: None,
        }
    }

    pub fn limit(symbol: &str, side: Side, quantity: i64, price: f64) -> Self {
        OrderRequest {
            symbol: symbol.to_string(),
            side,
            quantity,
            order_type: OrderType::Limit,
            limit_price: Some(price),
        }
    }
}

/// Declared recovery for a broker error code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recovery {
    /// Retry once, immediately, as a limit order priced through the reference.
    LimitFallback,
    /// Leave everything unchanged and submit the identical order next cycle.
    RetryVerbatimNextCycle,
    /// Give up for this cycle; the next cycle decides afresh.
    Terminal,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum BrokerErrorCode {
    /// AB4036: market orders not allowed for a cautionary-listed instrument.
    CautionaryListing,
    /// AB1007: delivery (EDIS) authorization pending.
    AuthorizationPending,
    /// AB1019: trading symbol does not match the instrument token.
    SymbolMismatch,
    /// AG8001: session token invalid or expired.
    InvalidSession,
    Disconnected,
    /// A pending order that the broker never confirmed in time.
    Unconfirmed,
    Other(String),
}

impl BrokerErrorCode {
    pub fn from_raw(raw: &str) -> Self {
        match raw.trim().to_uppercase().as_str() {
            "AB4036" => BrokerErrorCode::CautionaryListing,
            "AB1007" => BrokerErrorCode::AuthorizationPending,
            "AB1019" => BrokerErrorCode::SymbolMismatch,
            "AG8001" => BrokerErrorCode::InvalidSession,
            "DISCONNECTED" => BrokerErrorCode::Disconnected,
            "UNCONFIRMED" => BrokerErrorCode::Unconfirmed,
            _ => BrokerErrorCode::Other(raw.trim().to_string()),
        }
    }

    pub fn raw(&self) -> &str {
        match self {
            BrokerErrorCode::CautionaryListing => "AB4036",
            BrokerErrorCode::AuthorizationPending => "AB1007",
            BrokerErrorCode::SymbolMismatch => "AB1019",
            BrokerErrorCode::InvalidSession => "AG8001",
            BrokerErrorCode::Disconnected => "DISCONNECTED",
            BrokerErrorCode::Unconfirmed => "UNCONFIRMED",
            BrokerErrorCode::Other(code) => code,
        }
    }

    pub fn explanation(&self) -> &'static str {
        match self {
            BrokerErrorCode::CautionaryListing => {
                "instrument is under cautionary listing; market orders are not allowed"
            }
            BrokerErrorCode::AuthorizationPending => {
                "delivery authorization (EDIS) pending; authorize holdings with the broker"
            }
            BrokerErrorCode::SymbolMismatch => "trading symbol does not match instrument token",
            BrokerErrorCode::InvalidSession => "broker session invalid or expired; log in again",
            BrokerErrorCode::Disconnected => "broker connection unavailable",
            BrokerErrorCode::Unconfirmed => "order was not confirmed by the broker in time",
            BrokerErrorCode::Other(_) => "unrecognized broker rejection",
        }
    }

    pub fn recovery(&self) -> Recovery {
        match self {
            BrokerErrorCode::CautionaryListing => Recovery::LimitFallback,
            BrokerErrorCode::AuthorizationPending => Recovery::RetryVerbatimNextCycle,
            BrokerErrorCode::SymbolMismatch
            | BrokerErrorCode::InvalidSession
            | BrokerErrorCode::Disconnected
            | BrokerErrorCode::Unconfirmed
            | BrokerErrorCode::Other(_) => Recovery::Terminal,
        }
    }
}

impl fmt::Display for BrokerErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.raw())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BrokerRejection {
    pub code: BrokerErrorCode,
    pub message: String,
}

impl BrokerRejection {
    pub fn new(code: BrokerErrorCode, message: impl Into<String>) -> Self {
        BrokerRejection {
            code,
            message: message.into(),
        }
    }
}

impl fmt::Display for BrokerRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {} ({})", self.code, self.code.explanation(), self.message)
    }
}

/// Result of a single order placement, and of an executor run.
#[derive(Debug, Clone, PartialEq)]
pub enum OrderOutcome {
    Filled { price: f64, quantity: i64 },
    Pending,
    Rejected(BrokerRejection),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExitReason {
    StopLoss,
    TrailingStop,
    TargetHit,
    PartialTarget,
    TrendReversal,
}

impl ExitReason {
    pub fn as_str(self) -> &'static str {
        match self {
            ExitReason::StopLoss => "STOP_LOSS",
            ExitReason::TrailingStop => "TRAILING_STOP",
            ExitReason::TargetHit => "TARGET_HIT",
            ExitReason::PartialTarget => "PARTIAL_TARGET",
            ExitReason::TrendReversal => "TREND_REVERSAL",
        }
    }
}

impl fmt::Display for ExitReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExitReason {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "STOP_LOSS" => Ok(ExitReason::StopLoss),
            "TRAILING_STOP" => Ok(ExitReason::TrailingStop),
            "TARGET_HIT" => Ok(ExitReason::TargetHit),
            "PARTIAL_TARGET" => Ok(ExitReason::PartialTarget),
            "TREND_REVERSAL" => Ok(ExitReason::TrendReversal),
            other => Err(format!("unknown exit reason '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExitKind {
    Partial,
    Full,
}

impl ExitKind {
    pub fn action(self) -> OrderAction {
        match self {
            ExitKind::Partial => OrderAction::PartialExit,
            ExitKind::Full => OrderAction::FullExit,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ExitKind::Partial => "PARTIAL",
            ExitKind::Full => "FULL",
        }
    }
}

impl FromStr for ExitKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PARTIAL" => Ok(ExitKind::Partial),
            "FULL" => Ok(ExitKind::Full),
            other => Err(format!("unknown exit kind '{other}'")),
        }
    }
}

/// A concrete exit: how many units to sell and why.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExitOrder {
    pub kind: ExitKind,
    pub quantity: i64,
    pub reason: ExitReason,
}
