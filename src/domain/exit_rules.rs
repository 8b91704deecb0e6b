//! Exit decisions for a bot-held position.
//!
//! Checked in order, first match wins: fixed stop-loss, trailing stop, full
//! target, partial target, then an explicit SELL signal.

use std::fmt;
use std::str::FromStr;

use super::order::{ExitKind, ExitOrder, ExitReason};
use super::position::Position;
use super::signal::Signal;

/// How the fixed-percentage and ATR trailing stops combine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrailingMode {
    /// The larger trailing distance wins (lower stop).
    Wider,
    /// The smaller trailing distance wins (higher stop).
    Tighter,
    /// ATR is ignored.
    Fixed,
}

impl fmt::Display for TrailingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrailingMode::Wider => f.write_str("wider"),
            TrailingMode::Tighter => f.write_str("tighter"),
            TrailingMode::Fixed => f.write_str("fixed"),
        }
    }
}

impl FromStr for TrailingMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "wider" => Ok(TrailingMode::Wider),
            "tighter" => Ok(TrailingMode::Tighter),
            "fixed" => Ok(TrailingMode::Fixed),
            other => Err(format!(
                "unknown trailing mode '{other}' (expected wider, tighter or fixed)"
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExitConfig {
    pub stop_loss_pct: f64,
    pub target_pct: f64,
    pub trailing_stop_pct: f64,
    pub atr_multiplier: f64,
    /// Fraction of the held quantity sold by the partial exit.
    pub partial_exit_fraction: f64,
    /// Fraction of the target gain at which the partial exit fires.
    pub partial_trigger_ratio: f64,
    pub trailing_mode: TrailingMode,
}

impl Default for ExitConfig {
    fn default() -> Self {
        ExitConfig {
            stop_loss_pct: 5.0,
            target_pct: 8.0,
            trailing_stop_pct: 3.0,
            atr_multiplier: 2.0,
            partial_exit_fraction: 0.5,
            partial_trigger_ratio: 0.5,
            trailing_mode: TrailingMode::Wider,
        }
    }
}

pub fn stop_loss_price(entry_price: f64, config: &ExitConfig) -> f64 {
    entry_price - entry_price * config.stop_loss_pct / 100.0
}

pub fn target_price(entry_price: f64, config: &ExitConfig) -> f64 {
    entry_price + entry_price * config.target_pct / 100.0
}

pub fn partial_trigger_price(entry_price: f64, config: &ExitConfig) -> f64 {
    entry_price + entry_price * config.target_pct * config.partial_trigger_ratio / 100.0
}

/// Trailing stop level below the high-water mark.
///
/// A non-positive ATR contributes no ATR stop, whatever the mode.
pub fn trailing_stop_price(highest: f64, atr: f64, config: &ExitConfig) -> f64 {
    let pct_distance = highest * config.trailing_stop_pct / 100.0;
    let atr_distance = config.atr_multiplier * atr;
    if atr <= 0.0 {
        return highest - pct_distance;
    }
    let distance = match config.trailing_mode {
        TrailingMode::Wider => pct_distance.max(atr_distance),
        TrailingMode::Tighter => pct_distance.min(atr_distance),
        TrailingMode::Fixed => pct_distance,
    };
    highest - distance
}

/// Units sold by a partial exit: the configured fraction, at least one.
pub fn partial_exit_quantity(quantity: i64, config: &ExitConfig) -> i64 {
    ((quantity as f64 * config.partial_exit_fraction).floor() as i64).max(1)
}

/// Decide whether the position should be exited at `price`.
pub fn check_exit(
    position: &Position,
    price: f64,
    atr: f64,
    signal: Signal,
    config: &ExitConfig,
) -> Option<ExitOrder> {
    let entry = position.entry_price();
    let full = |reason| ExitOrder {
        kind: ExitKind::Full,
        quantity: position.quantity,
        reason,
    };

    if price <= stop_loss_price(entry, config) {
        return Some(full(ExitReason::StopLoss));
    }
    if price <= trailing_stop_price(position.highest_price_seen(), atr, config) {
        return Some(full(ExitReason::TrailingStop));
    }
    if price >= target_price(entry, config) {
        return Some(full(ExitReason::TargetHit));
    }
    if !position.has_partial_exit()
        && position.quantity >= 2
        && price >= partial_trigger_price(entry, config)
    {
        return Some(ExitOrder {
            kind: ExitKind::Partial,
            quantity: partial_exit_quantity(position.quantity, config),
            reason: ExitReason::PartialTarget,
        });
    }
    if signal == Signal::Sell {
        return Some(full(ExitReason::TrendReversal));
    }
    None
}
