//! Signal evaluator.
//!
//! A pure function from an [`IndicatorSnapshot`] to a classified signal plus a
//! reason trail. Rules live in one ordered table and are tried top to bottom;
//! the first rule that returns a signal wins. Every rule tried may append
//! reasons, so a HOLD explains which entry setups were close and why they failed.
//!
//! Order matters: the oversold and reversal entries are tried before the
//! downtrend veto, so a deeply oversold bullish-MTF symbol is not blocked just
//! because its short SMA is still under its long SMA.

use crate::domain::snapshot::{IndicatorSnapshot, MtfTrend};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Signal {
    StrongBuy,
    Buy,
    Sell,
    Hold,
}

impl Signal {
    pub fn is_buy(self) -> bool {
        matches!(self, Signal::Buy | Signal::StrongBuy)
    }

    pub fn strength(self) -> Option<SignalStrength> {
        match self {
            Signal::StrongBuy => Some(SignalStrength::StrongBuy),
            Signal::Buy => Some(SignalStrength::Buy),
            Signal::Sell | Signal::Hold => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Signal::StrongBuy => "STRONG_BUY",
            Signal::Buy => "BUY",
            Signal::Sell => "SELL",
            Signal::Hold => "HOLD",
        }
    }
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Strength carried by an entry decision and handed to position sizing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SignalStrength {
    Buy,
    StrongBuy,
}

impl fmt::Display for SignalStrength {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SignalStrength::Buy => f.write_str("BUY"),
            SignalStrength::StrongBuy => f.write_str("STRONG_BUY"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SignalConfig {
    pub rsi_oversold: f64,
    pub rsi_deep_oversold: f64,
    pub rsi_overbought: f64,
}

impl Default for SignalConfig {
    fn default() -> Self {
        SignalConfig {
            rsi_oversold: 30.0,
            rsi_deep_oversold: 25.0,
            rsi_overbought: 70.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Evaluation {
    pub signal: Signal,
    pub reasons: Vec<String>,
    /// Name of the rule that produced the signal.
    pub rule: &'static str,
}

impl Evaluation {
    /// A SELL is only actionable against a bot-held position. For a flat or
    /// externally held symbol it is reported as HOLD, keeping the bearish trail.
    pub fn without_position(self) -> Evaluation {
        if self.signal != Signal::Sell {
            return self;
        }
        Evaluation {
            signal: Signal::Hold,
            reasons: vec![
                format!("Bearish: {}", self.reasons.join(", ")),
                "No position (cannot exit)".to_string(),
            ],
            rule: self.rule,
        }
    }
}

type RuleFn = fn(&IndicatorSnapshot, &SignalConfig, &mut Vec<String>) -> Option<Signal>;

struct SignalRule {
    name: &'static str,
    apply: RuleFn,
}

const RULES: [SignalRule; 5] = [
    SignalRule {
        name: "reversal_entry",
        apply: reversal_entry,
    },
    SignalRule {
        name: "oversold_entry",
        apply: oversold_entry,
    },
    SignalRule {
        name: "trend_following_entry",
        apply: trend_following_entry,
    },
    SignalRule {
        name: "bearish_exit",
        apply: bearish_exit,
    },
    SignalRule {
        name: "downtrend_veto",
        apply: downtrend_veto,
    },
];

/// Names of the rules in evaluation order.
pub fn rule_names() -> Vec<&'static str> {
    RULES.iter().map(|r| r.name).collect()
}

pub fn evaluate(snapshot: &IndicatorSnapshot, config: &SignalConfig) -> Evaluation {
    let mut reasons = Vec::new();
    for rule in &RULES {
        if let Some(signal) = (rule.apply)(snapshot, config, &mut reasons) {
            return Evaluation {
                signal,
                reasons,
                rule: rule.name,
            };
        }
    }
    reasons.push("No signal".to_string());
    Evaluation {
        signal: Signal::Hold,
        reasons,
        rule: "none",
    }
}

/// Bullish MTF, oversold RSI and price holding above SMA(20), whatever the
/// short-term SMA trend reads. MACD lags at turning points, so either a
/// bullish MACD or volume confirmation is enough.
fn reversal_entry(
    s: &IndicatorSnapshot,
    config: &SignalConfig,
    reasons: &mut Vec<String>,
) -> Option<Signal> {
    if !(s.mtf_trend.is_bullish() && s.rsi < config.rsi_oversold && s.price_above_long_sma()) {
        return None;
    }

    reasons.push(format!(
        "Reversal setup: MTF {}, RSI oversold ({:.1} < {}), price above SMA20",
        s.mtf_trend, s.rsi, config.rsi_oversold
    ));

    let macd = s.macd_bullish();
    let volume = s.volume_confirmed;
    if !macd && !volume {
        reasons.push("Reversal unconfirmed: MACD not bullish, no volume confirmation".into());
        return None;
    }
    if macd {
        reasons.push("MACD bullish ✓".into());
    }
    if volume {
        reasons.push("Volume confirmed ✓".into());
    }

    if s.mtf_trend == MtfTrend::StrongBullish {
        Some(Signal::StrongBuy)
    } else {
        Some(Signal::Buy)
    }
}

/// Oversold with bullish MTF and price above SMA(20). MACD is not required
/// but volume confirmation is.
fn oversold_entry(
    s: &IndicatorSnapshot,
    config: &SignalConfig,
    reasons: &mut Vec<String>,
) -> Option<Signal> {
    if !(s.rsi < config.rsi_oversold && s.mtf_trend.is_bullish() && s.price_above_long_sma()) {
        return None;
    }

    if !s.volume_confirmed {
        reasons.push("Oversold entry needs volume confirmation".into());
        return None;
    }

    reasons.push(format!(
        "Oversold entry: RSI {:.1} < {}, MTF {}, volume confirmed",
        s.rsi, config.rsi_oversold, s.mtf_trend
    ));
    if !s.macd_bullish() {
        reasons.push("MACD not bullish (relaxed)".into());
    }

    if s.rsi < config.rsi_deep_oversold && s.mtf_trend == MtfTrend::StrongBullish {
        Some(Signal::StrongBuy)
    } else {
        Some(Signal::Buy)
    }
}

fn trend_following_entry(
    s: &IndicatorSnapshot,
    _config: &SignalConfig,
    reasons: &mut Vec<String>,
) -> Option<Signal> {
    if !s.crossed_above() {
        return None;
    }

    reasons.push("SMA crossover up".into());
    if !s.macd_bullish() {
        reasons.push("Crossover without MACD confirmation".into());
        return None;
    }
    if s.mtf_trend.is_bearish() {
        reasons.push(format!("Crossover vetoed: MTF {}", s.mtf_trend));
        return None;
    }

    reasons.push("MACD bullish ✓".into());
    reasons.push(format!("MTF {} ✓", s.mtf_trend));
    Some(Signal::Buy)
}

fn bearish_exit(
    s: &IndicatorSnapshot,
    _config: &SignalConfig,
    reasons: &mut Vec<String>,
) -> Option<Signal> {
    if !s.macd_bearish() {
        return None;
    }
    if s.crossed_below() {
        reasons.push("SMA crossover down".into());
        reasons.push("MACD bearish".into());
        return Some(Signal::Sell);
    }
    if s.mtf_trend.is_bearish() {
        reasons.push(format!("MTF {}", s.mtf_trend));
        reasons.push("MACD bearish".into());
        return Some(Signal::Sell);
    }
    None
}

/// Blanket "no buy" outcome. Only reached when no entry rule matched.
fn downtrend_veto(
    s: &IndicatorSnapshot,
    config: &SignalConfig,
    reasons: &mut Vec<String>,
) -> Option<Signal> {
    if s.mtf_trend.is_bearish() {
        reasons.push(format!("MTF: {} (blocks entries)", s.mtf_trend));
    } else if s.mtf_trend == MtfTrend::Neutral && s.rsi >= config.rsi_oversold {
        reasons.push(format!(
            "MTF: NEUTRAL (waiting for oversold RSI < {})",
            config.rsi_oversold
        ));
    }

    if s.rsi > config.rsi_overbought {
        reasons.push(format!(
            "RSI overbought ({:.1} > {})",
            s.rsi, config.rsi_overbought
        ));
    }

    if s.short_term_downtrend() {
        reasons.push("Downtrend (no buy)".into());
    } else {
        reasons.push("Uptrend (waiting for entry)".into());
    }

    if s.macd_bearish() {
        reasons.push("MACD bearish".into());
    }

    Some(Signal::Hold)
}
