//! Per-symbol indicator snapshot supplied by the market-data feed.
//!
//! Indicator arithmetic happens upstream; the core only reads these values.

use chrono::{DateTime, Utc};
use std::fmt;
use std::str::FromStr;

/// Multi-timeframe trend classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MtfTrend {
    StrongBearish,
    Bearish,
    Neutral,
    Bullish,
    StrongBullish,
}

impl MtfTrend {
    pub fn is_bullish(self) -> bool {
        matches!(self, MtfTrend::Bullish | MtfTrend::StrongBullish)
    }

    pub fn is_bearish(self) -> bool {
        matches!(self, MtfTrend::Bearish | MtfTrend::StrongBearish)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            MtfTrend::StrongBearish => "STRONG_BEARISH",
            MtfTrend::Bearish => "BEARISH",
            MtfTrend::Neutral => "NEUTRAL",
            MtfTrend::Bullish => "BULLISH",
            MtfTrend::StrongBullish => "STRONG_BULLISH",
        }
    }
}

impl fmt::Display for MtfTrend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MtfTrend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "STRONG_BEARISH" => Ok(MtfTrend::StrongBearish),
            "BEARISH" => Ok(MtfTrend::Bearish),
            "NEUTRAL" => Ok(MtfTrend::Neutral),
            "BULLISH" => Ok(MtfTrend::Bullish),
            "STRONG_BULLISH" => Ok(MtfTrend::StrongBullish),
            other => Err(format!("unknown trend '{other}'")),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct IndicatorSnapshot {
    pub symbol: String,
    pub timestamp: DateTime<Utc>,
    pub price: f64,
    pub rsi: f64,
    /// MACD histogram (MACD line minus signal line); only the sign is used.
    pub macd_histogram: f64,
    pub sma_short: f64,
    /// SMA(20).
    pub sma_long: f64,
    pub prev_sma_short: Option<f64>,
    pub prev_sma_long: Option<f64>,
    pub atr: f64,
    pub mtf_trend: MtfTrend,
    pub volume_confirmed: bool,
}

impl IndicatorSnapshot {
    pub fn macd_bullish(&self) -> bool {
        self.macd_histogram > 0.0
    }

    pub fn macd_bearish(&self) -> bool {
        self.macd_histogram < 0.0
    }

    /// Short SMA at or below the long SMA: the short-term trend reads as down.
    pub fn short_term_downtrend(&self) -> bool {
        self.sma_short <= self.sma_long
    }

    pub fn price_above_long_sma(&self) -> bool {
        self.price > self.sma_long
    }

    pub fn crossed_above(&self) -> bool {
        match (self.prev_sma_short, self.prev_sma_long) {
            (Some(ps), Some(pl)) => ps <= pl && self.sma_short > self.sma_long,
            _ => false,
        }
    }

    pub fn crossed_below(&self) -> bool {
        match (self.prev_sma_short, self.prev_sma_long) {
            (Some(ps), Some(pl)) => ps >= pl && self.sma_short < self.sma_long,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn snapshot() -> IndicatorSnapshot {
        IndicatorSnapshot {
            symbol: "GOLDBEES-EQ".into(),
            timestamp: Utc.with_ymd_and_hms(2026, 3, 2, 5, 0, 0).unwrap(),
            price: 101.0,
            rsi: 45.0,
            macd_histogram: 0.2,
            sma_short: 100.5,
            sma_long: 100.0,
            prev_sma_short: Some(99.8),
            prev_sma_long: Some(100.0),
            atr: 1.5,
            mtf_trend: MtfTrend::Bullish,
            volume_confirmed: true,
        }
    }

    #[test]
    fn trend_parses_case_insensitively() {
        assert_eq!("strong_bullish".parse::<MtfTrend>(), Ok(MtfTrend::StrongBullish));
        assert_eq!(" BEARISH ".parse::<MtfTrend>(), Ok(MtfTrend::Bearish));
        assert!("SIDEWAYS".parse::<MtfTrend>().is_err());
    }

    #[test]
    fn trend_classes() {
        assert!(MtfTrend::StrongBullish.is_bullish());
        assert!(!MtfTrend::Neutral.is_bullish());
        assert!(!MtfTrend::Neutral.is_bearish());
        assert!(MtfTrend::StrongBearish.is_bearish());
    }

    #[test]
    fn crossover_detection() {
        let s = snapshot();
        assert!(s.crossed_above());
        assert!(!s.crossed_below());

        let down = IndicatorSnapshot {
            sma_short: 99.0,
            prev_sma_short: Some(100.5),
            ..snapshot()
        };
        assert!(down.crossed_below());
        assert!(!down.crossed_above());
    }

    #[test]
    fn crossover_needs_previous_values() {
        let s = IndicatorSnapshot {
            prev_sma_short: None,
            ..snapshot()
        };
        assert!(!s.crossed_above());
        assert!(!s.crossed_below());
    }

    #[test]
    fn macd_sign() {
        let mut s = snapshot();
        assert!(s.macd_bullish());
        s.macd_histogram = -0.1;
        assert!(s.macd_bearish());
        s.macd_histogram = 0.0;
        assert!(!s.macd_bullish() && !s.macd_bearish());
    }
}
