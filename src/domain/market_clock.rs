//! Market clock: session hours in the exchange's own time zone.
//!
//! Every check converts the supplied UTC instant into the configured zone, so
//! the host's local time zone never matters.

use chrono::{DateTime, Datelike, NaiveDate, NaiveTime, Utc, Weekday};
use chrono_tz::Tz;
use std::collections::BTreeSet;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MarketStatus {
    Open,
    Weekend,
    Holiday(NaiveDate),
    PreOpen { opens_at: NaiveTime },
    PostClose { closed_at: NaiveTime },
}

impl MarketStatus {
    pub fn is_open(&self) -> bool {
        matches!(self, MarketStatus::Open)
    }
}

impl fmt::Display for MarketStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MarketStatus::Open => f.write_str("Market open"),
            MarketStatus::Weekend => f.write_str("Weekend"),
            MarketStatus::Holiday(date) => write!(f, "Exchange holiday ({date})"),
            MarketStatus::PreOpen { opens_at } => {
                write!(f, "Market opens at {}", opens_at.format("%H:%M"))
            }
            MarketStatus::PostClose { closed_at } => {
                write!(f, "Market closed at {}", closed_at.format("%H:%M"))
            }
        }
    }
}

/// Inclusive time-of-day range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeWindow {
    pub start: NaiveTime,
    pub end: NaiveTime,
}

impl TimeWindow {
    pub fn contains(&self, time: NaiveTime) -> bool {
        self.start <= time && time <= self.end
    }
}

impl fmt::Display for TimeWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}-{}",
            self.start.format("%H:%M"),
            self.end.format("%H:%M")
        )
    }
}

pub fn parse_time(input: &str) -> Result<NaiveTime, String> {
    NaiveTime::parse_from_str(input.trim(), "%H:%M")
        .map_err(|e| format!("invalid time '{}': {e}", input.trim()))
}

/// Parse `HH:MM-HH:MM`.
pub fn parse_window(input: &str) -> Result<TimeWindow, String> {
    let (start, end) = input
        .split_once('-')
        .ok_or_else(|| format!("invalid window '{}': expected HH:MM-HH:MM", input.trim()))?;
    let window = TimeWindow {
        start: parse_time(start)?,
        end: parse_time(end)?,
    };
    if window.start >= window.end {
        return Err(format!("window '{}' ends before it starts", input.trim()));
    }
    Ok(window)
}

pub fn parse_timezone(input: &str) -> Result<Tz, String> {
    input
        .trim()
        .parse::<Tz>()
        .map_err(|e| format!("unknown time zone '{}': {e}", input.trim()))
}

#[derive(Debug, Clone, PartialEq)]
pub struct MarketClock {
    timezone: Tz,
    open: NaiveTime,
    close: NaiveTime,
    holidays: BTreeSet<NaiveDate>,
    liquidity_windows: Vec<TimeWindow>,
}

impl MarketClock {
    pub fn new(timezone: Tz, open: NaiveTime, close: NaiveTime) -> Self {
        MarketClock {
            timezone,
            open,
            close,
            holidays: BTreeSet::new(),
            liquidity_windows: Vec::new(),
        }
    }

    pub fn with_holidays(mut self, holidays: impl IntoIterator<Item = NaiveDate>) -> Self {
        self.holidays.extend(holidays);
        self
    }

    pub fn with_liquidity_windows(mut self, windows: Vec<TimeWindow>) -> Self {
        self.liquidity_windows = windows;
        self
    }

    pub fn timezone(&self) -> Tz {
        self.timezone
    }

    pub fn open_time(&self) -> NaiveTime {
        self.open
    }

    pub fn close_time(&self) -> NaiveTime {
        self.close
    }

    pub fn local(&self, now: DateTime<Utc>) -> DateTime<Tz> {
        now.with_timezone(&self.timezone)
    }

    /// Calendar date at the exchange.
    pub fn trading_day(&self, now: DateTime<Utc>) -> NaiveDate {
        self.local(now).date_naive()
    }

    pub fn status(&self, now: DateTime<Utc>) -> MarketStatus {
        let local = self.local(now);
        let date = local.date_naive();
        if matches!(date.weekday(), Weekday::Sat | Weekday::Sun) {
            return MarketStatus::Weekend;
        }
        if self.holidays.contains(&date) {
            return MarketStatus::Holiday(date);
        }
        let time = local.time();
        if time < self.open {
            return MarketStatus::PreOpen {
                opens_at: self.open,
            };
        }
        if time > self.close {
            return MarketStatus::PostClose {
                closed_at: self.close,
            };
        }
        MarketStatus::Open
    }

    pub fn is_open(&self, now: DateTime<Utc>) -> bool {
        self.status(now).is_open()
    }

    /// The high-liquidity window containing `now`, if any.
    pub fn liquidity_window(&self, now: DateTime<Utc>) -> Option<TimeWindow> {
        let time = self.local(now).time();
        self.liquidity_windows
            .iter()
            .copied()
            .find(|w| w.contains(time))
    }

    pub fn liquidity_windows(&self) -> &[TimeWindow] {
        &self.liquidity_windows
    }
}

impl Default for MarketClock {
    /// NSE cash session, 09:15-15:30 Asia/Kolkata.
    fn default() -> Self {
        let open = NaiveTime::from_hms_opt(9, 15, 0).unwrap_or(NaiveTime::MIN);
        let close = NaiveTime::from_hms_opt(15, 30, 0).unwrap_or(NaiveTime::MIN);
        MarketClock::new(chrono_tz::Asia::Kolkata, open, close)
    }
}
