//! CSV indicator snapshot feed.
//!
//! Reads `<dir>/<SYMBOL>.csv` with columns
//! `timestamp,price,rsi,macd_histogram,sma_short,sma_long,atr,mtf_trend,volume_confirmed`.
//! The last row is the current snapshot; the row before it supplies the
//! previous SMAs for crossover detection.

use crate::domain::error::TradexError;
use crate::domain::snapshot::{IndicatorSnapshot, MtfTrend};
use crate::ports::market_data_port::MarketDataPort;
use chrono::{DateTime, Utc};
use std::fs;
use std::path::PathBuf;

pub struct CsvSnapshotFeed {
    base_path: PathBuf,
}

impl CsvSnapshotFeed {
    pub fn new(base_path: PathBuf) -> Self {
        Self { base_path }
    }

    fn csv_path(&self, symbol: &str) -> PathBuf {
        self.base_path.join(format!("{symbol}.csv"))
    }
}

struct Row {
    timestamp: DateTime<Utc>,
    price: f64,
    rsi: f64,
    macd_histogram: f64,
    sma_short: f64,
    sma_long: f64,
    atr: f64,
    mtf_trend: MtfTrend,
    volume_confirmed: bool,
}

fn field<'r>(record: &'r csv::StringRecord, idx: usize, name: &str) -> Result<&'r str, String> {
    record
        .get(idx)
        .map(str::trim)
        .ok_or_else(|| format!("missing {name} column"))
}

fn number(record: &csv::StringRecord, idx: usize, name: &str) -> Result<f64, String> {
    field(record, idx, name)?
        .parse::<f64>()
        .map_err(|e| format!("invalid {name} value: {e}"))
}

fn parse_row(record: &csv::StringRecord) -> Result<Row, String> {
    let timestamp = DateTime::parse_from_rfc3339(field(record, 0, "timestamp")?)
        .map_err(|e| format!("invalid timestamp: {e}"))?
        .with_timezone(&Utc);
    let volume = field(record, 8, "volume_confirmed")?;
    let volume_confirmed = match volume.to_lowercase().as_str() {
        "true" | "yes" | "1" => true,
        "false" | "no" | "0" => false,
        other => return Err(format!("invalid volume_confirmed value: {other}")),
    };

    Ok(Row {
        timestamp,
        price: number(record, 1, "price")?,
        rsi: number(record, 2, "rsi")?,
        macd_histogram: number(record, 3, "macd_histogram")?,
        sma_short: number(record, 4, "sma_short")?,
        sma_long: number(record, 5, "sma_long")?,
        atr: number(record, 6, "atr")?,
        mtf_trend: field(record, 7, "mtf_trend")?.parse::<MtfTrend>()?,
        volume_confirmed,
    })
}

impl MarketDataPort for CsvSnapshotFeed {
    fn get_snapshot(&self, symbol: &str) -> Result<IndicatorSnapshot, TradexError> {
        let unavailable = |reason: String| TradexError::DataUnavailable {
            symbol: symbol.to_string(),
            reason,
        };

        let path = self.csv_path(symbol);
        let content = fs::read_to_string(&path)
            .map_err(|e| unavailable(format!("failed to read {}: {e}", path.display())))?;

        let mut rdr = csv::Reader::from_reader(content.as_bytes());
        let mut rows = Vec::new();
        for result in rdr.records() {
            let record = result.map_err(|e| unavailable(format!("CSV parse error: {e}")))?;
            rows.push(parse_row(&record).map_err(unavailable)?);
        }
        rows.sort_by_key(|r| r.timestamp);

        let current = rows
            .pop()
            .ok_or_else(|| unavailable(format!("{} has no rows", path.display())))?;
        let previous = rows.last();

        Ok(IndicatorSnapshot {
            symbol: symbol.to_string(),
            timestamp: current.timestamp,
            price: current.price,
            rsi: current.rsi,
            macd_histogram: current.macd_histogram,
            sma_short: current.sma_short,
            sma_long: current.sma_long,
            prev_sma_short: previous.map(|r| r.sma_short),
            prev_sma_long: previous.map(|r| r.sma_long),
            atr: current.atr,
            mtf_trend: current.mtf_trend,
            volume_confirmed: current.volume_confirmed,
        })
    }
}
