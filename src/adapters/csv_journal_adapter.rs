//! Append-only CSV trade journal.
//!
//! Only trade events (fills and rejections) are written. Columns:
//! `recorded_at,event,symbol,quantity,price,pnl,detail`.

use crate::domain::error::TradexError;
use crate::domain::event::TradeEvent;
use crate::ports::notification_port::NotificationPort;
use chrono::{SecondsFormat, Utc};
use std::fs::OpenOptions;
use std::path::PathBuf;

const HEADER: [&str; 7] = [
    "recorded_at",
    "event",
    "symbol",
    "quantity",
    "price",
    "pnl",
    "detail",
];

pub struct CsvJournal {
    path: PathBuf,
}

impl CsvJournal {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &std::path::Path {
        &self.path
    }

    fn columns(event: &TradeEvent) -> (String, String, String) {
        let num = |v: f64| format!("{v:.2}");
        match event {
            TradeEvent::Entered {
                quantity, price, ..
            } => (quantity.to_string(), num(*price), String::new()),
            TradeEvent::PartialExit {
                quantity,
                price,
                pnl,
                ..
            }
            | TradeEvent::Closed {
                quantity,
                price,
                pnl,
                ..
            } => (quantity.to_string(), num(*price), num(*pnl)),
            TradeEvent::AuthorizationPending { quantity, .. } => {
                (quantity.to_string(), String::new(), String::new())
            }
            _ => (String::new(), String::new(), String::new()),
        }
    }

    fn failure(&self, reason: impl std::fmt::Display) -> TradexError {
        TradexError::Notification {
            reason: format!("journal {}: {reason}", self.path.display()),
        }
    }
}

impl NotificationPort for CsvJournal {
    fn notify(&self, event: &TradeEvent) -> Result<(), TradexError> {
        if !event.is_trade() {
            return Ok(());
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| self.failure(e))?;
        let is_new = file.metadata().map_err(|e| self.failure(e))?.len() == 0;

        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(file);
        if is_new {
            writer.write_record(HEADER).map_err(|e| self.failure(e))?;
        }

        let (quantity, price, pnl) = Self::columns(event);
        writer
            .write_record([
                Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
                event.kind().to_string(),
                event.symbol().unwrap_or_default().to_string(),
                quantity,
                price,
                pnl,
                event.to_string(),
            ])
            .map_err(|e| self.failure(e))?;
        writer.flush().map_err(|e| self.failure(e))?;
        Ok(())
    }
}
