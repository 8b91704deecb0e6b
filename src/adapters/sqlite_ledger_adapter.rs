//! SQLite ledger store.
//!
//! `save` rewrites both tables inside one transaction, so a crash leaves
//! either the previous snapshot or the new one.

use crate::domain::error::TradexError;
use crate::domain::ledger::{PendingEntry, PositionLedger};
use crate::domain::order::{BrokerErrorCode, ExitKind, ExitOrder, ExitReason};
use crate::domain::position::{InFlightExit, Position, PositionRecord, PositionState};
use crate::domain::signal::SignalStrength;
use crate::ports::config_port::ConfigPort;
use crate::ports::ledger_store_port::LedgerStorePort;
use chrono::{DateTime, Utc};
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::params;

pub struct SqliteLedgerAdapter {
    pool: Pool<SqliteConnectionManager>,
}

fn pool_error(e: r2d2::Error) -> TradexError {
    TradexError::Database {
        reason: e.to_string(),
    }
}

fn query_error(e: rusqlite::Error) -> TradexError {
    TradexError::DatabaseQuery {
        reason: e.to_string(),
    }
}

fn corrupt(symbol: &str, reason: String) -> TradexError {
    TradexError::DatabaseQuery {
        reason: format!("corrupt ledger row for {symbol}: {reason}"),
    }
}

impl SqliteLedgerAdapter {
    pub fn from_config(config: &dyn ConfigPort) -> Result<Self, TradexError> {
        let db_path = config
            .get_string("ledger", "path")
            .ok_or_else(|| TradexError::config_missing("ledger", "path"))?;
        Self::open(&db_path)
    }

    pub fn open(db_path: &str) -> Result<Self, TradexError> {
        let manager = SqliteConnectionManager::file(db_path);
        let pool = Pool::builder()
            .max_size(2)
            .build(manager)
            .map_err(pool_error)?;
        let adapter = Self { pool };
        adapter.initialize_schema()?;
        Ok(adapter)
    }

    pub fn in_memory() -> Result<Self, TradexError> {
        let manager = SqliteConnectionManager::memory();
        let pool = Pool::builder()
            .max_size(1)
            .build(manager)
            .map_err(pool_error)?;
        let adapter = Self { pool };
        adapter.initialize_schema()?;
        Ok(adapter)
    }

    pub fn initialize_schema(&self) -> Result<(), TradexError> {
        let conn = self.pool.get().map_err(pool_error)?;

        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS positions (
                symbol TEXT PRIMARY KEY,
                quantity INTEGER NOT NULL,
                initial_quantity INTEGER NOT NULL,
                entry_price REAL NOT NULL,
                entry_time TEXT NOT NULL,
                bot_entered INTEGER NOT NULL,
                highest_price_seen REAL NOT NULL,
                last_price REAL NOT NULL,
                realized_partial_quantity INTEGER NOT NULL,
                realized_pnl REAL NOT NULL,
                state TEXT NOT NULL,
                last_order_error TEXT,
                inflight_kind TEXT,
                inflight_quantity INTEGER,
                inflight_reason TEXT,
                inflight_prior_state TEXT,
                inflight_cycles INTEGER,
                deferred_kind TEXT,
                deferred_quantity INTEGER,
                deferred_reason TEXT
            );
            CREATE TABLE IF NOT EXISTS pending_entries (
                symbol TEXT PRIMARY KEY,
                quantity INTEGER NOT NULL,
                reference_price REAL NOT NULL,
                strength TEXT NOT NULL,
                submitted_at TEXT NOT NULL,
                cycles_waiting INTEGER NOT NULL
            );",
        )
        .map_err(query_error)?;

        Ok(())
    }

    fn load_positions(&self) -> Result<Vec<Position>, TradexError> {
        let conn = self.pool.get().map_err(pool_error)?;
        let mut stmt = conn
            .prepare(
                "SELECT symbol, quantity, initial_quantity, entry_price, entry_time, bot_entered,
                        highest_price_seen, last_price, realized_partial_quantity, realized_pnl,
                        state, last_order_error, inflight_kind, inflight_quantity, inflight_reason,
                        inflight_prior_state, inflight_cycles, deferred_kind, deferred_quantity,
                        deferred_reason
                 FROM positions ORDER BY symbol",
            )
            .map_err(query_error)?;

        let rows = stmt
            .query_map([], |row| {
                Ok(StoredPosition {
                    symbol: row.get(0)?,
                    quantity: row.get(1)?,
                    initial_quantity: row.get(2)?,
                    entry_price: row.get(3)?,
                    entry_time: row.get(4)?,
                    bot_entered: row.get(5)?,
                    highest_price_seen: row.get(6)?,
                    last_price: row.get(7)?,
                    realized_partial_quantity: row.get(8)?,
                    realized_pnl: row.get(9)?,
                    state: row.get(10)?,
                    last_order_error: row.get(11)?,
                    inflight_kind: row.get(12)?,
                    inflight_quantity: row.get(13)?,
                    inflight_reason: row.get(14)?,
                    inflight_prior_state: row.get(15)?,
                    inflight_cycles: row.get(16)?,
                    deferred_kind: row.get(17)?,
                    deferred_quantity: row.get(18)?,
                    deferred_reason: row.get(19)?,
                })
            })
            .map_err(query_error)?;

        let mut positions = Vec::new();
        for row in rows {
            let stored = row.map_err(query_error)?;
            positions.push(Position::from_record(stored.into_record()?));
        }
        Ok(positions)
    }

    fn load_pending(&self) -> Result<Vec<PendingEntry>, TradexError> {
        let conn = self.pool.get().map_err(pool_error)?;
        let mut stmt = conn
            .prepare(
                "SELECT symbol, quantity, reference_price, strength, submitted_at, cycles_waiting
                 FROM pending_entries ORDER BY symbol",
            )
            .map_err(query_error)?;

        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, i64>(1)?,
                    row.get::<_, f64>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, String>(4)?,
                    row.get::<_, u32>(5)?,
                ))
            })
            .map_err(query_error)?;

        let mut entries = Vec::new();
        for row in rows {
            let (symbol, quantity, reference_price, strength, submitted_at, cycles_waiting) =
                row.map_err(query_error)?;
            entries.push(PendingEntry {
                strength: parse_strength(&strength).map_err(|e| corrupt(&symbol, e))?,
                submitted_at: parse_time(&submitted_at).map_err(|e| corrupt(&symbol, e))?,
                symbol,
                quantity,
                reference_price,
                cycles_waiting,
            });
        }
        Ok(entries)
    }
}

impl LedgerStorePort for SqliteLedgerAdapter {
    fn load(&self) -> Result<PositionLedger, TradexError> {
        let positions = self.load_positions()?;
        let pending = self.load_pending()?;
        Ok(PositionLedger::from_parts(positions, pending))
    }

    fn save(&self, ledger: &PositionLedger) -> Result<(), TradexError> {
        let mut conn = self.pool.get().map_err(pool_error)?;
        let tx = conn.transaction().map_err(query_error)?;

        tx.execute("DELETE FROM positions", []).map_err(query_error)?;
        tx.execute("DELETE FROM pending_entries", [])
            .map_err(query_error)?;

        for position in ledger.positions() {
            let r = position.to_record();
            let inflight = r.in_flight.as_ref();
            let deferred = r.deferred.as_ref();
            tx.execute(
                "INSERT INTO positions (symbol, quantity, initial_quantity, entry_price, entry_time,
                    bot_entered, highest_price_seen, last_price, realized_partial_quantity,
                    realized_pnl, state, last_order_error, inflight_kind, inflight_quantity,
                    inflight_reason, inflight_prior_state, inflight_cycles, deferred_kind,
                    deferred_quantity, deferred_reason)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16,
                    ?17, ?18, ?19, ?20)",
                params![
                    r.symbol,
                    r.quantity,
                    r.initial_quantity,
                    r.entry_price,
                    r.entry_time.to_rfc3339(),
                    r.bot_entered,
                    r.highest_price_seen,
                    r.last_price,
                    r.realized_partial_quantity,
                    r.realized_pnl,
                    r.state.as_str(),
                    r.last_order_error.as_ref().map(|c| c.raw().to_string()),
                    inflight.map(|f| f.order.kind.as_str()),
                    inflight.map(|f| f.order.quantity),
                    inflight.map(|f| f.order.reason.as_str()),
                    inflight.map(|f| f.prior_state.as_str()),
                    inflight.map(|f| f.cycles_waiting),
                    deferred.map(|d| d.kind.as_str()),
                    deferred.map(|d| d.quantity),
                    deferred.map(|d| d.reason.as_str()),
                ],
            )
            .map_err(query_error)?;
        }

        for entry in ledger.pending_entries() {
            tx.execute(
                "INSERT INTO pending_entries
                    (symbol, quantity, reference_price, strength, submitted_at, cycles_waiting)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    entry.symbol,
                    entry.quantity,
                    entry.reference_price,
                    entry.strength.to_string(),
                    entry.submitted_at.to_rfc3339(),
                    entry.cycles_waiting,
                ],
            )
            .map_err(query_error)?;
        }

        tx.commit().map_err(query_error)?;
        Ok(())
    }
}

struct StoredPosition {
    symbol: String,
    quantity: i64,
    initial_quantity: i64,
    entry_price: f64,
    entry_time: String,
    bot_entered: bool,
    highest_price_seen: f64,
    last_price: f64,
    realized_partial_quantity: i64,
    realized_pnl: f64,
    state: String,
    last_order_error: Option<String>,
    inflight_kind: Option<String>,
    inflight_quantity: Option<i64>,
    inflight_reason: Option<String>,
    inflight_prior_state: Option<String>,
    inflight_cycles: Option<u32>,
    deferred_kind: Option<String>,
    deferred_quantity: Option<i64>,
    deferred_reason: Option<String>,
}

impl StoredPosition {
    fn into_record(self) -> Result<PositionRecord, TradexError> {
        let symbol = self.symbol;
        let bad = |e: String| corrupt(&symbol, e);

        let in_flight = match (
            self.inflight_kind,
            self.inflight_quantity,
            self.inflight_reason,
            self.inflight_prior_state,
        ) {
            (Some(kind), Some(quantity), Some(reason), Some(prior)) => Some(InFlightExit {
                order: exit_order(&kind, quantity, &reason).map_err(bad)?,
                prior_state: prior.parse::<PositionState>().map_err(bad)?,
                cycles_waiting: self.inflight_cycles.unwrap_or(0),
            }),
            _ => None,
        };

        let deferred = match (self.deferred_kind, self.deferred_quantity, self.deferred_reason) {
            (Some(kind), Some(quantity), Some(reason)) => {
                Some(exit_order(&kind, quantity, &reason).map_err(bad)?)
            }
            _ => None,
        };

        Ok(PositionRecord {
            quantity: self.quantity,
            initial_quantity: self.initial_quantity,
            entry_price: self.entry_price,
            entry_time: parse_time(&self.entry_time).map_err(bad)?,
            bot_entered: self.bot_entered,
            highest_price_seen: self.highest_price_seen,
            last_price: self.last_price,
            realized_partial_quantity: self.realized_partial_quantity,
            realized_pnl: self.realized_pnl,
            state: self.state.parse::<PositionState>().map_err(bad)?,
            last_order_error: self.last_order_error.as_deref().map(BrokerErrorCode::from_raw),
            in_flight,
            deferred,
            symbol,
        })
    }
}

fn exit_order(kind: &str, quantity: i64, reason: &str) -> Result<ExitOrder, String> {
    Ok(ExitOrder {
        kind: kind.parse::<ExitKind>()?,
        quantity,
        reason: reason.parse::<ExitReason>()?,
    })
}

fn parse_time(raw: &str) -> Result<DateTime<Utc>, String> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| format!("invalid timestamp '{raw}': {e}"))
}

fn parse_strength(raw: &str) -> Result<SignalStrength, String> {
    match raw {
        "BUY" => Ok(SignalStrength::Buy),
        "STRONG_BUY" => Ok(SignalStrength::StrongBuy),
        other => Err(format!("unknown signal strength '{other}'")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 2, 4, 0, 0).unwrap()
    }

    fn sample_ledger() -> PositionLedger {
        let mut ledger = PositionLedger::new();

        let mut gold = Position::bot_entered("GOLDBEES-EQ", 10, 100.0, now());
        gold.refresh_price(106.0);
        gold.apply_exit_fill(
            &ExitOrder {
                kind: ExitKind::Partial,
                quantity: 5,
                reason: ExitReason::PartialTarget,
            },
            104.0,
            5,
        )
        .unwrap();
        gold.begin_pending_exit(ExitOrder {
            kind: ExitKind::Full,
            quantity: 5,
            reason: ExitReason::TrailingStop,
        });
        ledger.insert(gold);

        let mut silver = Position::bot_entered("SILVERBEES-EQ", 4, 90.0, now());
        silver.record_rejection(
            BrokerErrorCode::AuthorizationPending,
            Some(ExitOrder {
                kind: ExitKind::Full,
                quantity: 4,
                reason: ExitReason::StopLoss,
            }),
        );
        ledger.insert(silver);

        ledger.insert(Position::external("NIFTYBEES-EQ", 7, 250.0, now()));
        ledger.add_pending_entry(PendingEntry {
            symbol: "BANKBEES-EQ".into(),
            quantity: 3,
            reference_price: 510.5,
            strength: SignalStrength::StrongBuy,
            submitted_at: now(),
            cycles_waiting: 2,
        });
        ledger
    }

    #[test]
    fn empty_store_loads_empty_ledger() {
        let store = SqliteLedgerAdapter::in_memory().unwrap();
        assert!(store.load().unwrap().is_empty());
    }

    #[test]
    fn save_then_load_restores_lifecycle_state() {
        let store = SqliteLedgerAdapter::in_memory().unwrap();
        let ledger = sample_ledger();
        store.save(&ledger).unwrap();

        let loaded = store.load().unwrap();
        let gold = loaded.get("GOLDBEES-EQ").unwrap();
        assert_eq!(gold, ledger.get("GOLDBEES-EQ").unwrap());
        assert_eq!(gold.realized_partial_quantity(), 5);
        assert_eq!(gold.highest_price_seen(), 106.0);
        assert_eq!(gold.state, PositionState::PendingClose);

        let silver = loaded.get("SILVERBEES-EQ").unwrap();
        assert_eq!(
            silver.last_order_error,
            Some(BrokerErrorCode::AuthorizationPending)
        );
        assert_eq!(silver.deferred.map(|d| d.quantity), Some(4));

        assert!(!loaded.get("NIFTYBEES-EQ").unwrap().is_bot_entered());
        assert_eq!(
            loaded.pending_entry("BANKBEES-EQ"),
            ledger.pending_entry("BANKBEES-EQ")
        );
    }

    #[test]
    fn save_replaces_previous_snapshot() {
        let store = SqliteLedgerAdapter::in_memory().unwrap();
        let mut ledger = sample_ledger();
        store.save(&ledger).unwrap();

        ledger.remove("NIFTYBEES-EQ");
        ledger.take_pending_entry("BANKBEES-EQ");
        store.save(&ledger).unwrap();

        let loaded = store.load().unwrap();
        assert_eq!(loaded.len(), 2);
        assert!(!loaded.contains("NIFTYBEES-EQ"));
        assert!(loaded.pending_entry("BANKBEES-EQ").is_none());
    }

    #[test]
    fn file_store_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ledger.db");
        let path = path.to_str().unwrap();
        {
            let store = SqliteLedgerAdapter::open(path).unwrap();
            store.save(&sample_ledger()).unwrap();
        }
        let store = SqliteLedgerAdapter::open(path).unwrap();
        assert_eq!(store.load().unwrap().len(), 3);
    }
}
