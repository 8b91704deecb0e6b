//! Concrete implementations of the ports.

pub mod csv_journal_adapter;
pub mod csv_snapshot_adapter;
pub mod file_config_adapter;
pub mod log_notifier;
pub mod paper_broker;
#[cfg(feature = "sqlite")]
pub mod sqlite_ledger_adapter;
pub mod throttled_feed;
