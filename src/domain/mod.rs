//! Core domain types and logic.

pub mod config_validation;
pub mod error;
pub mod event;
pub mod executor;
pub mod exit_rules;
pub mod ledger;
pub mod lifecycle;
pub mod market_clock;
pub mod order;
pub mod position;
pub mod runner;
pub mod signal;
pub mod sizing;
pub mod snapshot;
pub mod universe;
