//! Collaborator contracts consumed by the domain.

pub mod broker_port;
pub mod config_port;
pub mod ledger_store_port;
pub mod market_data_port;
pub mod notification_port;
pub mod risk_port;
