//! Domain error types.

use crate::domain::universe::UniverseError;

/// Top-level error type for tradex.
///
/// Broker order rejections are not errors at this level: they travel as
/// [`BrokerRejection`](crate::domain::order::BrokerRejection) values inside an
/// execution outcome so the lifecycle controller can act on them.
#[derive(Debug, thiserror::Error)]
pub enum TradexError {
    #[error("database error: {reason}")]
    Database { reason: String },

    #[error("database query error: {reason}")]
    DatabaseQuery { reason: String },

    #[error("config parse error in {file}: {reason}")]
    ConfigParse { file: String, reason: String },

    #[error("missing config key [{section}] {key}")]
    ConfigMissing { section: String, key: String },

    #[error("invalid config value [{section}] {key}: {reason}")]
    ConfigInvalid {
        section: String,
        key: String,
        reason: String,
    },

    #[error("market data unavailable for {symbol}: {reason}")]
    DataUnavailable { symbol: String, reason: String },

    #[error("broker error: {reason}")]
    Broker { reason: String },

    #[error("notification failed: {reason}")]
    Notification { reason: String },

    #[error("invariant violated for {symbol}: {reason}")]
    InvariantViolation { symbol: String, reason: String },

    #[error(transparent)]
    Universe(#[from] UniverseError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl TradexError {
    pub fn config_missing(section: &str, key: &str) -> Self {
        TradexError::ConfigMissing {
            section: section.to_string(),
            key: key.to_string(),
        }
    }

    pub fn config_invalid(section: &str, key: &str, reason: impl Into<String>) -> Self {
        TradexError::ConfigInvalid {
            section: section.to_string(),
            key: key.to_string(),
            reason: reason.into(),
        }
    }

    /// Errors after which the poll loop must not continue.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            TradexError::InvariantViolation { .. }
                | TradexError::Database { .. }
                | TradexError::DatabaseQuery { .. }
        )
    }
}

impl From<&TradexError> for std::process::ExitCode {
    fn from(err: &TradexError) -> Self {
        let code: u8 = match err {
            TradexError::Io(_) => 1,
            TradexError::ConfigParse { .. }
            | TradexError::ConfigMissing { .. }
            | TradexError::ConfigInvalid { .. }
            | TradexError::Universe(_) => 2,
            TradexError::Database { .. } | TradexError::DatabaseQuery { .. } => 3,
            TradexError::InvariantViolation { .. } => 4,
            TradexError::DataUnavailable { .. } => 5,
            TradexError::Broker { .. } | TradexError::Notification { .. } => 6,
        };
        std::process::ExitCode::from(code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invariant_violation_is_fatal() {
        let err = TradexError::InvariantViolation {
            symbol: "GOLDBEES-EQ".into(),
            reason: "sell on external position".into(),
        };
        assert!(err.is_fatal());
        assert!(err.to_string().contains("GOLDBEES-EQ"));
    }

    #[test]
    fn data_unavailable_is_not_fatal() {
        let err = TradexError::DataUnavailable {
            symbol: "NIFTYBEES-EQ".into(),
            reason: "timeout".into(),
        };
        assert!(!err.is_fatal());
    }

    #[test]
    fn config_helpers_fill_section_and_key() {
        match TradexError::config_invalid("exits", "target_pct", "must be positive") {
            TradexError::ConfigInvalid {
                section,
                key,
                reason,
            } => {
                assert_eq!(section, "exits");
                assert_eq!(key, "target_pct");
                assert_eq!(reason, "must be positive");
            }
            other => panic!("unexpected: {other}"),
        }
    }
}
