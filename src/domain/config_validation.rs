//! Configuration validation.
//!
//! Checks every section before the bot runs. The typed `read_*` helpers are
//! also used when building settings, so a value that validates always builds.

use crate::domain::error::TradexError;
use crate::domain::exit_rules::TrailingMode;
use crate::domain::market_clock::{parse_time, parse_timezone, parse_window};
use crate::domain::universe::parse_symbols;
use crate::ports::config_port::ConfigPort;
use chrono::NaiveDate;

pub fn validate_config(config: &dyn ConfigPort) -> Result<(), TradexError> {
    validate_market(config)?;
    validate_universe(config)?;
    validate_signal(config)?;
    validate_exits(config)?;
    validate_risk(config)?;
    validate_executor(config)?;
    validate_feed(config)?;
    validate_runner(config)?;
    Ok(())
}

/// Float value, or `default` when absent. Present but unparsable is an error.
pub fn read_f64(
    config: &dyn ConfigPort,
    section: &str,
    key: &str,
    default: f64,
) -> Result<f64, TradexError> {
    match config.get_string(section, key) {
        None => Ok(default),
        Some(raw) => raw
            .trim()
            .parse::<f64>()
            .ok()
            .filter(|v| v.is_finite())
            .ok_or_else(|| TradexError::config_invalid(section, key, format!("'{raw}' is not a number"))),
    }
}

pub fn read_u64(
    config: &dyn ConfigPort,
    section: &str,
    key: &str,
    default: u64,
) -> Result<u64, TradexError> {
    match config.get_string(section, key) {
        None => Ok(default),
        Some(raw) => raw.trim().parse::<u64>().map_err(|_| {
            TradexError::config_invalid(section, key, format!("'{raw}' is not a non-negative integer"))
        }),
    }
}

pub fn parse_holidays(config: &dyn ConfigPort) -> Result<Vec<NaiveDate>, TradexError> {
    config
        .get_list("market", "holidays")
        .iter()
        .map(|d| {
            NaiveDate::parse_from_str(d, "%Y-%m-%d").map_err(|_| {
                TradexError::config_invalid(
                    "market",
                    "holidays",
                    format!("invalid date '{d}' (expected YYYY-MM-DD)"),
                )
            })
        })
        .collect()
}

fn ensure(ok: bool, section: &str, key: &str, reason: &str) -> Result<(), TradexError> {
    if ok {
        Ok(())
    } else {
        Err(TradexError::config_invalid(section, key, reason))
    }
}

fn validate_market(config: &dyn ConfigPort) -> Result<(), TradexError> {
    if let Some(tz) = config.get_string("market", "timezone") {
        parse_timezone(&tz).map_err(|e| TradexError::config_invalid("market", "timezone", e))?;
    }
    let open = config.get_string("market", "open").unwrap_or_else(|| "09:15".into());
    let close = config.get_string("market", "close").unwrap_or_else(|| "15:30".into());
    let open = parse_time(&open).map_err(|e| TradexError::config_invalid("market", "open", e))?;
    let close = parse_time(&close).map_err(|e| TradexError::config_invalid("market", "close", e))?;
    ensure(open < close, "market", "close", "close must be after open")?;

    parse_holidays(config)?;
    for window in config.get_list("market", "liquidity_windows") {
        parse_window(&window)
            .map_err(|e| TradexError::config_invalid("market", "liquidity_windows", e))?;
    }
    Ok(())
}

fn validate_universe(config: &dyn ConfigPort) -> Result<(), TradexError> {
    let symbols = config
        .get_string("universe", "symbols")
        .ok_or_else(|| TradexError::config_missing("universe", "symbols"))?;
    parse_symbols(&symbols)?;
    Ok(())
}

fn validate_signal(config: &dyn ConfigPort) -> Result<(), TradexError> {
    let deep = read_f64(config, "signal", "rsi_deep_oversold", 25.0)?;
    let oversold = read_f64(config, "signal", "rsi_oversold", 30.0)?;
    let overbought = read_f64(config, "signal", "rsi_overbought", 70.0)?;
    ensure(
        deep > 0.0 && deep < oversold,
        "signal",
        "rsi_deep_oversold",
        "must be positive and below rsi_oversold",
    )?;
    ensure(
        oversold < overbought && overbought < 100.0,
        "signal",
        "rsi_overbought",
        "must be above rsi_oversold and below 100",
    )
}

fn validate_exits(config: &dyn ConfigPort) -> Result<(), TradexError> {
    let stop = read_f64(config, "exits", "stop_loss_pct", 5.0)?;
    ensure(stop > 0.0 && stop < 100.0, "exits", "stop_loss_pct", "must be between 0 and 100")?;

    let target = read_f64(config, "exits", "target_pct", 8.0)?;
    ensure(target > 0.0, "exits", "target_pct", "must be positive")?;

    let trailing = read_f64(config, "exits", "trailing_stop_pct", 3.0)?;
    ensure(
        trailing > 0.0 && trailing < 100.0,
        "exits",
        "trailing_stop_pct",
        "must be between 0 and 100",
    )?;

    let atr = read_f64(config, "exits", "atr_multiplier", 2.0)?;
    ensure(atr >= 0.0, "exits", "atr_multiplier", "must be non-negative")?;

    let fraction = read_f64(config, "exits", "partial_exit_fraction", 0.5)?;
    ensure(
        fraction > 0.0 && fraction < 1.0,
        "exits",
        "partial_exit_fraction",
        "must be between 0 and 1",
    )?;

    let trigger = read_f64(config, "exits", "partial_trigger_ratio", 0.5)?;
    ensure(
        trigger > 0.0 && trigger < 1.0,
        "exits",
        "partial_trigger_ratio",
        "must be between 0 and 1",
    )?;

    if let Some(mode) = config.get_string("exits", "trailing_mode") {
        mode.parse::<TrailingMode>()
            .map_err(|e| TradexError::config_invalid("exits", "trailing_mode", e))?;
    }
    Ok(())
}

fn validate_risk(config: &dyn ConfigPort) -> Result<(), TradexError> {
    if config.get_string("risk", "capital").is_none() {
        return Err(TradexError::config_missing("risk", "capital"));
    }
    let capital = read_f64(config, "risk", "capital", 0.0)?;
    ensure(capital > 0.0, "risk", "capital", "capital must be positive")?;

    let pct = read_f64(config, "risk", "max_position_pct", 50.0)?;
    ensure(pct > 0.0 && pct <= 100.0, "risk", "max_position_pct", "must be in (0, 100]")?;

    let max_positions = read_u64(config, "risk", "max_positions", 2)?;
    ensure(max_positions >= 1, "risk", "max_positions", "must be at least 1")?;

    for key in ["buy_scale", "strong_buy_scale"] {
        let scale = read_f64(config, "risk", key, 1.0)?;
        ensure(scale > 0.0 && scale <= 1.0, "risk", key, "must be in (0, 1]")?;
    }
    Ok(())
}

fn validate_executor(config: &dyn ConfigPort) -> Result<(), TradexError> {
    let offset = read_f64(config, "executor", "limit_offset_pct", 0.5)?;
    ensure(
        offset > 0.0 && offset <= 10.0,
        "executor",
        "limit_offset_pct",
        "must be in (0, 10]",
    )?;
    let timeout = read_u64(config, "executor", "pending_timeout_cycles", 5)?;
    ensure(timeout >= 1, "executor", "pending_timeout_cycles", "must be at least 1")
}

fn validate_feed(config: &dyn ConfigPort) -> Result<(), TradexError> {
    read_u64(config, "feed", "min_spacing_ms", 500)?;
    read_u64(config, "feed", "backoff_base_ms", 2000)?;
    let attempts = read_u64(config, "feed", "max_attempts", 3)?;
    ensure(attempts >= 1, "feed", "max_attempts", "must be at least 1")
}

fn validate_runner(config: &dyn ConfigPort) -> Result<(), TradexError> {
    let poll = read_u64(config, "runner", "poll_interval_secs", 60)?;
    ensure(poll >= 1, "runner", "poll_interval_secs", "must be at least 1")?;
    let closed = read_u64(config, "runner", "closed_interval_secs", 300)?;
    ensure(closed >= 1, "runner", "closed_interval_secs", "must be at least 1")
}
