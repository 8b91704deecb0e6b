//! CLI definition and dispatch.

use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use crate::adapters::csv_journal_adapter::CsvJournal;
use crate::adapters::csv_snapshot_adapter::CsvSnapshotFeed;
use crate::adapters::file_config_adapter::FileConfigAdapter;
use crate::adapters::log_notifier::{LogNotifier, MultiNotifier};
use crate::adapters::paper_broker::PaperBroker;
use crate::adapters::throttled_feed::{ThrottleConfig, ThrottledFeed};
use crate::domain::config_validation::{parse_holidays, read_f64, read_u64, validate_config};
use crate::domain::error::TradexError;
use crate::domain::executor::ExecutorConfig;
use crate::domain::exit_rules::{ExitConfig, TrailingMode};
use crate::domain::ledger::PositionLedger;
use crate::domain::lifecycle::{Collaborators, LifecycleConfig, LifecycleController};
use crate::domain::market_clock::{
    MarketClock, TimeWindow, parse_time, parse_timezone, parse_window,
};
use crate::domain::runner::{Runner, RunnerConfig};
use crate::domain::signal::{SignalConfig, evaluate};
use crate::domain::sizing::{FractionalSizer, SizingConfig};
use crate::domain::universe::{Universe, parse_symbols};
use crate::ports::config_port::ConfigPort;
use crate::ports::ledger_store_port::LedgerStorePort;
use crate::ports::market_data_port::MarketDataPort;

const DEFAULT_LIQUIDITY_WINDOWS: &str = "09:30-11:30,13:30-15:15";

#[derive(Parser, Debug)]
#[command(name = "tradex", about = "Rule-driven position lifecycle trader")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the trading loop against the paper broker
    Run {
        #[arg(short, long)]
        config: PathBuf,
        /// Stop after this many loop passes
        #[arg(long)]
        max_cycles: Option<u64>,
        /// Treat the market as always open
        #[arg(long)]
        ignore_clock: bool,
    },
    /// Print the persisted position ledger
    Status {
        #[arg(short, long)]
        config: PathBuf,
    },
    /// Validate a configuration and print the resolved settings
    Validate {
        #[arg(short, long)]
        config: PathBuf,
    },
    /// Show market status now or at a given instant
    Clock {
        #[arg(short, long)]
        config: PathBuf,
        /// RFC 3339 instant, e.g. 2026-03-02T10:00:00+05:30
        #[arg(long)]
        at: Option<String>,
    },
    /// Print the signal and reasons for one symbol
    Evaluate {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(long)]
        symbol: String,
    },
}

pub fn run(cli: Cli) -> ExitCode {
    match cli.command {
        Command::Run {
            config,
            max_cycles,
            ignore_clock,
        } => run_trader(&config, max_cycles, ignore_clock),
        Command::Status { config } => run_status(&config),
        Command::Validate { config } => run_validate(&config),
        Command::Clock { config, at } => run_clock(&config, at.as_deref()),
        Command::Evaluate { config, symbol } => run_evaluate(&config, &symbol),
    }
}

pub fn load_config(path: &PathBuf) -> Result<FileConfigAdapter, ExitCode> {
    FileConfigAdapter::from_file(path).map_err(fail)
}

fn fail(err: TradexError) -> ExitCode {
    eprintln!("error: {err}");
    ExitCode::from(&err)
}

/// Load the config file and validate every section.
fn load_validated(path: &PathBuf) -> Result<FileConfigAdapter, ExitCode> {
    eprintln!("Loading config from {}", path.display());
    let adapter = load_config(path)?;
    validate_config(&adapter).map_err(fail)?;
    Ok(adapter)
}

pub fn build_universe(config: &dyn ConfigPort) -> Result<Universe, TradexError> {
    let raw = config
        .get_string("universe", "symbols")
        .ok_or_else(|| TradexError::config_missing("universe", "symbols"))?;
    Ok(Universe::new(parse_symbols(&raw)?))
}

pub fn build_market_clock(config: &dyn ConfigPort) -> Result<MarketClock, TradexError> {
    let timezone = config
        .get_string("market", "timezone")
        .unwrap_or_else(|| "Asia/Kolkata".into());
    let timezone =
        parse_timezone(&timezone).map_err(|e| TradexError::config_invalid("market", "timezone", e))?;

    let open = config.get_string("market", "open").unwrap_or_else(|| "09:15".into());
    let open = parse_time(&open).map_err(|e| TradexError::config_invalid("market", "open", e))?;
    let close = config.get_string("market", "close").unwrap_or_else(|| "15:30".into());
    let close = parse_time(&close).map_err(|e| TradexError::config_invalid("market", "close", e))?;

    let windows_raw = config
        .get_string("market", "liquidity_windows")
        .unwrap_or_else(|| DEFAULT_LIQUIDITY_WINDOWS.into());
    let windows = windows_raw
        .split(',')
        .map(str::trim)
        .filter(|w| !w.is_empty())
        .map(|w| {
            parse_window(w).map_err(|e| TradexError::config_invalid("market", "liquidity_windows", e))
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok(MarketClock::new(timezone, open, close)
        .with_holidays(parse_holidays(config)?)
        .with_liquidity_windows(windows))
}

pub fn build_signal_config(config: &dyn ConfigPort) -> Result<SignalConfig, TradexError> {
    let defaults = SignalConfig::default();
    Ok(SignalConfig {
        rsi_oversold: read_f64(config, "signal", "rsi_oversold", defaults.rsi_oversold)?,
        rsi_deep_oversold: read_f64(
            config,
            "signal",
            "rsi_deep_oversold",
            defaults.rsi_deep_oversold,
        )?,
        rsi_overbought: read_f64(config, "signal", "rsi_overbought", defaults.rsi_overbought)?,
    })
}

pub fn build_exit_config(config: &dyn ConfigPort) -> Result<ExitConfig, TradexError> {
    let d = ExitConfig::default();
    let trailing_mode = match config.get_string("exits", "trailing_mode") {
        Some(raw) => raw
            .parse::<TrailingMode>()
            .map_err(|e| TradexError::config_invalid("exits", "trailing_mode", e))?,
        None => d.trailing_mode,
    };
    Ok(ExitConfig {
        stop_loss_pct: read_f64(config, "exits", "stop_loss_pct", d.stop_loss_pct)?,
        target_pct: read_f64(config, "exits", "target_pct", d.target_pct)?,
        trailing_stop_pct: read_f64(config, "exits", "trailing_stop_pct", d.trailing_stop_pct)?,
        atr_multiplier: read_f64(config, "exits", "atr_multiplier", d.atr_multiplier)?,
        partial_exit_fraction: read_f64(
            config,
            "exits",
            "partial_exit_fraction",
            d.partial_exit_fraction,
        )?,
        partial_trigger_ratio: read_f64(
            config,
            "exits",
            "partial_trigger_ratio",
            d.partial_trigger_ratio,
        )?,
        trailing_mode,
    })
}

pub fn build_executor_config(config: &dyn ConfigPort) -> Result<ExecutorConfig, TradexError> {
    let d = ExecutorConfig::default();
    let timeout = read_u64(
        config,
        "executor",
        "pending_timeout_cycles",
        u64::from(d.pending_timeout_cycles),
    )?;
    Ok(ExecutorConfig {
        limit_offset_pct: read_f64(config, "executor", "limit_offset_pct", d.limit_offset_pct)?,
        pending_timeout_cycles: u32::try_from(timeout).map_err(|_| {
            TradexError::config_invalid("executor", "pending_timeout_cycles", "too large")
        })?,
    })
}

pub fn build_sizing_config(config: &dyn ConfigPort) -> Result<SizingConfig, TradexError> {
    let d = SizingConfig::default();
    let capital = config
        .get_string("risk", "capital")
        .ok_or_else(|| TradexError::config_missing("risk", "capital"))
        .and_then(|_| read_f64(config, "risk", "capital", 0.0))?;
    Ok(SizingConfig {
        capital,
        max_position_pct: read_f64(config, "risk", "max_position_pct", d.max_position_pct)?,
        max_positions: read_u64(config, "risk", "max_positions", d.max_positions as u64)? as usize,
        buy_scale: read_f64(config, "risk", "buy_scale", d.buy_scale)?,
        strong_buy_scale: read_f64(config, "risk", "strong_buy_scale", d.strong_buy_scale)?,
    })
}

pub fn build_lifecycle_config(config: &dyn ConfigPort) -> Result<LifecycleConfig, TradexError> {
    Ok(LifecycleConfig {
        signal: build_signal_config(config)?,
        exits: build_exit_config(config)?,
        executor: build_executor_config(config)?,
        capital: build_sizing_config(config)?.capital,
    })
}

pub fn build_runner_config(
    config: &dyn ConfigPort,
    max_cycles: Option<u64>,
    ignore_clock: bool,
) -> Result<RunnerConfig, TradexError> {
    Ok(RunnerConfig {
        poll_interval: Duration::from_secs(read_u64(config, "runner", "poll_interval_secs", 60)?),
        closed_interval: Duration::from_secs(read_u64(
            config,
            "runner",
            "closed_interval_secs",
            300,
        )?),
        trade_only_high_liquidity: config.get_bool("market", "trade_only_high_liquidity", false),
        max_passes: max_cycles,
        ignore_clock,
    })
}

pub fn build_throttle_config(config: &dyn ConfigPort) -> Result<ThrottleConfig, TradexError> {
    let attempts = read_u64(config, "feed", "max_attempts", 3)?;
    Ok(ThrottleConfig {
        min_spacing: Duration::from_millis(read_u64(config, "feed", "min_spacing_ms", 500)?),
        max_attempts: u32::try_from(attempts)
            .map_err(|_| TradexError::config_invalid("feed", "max_attempts", "too large"))?,
        backoff_base: Duration::from_millis(read_u64(config, "feed", "backoff_base_ms", 2000)?),
    })
}

pub fn snapshot_dir(config: &dyn ConfigPort) -> Result<PathBuf, TradexError> {
    config
        .get_string("feed", "snapshot_dir")
        .map(PathBuf::from)
        .ok_or_else(|| TradexError::config_missing("feed", "snapshot_dir"))
}

#[cfg(feature = "sqlite")]
fn open_store(
    config: &dyn ConfigPort,
) -> Result<crate::adapters::sqlite_ledger_adapter::SqliteLedgerAdapter, TradexError> {
    crate::adapters::sqlite_ledger_adapter::SqliteLedgerAdapter::from_config(config)
}

#[cfg(not(feature = "sqlite"))]
fn open_store(config: &dyn ConfigPort) -> Result<NoStore, TradexError> {
    let _ = config;
    Err(TradexError::Database {
        reason: "sqlite feature is required for the position ledger".into(),
    })
}

#[cfg(not(feature = "sqlite"))]
struct NoStore;

#[cfg(not(feature = "sqlite"))]
impl LedgerStorePort for NoStore {
    fn load(&self) -> Result<PositionLedger, TradexError> {
        Ok(PositionLedger::new())
    }

    fn save(&self, _ledger: &PositionLedger) -> Result<(), TradexError> {
        Ok(())
    }
}

fn run_trader(config_path: &PathBuf, max_cycles: Option<u64>, ignore_clock: bool) -> ExitCode {
    // Stage 1: config
    let adapter = match load_validated(config_path) {
        Ok(a) => a,
        Err(code) => return code,
    };

    // Stage 2: settings
    let settings = (|| -> Result<_, TradexError> {
        Ok((
            build_universe(&adapter)?,
            build_market_clock(&adapter)?,
            build_lifecycle_config(&adapter)?,
            build_sizing_config(&adapter)?,
            build_runner_config(&adapter, max_cycles, ignore_clock)?,
            build_throttle_config(&adapter)?,
            snapshot_dir(&adapter)?,
        ))
    })();
    let (universe, clock, lifecycle_config, sizing, runner_config, throttle, dir) = match settings
    {
        Ok(s) => s,
        Err(e) => return fail(e),
    };

    // Stage 3: ledger
    let store = match open_store(&adapter) {
        Ok(s) => s,
        Err(e) => return fail(e),
    };
    let mut ledger = match store.load() {
        Ok(l) => l,
        Err(e) => return fail(e),
    };
    eprintln!(
        "Loaded ledger: {} positions, {} pending entries",
        ledger.len(),
        ledger.pending_entries().count()
    );

    // Stage 4: collaborators
    let quotes = CsvSnapshotFeed::new(dir.clone());
    let feed = ThrottledFeed::new(CsvSnapshotFeed::new(dir), throttle);
    let broker = PaperBroker::new(&quotes)
        .seeded_from(&ledger)
        .with_cautionary(adapter.get_list("paper", "cautionary"))
        .with_authorization_pending(adapter.get_list("paper", "authorization_pending"))
        .with_offline(adapter.get_bool("paper", "offline", false));
    let sizer = FractionalSizer::new(sizing);
    let mut notifier = MultiNotifier::new().with(LogNotifier);
    if let Some(path) = adapter.get_string("journal", "path") {
        eprintln!("Journaling trades to {path}");
        notifier = notifier.with(CsvJournal::new(PathBuf::from(path)));
    }

    let ports = Collaborators {
        feed: &feed,
        broker: &broker,
        risk: &sizer,
        notifier: &notifier,
        store: &store,
    };
    let mut controller = LifecycleController::new(&universe, ports, lifecycle_config);

    // Stage 5: poll loop
    let stop = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&stop);
    if let Err(e) = ctrlc::set_handler(move || flag.store(true, Ordering::SeqCst)) {
        eprintln!("warning: could not install Ctrl-C handler: {e}");
    }

    eprintln!(
        "Trading {} symbols ({})",
        universe.count(),
        universe.symbols.join(", ")
    );
    let runner = Runner::new(&clock, runner_config);
    match runner.run(
        &mut controller,
        &mut ledger,
        Utc::now,
        std::thread::sleep,
        || stop.load(Ordering::SeqCst),
    ) {
        Ok(summary) => {
            eprintln!(
                "Stopped after {} passes: {} cycles, {} closed, {} failed",
                summary.passes, summary.cycles, summary.closed_passes, summary.failed_cycles
            );
            ExitCode::SUCCESS
        }
        Err(e) => fail(e),
    }
}

fn run_status(config_path: &PathBuf) -> ExitCode {
    let adapter = match load_config(config_path) {
        Ok(a) => a,
        Err(code) => return code,
    };
    let ledger = match open_store(&adapter).and_then(|s| s.load()) {
        Ok(l) => l,
        Err(e) => return fail(e),
    };
    print!("{}", format_ledger(&ledger));
    ExitCode::SUCCESS
}

/// Human-readable ledger table.
pub fn format_ledger(ledger: &PositionLedger) -> String {
    let mut out = String::new();
    if ledger.is_empty() && ledger.pending_entries().next().is_none() {
        out.push_str("No positions\n");
        return out;
    }

    out.push_str(&format!(
        "{:<16} {:<17} {:>6} {:>10} {:>10} {:>10} {:>10}  {:<8} {}\n",
        "SYMBOL", "STATE", "QTY", "ENTRY", "LAST", "HIGH", "P&L", "ORIGIN", "LAST ERROR"
    ));
    for p in ledger.positions() {
        out.push_str(&format!(
            "{:<16} {:<17} {:>6} {:>10.2} {:>10.2} {:>10.2} {:>+10.2}  {:<8} {}\n",
            p.symbol,
            p.state.as_str(),
            p.quantity,
            p.entry_price(),
            p.last_price,
            p.highest_price_seen(),
            p.unrealized_pnl() + p.realized_pnl,
            if p.is_bot_entered() { "bot" } else { "external" },
            p.last_order_error
                .as_ref()
                .map(|c| c.raw().to_string())
                .unwrap_or_default(),
        ));
    }
    for pending in ledger.pending_entries() {
        out.push_str(&format!(
            "{:<16} {:<17} {:>6} {:>10.2} (waiting {} cycles)\n",
            pending.symbol, "PENDING_ENTRY", pending.quantity, pending.reference_price,
            pending.cycles_waiting
        ));
    }
    out.push_str(&format!(
        "Deployed {:.2}, unrealized {:+.2}\n",
        ledger.deployed_capital(),
        ledger.total_unrealized_pnl()
    ));
    out
}

fn run_validate(config_path: &PathBuf) -> ExitCode {
    let adapter = match load_validated(config_path) {
        Ok(a) => a,
        Err(code) => return code,
    };
    eprintln!("Config validated successfully ({})", adapter.source());

    let resolved = (|| -> Result<_, TradexError> {
        Ok((
            build_universe(&adapter)?,
            build_market_clock(&adapter)?,
            build_lifecycle_config(&adapter)?,
            build_sizing_config(&adapter)?,
            build_runner_config(&adapter, None, false)?,
            build_throttle_config(&adapter)?,
        ))
    })();
    let (universe, clock, lifecycle, sizing, runner, throttle) = match resolved {
        Ok(r) => r,
        Err(e) => return fail(e),
    };

    println!("Universe: {}", universe.symbols.join(", "));
    println!(
        "Market: {} {}-{}, liquidity windows {}{}",
        clock.timezone(),
        clock.open_time().format("%H:%M"),
        clock.close_time().format("%H:%M"),
        clock
            .liquidity_windows()
            .iter()
            .map(TimeWindow::to_string)
            .collect::<Vec<_>>()
            .join(", "),
        if runner.trade_only_high_liquidity {
            " (entries only inside windows)"
        } else {
            ""
        }
    );
    println!(
        "Signal: RSI oversold < {}, deep < {}, overbought > {}",
        lifecycle.signal.rsi_oversold,
        lifecycle.signal.rsi_deep_oversold,
        lifecycle.signal.rsi_overbought
    );
    let e = &lifecycle.exits;
    println!(
        "Exits: stop {}%, target {}%, trailing {}% / {}x ATR ({}), partial {} at {} of target",
        e.stop_loss_pct,
        e.target_pct,
        e.trailing_stop_pct,
        e.atr_multiplier,
        e.trailing_mode,
        e.partial_exit_fraction,
        e.partial_trigger_ratio
    );
    println!(
        "Risk: capital {:.2}, {}% per position, max {} positions, scales BUY {} / STRONG_BUY {}",
        sizing.capital,
        sizing.max_position_pct,
        sizing.max_positions,
        sizing.buy_scale,
        sizing.strong_buy_scale
    );
    println!(
        "Executor: limit offset {}%, pending timeout {} cycles",
        lifecycle.executor.limit_offset_pct, lifecycle.executor.pending_timeout_cycles
    );
    println!(
        "Feed: spacing {}ms, {} attempts, backoff {}ms",
        throttle.min_spacing.as_millis(),
        throttle.max_attempts,
        throttle.backoff_base.as_millis()
    );
    println!(
        "Runner: poll every {}s, closed check every {}s",
        runner.poll_interval.as_secs(),
        runner.closed_interval.as_secs()
    );
    ExitCode::SUCCESS
}

pub fn parse_instant(raw: &str) -> Result<DateTime<Utc>, String> {
    DateTime::parse_from_rfc3339(raw.trim())
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| format!("invalid instant '{raw}': {e}"))
}

fn run_clock(config_path: &PathBuf, at: Option<&str>) -> ExitCode {
    let adapter = match load_config(config_path) {
        Ok(a) => a,
        Err(code) => return code,
    };
    let clock = match build_market_clock(&adapter) {
        Ok(c) => c,
        Err(e) => return fail(e),
    };
    let now = match at.map(parse_instant).transpose() {
        Ok(t) => t.unwrap_or_else(Utc::now),
        Err(e) => {
            eprintln!("error: {e}");
            return ExitCode::from(2);
        }
    };

    println!("Local time: {}", clock.local(now).format("%Y-%m-%d %H:%M:%S %Z"));
    println!("Trading day: {}", clock.trading_day(now));
    println!("Status: {}", clock.status(now));
    match clock.liquidity_window(now) {
        Some(w) => println!("High liquidity: yes ({})", w),
        None => println!("High liquidity: no"),
    }
    ExitCode::SUCCESS
}

fn run_evaluate(config_path: &PathBuf, symbol: &str) -> ExitCode {
    let adapter = match load_validated(config_path) {
        Ok(a) => a,
        Err(code) => return code,
    };
    let (signal_config, dir) = match build_signal_config(&adapter)
        .and_then(|s| snapshot_dir(&adapter).map(|d| (s, d)))
    {
        Ok(v) => v,
        Err(e) => return fail(e),
    };

    let feed = CsvSnapshotFeed::new(dir);
    let snapshot = match feed.get_snapshot(symbol) {
        Ok(s) => s,
        Err(e) => return fail(e),
    };
    let evaluation = evaluate(&snapshot, &signal_config);

    println!(
        "{symbol} @ {:.2} ({}): RSI {:.1}, MACD hist {:+.3}, SMA {:.2}/{:.2}, ATR {:.2}, MTF {}, volume {}",
        snapshot.price,
        snapshot.timestamp,
        snapshot.rsi,
        snapshot.macd_histogram,
        snapshot.sma_short,
        snapshot.sma_long,
        snapshot.atr,
        snapshot.mtf_trend,
        if snapshot.volume_confirmed { "confirmed" } else { "unconfirmed" }
    );
    println!("Signal: {} (rule: {})", evaluation.signal.as_str(), evaluation.rule);
    for reason in &evaluation.reasons {
        println!("  - {reason}");
    }
    ExitCode::SUCCESS
}
