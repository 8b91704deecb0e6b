//! Poll loop: gates lifecycle cycles on the market clock.
//!
//! Time, sleeping and the stop flag are injected so the loop can be driven
//! deterministically in tests.

use chrono::{DateTime, Utc};
use log::{error, info, warn};
use std::time::Duration;

use super::error::TradexError;
use super::event::TradeEvent;
use super::ledger::PositionLedger;
use super::lifecycle::LifecycleController;
use super::market_clock::{MarketClock, MarketStatus};

#[derive(Debug, Clone, PartialEq)]
pub struct RunnerConfig {
    pub poll_interval: Duration,
    pub closed_interval: Duration,
    pub trade_only_high_liquidity: bool,
    /// Stop after this many loop passes, open or closed.
    pub max_passes: Option<u64>,
    pub ignore_clock: bool,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        RunnerConfig {
            poll_interval: Duration::from_secs(60),
            closed_interval: Duration::from_secs(300),
            trade_only_high_liquidity: false,
            max_passes: None,
            ignore_clock: false,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub passes: u64,
    pub cycles: u64,
    pub closed_passes: u64,
    pub failed_cycles: u64,
}

pub struct Runner<'a> {
    clock: &'a MarketClock,
    config: RunnerConfig,
}

impl<'a> Runner<'a> {
    pub fn new(clock: &'a MarketClock, config: RunnerConfig) -> Self {
        Runner { clock, config }
    }

    pub fn run<N, S, Q>(
        &self,
        controller: &mut LifecycleController<'_>,
        ledger: &mut PositionLedger,
        mut now: N,
        mut sleep: S,
        should_stop: Q,
    ) -> Result<RunSummary, TradexError>
    where
        N: FnMut() -> DateTime<Utc>,
        S: FnMut(Duration),
        Q: Fn() -> bool,
    {
        let mut summary = RunSummary::default();
        let mut was_open: Option<bool> = None;

        loop {
            if should_stop() {
                info!("stop requested, leaving poll loop");
                break;
            }
            if self.config.max_passes.is_some_and(|max| summary.passes >= max) {
                break;
            }
            summary.passes += 1;

            let at = now();
            let status = if self.config.ignore_clock {
                MarketStatus::Open
            } else {
                self.clock.status(at)
            };
            let open = status.is_open();

            if was_open != Some(open) {
                if open {
                    controller.notify(TradeEvent::MarketOpened { at });
                } else if was_open == Some(true) {
                    controller.notify(TradeEvent::MarketClosed { at });
                }
                was_open = Some(open);
            }

            if !open {
                summary.closed_passes += 1;
                info!(
                    "{status}; next check in {}s",
                    self.config.closed_interval.as_secs()
                );
                if !self.finished(&summary) {
                    sleep(self.config.closed_interval);
                }
                continue;
            }

            if self.config.trade_only_high_liquidity {
                let window = self.clock.liquidity_window(at);
                if window.is_none() {
                    info!("outside high-liquidity windows, exits only");
                }
                controller.set_entries_allowed(window.is_some());
            }

            match controller.run_cycle(ledger, at) {
                Ok(_) => summary.cycles += 1,
                Err(e) if e.is_fatal() => {
                    error!("fatal error, stopping: {e}");
                    return Err(e);
                }
                Err(e) => {
                    summary.failed_cycles += 1;
                    warn!("cycle failed, retrying next poll: {e}");
                }
            }

            if !self.finished(&summary) && !should_stop() {
                sleep(self.config.poll_interval);
            }
        }

        Ok(summary)
    }

    fn finished(&self, summary: &RunSummary) -> bool {
        self.config
            .max_passes
            .is_some_and(|max| summary.passes >= max)
    }
}
