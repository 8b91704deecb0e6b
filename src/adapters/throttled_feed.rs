//! Rate-limited, retrying wrapper around any market-data feed.

use crate::domain::error::TradexError;
use crate::domain::snapshot::IndicatorSnapshot;
use crate::ports::market_data_port::MarketDataPort;
use log::warn;
use std::cell::Cell;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, PartialEq)]
pub struct ThrottleConfig {
    /// Minimum gap between the start of two requests.
    pub min_spacing: Duration,
    pub max_attempts: u32,
    /// Delay after failed attempt `n` is `backoff_base * n`.
    pub backoff_base: Duration,
}

impl Default for ThrottleConfig {
    fn default() -> Self {
        ThrottleConfig {
            min_spacing: Duration::from_millis(500),
            max_attempts: 3,
            backoff_base: Duration::from_secs(2),
        }
    }
}

/// Linearly increasing retry delay.
#[derive(Debug, Clone)]
pub struct LinearBackoff {
    base: Duration,
    attempt: u32,
}

impl LinearBackoff {
    pub fn new(base: Duration) -> Self {
        Self { base, attempt: 0 }
    }

    pub fn next_delay(&mut self) -> Duration {
        self.attempt = self.attempt.saturating_add(1);
        self.base.saturating_mul(self.attempt)
    }

    pub fn attempt(&self) -> u32 {
        self.attempt
    }
}

pub struct ThrottledFeed<F> {
    inner: F,
    config: ThrottleConfig,
    last_request: Cell<Option<Instant>>,
    sleeper: Box<dyn Fn(Duration)>,
}

impl<F: MarketDataPort> ThrottledFeed<F> {
    pub fn new(inner: F, config: ThrottleConfig) -> Self {
        Self {
            inner,
            config,
            last_request: Cell::new(None),
            sleeper: Box::new(std::thread::sleep),
        }
    }

    /// Replace the blocking sleep, e.g. to record delays in tests.
    pub fn with_sleeper(mut self, sleeper: impl Fn(Duration) + 'static) -> Self {
        self.sleeper = Box::new(sleeper);
        self
    }

    fn wait_for_slot(&self) {
        if let Some(last) = self.last_request.get() {
            let elapsed = last.elapsed();
            if elapsed < self.config.min_spacing {
                (self.sleeper)(self.config.min_spacing - elapsed);
            }
        }
        self.last_request.set(Some(Instant::now()));
    }
}

impl<F: MarketDataPort> MarketDataPort for ThrottledFeed<F> {
    fn get_snapshot(&self, symbol: &str) -> Result<IndicatorSnapshot, TradexError> {
        let mut backoff = LinearBackoff::new(self.config.backoff_base);
        loop {
            self.wait_for_slot();
            let err = match self.inner.get_snapshot(symbol) {
                Ok(snapshot) => return Ok(snapshot),
                Err(e @ TradexError::DataUnavailable { .. }) => e,
                Err(e) => return Err(e),
            };

            let delay = backoff.next_delay();
            if backoff.attempt() >= self.config.max_attempts {
                return Err(err);
            }
            warn!(
                "{symbol}: fetch attempt {}/{} failed ({err}), retrying in {}s",
                backoff.attempt(),
                self.config.max_attempts,
                delay.as_secs_f64()
            );
            (self.sleeper)(delay);
        }
    }
}
