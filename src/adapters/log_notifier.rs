//! Notification sinks backed by the `log` facade, plus fan-out.

use crate::domain::error::TradexError;
use crate::domain::event::TradeEvent;
use crate::ports::notification_port::NotificationPort;
use log::{info, warn};

pub struct LogNotifier;

impl NotificationPort for LogNotifier {
    fn notify(&self, event: &TradeEvent) -> Result<(), TradexError> {
        match event {
            TradeEvent::OrderRejected { .. } | TradeEvent::AuthorizationPending { .. } => {
                warn!("{event}")
            }
            _ => info!("{event}"),
        }
        Ok(())
    }
}

/// Delivers each event to every sink. A failing sink does not stop delivery
/// to the rest; the first failure is returned.
#[derive(Default)]
pub struct MultiNotifier {
    sinks: Vec<Box<dyn NotificationPort>>,
}

impl MultiNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, sink: impl NotificationPort + 'static) -> Self {
        self.sinks.push(Box::new(sink));
        self
    }

    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }
}

impl NotificationPort for MultiNotifier {
    fn notify(&self, event: &TradeEvent) -> Result<(), TradexError> {
        let mut first_error = None;
        for sink in &self.sinks {
            if let Err(e) = sink.notify(event) {
                warn!("notification sink failed: {e}");
                first_error.get_or_insert(e);
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}
