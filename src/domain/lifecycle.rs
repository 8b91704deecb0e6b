//! Position lifecycle controller.
//!
//! One call to [`LifecycleController::run_cycle`] is one poll cycle:
//! reconcile the ledger against broker holdings, then walk every symbol in
//! order, deciding and executing at most one order per symbol. Ledger state
//! only moves on an executor outcome, and the ledger is persisted whenever
//! its revision changes.
//!
//! Externally held positions get their prices refreshed and nothing else.
//! The exit path additionally requires an [`ExitTicket`](super::position::ExitTicket),
//! which cannot be issued for them.

use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use std::collections::BTreeMap;
use std::fmt;

use super::error::TradexError;
use super::event::TradeEvent;
use super::executor::{ExecutorConfig, OrderExecutor};
use super::exit_rules::{self, ExitConfig};
use super::ledger::{PendingEntry, PositionLedger};
use super::order::{
    BrokerErrorCode, ExitKind, ExitOrder, ExitReason, OrderAction, OrderOutcome, Recovery,
};
use super::position::{Position, PositionState};
use super::signal::{self, Evaluation, Signal, SignalConfig, SignalStrength};
use super::snapshot::IndicatorSnapshot;
use super::universe::Universe;
use crate::ports::broker_port::{BrokerPort, Holding};
use crate::ports::ledger_store_port::LedgerStorePort;
use crate::ports::market_data_port::MarketDataPort;
use crate::ports::notification_port::NotificationPort;
use crate::ports::risk_port::{RiskPort, SizingRequest};

/// Per-cycle decision for one bot-controlled symbol. Never persisted.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Decision {
    NoAction,
    Enter(SignalStrength),
    PartialExit(f64),
    FullExit(ExitReason),
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Decision::NoAction => f.write_str("NO_ACTION"),
            Decision::Enter(strength) => write!(f, "ENTER({strength})"),
            Decision::PartialExit(fraction) => write!(f, "PARTIAL_EXIT({fraction})"),
            Decision::FullExit(reason) => write!(f, "FULL_EXIT({reason})"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SymbolStatus {
    Evaluated,
    /// No snapshot this cycle; retried next cycle.
    Skipped(String),
    MonitorOnly,
    /// Waiting on the broker (pending order, or closed but still held).
    Waiting(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct SymbolReport {
    pub symbol: String,
    pub status: SymbolStatus,
    pub evaluation: Option<Evaluation>,
    pub decision: Decision,
    pub outcome: Option<OrderOutcome>,
}

impl SymbolReport {
    fn new(symbol: &str, status: SymbolStatus) -> Self {
        SymbolReport {
            symbol: symbol.to_string(),
            status,
            evaluation: None,
            decision: Decision::NoAction,
            outcome: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CycleReport {
    pub cycle: u64,
    pub symbols: Vec<SymbolReport>,
}

impl CycleReport {
    pub fn evaluated(&self) -> usize {
        self.symbols
            .iter()
            .filter(|s| s.evaluation.is_some())
            .count()
    }

    pub fn skipped(&self) -> usize {
        self.symbols
            .iter()
            .filter(|s| matches!(s.status, SymbolStatus::Skipped(_)))
            .count()
    }

    pub fn orders(&self) -> usize {
        self.symbols.iter().filter(|s| s.outcome.is_some()).count()
    }

    pub fn symbol(&self, symbol: &str) -> Option<&SymbolReport> {
        self.symbols.iter().find(|s| s.symbol == symbol)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LifecycleConfig {
    pub signal: SignalConfig,
    pub exits: ExitConfig,
    pub executor: ExecutorConfig,
    /// Total capital available to bot entries.
    pub capital: f64,
}

/// The external collaborators a controller drives.
pub struct Collaborators<'a> {
    pub feed: &'a dyn MarketDataPort,
    pub broker: &'a dyn BrokerPort,
    pub risk: &'a dyn RiskPort,
    pub notifier: &'a dyn NotificationPort,
    pub store: &'a dyn LedgerStorePort,
}

pub struct LifecycleController<'a> {
    universe: &'a Universe,
    ports: Collaborators<'a>,
    executor: OrderExecutor<'a>,
    config: LifecycleConfig,
    saved_revision: u64,
    cycles: u64,
    entries_allowed: bool,
}

impl<'a> LifecycleController<'a> {
    pub fn new(universe: &'a Universe, ports: Collaborators<'a>, config: LifecycleConfig) -> Self {
        let executor = OrderExecutor::new(ports.broker, config.executor.clone());
        LifecycleController {
            universe,
            ports,
            executor,
            config,
            saved_revision: 0,
            cycles: 0,
            entries_allowed: true,
        }
    }

    /// Gate new entries (exits are never gated).
    pub fn set_entries_allowed(&mut self, allowed: bool) {
        self.entries_allowed = allowed;
    }

    pub fn notify(&self, event: TradeEvent) {
        if let Err(e) = self.ports.notifier.notify(&event) {
            warn!("notification '{}' dropped: {e}", event.kind());
        }
    }

    pub fn run_cycle(
        &mut self,
        ledger: &mut PositionLedger,
        now: DateTime<Utc>,
    ) -> Result<CycleReport, TradexError> {
        self.cycles += 1;
        let mut report = CycleReport {
            cycle: self.cycles,
            symbols: Vec::new(),
        };

        self.reconcile(ledger, now);
        self.persist(ledger)?;

        let tracked: Vec<String> = ledger.symbols().map(str::to_string).collect();
        let order = self.universe.cycle_order(tracked.iter().map(String::as_str));

        for symbol in order {
            let symbol_report = self.process_symbol(ledger, &symbol, now)?;
            self.persist(ledger)?;
            report.symbols.push(symbol_report);
        }

        info!(
            "cycle {}: {} evaluated, {} skipped, {} orders, {} positions",
            report.cycle,
            report.evaluated(),
            report.skipped(),
            report.orders(),
            ledger.len()
        );
        self.notify(TradeEvent::CycleCompleted {
            cycle: report.cycle,
            evaluated: report.evaluated(),
            skipped: report.skipped(),
            orders: report.orders(),
        });
        Ok(report)
    }

    fn persist(&mut self, ledger: &PositionLedger) -> Result<(), TradexError> {
        if ledger.revision() != self.saved_revision {
            self.ports.store.save(ledger)?;
            debug!("ledger saved at revision {}", ledger.revision());
            self.saved_revision = ledger.revision();
        }
        Ok(())
    }

    // Reconciliation

    fn reconcile(&self, ledger: &mut PositionLedger, now: DateTime<Utc>) {
        let holdings = match self.ports.broker.get_holdings() {
            Ok(h) => h,
            Err(e) => {
                warn!("holdings unavailable, skipping reconciliation: {e}");
                return;
            }
        };
        let held: BTreeMap<&str, &Holding> = holdings
            .iter()
            .filter(|h| h.quantity > 0)
            .map(|h| (h.symbol.as_str(), h))
            .collect();

        self.reconcile_pending_entries(ledger, &held);

        let symbols: Vec<String> = ledger.positions().map(|p| p.symbol.clone()).collect();
        for symbol in symbols {
            let holding = held.get(symbol.as_str()).copied();
            self.reconcile_position(ledger, &symbol, holding, now);
        }

        for holding in held.values() {
            if ledger.contains(&holding.symbol) || ledger.pending_entry(&holding.symbol).is_some()
            {
                continue;
            }
            info!(
                "{}: external holding of {} @ {:.2}, tracking read-only",
                holding.symbol, holding.quantity, holding.avg_price
            );
            ledger.insert(Position::external(
                &holding.symbol,
                holding.quantity,
                holding.avg_price,
                now,
            ));
            self.notify(TradeEvent::ExternalDetected {
                symbol: holding.symbol.clone(),
                quantity: holding.quantity,
                avg_price: holding.avg_price,
            });
        }
    }

    fn reconcile_pending_entries(&self, ledger: &mut PositionLedger, held: &BTreeMap<&str, &Holding>) {
        let pending: Vec<String> = ledger.pending_entries().map(|e| e.symbol.clone()).collect();
        for symbol in pending {
            if let Some(holding) = held.get(symbol.as_str()) {
                if let Some(entry) = ledger.take_pending_entry(&symbol) {
                    info!(
                        "{symbol}: pending entry confirmed, {} @ {:.2}",
                        holding.quantity, holding.avg_price
                    );
                    ledger.insert(Position::bot_entered(
                        &symbol,
                        holding.quantity,
                        holding.avg_price,
                        entry.submitted_at,
                    ));
                    self.notify(TradeEvent::Entered {
                        symbol: symbol.clone(),
                        quantity: holding.quantity,
                        price: holding.avg_price,
                        strength: entry.strength,
                        reasons: vec!["pending order confirmed".into()],
                    });
                }
                continue;
            }

            let waited = ledger.age_pending_entry(&symbol).unwrap_or(0);
            if waited >= self.config.executor.pending_timeout_cycles {
                ledger.take_pending_entry(&symbol);
                warn!("{symbol}: entry unconfirmed after {waited} cycles, dropped");
                self.notify(TradeEvent::OrderRejected {
                    symbol: symbol.clone(),
                    action: OrderAction::Enter,
                    code: BrokerErrorCode::Unconfirmed,
                    message: format!("no holding after {waited} cycles"),
                });
            }
        }
    }

    fn reconcile_position(
        &self,
        ledger: &mut PositionLedger,
        symbol: &str,
        holding: Option<&Holding>,
        now: DateTime<Utc>,
    ) {
        let Some(position) = ledger.get(symbol).cloned() else {
            return;
        };
        let broker_qty = holding.map_or(0, |h| h.quantity);

        if position.state == PositionState::PendingClose {
            if let Some(in_flight) = position.in_flight {
                let remaining_after = position.quantity - in_flight.order.quantity;
                if broker_qty <= remaining_after {
                    // Anything sold beyond the order is a manual change, adopted below.
                    let filled = (position.quantity - broker_qty).min(in_flight.order.quantity);
                    self.confirm_exit(ledger, symbol, &in_flight.order, position.last_price, filled);
                } else {
                    let timeout = self.config.executor.pending_timeout_cycles;
                    let reverted = ledger
                        .update(symbol, |p| {
                            if let Some(f) = p.in_flight.as_mut() {
                                f.cycles_waiting += 1;
                                if f.cycles_waiting >= timeout {
                                    p.revert_pending_exit(BrokerErrorCode::Unconfirmed);
                                    return true;
                                }
                            }
                            false
                        })
                        .unwrap_or(false);
                    if reverted {
                        warn!("{symbol}: exit unconfirmed after {timeout} cycles, reverted");
                        self.notify(TradeEvent::OrderRejected {
                            symbol: symbol.to_string(),
                            action: in_flight.order.kind.action(),
                            code: BrokerErrorCode::Unconfirmed,
                            message: format!("holding unchanged after {timeout} cycles"),
                        });
                    }
                }
            }
        }

        if broker_qty == 0 {
            if ledger.remove(symbol).is_some() {
                info!("{symbol}: broker reports no holding, removed from ledger");
                self.notify(TradeEvent::PositionRemoved {
                    symbol: symbol.to_string(),
                });
            }
            return;
        }

        let Some(current) = ledger.get(symbol) else {
            return;
        };
        let (current_state, current_quantity) = (current.state, current.quantity);
        let adopt = match current_state {
            PositionState::Open | PositionState::PartiallyExited => {
                current_quantity != broker_qty
            }
            PositionState::PendingClose => false,
            PositionState::Closed => {
                // Holdings include same-day fills, so units still held after a
                // confirmed close are not the bot's.
                if let Some(h) = holding {
                    warn!(
                        "{symbol}: closed but broker still holds {}, tracking as external",
                        h.quantity
                    );
                    ledger.insert(Position::external(symbol, h.quantity, h.avg_price, now));
                    self.notify(TradeEvent::ExternalDetected {
                        symbol: symbol.to_string(),
                        quantity: h.quantity,
                        avg_price: h.avg_price,
                    });
                }
                false
            }
        };
        if adopt {
            info!(
                "{symbol}: broker quantity {broker_qty} differs from ledger {}, adopting",
                current_quantity
            );
            ledger.update(symbol, |p| {
                p.quantity = broker_qty;
                p.deferred = None;
            });
        }
    }

    fn confirm_exit(
        &self,
        ledger: &mut PositionLedger,
        symbol: &str,
        order: &ExitOrder,
        price: f64,
        filled: i64,
    ) {
        let applied = ledger.update(symbol, |p| p.apply_exit_fill(order, price, filled));
        match applied {
            Some(Ok(())) => self.notify_exit_fill(ledger, symbol, order, price, filled),
            Some(Err(e)) => warn!("{symbol}: could not apply confirmed exit: {e}"),
            None => {}
        }
    }

    // Per-symbol pass

    fn process_symbol(
        &self,
        ledger: &mut PositionLedger,
        symbol: &str,
        now: DateTime<Utc>,
    ) -> Result<SymbolReport, TradexError> {
        if ledger.pending_entry(symbol).is_some() {
            return Ok(SymbolReport::new(
                symbol,
                SymbolStatus::Waiting("entry order pending".into()),
            ));
        }

        let snapshot = match self.ports.feed.get_snapshot(symbol) {
            Ok(s) => s,
            Err(e) => {
                warn!("{symbol}: skipped this cycle: {e}");
                return Ok(SymbolReport::new(symbol, SymbolStatus::Skipped(e.to_string())));
            }
        };

        if !ledger.contains(symbol) {
            let evaluation = signal::evaluate(&snapshot, &self.config.signal).without_position();
            log_evaluation(symbol, &snapshot, &evaluation);
            return self.consider_entry(ledger, symbol, &snapshot, evaluation, now);
        }

        ledger.update(symbol, |p| p.refresh_price(snapshot.price));
        let Some(position) = ledger.get(symbol).cloned() else {
            return Err(missing(symbol));
        };

        if !position.is_bot_entered() {
            debug!(
                "{symbol}: external position, monitor only (P&L {:+.2})",
                position.unrealized_pnl()
            );
            return Ok(SymbolReport::new(symbol, SymbolStatus::MonitorOnly));
        }

        let evaluation = signal::evaluate(&snapshot, &self.config.signal);
        log_evaluation(symbol, &snapshot, &evaluation);
        let mut report = SymbolReport::new(symbol, SymbolStatus::Evaluated);

        match position.state {
            PositionState::Closed => {
                report.status = SymbolStatus::Waiting("closed, awaiting broker settlement".into());
                report.evaluation = Some(evaluation);
                return Ok(report);
            }
            PositionState::PendingClose => {
                report.status = SymbolStatus::Waiting("exit order pending".into());
                report.evaluation = Some(evaluation);
                return Ok(report);
            }
            PositionState::Open | PositionState::PartiallyExited => {}
        }

        let exit = match position.deferred {
            Some(deferred) => {
                info!(
                    "{symbol}: resubmitting deferred {} x{}",
                    deferred.kind.action(),
                    deferred.quantity
                );
                Some(deferred)
            }
            None => exit_rules::check_exit(
                &position,
                snapshot.price,
                snapshot.atr,
                evaluation.signal,
                &self.config.exits,
            ),
        };
        report.evaluation = Some(evaluation);

        if let Some(order) = exit {
            report.decision = self.exit_decision(&order);
            report.outcome = Some(self.execute_exit(ledger, symbol, order, snapshot.price)?);
        }
        Ok(report)
    }

    fn exit_decision(&self, order: &ExitOrder) -> Decision {
        match order.kind {
            ExitKind::Partial => Decision::PartialExit(self.config.exits.partial_exit_fraction),
            ExitKind::Full => Decision::FullExit(order.reason),
        }
    }

    fn consider_entry(
        &self,
        ledger: &mut PositionLedger,
        symbol: &str,
        snapshot: &IndicatorSnapshot,
        evaluation: Evaluation,
        now: DateTime<Utc>,
    ) -> Result<SymbolReport, TradexError> {
        let mut report = SymbolReport::new(symbol, SymbolStatus::Evaluated);
        let strength = match evaluation.signal.strength() {
            Some(s) if self.entries_allowed && self.universe.contains(symbol) => s,
            Some(_) => {
                debug!("{symbol}: entry signal ignored, entries gated");
                report.evaluation = Some(evaluation);
                return Ok(report);
            }
            None => {
                report.evaluation = Some(evaluation);
                return Ok(report);
            }
        };

        let available = self.config.capital - ledger.deployed_capital();
        let request = SizingRequest {
            symbol,
            strength,
            price: snapshot.price,
            available_capital: available,
            open_positions: ledger.bot_open_count(),
        };
        let quantity = match self.ports.risk.size_for(&request) {
            Ok(q) => q,
            Err(rejection) => {
                info!("{symbol}: {strength} not taken: {rejection}");
                report.evaluation = Some(evaluation);
                return Ok(report);
            }
        };

        report.decision = Decision::Enter(strength);
        let execution = self.executor.enter(symbol, quantity, snapshot.price);
        match &execution.outcome {
            OrderOutcome::Filled {
                price,
                quantity: filled,
            } => {
                info!("{symbol}: entered {filled} @ {price:.2}");
                ledger.insert(Position::bot_entered(symbol, *filled, *price, now));
                self.notify(TradeEvent::Entered {
                    symbol: symbol.to_string(),
                    quantity: *filled,
                    price: *price,
                    strength,
                    reasons: evaluation.reasons.clone(),
                });
            }
            OrderOutcome::Pending => {
                info!("{symbol}: entry of {quantity} pending confirmation");
                ledger.add_pending_entry(PendingEntry {
                    symbol: symbol.to_string(),
                    quantity,
                    reference_price: snapshot.price,
                    strength,
                    submitted_at: now,
                    cycles_waiting: 0,
                });
                self.notify(TradeEvent::OrderPending {
                    symbol: symbol.to_string(),
                    action: OrderAction::Enter,
                    quantity,
                });
            }
            OrderOutcome::Rejected(rejection) => {
                self.notify(TradeEvent::OrderRejected {
                    symbol: symbol.to_string(),
                    action: OrderAction::Enter,
                    code: rejection.code.clone(),
                    message: rejection.message.clone(),
                });
            }
        }

        report.evaluation = Some(evaluation);
        report.outcome = Some(execution.outcome);
        Ok(report)
    }

    fn execute_exit(
        &self,
        ledger: &mut PositionLedger,
        symbol: &str,
        order: ExitOrder,
        reference_price: f64,
    ) -> Result<OrderOutcome, TradexError> {
        let ticket = ledger
            .get(symbol)
            .ok_or_else(|| missing(symbol))?
            .exit_ticket(order)?;

        let execution = self.executor.exit(&ticket, reference_price);
        match &execution.outcome {
            OrderOutcome::Filled { price, quantity } => {
                ledger
                    .update(symbol, |p| p.apply_exit_fill(&order, *price, *quantity))
                    .ok_or_else(|| missing(symbol))??;
                self.notify_exit_fill(ledger, symbol, &order, *price, *quantity);
            }
            OrderOutcome::Pending => {
                info!("{symbol}: {} pending confirmation", order.kind.action());
                ledger.update(symbol, |p| p.begin_pending_exit(order));
                self.notify(TradeEvent::OrderPending {
                    symbol: symbol.to_string(),
                    action: order.kind.action(),
                    quantity: order.quantity,
                });
            }
            OrderOutcome::Rejected(rejection) => {
                let code = rejection.code.clone();
                match code.recovery() {
                    Recovery::RetryVerbatimNextCycle => {
                        ledger.update(symbol, |p| p.record_rejection(code, Some(order)));
                        self.notify(TradeEvent::AuthorizationPending {
                            symbol: symbol.to_string(),
                            quantity: order.quantity,
                        });
                    }
                    Recovery::LimitFallback | Recovery::Terminal => {
                        ledger.update(symbol, |p| p.record_rejection(code, None));
                        self.notify(TradeEvent::OrderRejected {
                            symbol: symbol.to_string(),
                            action: order.kind.action(),
                            code: rejection.code.clone(),
                            message: rejection.message.clone(),
                        });
                    }
                }
            }
        }
        Ok(execution.outcome)
    }

    fn notify_exit_fill(
        &self,
        ledger: &PositionLedger,
        symbol: &str,
        order: &ExitOrder,
        price: f64,
        filled: i64,
    ) {
        let Some(position) = ledger.get(symbol) else {
            return;
        };
        let pnl = filled as f64 * (price - position.entry_price());
        if position.state == PositionState::Closed {
            info!("{symbol}: closed ({}) {filled} @ {price:.2}, P&L {pnl:+.2}", order.reason);
            self.notify(TradeEvent::Closed {
                symbol: symbol.to_string(),
                quantity: filled,
                price,
                reason: order.reason,
                pnl,
            });
        } else {
            info!(
                "{symbol}: sold {filled} @ {price:.2}, {} remaining",
                position.quantity
            );
            self.notify(TradeEvent::PartialExit {
                symbol: symbol.to_string(),
                quantity: filled,
                price,
                remaining: position.quantity,
                pnl,
            });
        }
    }
}

fn missing(symbol: &str) -> TradexError {
    TradexError::InvariantViolation {
        symbol: symbol.to_string(),
        reason: "position vanished from ledger mid-cycle".into(),
    }
}

fn log_evaluation(symbol: &str, snapshot: &IndicatorSnapshot, evaluation: &Evaluation) {
    let level = if evaluation.signal == Signal::Hold {
        log::Level::Debug
    } else {
        log::Level::Info
    };
    log::log!(
        level,
        "{symbol} @ {:.2} RSI {:.1} MTF {}: {} [{}]",
        snapshot.price,
        snapshot.rsi,
        snapshot.mtf_trend,
        evaluation.signal,
        evaluation.reasons.join("; ")
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decision_display() {
        assert_eq!(Decision::NoAction.to_string(), "NO_ACTION");
        assert_eq!(
            Decision::Enter(SignalStrength::StrongBuy).to_string(),
            "ENTER(STRONG_BUY)"
        );
        assert_eq!(Decision::PartialExit(0.5).to_string(), "PARTIAL_EXIT(0.5)");
        assert_eq!(
            Decision::FullExit(ExitReason::StopLoss).to_string(),
            "FULL_EXIT(STOP_LOSS)"
        );
    }

    #[test]
    fn cycle_report_counts() {
        let mut skipped = SymbolReport::new("A", SymbolStatus::Skipped("timeout".into()));
        skipped.decision = Decision::NoAction;
        let mut traded = SymbolReport::new("B", SymbolStatus::Evaluated);
        traded.evaluation = Some(Evaluation {
            signal: Signal::Buy,
            reasons: vec![],
            rule: "oversold_entry",
        });
        traded.outcome = Some(OrderOutcome::Pending);
        let report = CycleReport {
            cycle: 1,
            symbols: vec![skipped, traded],
        };
        assert_eq!(report.skipped(), 1);
        assert_eq!(report.evaluated(), 1);
        assert_eq!(report.orders(), 1);
        assert!(report.symbol("B").is_some());
    }
}
