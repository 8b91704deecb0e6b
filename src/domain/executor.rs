//! Order executor: turns a decision into broker order attempts.
//!
//! A market order goes first. A rejection is then handled according to the
//! code's declared [`Recovery`]: at most one immediate limit-order fallback,
//! otherwise the rejection is handed back for the controller to record.

use log::{info, warn};

use super::order::{
    BrokerErrorCode, BrokerRejection, OrderAction, OrderOutcome, OrderRequest, Recovery, Side,
};
use super::position::ExitTicket;
use crate::ports::broker_port::BrokerPort;

#[derive(Debug, Clone, PartialEq)]
pub struct ExecutorConfig {
    /// Distance of the fallback limit price through the reference, in percent.
    pub limit_offset_pct: f64,
    /// Cycles a pending order may stay unconfirmed before it is reverted.
    pub pending_timeout_cycles: u32,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        ExecutorConfig {
            limit_offset_pct: 0.5,
            pending_timeout_cycles: 5,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionReport {
    pub outcome: OrderOutcome,
    /// Every order actually sent, in order.
    pub attempts: Vec<OrderRequest>,
}

impl ExecutionReport {
    pub fn used_fallback(&self) -> bool {
        self.attempts.len() > 1
    }
}

/// Limit price for the fallback order, rounded to the paisa.
///
/// Buys go above the reference and sells below it, so the limit is marketable.
pub fn fallback_limit_price(side: Side, reference_price: f64, offset_pct: f64) -> f64 {
    let factor = match side {
        Side::Buy => 1.0 + offset_pct / 100.0,
        Side::Sell => 1.0 - offset_pct / 100.0,
    };
    (reference_price * factor * 100.0).round() / 100.0
}

pub struct OrderExecutor<'a> {
    broker: &'a dyn BrokerPort,
    config: ExecutorConfig,
}

impl<'a> OrderExecutor<'a> {
    pub fn new(broker: &'a dyn BrokerPort, config: ExecutorConfig) -> Self {
        OrderExecutor { broker, config }
    }

    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    pub fn enter(&self, symbol: &str, quantity: i64, reference_price: f64) -> ExecutionReport {
        self.execute(OrderAction::Enter, symbol, quantity, reference_price)
    }

    /// Sell under an [`ExitTicket`]; there is no other way to place a sell.
    pub fn exit(&self, ticket: &ExitTicket, reference_price: f64) -> ExecutionReport {
        let order = ticket.order();
        self.execute(
            order.kind.action(),
            ticket.symbol(),
            order.quantity,
            reference_price,
        )
    }

    fn execute(
        &self,
        action: OrderAction,
        symbol: &str,
        quantity: i64,
        reference_price: f64,
    ) -> ExecutionReport {
        let side = action.side();
        let mut attempts = Vec::new();

        if !self.broker.is_connected() {
            let rejection = BrokerRejection::new(
                BrokerErrorCode::Disconnected,
                "broker not connected; order not sent",
            );
            log_rejection(action, symbol, &rejection);
            return ExecutionReport {
                outcome: OrderOutcome::Rejected(rejection),
                attempts,
            };
        }

        let primary = OrderRequest::market(symbol, side, quantity);
        info!("{action} {symbol}: {side} {quantity} MARKET (ref {reference_price:.2})");
        let outcome = self.broker.place_order(&primary);
        attempts.push(primary);

        let rejection = match outcome {
            OrderOutcome::Rejected(rejection) => rejection,
            other => return ExecutionReport { outcome: other, attempts },
        };
        log_rejection(action, symbol, &rejection);

        let outcome = match rejection.code.recovery() {
            Recovery::LimitFallback => {
                let price =
                    fallback_limit_price(side, reference_price, self.config.limit_offset_pct);
                info!("{action} {symbol}: falling back to {side} {quantity} LIMIT @ {price:.2}");
                let fallback = OrderRequest::limit(symbol, side, quantity, price);
                let outcome = self.broker.place_order(&fallback);
                attempts.push(fallback);
                if let OrderOutcome::Rejected(second) = &outcome {
                    log_rejection(action, symbol, second);
                }
                outcome
            }
            Recovery::RetryVerbatimNextCycle => {
                info!("{action} {symbol}: identical order will be resubmitted next cycle");
                OrderOutcome::Rejected(rejection)
            }
            Recovery::Terminal => OrderOutcome::Rejected(rejection),
        };

        ExecutionReport { outcome, attempts }
    }
}

fn log_rejection(action: OrderAction, symbol: &str, rejection: &BrokerRejection) {
    warn!(
        "{action} {symbol} rejected: code={} ({}) message={}",
        rejection.code.raw(),
        rejection.code.explanation(),
        rejection.message
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::error::TradexError;
    use crate::domain::order::{ExitKind, ExitOrder, ExitReason, OrderType};
    use crate::domain::position::Position;
    use crate::ports::broker_port::Holding;
    use chrono::{TimeZone, Utc};
    use std::cell::RefCell;
    use std::collections::VecDeque;

    struct ScriptedBroker {
        connected: bool,
        outcomes: RefCell<VecDeque<OrderOutcome>>,
        placed: RefCell<Vec<OrderRequest>>,
    }

    impl ScriptedBroker {
        fn new(outcomes: Vec<OrderOutcome>) -> Self {
            ScriptedBroker {
                connected: true,
                outcomes: RefCell::new(outcomes.into()),
                placed: RefCell::new(Vec::new()),
            }
        }
    }

    impl BrokerPort for ScriptedBroker {
        fn get_holdings(&self) -> Result<Vec<Holding>, TradexError> {
            Ok(Vec::new())
        }

        fn place_order(&self, request: &OrderRequest) -> OrderOutcome {
            self.placed.borrow_mut().push(request.clone());
            self.outcomes
                .borrow_mut()
                .pop_front()
                .unwrap_or(OrderOutcome::Pending)
        }

        fn is_connected(&self) -> bool {
            self.connected
        }
    }

    fn rejected(code: BrokerErrorCode) -> OrderOutcome {
        OrderOutcome::Rejected(BrokerRejection::new(code, "rejected by test broker"))
    }

    fn sell_ticket(quantity: i64) -> ExitTicket {
        let time = Utc.with_ymd_and_hms(2026, 3, 2, 4, 0, 0).unwrap();
        let position = Position::bot_entered("GOLDBEES-EQ", 10, 190.0, time);
        position
            .exit_ticket(ExitOrder {
                kind: ExitKind::Full,
                quantity,
                reason: ExitReason::TrendReversal,
            })
            .unwrap()
    }

    #[test]
    fn fallback_price_rounds_through_reference() {
        assert_eq!(fallback_limit_price(Side::Sell, 200.0, 0.5), 199.0);
        assert_eq!(fallback_limit_price(Side::Buy, 200.0, 0.5), 201.0);
        assert_eq!(fallback_limit_price(Side::Buy, 123.45, 0.5), 124.07);
    }

    #[test]
    fn market_fill_needs_one_attempt() {
        let broker = ScriptedBroker::new(vec![OrderOutcome::Filled {
            price: 100.0,
            quantity: 3,
        }]);
        let executor = OrderExecutor::new(&broker, ExecutorConfig::default());
        let report = executor.enter("GOLDBEES-EQ", 3, 100.0);
        assert!(matches!(report.outcome, OrderOutcome::Filled { quantity: 3, .. }));
        assert_eq!(report.attempts.len(), 1);
        assert_eq!(report.attempts[0].order_type, OrderType::Market);
        assert_eq!(report.attempts[0].side, Side::Buy);
    }

    #[test]
    fn cautionary_rejection_falls_back_to_limit_once() {
        let broker = ScriptedBroker::new(vec![
            rejected(BrokerErrorCode::CautionaryListing),
            OrderOutcome::Filled {
                price: 199.0,
                quantity: 10,
            },
        ]);
        let executor = OrderExecutor::new(&broker, ExecutorConfig::default());
        let report = executor.exit(&sell_ticket(10), 200.0);
        assert!(report.used_fallback());
        let fallback = &report.attempts[1];
        assert_eq!(fallback.order_type, OrderType::Limit);
        assert_eq!(fallback.side, Side::Sell);
        assert_eq!(fallback.limit_price, Some(199.0));
        assert_eq!(fallback.quantity, 10);
        assert!(matches!(report.outcome, OrderOutcome::Filled { .. }));
    }

    #[test]
    fn failed_fallback_surfaces_rejection_without_third_attempt() {
        let broker = ScriptedBroker::new(vec![
            rejected(BrokerErrorCode::CautionaryListing),
            rejected(BrokerErrorCode::CautionaryListing),
        ]);
        let executor = OrderExecutor::new(&broker, ExecutorConfig::default());
        let report = executor.exit(&sell_ticket(10), 200.0);
        assert_eq!(broker.placed.borrow().len(), 2);
        match report.outcome {
            OrderOutcome::Rejected(r) => assert_eq!(r.code, BrokerErrorCode::CautionaryListing),
            other => panic!("expected rejection, got {other:?}"),
        }
    }

    #[test]
    fn authorization_pending_is_not_retried_with_other_type() {
        let broker = ScriptedBroker::new(vec![rejected(BrokerErrorCode::AuthorizationPending)]);
        let executor = OrderExecutor::new(&broker, ExecutorConfig::default());
        let report = executor.exit(&sell_ticket(4), 200.0);
        assert_eq!(report.attempts.len(), 1);
        assert_eq!(report.attempts[0].order_type, OrderType::Market);
        assert!(matches!(
            report.outcome,
            OrderOutcome::Rejected(BrokerRejection {
                code: BrokerErrorCode::AuthorizationPending,
                ..
            })
        ));
    }

    #[test]
    fn other_rejection_is_terminal() {
        let broker = ScriptedBroker::new(vec![rejected(BrokerErrorCode::from_raw("AB9999"))]);
        let executor = OrderExecutor::new(&broker, ExecutorConfig::default());
        let report = executor.enter("GOLDBEES-EQ", 1, 50.0);
        assert_eq!(report.attempts.len(), 1);
        assert!(matches!(report.outcome, OrderOutcome::Rejected(_)));
    }

    #[test]
    fn disconnected_broker_gets_no_order() {
        let mut broker = ScriptedBroker::new(vec![]);
        broker.connected = false;
        let executor = OrderExecutor::new(&broker, ExecutorConfig::default());
        let report = executor.enter("GOLDBEES-EQ", 1, 50.0);
        assert!(report.attempts.is_empty());
        assert!(broker.placed.borrow().is_empty());
        assert!(matches!(
            report.outcome,
            OrderOutcome::Rejected(BrokerRejection {
                code: BrokerErrorCode::Disconnected,
                ..
            })
        ));
    }

    #[test]
    fn pending_outcome_passes_through() {
        let broker = ScriptedBroker::new(vec![OrderOutcome::Pending]);
        let executor = OrderExecutor::new(&broker, ExecutorConfig::default());
        let report = executor.exit(&sell_ticket(5), 200.0);
        assert_eq!(report.outcome, OrderOutcome::Pending);
        assert_eq!(report.attempts[0].quantity, 5);
    }
}
