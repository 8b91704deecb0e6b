//! In-memory broker for rehearsal runs.
//!
//! Market orders fill at the feed's current price, limit orders at their limit
//! price. Symbols can be configured to reject with the cautionary-listing or
//! delivery-authorization codes so the recovery paths can be exercised end to
//! end, or taken offline to rehearse a broker outage.

use crate::domain::error::TradexError;
use crate::domain::ledger::PositionLedger;
use crate::domain::order::{
    BrokerErrorCode, BrokerRejection, OrderOutcome, OrderRequest, OrderType, Side,
};
use crate::ports::broker_port::{BrokerPort, Holding};
use crate::ports::market_data_port::MarketDataPort;
use log::debug;
use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet};

pub struct PaperBroker<'a> {
    prices: &'a dyn MarketDataPort,
    holdings: RefCell<BTreeMap<String, Holding>>,
    cautionary: BTreeSet<String>,
    authorization_pending: BTreeSet<String>,
    offline: bool,
}

impl<'a> PaperBroker<'a> {
    pub fn new(prices: &'a dyn MarketDataPort) -> Self {
        PaperBroker {
            prices,
            holdings: RefCell::new(BTreeMap::new()),
            cautionary: BTreeSet::new(),
            authorization_pending: BTreeSet::new(),
            offline: false,
        }
    }

    /// Start from what the ledger says is held. Paper orders always fill, so
    /// orders still in flight in the ledger are treated as filled: pending
    /// entries are held and in-flight exits are already sold.
    pub fn seeded_from(self, ledger: &PositionLedger) -> Self {
        {
            let mut holdings = self.holdings.borrow_mut();
            for p in ledger.positions() {
                let sold = p.in_flight.as_ref().map_or(0, |f| f.order.quantity);
                let quantity = p.quantity - sold;
                if quantity > 0 {
                    holdings.insert(
                        p.symbol.clone(),
                        Holding {
                            symbol: p.symbol.clone(),
                            quantity,
                            avg_price: p.entry_price(),
                        },
                    );
                }
            }
            for entry in ledger.pending_entries().filter(|e| e.quantity > 0) {
                holdings.insert(
                    entry.symbol.clone(),
                    Holding {
                        symbol: entry.symbol.clone(),
                        quantity: entry.quantity,
                        avg_price: entry.reference_price,
                    },
                );
            }
        }
        self
    }

    pub fn with_holding(self, holding: Holding) -> Self {
        self.holdings
            .borrow_mut()
            .insert(holding.symbol.clone(), holding);
        self
    }

    /// Market orders for these symbols are rejected with AB4036.
    pub fn with_cautionary(mut self, symbols: impl IntoIterator<Item = String>) -> Self {
        self.cautionary.extend(symbols);
        self
    }

    /// Sells for these symbols are rejected with AB1007.
    pub fn with_authorization_pending(
        mut self,
        symbols: impl IntoIterator<Item = String>,
    ) -> Self {
        self.authorization_pending.extend(symbols);
        self
    }

    /// Simulate a broker outage: holdings fail and orders are not accepted.
    pub fn with_offline(mut self, offline: bool) -> Self {
        self.offline = offline;
        self
    }

    pub fn holding(&self, symbol: &str) -> Option<Holding> {
        self.holdings.borrow().get(symbol).cloned()
    }

    fn fill_price(&self, request: &OrderRequest) -> Result<f64, BrokerRejection> {
        match (request.order_type, request.limit_price) {
            (OrderType::Limit, Some(price)) => Ok(price),
            (OrderType::Limit, None) => Err(BrokerRejection::new(
                BrokerErrorCode::Other("NO_LIMIT_PRICE".into()),
                "limit order without a price",
            )),
            (OrderType::Market, _) => self
                .prices
                .get_snapshot(&request.symbol)
                .map(|s| s.price)
                .map_err(|e| {
                    BrokerRejection::new(BrokerErrorCode::Other("NO_QUOTE".into()), e.to_string())
                }),
        }
    }

    fn check_restrictions(&self, request: &OrderRequest) -> Result<(), BrokerRejection> {
        if request.order_type == OrderType::Market && self.cautionary.contains(&request.symbol) {
            return Err(BrokerRejection::new(
                BrokerErrorCode::CautionaryListing,
                "market orders blocked for cautionary listing",
            ));
        }
        if request.side == Side::Sell && self.authorization_pending.contains(&request.symbol) {
            return Err(BrokerRejection::new(
                BrokerErrorCode::AuthorizationPending,
                "EDIS authorization pending",
            ));
        }
        if request.quantity <= 0 {
            return Err(BrokerRejection::new(
                BrokerErrorCode::Other("INVALID_QTY".into()),
                format!("quantity {} must be positive", request.quantity),
            ));
        }
        Ok(())
    }

    fn apply_fill(&self, request: &OrderRequest, price: f64) -> Result<(), BrokerRejection> {
        let mut holdings = self.holdings.borrow_mut();
        match request.side {
            Side::Buy => {
                let entry = holdings
                    .entry(request.symbol.clone())
                    .or_insert_with(|| Holding {
                        symbol: request.symbol.clone(),
                        quantity: 0,
                        avg_price: 0.0,
                    });
                let total = entry.quantity + request.quantity;
                entry.avg_price = (entry.avg_price * entry.quantity as f64
                    + price * request.quantity as f64)
                    / total as f64;
                entry.quantity = total;
            }
            Side::Sell => {
                let held = holdings.get(&request.symbol).map_or(0, |h| h.quantity);
                if held < request.quantity {
                    return Err(BrokerRejection::new(
                        BrokerErrorCode::Other("INSUFFICIENT_QTY".into()),
                        format!("holding {held}, asked to sell {}", request.quantity),
                    ));
                }
                if held == request.quantity {
                    holdings.remove(&request.symbol);
                } else if let Some(h) = holdings.get_mut(&request.symbol) {
                    h.quantity -= request.quantity;
                }
            }
        }
        Ok(())
    }
}

impl BrokerPort for PaperBroker<'_> {
    fn get_holdings(&self) -> Result<Vec<Holding>, TradexError> {
        if self.offline {
            return Err(TradexError::Broker {
                reason: "paper broker is offline".into(),
            });
        }
        Ok(self.holdings.borrow().values().cloned().collect())
    }

    fn place_order(&self, request: &OrderRequest) -> OrderOutcome {
        let result = self
            .check_restrictions(request)
            .and_then(|()| self.fill_price(request))
            .and_then(|price| self.apply_fill(request, price).map(|()| price));

        match result {
            Ok(price) => {
                debug!(
                    "paper fill: {} {} x{} @ {price:.2}",
                    request.side, request.symbol, request.quantity
                );
                OrderOutcome::Filled {
                    price,
                    quantity: request.quantity,
                }
            }
            Err(rejection) => OrderOutcome::Rejected(rejection),
        }
    }

    fn is_connected(&self) -> bool {
        !self.offline
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::position::Position;
    use crate::domain::snapshot::{IndicatorSnapshot, MtfTrend};
    use chrono::{TimeZone, Utc};

    struct FixedQuote(f64);

    impl MarketDataPort for FixedQuote {
        fn get_snapshot(&self, symbol: &str) -> Result<IndicatorSnapshot, TradexError> {
            Ok(IndicatorSnapshot {
                symbol: symbol.to_string(),
                timestamp: Utc.with_ymd_and_hms(2026, 3, 2, 4, 30, 0).unwrap(),
                price: self.0,
                rsi: 50.0,
                macd_histogram: 0.0,
                sma_short: self.0,
                sma_long: self.0,
                prev_sma_short: None,
                prev_sma_long: None,
                atr: 1.0,
                mtf_trend: MtfTrend::Neutral,
                volume_confirmed: false,
            })
        }
    }

    #[test]
    fn market_buy_fills_at_quote_and_averages_in() {
        let quote = FixedQuote(100.0);
        let broker = PaperBroker::new(&quote).with_holding(Holding {
            symbol: "GOLDBEES-EQ".into(),
            quantity: 10,
            avg_price: 80.0,
        });
        let outcome = broker.place_order(&OrderRequest::market("GOLDBEES-EQ", Side::Buy, 10));
        assert_eq!(
            outcome,
            OrderOutcome::Filled {
                price: 100.0,
                quantity: 10
            }
        );
        let holding = broker.holding("GOLDBEES-EQ").unwrap();
        assert_eq!(holding.quantity, 20);
        assert!((holding.avg_price - 90.0).abs() < 1e-9);
    }

    #[test]
    fn cautionary_symbol_rejects_market_but_fills_limit() {
        let quote = FixedQuote(200.0);
        let broker = PaperBroker::new(&quote)
            .with_holding(Holding {
                symbol: "SILVERBEES-EQ".into(),
                quantity: 3,
                avg_price: 180.0,
            })
            .with_cautionary(["SILVERBEES-EQ".to_string()]);

        let market = broker.place_order(&OrderRequest::market("SILVERBEES-EQ", Side::Sell, 3));
        assert!(matches!(
            market,
            OrderOutcome::Rejected(BrokerRejection { code: BrokerErrorCode::CautionaryListing, .. })
        ));

        let limit =
            broker.place_order(&OrderRequest::limit("SILVERBEES-EQ", Side::Sell, 3, 199.0));
        assert_eq!(
            limit,
            OrderOutcome::Filled {
                price: 199.0,
                quantity: 3
            }
        );
        assert!(broker.holding("SILVERBEES-EQ").is_none());
    }

    #[test]
    fn authorization_pending_blocks_sells_only() {
        let quote = FixedQuote(50.0);
        let broker = PaperBroker::new(&quote)
            .with_holding(Holding {
                symbol: "TCS-EQ".into(),
                quantity: 4,
                avg_price: 40.0,
            })
            .with_authorization_pending(["TCS-EQ".to_string()]);

        let sell = broker.place_order(&OrderRequest::market("TCS-EQ", Side::Sell, 2));
        assert!(matches!(
            sell,
            OrderOutcome::Rejected(BrokerRejection { code: BrokerErrorCode::AuthorizationPending, .. })
        ));
        let buy = broker.place_order(&OrderRequest::market("TCS-EQ", Side::Buy, 1));
        assert!(matches!(buy, OrderOutcome::Filled { .. }));
    }

    #[test]
    fn overselling_is_rejected() {
        let quote = FixedQuote(50.0);
        let broker = PaperBroker::new(&quote);
        let outcome = broker.place_order(&OrderRequest::market("TCS-EQ", Side::Sell, 1));
        assert!(matches!(outcome, OrderOutcome::Rejected(_)));
    }

    #[test]
    fn seeding_skips_closed_positions() {
        let quote = FixedQuote(50.0);
        let t = Utc.with_ymd_and_hms(2026, 3, 2, 4, 30, 0).unwrap();
        let mut ledger = PositionLedger::new();
        ledger.insert(Position::bot_entered("GOLDBEES-EQ", 5, 100.0, t));
        let mut closed = Position::bot_entered("TCS-EQ", 0, 100.0, t);
        closed.quantity = 0;
        ledger.insert(closed);

        let broker = PaperBroker::new(&quote).seeded_from(&ledger);
        let holdings = broker.get_holdings().unwrap();
        assert_eq!(holdings.len(), 1);
        assert_eq!(holdings[0].symbol, "GOLDBEES-EQ");
        assert_eq!(holdings[0].quantity, 5);
    }

    #[test]
    fn seeding_treats_in_flight_orders_as_filled() {
        use crate::domain::ledger::PendingEntry;
        use crate::domain::order::{ExitKind, ExitOrder, ExitReason};
        use crate::domain::position::{InFlightExit, PositionState};
        use crate::domain::signal::SignalStrength;

        let quote = FixedQuote(50.0);
        let t = Utc.with_ymd_and_hms(2026, 3, 2, 4, 30, 0).unwrap();
        let mut ledger = PositionLedger::new();
        let mut closing = Position::bot_entered("GOLDBEES-EQ", 10, 100.0, t);
        closing.in_flight = Some(InFlightExit {
            order: ExitOrder {
                kind: ExitKind::Partial,
                quantity: 4,
                reason: ExitReason::PartialTarget,
            },
            prior_state: PositionState::Open,
            cycles_waiting: 0,
        });
        ledger.insert(closing);
        ledger.add_pending_entry(PendingEntry {
            symbol: "SILVERBEES-EQ".into(),
            quantity: 7,
            reference_price: 80.0,
            strength: SignalStrength::Buy,
            submitted_at: t,
            cycles_waiting: 2,
        });

        let broker = PaperBroker::new(&quote).seeded_from(&ledger);
        assert_eq!(broker.holding("GOLDBEES-EQ").unwrap().quantity, 6);
        let silver = broker.holding("SILVERBEES-EQ").unwrap();
        assert_eq!(silver.quantity, 7);
        assert_eq!(silver.avg_price, 80.0);
    }

    #[test]
    fn offline_broker_reports_holdings_failure() {
        let quote = FixedQuote(50.0);
        let broker = PaperBroker::new(&quote).with_offline(true);
        assert!(!broker.is_connected());
        let err = broker.get_holdings().unwrap_err();
        assert!(matches!(err, TradexError::Broker { .. }));
        assert!(!err.is_fatal());
    }
}
