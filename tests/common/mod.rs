#![allow(dead_code)]

use chrono::{DateTime, TimeZone, Utc};
use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use tradex::domain::error::TradexError;
use tradex::domain::event::TradeEvent;
use tradex::domain::executor::ExecutorConfig;
use tradex::domain::exit_rules::ExitConfig;
use tradex::domain::ledger::PositionLedger;
use tradex::domain::lifecycle::{Collaborators, LifecycleConfig, LifecycleController};
use tradex::domain::order::{
    BrokerErrorCode, BrokerRejection, OrderOutcome, OrderRequest, OrderType, Side,
};
use tradex::domain::signal::SignalConfig;
pub use tradex::domain::snapshot::{IndicatorSnapshot, MtfTrend};
use tradex::domain::universe::Universe;
use tradex::ports::broker_port::{BrokerPort, Holding};
use tradex::ports::ledger_store_port::LedgerStorePort;
use tradex::ports::market_data_port::MarketDataPort;
use tradex::ports::notification_port::NotificationPort;
use tradex::ports::risk_port::{RiskPort, SizingRejection, SizingRequest};

pub const GOLD: &str = "GOLDBEES-EQ";
pub const SILVER: &str = "SILVERBEES-EQ";

/// Monday 2 March 2026, given as IST wall-clock time.
pub fn ist(hour: u32, minute: u32) -> DateTime<Utc> {
    chrono_tz::Asia::Kolkata
        .with_ymd_and_hms(2026, 3, 2, hour, minute, 0)
        .unwrap()
        .with_timezone(&Utc)
}

pub fn now() -> DateTime<Utc> {
    ist(10, 0)
}

/// Neutral snapshot: evaluates to HOLD and triggers no exit on its own.
pub fn hold_snapshot(symbol: &str, price: f64) -> IndicatorSnapshot {
    IndicatorSnapshot {
        symbol: symbol.to_string(),
        timestamp: now(),
        price,
        rsi: 50.0,
        macd_histogram: 0.0,
        sma_short: price,
        sma_long: price,
        prev_sma_short: None,
        prev_sma_long: None,
        atr: 1.0,
        mtf_trend: MtfTrend::Neutral,
        volume_confirmed: false,
    }
}

/// Oversold reversal under a strong-bullish MTF with MACD confirmation.
pub fn strong_buy_snapshot(symbol: &str, price: f64) -> IndicatorSnapshot {
    IndicatorSnapshot {
        rsi: 28.0,
        macd_histogram: 0.05,
        sma_short: price * 0.98,
        sma_long: price * 0.99,
        mtf_trend: MtfTrend::StrongBullish,
        ..hold_snapshot(symbol, price)
    }
}

/// MACD bearish under a bearish MTF.
pub fn sell_snapshot(symbol: &str, price: f64) -> IndicatorSnapshot {
    IndicatorSnapshot {
        rsi: 45.0,
        macd_histogram: -0.2,
        mtf_trend: MtfTrend::Bearish,
        ..hold_snapshot(symbol, price)
    }
}

pub fn rejection(code: BrokerErrorCode) -> OrderOutcome {
    OrderOutcome::Rejected(BrokerRejection::new(code, "rejected by test broker"))
}

// Feed

#[derive(Default)]
pub struct MockFeed {
    snapshots: RefCell<HashMap<String, IndicatorSnapshot>>,
    failing: RefCell<HashSet<String>>,
    pub requests: RefCell<Vec<String>>,
}

impl MockFeed {
    pub fn set(&self, snapshot: IndicatorSnapshot) {
        self.snapshots
            .borrow_mut()
            .insert(snapshot.symbol.clone(), snapshot);
    }

    pub fn fail(&self, symbol: &str) {
        self.failing.borrow_mut().insert(symbol.to_string());
    }

    pub fn recover(&self, symbol: &str) {
        self.failing.borrow_mut().remove(symbol);
    }
}

impl MarketDataPort for MockFeed {
    fn get_snapshot(&self, symbol: &str) -> Result<IndicatorSnapshot, TradexError> {
        self.requests.borrow_mut().push(symbol.to_string());
        if self.failing.borrow().contains(symbol) {
            return Err(TradexError::DataUnavailable {
                symbol: symbol.to_string(),
                reason: "feed timeout".into(),
            });
        }
        self.snapshots
            .borrow()
            .get(symbol)
            .cloned()
            .ok_or_else(|| TradexError::DataUnavailable {
                symbol: symbol.to_string(),
                reason: "no snapshot".into(),
            })
    }
}

// Broker

/// Fills at the quoted price (market) or the limit price unless an outcome is
/// scripted. Fills move the mock holdings; pending and rejected orders do not.
pub struct MockBroker {
    holdings: RefCell<BTreeMap<String, Holding>>,
    quotes: RefCell<HashMap<String, f64>>,
    script: RefCell<VecDeque<OrderOutcome>>,
    pub orders: RefCell<Vec<OrderRequest>>,
    pub connected: Cell<bool>,
    pub holdings_unavailable: Cell<bool>,
}

impl Default for MockBroker {
    fn default() -> Self {
        MockBroker {
            holdings: RefCell::new(BTreeMap::new()),
            quotes: RefCell::new(HashMap::new()),
            script: RefCell::new(VecDeque::new()),
            orders: RefCell::new(Vec::new()),
            connected: Cell::new(true),
            holdings_unavailable: Cell::new(false),
        }
    }
}

impl MockBroker {
    pub fn quote(&self, symbol: &str, price: f64) {
        self.quotes.borrow_mut().insert(symbol.to_string(), price);
    }

    pub fn hold(&self, symbol: &str, quantity: i64, avg_price: f64) {
        let mut holdings = self.holdings.borrow_mut();
        if quantity <= 0 {
            holdings.remove(symbol);
        } else {
            holdings.insert(
                symbol.to_string(),
                Holding {
                    symbol: symbol.to_string(),
                    quantity,
                    avg_price,
                },
            );
        }
    }

    pub fn held(&self, symbol: &str) -> i64 {
        self.holdings
            .borrow()
            .get(symbol)
            .map_or(0, |h| h.quantity)
    }

    pub fn script(&self, outcomes: impl IntoIterator<Item = OrderOutcome>) {
        self.script.borrow_mut().extend(outcomes);
    }

    pub fn order_count(&self) -> usize {
        self.orders.borrow().len()
    }

    pub fn last_order(&self) -> Option<OrderRequest> {
        self.orders.borrow().last().cloned()
    }

    fn default_outcome(&self, request: &OrderRequest) -> OrderOutcome {
        let price = match request.order_type {
            OrderType::Limit => request.limit_price,
            OrderType::Market => self.quotes.borrow().get(&request.symbol).copied(),
        };
        match price {
            Some(price) => OrderOutcome::Filled {
                price,
                quantity: request.quantity,
            },
            None => rejection(BrokerErrorCode::Other("NO_QUOTE".into())),
        }
    }
}

impl BrokerPort for MockBroker {
    fn get_holdings(&self) -> Result<Vec<Holding>, TradexError> {
        if self.holdings_unavailable.get() {
            return Err(TradexError::Broker {
                reason: "holdings endpoint down".into(),
            });
        }
        Ok(self.holdings.borrow().values().cloned().collect())
    }

    fn place_order(&self, request: &OrderRequest) -> OrderOutcome {
        self.orders.borrow_mut().push(request.clone());
        let scripted = self.script.borrow_mut().pop_front();
        let outcome = scripted.unwrap_or_else(|| self.default_outcome(request));
        if let OrderOutcome::Filled { price, quantity } = outcome {
            let held = self.held(&request.symbol);
            match request.side {
                Side::Buy => self.hold(&request.symbol, held + quantity, price),
                Side::Sell => self.hold(&request.symbol, held - quantity, price),
            }
        }
        outcome
    }

    fn is_connected(&self) -> bool {
        self.connected.get()
    }
}

// Risk

/// Always sizes a fixed quantity, up to a position count.
pub struct FixedSizer {
    pub quantity: i64,
    pub max_positions: usize,
}

impl Default for FixedSizer {
    fn default() -> Self {
        FixedSizer {
            quantity: 10,
            max_positions: 2,
        }
    }
}

impl RiskPort for FixedSizer {
    fn size_for(&self, request: &SizingRequest<'_>) -> Result<i64, SizingRejection> {
        if request.open_positions >= self.max_positions {
            return Err(SizingRejection::MaxPositions(self.max_positions));
        }
        Ok(self.quantity)
    }
}

// Notifications

#[derive(Default)]
pub struct RecordingNotifier {
    pub events: RefCell<Vec<TradeEvent>>,
}

impl RecordingNotifier {
    pub fn kinds(&self) -> Vec<&'static str> {
        self.events.borrow().iter().map(TradeEvent::kind).collect()
    }

    pub fn count(&self, kind: &str) -> usize {
        self.kinds().iter().filter(|k| **k == kind).count()
    }

    pub fn clear(&self) {
        self.events.borrow_mut().clear();
    }
}

impl NotificationPort for RecordingNotifier {
    fn notify(&self, event: &TradeEvent) -> Result<(), TradexError> {
        self.events.borrow_mut().push(event.clone());
        Ok(())
    }
}

// Store

#[derive(Default)]
pub struct MemoryStore {
    pub saved: RefCell<Option<PositionLedger>>,
    pub saves: Cell<usize>,
    pub fail_saves: Cell<bool>,
}

impl LedgerStorePort for MemoryStore {
    fn load(&self) -> Result<PositionLedger, TradexError> {
        Ok(self.saved.borrow().clone().unwrap_or_default())
    }

    fn save(&self, ledger: &PositionLedger) -> Result<(), TradexError> {
        if self.fail_saves.get() {
            return Err(TradexError::Database {
                reason: "disk full".into(),
            });
        }
        *self.saved.borrow_mut() = Some(ledger.clone());
        self.saves.set(self.saves.get() + 1);
        Ok(())
    }
}

// Rig

pub fn lifecycle_config() -> LifecycleConfig {
    LifecycleConfig {
        signal: SignalConfig::default(),
        exits: ExitConfig::default(),
        executor: ExecutorConfig::default(),
        capital: 100_000.0,
    }
}

/// All collaborators for one controller, owned in one place.
pub struct Rig {
    pub universe: Universe,
    pub feed: MockFeed,
    pub broker: MockBroker,
    pub sizer: FixedSizer,
    pub notifier: RecordingNotifier,
    pub store: MemoryStore,
    pub config: LifecycleConfig,
}

impl Rig {
    pub fn new(symbols: &[&str]) -> Self {
        Rig {
            universe: Universe::new(symbols.iter().map(|s| s.to_string()).collect()),
            feed: MockFeed::default(),
            broker: MockBroker::default(),
            sizer: FixedSizer::default(),
            notifier: RecordingNotifier::default(),
            store: MemoryStore::default(),
            config: lifecycle_config(),
        }
    }

    /// Serve `snapshot` from the feed and quote its price at the broker.
    pub fn market(&self, snapshot: IndicatorSnapshot) {
        self.broker.quote(&snapshot.symbol, snapshot.price);
        self.feed.set(snapshot);
    }

    pub fn controller(&self) -> LifecycleController<'_> {
        let ports = Collaborators {
            feed: &self.feed,
            broker: &self.broker,
            risk: &self.sizer,
            notifier: &self.notifier,
            store: &self.store,
        };
        LifecycleController::new(&self.universe, ports, self.config.clone())
    }
}
