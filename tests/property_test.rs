//! Property tests for the lifecycle invariants.

mod common;

use common::*;
use proptest::prelude::*;
use tradex::domain::ledger::PositionLedger;
use tradex::domain::position::{Position, PositionState};
use tradex::domain::signal::{SignalConfig, evaluate};

fn trend() -> impl Strategy<Value = MtfTrend> {
    prop_oneof![
        Just(MtfTrend::StrongBearish),
        Just(MtfTrend::Bearish),
        Just(MtfTrend::Neutral),
        Just(MtfTrend::Bullish),
        Just(MtfTrend::StrongBullish),
    ]
}

prop_compose! {
    fn snapshot_for(symbol: &'static str)(
        price in 1.0f64..500.0,
        rsi in 0.0f64..100.0,
        macd in -1.0f64..1.0,
        short_ratio in 0.9f64..1.1,
        long_ratio in 0.9f64..1.1,
        prev in proptest::option::of((0.9f64..1.1, 0.9f64..1.1)),
        atr in 0.0f64..10.0,
        mtf_trend in trend(),
        volume_confirmed in any::<bool>(),
    ) -> IndicatorSnapshot {
        IndicatorSnapshot {
            rsi,
            macd_histogram: macd,
            sma_short: price * short_ratio,
            sma_long: price * long_ratio,
            prev_sma_short: prev.map(|(s, _)| price * s),
            prev_sma_long: prev.map(|(_, l)| price * l),
            atr,
            mtf_trend,
            volume_confirmed,
            ..hold_snapshot(symbol, price)
        }
    }
}

proptest! {
    #[test]
    fn evaluation_is_idempotent(snapshot in snapshot_for(GOLD)) {
        let config = SignalConfig::default();
        prop_assert_eq!(evaluate(&snapshot, &config), evaluate(&snapshot, &config));
    }

    #[test]
    fn external_positions_never_get_orders(
        snapshots in proptest::collection::vec(snapshot_for(SILVER), 1..12),
    ) {
        let rig = Rig::new(&[SILVER]);
        rig.broker.hold(SILVER, 25, 100.0);
        let mut ledger = PositionLedger::new();
        let mut controller = rig.controller();

        for snapshot in snapshots {
            rig.market(snapshot);
            controller.run_cycle(&mut ledger, now()).unwrap();
            let position = ledger.get(SILVER).unwrap();
            prop_assert!(!position.is_bot_entered());
            prop_assert_eq!(position.quantity, 25);
        }
        prop_assert_eq!(rig.broker.order_count(), 0);
    }

    #[test]
    fn partial_exit_happens_at_most_once_and_high_water_never_drops(
        prices in proptest::collection::vec(80.0f64..130.0, 1..25),
    ) {
        let rig = Rig::new(&[GOLD]);
        let mut ledger = PositionLedger::new();
        ledger.insert(Position::bot_entered(GOLD, 10, 100.0, now()));
        rig.broker.hold(GOLD, 10, 100.0);
        let mut controller = rig.controller();

        let mut partial_seen = 0;
        let mut highest = 100.0;
        for price in prices {
            rig.market(hold_snapshot(GOLD, price));
            controller.run_cycle(&mut ledger, now()).unwrap();

            let Some(position) = ledger.get(GOLD) else { break };
            let realized = position.realized_partial_quantity();
            if partial_seen == 0 {
                partial_seen = realized;
            } else {
                prop_assert_eq!(realized, partial_seen);
            }

            if matches!(position.state, PositionState::Open | PositionState::PartiallyExited) {
                prop_assert!(position.highest_price_seen() >= highest);
                highest = position.highest_price_seen();
            }
        }
        prop_assert!(rig.notifier.count("PARTIAL_EXIT") <= 1);
    }
}
