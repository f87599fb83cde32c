//! Property tests for strategy invariants.
//!
//! Uses proptest to verify:
//! 1. Zone bands are ordered, top >= bottom
//! 2. Mirror symmetry: a demand fixture reflected through a pivot yields the supply outcome
//! 3. ADX stays within [0, 100]
//! 4. Determinism: the same seed and config give the same run

use chrono::{DateTime, Duration, TimeZone, Utc};
use proptest::prelude::*;
use zonebot::backtest::{MarketScenario, SyntheticDataGenerator};
use zonebot::feed::BarFeed;
use zonebot::indicators::{calculate_adx, Adx};
use zonebot::strategy::patterns::detect_zone;
use zonebot::strategy::{BaseSearch, Engine, PnlModel, StrategyConfig};
use zonebot::{Bar, Side};

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 4, 1, 0, 0, 0).unwrap()
}

fn config() -> StrategyConfig {
    StrategyConfig {
        enable_timerange_filter: false,
        pnl_model: PnlModel::PointValue,
        ..StrategyConfig::default()
    }
}

// ── Strategies (proptest) ────────────────────────────────────────────

/// Price on a 0.25 grid so that mirrored arithmetic stays exact
fn grid_price(quarters: i64) -> f64 {
    quarters as f64 * 0.25
}

fn arb_bar() -> impl Strategy<Value = Bar> {
    (8000i64..12000, 0i64..40, 0i64..40, 0i64..40, 0i64..40).prop_map(
        |(base, a, b, up, down)| {
            let open = grid_price(base + a);
            let close = grid_price(base + b);
            let high = open.max(close) + grid_price(up);
            let low = open.min(close) - grid_price(down);
            Bar::new(t0(), open, high, low, close, 1.0)
        },
    )
}

fn arb_series(len: usize) -> impl Strategy<Value = Vec<Bar>> {
    prop::collection::vec((-8i64..=8, 0i64..8, 0i64..8), len).prop_map(|steps| {
        let mut close = 2700.0;
        steps
            .into_iter()
            .enumerate()
            .map(|(i, (step, up, down))| {
                let open = close;
                close = open + grid_price(step);
                Bar::new(
                    t0() + Duration::minutes(i as i64),
                    open,
                    open.max(close) + grid_price(up),
                    open.min(close) - grid_price(down),
                    close,
                    1.0,
                )
            })
            .collect()
    })
}

// ── Fixtures ─────────────────────────────────────────────────────────

/// Demand zone on three coarse bars, then dojis wicking into it twice
fn demand_fixture(shift: f64) -> BarFeed {
    let coarse = [
        (15, 2702.0, 2703.0, 2699.0, 2700.0),
        (30, 2700.0, 2700.5, 2694.0, 2699.0),
        (45, 2699.0, 2704.5, 2696.0, 2704.0),
    ]
    .into_iter()
    .map(|(minute, o, h, l, c)| {
        Bar::new(
            t0() + Duration::minutes(minute),
            o + shift,
            h + shift,
            l + shift,
            c + shift,
            15.0,
        )
    })
    .collect();

    let fine = (0..50)
        .map(|minute| {
            let low = if minute == 46 || minute == 48 {
                2695.5
            } else {
                2704.75
            };
            Bar::new(
                t0() + Duration::minutes(minute),
                2705.0 + shift,
                2705.25 + shift,
                low + shift,
                2705.0 + shift,
                1.0,
            )
        })
        .collect();

    BarFeed::new(fine, coarse)
}

fn reflect(bar: &Bar, pivot: f64) -> Bar {
    Bar::new(
        bar.timestamp,
        2.0 * pivot - bar.open,
        2.0 * pivot - bar.low,
        2.0 * pivot - bar.high,
        2.0 * pivot - bar.close,
        bar.volume,
    )
}

fn reflect_feed(feed: &BarFeed, pivot: f64) -> BarFeed {
    BarFeed::new(
        feed.fine.iter().map(|b| reflect(b, pivot)).collect(),
        feed.coarse.iter().map(|b| reflect(b, pivot)).collect(),
    )
}

// ── 1. Zone ordering ─────────────────────────────────────────────────

proptest! {
    #[test]
    fn detected_zone_is_ordered(first in arb_bar(), second in arb_bar(), third in arb_bar()) {
        if let Some(signal) = detect_zone(&first, &second, &third) {
            prop_assert!(signal.band.top >= signal.band.bottom);
        }
    }

    #[test]
    fn engine_zones_are_ordered(bars in arb_series(600)) {
        let feed = BarFeed::from_fine(bars, 5).unwrap();
        let mut engine = Engine::new(config()).unwrap();

        let mut cursor = 0;
        for bar in &feed.fine {
            let start = cursor;
            while cursor < feed.coarse.len() && feed.coarse[cursor].timestamp <= bar.timestamp {
                cursor += 1;
            }
            engine.on_bar(bar, &feed.coarse[start..cursor]);

            for side in Side::BOTH {
                for zone in engine.side(side).zones() {
                    prop_assert!(zone.band.top >= zone.band.bottom);
                    prop_assert!(zone.price_top() >= zone.price_bottom());
                }
                if let Some(base) = engine.side(side).base() {
                    prop_assert!(base.price_top() >= base.price_bottom());
                }
            }
        }
    }
}

// ── 2. Mirror symmetry ───────────────────────────────────────────────

proptest! {
    #[test]
    fn reflected_demand_fixture_builds_supply(shift_q in -400i64..400, pivot_q in 8000i64..16000) {
        let shift = grid_price(shift_q);
        let pivot = grid_price(pivot_q);

        let feed = demand_fixture(shift);
        let mirrored = reflect_feed(&feed, pivot);

        let mut long_engine = Engine::new(config()).unwrap();
        let mut short_engine = Engine::new(config()).unwrap();
        let mut cursor = 0;
        for (bar, mirror_bar) in feed.fine.iter().zip(&mirrored.fine) {
            let start = cursor;
            while cursor < feed.coarse.len() && feed.coarse[cursor].timestamp <= bar.timestamp {
                cursor += 1;
            }
            long_engine.on_bar(bar, &feed.coarse[start..cursor]);
            short_engine.on_bar(mirror_bar, &mirrored.coarse[start..cursor]);

            let long = long_engine.side(Side::Long);
            let short = short_engine.side(Side::Short);
            prop_assert_eq!(long.zones().len(), short.zones().len());
            for (demand, supply) in long.zones().iter().zip(short.zones()) {
                prop_assert_eq!(supply.price_top(), 2.0 * pivot - demand.price_bottom());
                prop_assert_eq!(supply.price_bottom(), 2.0 * pivot - demand.price_top());
                prop_assert_eq!(supply.touch_count, demand.touch_count);
            }
            prop_assert_eq!(long.search(), short.search());
        }

        prop_assert_eq!(long_engine.side(Side::Long).search(), BaseSearch::Idle);
        let long = long_engine.counters();
        let short = short_engine.counters();
        prop_assert_eq!(long.long, short.short);
        prop_assert_eq!(long.short, short.long);
        prop_assert_eq!(long.long.zones_created, 1);
        prop_assert_eq!(long.long.zones_removed, 1);
    }

    #[test]
    fn reflected_series_swaps_sides(bars in arb_series(400), pivot_q in 8000i64..16000) {
        let pivot = grid_price(pivot_q);
        let feed = BarFeed::from_fine(bars, 5).unwrap();
        let mirrored = reflect_feed(&feed, pivot);

        let counters = Engine::new(config()).unwrap().run(&feed).counters;
        let mirrored_counters = Engine::new(config()).unwrap().run(&mirrored).counters;

        // Structure detection is per side and never depends on the other side
        prop_assert_eq!(counters.long.zones_created, mirrored_counters.short.zones_created);
        prop_assert_eq!(counters.short.zones_created, mirrored_counters.long.zones_created);
    }
}

// ── 3. ADX bounds ────────────────────────────────────────────────────

proptest! {
    #[test]
    fn adx_stays_in_range(bars in arb_series(300), period in 1usize..30) {
        let mut adx = Adx::new(period);
        for bar in &bars {
            let value = adx.update(bar);
            prop_assert!((0.0..=100.0).contains(&value), "adx {}", value);
        }

        if let Some(value) = calculate_adx(&bars, period) {
            prop_assert!((0.0..=100.0).contains(&value));
        }
    }
}

// ── 4. Determinism ───────────────────────────────────────────────────

proptest! {
    #![proptest_config(ProptestConfig::with_cases(8))]

    #[test]
    fn same_seed_same_run(seed in any::<u64>()) {
        let bars = SyntheticDataGenerator::new(seed).generate(MarketScenario::Volatile, 3000, 1);
        let feed = BarFeed::from_fine(bars, 15).unwrap();

        let first = Engine::new(config()).unwrap().run(&feed);
        let second = Engine::new(config()).unwrap().run(&feed);
        prop_assert_eq!(first, second);
    }
}
