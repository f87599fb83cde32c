use serde::Serialize;

use crate::execution::{OpenPosition, PositionManager};
use crate::feed::BarFeed;
use crate::indicators::Adx;
use crate::models::{Bar, ExitReason, Side, Trade};
use crate::risk::PaperStats;

use super::config::{ConfigError, StrategyConfig};
use super::entry::plan_entry;
use super::state::{EntryArm, SideCounters, SideState, StructureEvent};

/// One stage of the per-bar pipeline
type Step = fn(&mut Engine, &Bar);

/// Stages run after the trend filter and coarse sync, in this order.
/// Every stage handles Long before Short.
const PIPELINE: [(&str, Step); 6] = [
    ("classify_candles", Engine::classify_candles),
    ("zones_and_liquidity", Engine::update_structure),
    ("base_search", Engine::search_bases),
    ("base_lifecycle", Engine::update_bases),
    ("entries", Engine::evaluate_entries),
    ("positions", Engine::manage_positions),
];

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RunCounters {
    pub fine_bars: u64,
    pub coarse_bars: u64,
    pub long: SideCounters,
    pub short: SideCounters,
}

/// Everything a finished run reports
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunOutput {
    pub trades: Vec<Trade>,
    pub paper_trades: Vec<Trade>,
    pub equity_curve: Vec<f64>,
    pub initial_equity: f64,
    pub final_equity: f64,
    pub peak_equity: f64,
    pub paper: PaperStats,
    pub counters: RunCounters,
    pub open_positions: Vec<OpenPosition>,
}

/// Bar-by-bar zone/base strategy for both sides
pub struct Engine {
    config: StrategyConfig,
    adx: Adx,
    long: SideState,
    short: SideState,
    positions: PositionManager,
    fine_bars: u64,
    coarse_bars: u64,
}

impl Engine {
    pub fn new(config: StrategyConfig) -> Result<Self, ConfigError> {
        config.validate()?;

        Ok(Self {
            adx: Adx::new(config.adx_period),
            long: SideState::new(Side::Long),
            short: SideState::new(Side::Short),
            positions: PositionManager::new(&config),
            fine_bars: 0,
            coarse_bars: 0,
            config,
        })
    }

    pub fn config(&self) -> &StrategyConfig {
        &self.config
    }

    pub fn side(&self, side: Side) -> &SideState {
        match side {
            Side::Long => &self.long,
            Side::Short => &self.short,
        }
    }

    fn side_mut(&mut self, side: Side) -> &mut SideState {
        match side {
            Side::Long => &mut self.long,
            Side::Short => &mut self.short,
        }
    }

    pub fn positions(&self) -> &PositionManager {
        &self.positions
    }

    pub fn adx(&self) -> f64 {
        self.adx.value()
    }

    /// Run the whole feed and report
    pub fn run(mut self, feed: &BarFeed) -> RunOutput {
        let mut cursor = 0;
        for bar in &feed.fine {
            let start = cursor;
            while feed
                .coarse
                .get(cursor)
                .is_some_and(|coarse| coarse.timestamp <= bar.timestamp)
            {
                cursor += 1;
            }
            self.on_bar(bar, &feed.coarse[start..cursor]);
        }

        tracing::info!(
            "Run complete: {} bars, {} live trades, {} paper trades, equity {:.2}",
            self.fine_bars,
            self.positions.trades().len(),
            self.positions.paper_trades().len(),
            self.positions.equity()
        );
        self.finish()
    }

    /// Process one fine bar. `closed_coarse` holds the coarse bars that closed
    /// at or before it and have not been seen yet.
    pub fn on_bar(&mut self, bar: &Bar, closed_coarse: &[Bar]) {
        self.fine_bars += 1;
        self.long.begin_bar(bar);
        self.short.begin_bar(bar);

        self.adx.update(bar);
        for coarse in closed_coarse {
            self.on_coarse_bar(coarse);
        }

        for (name, step) in PIPELINE {
            tracing::trace!(step = name, "pipeline");
            step(self, bar);
        }
    }

    fn on_coarse_bar(&mut self, bar: &Bar) {
        self.coarse_bars += 1;
        let offset = self.config.liquidity_offset;
        self.long.on_coarse_bar(bar, offset);
        self.short.on_coarse_bar(bar, offset);
    }

    fn classify_candles(&mut self, _bar: &Bar) {
        self.long.classify_candle();
        self.short.classify_candle();
    }

    fn update_structure(&mut self, bar: &Bar) {
        let stale_distance = self.config.liquidity_stale_distance;

        for side in Side::BOTH {
            let state = self.side_mut(side);
            let events = [state.update_zones(), state.update_liquidity(stale_distance)];

            for event in events.into_iter().flatten() {
                let reason = match event {
                    StructureEvent::ZoneTouched { .. } => ExitReason::OpposingZoneTouched,
                    StructureEvent::LiquidityCrossed { .. } => ExitReason::OpposingLiquidityCrossed,
                };
                let opposite = side.opposite();
                if self.side_mut(opposite).cancel_flow() {
                    tracing::info!("Cancel {} flow: {:?} on {} side", opposite, event, side);
                }
                self.force_close(opposite, bar, reason);
            }
        }
    }

    fn search_bases(&mut self, _bar: &Bar) {
        let config = &self.config;
        self.long.search_base(config);
        self.short.search_base(config);
    }

    fn update_bases(&mut self, bar: &Bar) {
        for side in Side::BOTH {
            let config = &self.config;
            let exit = match side {
                Side::Long => self.long.update_base(config),
                Side::Short => self.short.update_base(config),
            };
            if let Some(reason) = exit {
                self.force_close(side, bar, reason);
            }
        }
    }

    fn evaluate_entries(&mut self, bar: &Bar) {
        for side in Side::BOTH {
            self.try_entry(side, bar);
        }
    }

    fn try_entry(&mut self, side: Side, bar: &Bar) {
        if self.positions.has_open_position(side) {
            return;
        }
        let Some(signal) = self.side(side).entry_signal(&self.config, self.adx.value()) else {
            return;
        };

        let opposing = self.side(side.opposite()).levels_facing_opposite();
        let Some(plan) = plan_entry(&signal, &opposing, &self.config) else {
            tracing::debug!(
                "{} entry at {:.2} skipped, target blocked by opposing level",
                side,
                side.from_frame(signal.entry)
            );
            return;
        };
        if self.positions.lot_size(plan.entry - plan.stop) <= 0.0 {
            return;
        }

        self.force_close(side.opposite(), bar, ExitReason::OppositeEntry);

        let opened = self
            .positions
            .open_position(side, plan.entry, plan.stop, plan.take_profit, bar.timestamp)
            .map(|position| position.is_some());

        match opened {
            Ok(true) => {
                let state = self.side_mut(side);
                state.entry = EntryArm::Idle;
                state.counters.entries_opened += 1;
            }
            Ok(false) => {}
            Err(e) => tracing::warn!("Failed to open {} position: {}", side, e),
        }
    }

    fn manage_positions(&mut self, bar: &Bar) {
        for side in Side::BOTH {
            let opposing = self.side(side.opposite()).levels_facing_opposite();
            let frame_bar = side.frame_bar(bar);
            self.positions
                .check_exit(side, &frame_bar, &opposing, &self.config);
        }
    }

    /// Close `side`'s position at the bar's close, if any
    fn force_close(&mut self, side: Side, bar: &Bar, reason: ExitReason) -> Option<Trade> {
        self.positions
            .close_position(side, side.to_frame(bar.close), bar.timestamp, reason)
    }

    pub fn counters(&self) -> RunCounters {
        RunCounters {
            fine_bars: self.fine_bars,
            coarse_bars: self.coarse_bars,
            long: self.long.counters(),
            short: self.short.counters(),
        }
    }

    /// Snapshot of the results so far. Open positions stay open.
    pub fn finish(self) -> RunOutput {
        let counters = self.counters();
        let positions = self.positions;

        RunOutput {
            trades: positions.trades().to_vec(),
            paper_trades: positions.paper_trades().to_vec(),
            equity_curve: positions.equity_curve().to_vec(),
            initial_equity: positions.initial_equity(),
            final_equity: positions.equity(),
            peak_equity: positions.peak_equity(),
            paper: positions.paper_stats(),
            counters,
            open_positions: positions.open_positions(),
        }
    }
}
