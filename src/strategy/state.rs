use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::execution::OpposingLevels;
use crate::models::{Bar, Base, BoundedHistory, LiquidityLevel, Side, Zone};

/// Strong-candle references kept for base search
pub const STRONG_CANDLE_CAPACITY: usize = 9;
/// Fine bars retained for look-backs (base window, trigger search, 10-bar stop)
pub const FINE_HISTORY_CAPACITY: usize = 32;
/// Closed coarse bars seen by the structural detector
pub const COARSE_WINDOW: usize = 3;

/// Where a side is looking for its next base
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum BaseSearch {
    #[default]
    Idle,
    /// A liquidity level of this side was crossed
    FromLiquidity,
    /// A zone of this side was touched
    FromZone,
}

/// Entry search state for the current base
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum EntryArm {
    #[default]
    Idle,
    /// The base was touched; waiting for a confirmation bar
    Armed,
}

/// Pending breakout confirmation during base search
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Confirmation {
    pub bars: u32,
    /// Bars back to the candle that set the broken reference
    pub trigger_offset: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SideCounters {
    pub zones_created: u32,
    pub zones_removed: u32,
    pub liquidity_created: u32,
    pub liquidity_crossed: u32,
    pub bases_created: u32,
    pub entries_armed: u32,
    pub entries_opened: u32,
}

/// What a side reported to the engine during zone/liquidity upkeep
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum StructureEvent {
    ZoneTouched { touch_count: u32 },
    LiquidityCrossed { level: f64 },
}

/// All strategy state of one side. Prices live in the side's frame.
#[derive(Debug, Clone)]
pub struct SideState {
    pub(crate) side: Side,
    pub(crate) fine: BoundedHistory<Bar>,
    pub(crate) coarse: BoundedHistory<Bar>,
    pub(crate) zones: Vec<Zone>,
    pub(crate) liquidity: Vec<LiquidityLevel>,
    pub(crate) strong_candles: BoundedHistory<f64>,
    pub(crate) search: BaseSearch,
    pub(crate) confirmation: Option<Confirmation>,
    pub(crate) base: Option<Base>,
    /// Base was confirmed on the current bar
    pub(crate) base_fresh: bool,
    pub(crate) entry: EntryArm,
    /// Bars since the base was armed for entry; 0 when not counting
    pub(crate) base_timeout: u32,
    /// Bars since the base's far edge first broke; None until it does
    pub(crate) break_grace: Option<u32>,
    pub(crate) base_attempts: u32,
    /// Last crossed liquidity level, for the stale check
    pub(crate) liquidity_reference: Option<f64>,
    /// Top of the last zone removed for over-touching
    pub(crate) zone_remove_price: Option<f64>,
    /// Open of the bar that started the current search; bounds the base window
    pub(crate) remove_candle_open: Option<f64>,
    pub(crate) zone_created_this_bar: bool,
    pub(crate) counters: SideCounters,
}

impl SideState {
    pub fn new(side: Side) -> Self {
        Self {
            side,
            fine: BoundedHistory::new(FINE_HISTORY_CAPACITY),
            coarse: BoundedHistory::new(COARSE_WINDOW),
            zones: Vec::new(),
            liquidity: Vec::new(),
            strong_candles: BoundedHistory::new(STRONG_CANDLE_CAPACITY),
            search: BaseSearch::Idle,
            confirmation: None,
            base: None,
            base_fresh: false,
            entry: EntryArm::Idle,
            base_timeout: 0,
            break_grace: None,
            base_attempts: 0,
            liquidity_reference: None,
            zone_remove_price: None,
            remove_candle_open: None,
            zone_created_this_bar: false,
            counters: SideCounters::default(),
        }
    }

    pub fn side(&self) -> Side {
        self.side
    }

    pub fn zones(&self) -> &[Zone] {
        &self.zones
    }

    pub fn liquidity_levels(&self) -> &[LiquidityLevel] {
        &self.liquidity
    }

    pub fn base(&self) -> Option<&Base> {
        self.base.as_ref()
    }

    pub fn search(&self) -> BaseSearch {
        self.search
    }

    pub fn entry_arm(&self) -> EntryArm {
        self.entry
    }

    pub fn counters(&self) -> SideCounters {
        self.counters
    }

    /// Strong-candle references in market prices, oldest first
    pub fn strong_candle_prices(&self) -> Vec<f64> {
        self.strong_candles
            .iter()
            .map(|p| self.side.from_frame(*p))
            .collect()
    }

    /// Record the new fine bar and clear per-bar flags
    pub(crate) fn begin_bar(&mut self, bar: &Bar) {
        self.fine.push(self.side.frame_bar(bar));
        self.zone_created_this_bar = false;
        self.base_fresh = false;
    }

    /// Current fine bar in this side's frame
    pub(crate) fn current(&self) -> Option<&Bar> {
        self.fine.ago(0)
    }

    /// Drop the base, entry arm, counters and search mode.
    /// Returns true if anything was in progress.
    pub(crate) fn cancel_flow(&mut self) -> bool {
        let active = self.base.is_some()
            || self.entry == EntryArm::Armed
            || self.search != BaseSearch::Idle;

        self.clear_base();
        self.search = BaseSearch::Idle;
        self.confirmation = None;
        active
    }

    /// Drop the base and everything that hangs off it
    pub(crate) fn clear_base(&mut self) {
        self.base = None;
        self.entry = EntryArm::Idle;
        self.base_timeout = 0;
        self.break_grace = None;
    }

    /// Switch into a fresh base search
    pub(crate) fn start_search(&mut self, search: BaseSearch) {
        self.search = search;
        self.confirmation = None;
    }

    /// This side's latest zone edge and liquidity level, in the other side's frame
    pub fn levels_facing_opposite(&self) -> OpposingLevels {
        OpposingLevels {
            zone_edge: self.zones.last().map(|zone| -zone.band.top),
            liquidity: self.liquidity.last().map(|level| -level.level),
        }
    }

    pub(crate) fn install_base(&mut self, base: Base, trigger_offset: usize) {
        tracing::info!(
            "{} base confirmed: {:.2} - {:.2} (attempt {})",
            self.side,
            base.price_bottom(),
            base.price_top(),
            self.base_attempts + 1
        );

        self.base = Some(base);
        self.base_fresh = true;
        self.entry = EntryArm::Idle;
        self.break_grace = None;
        self.search = BaseSearch::Idle;
        self.confirmation = None;
        self.base_timeout = trigger_offset as u32 + 2;
        self.base_attempts += 1;
        self.counters.bases_created += 1;
    }

    pub(crate) fn now(&self) -> Option<DateTime<Utc>> {
        self.current().map(|bar| bar.timestamp)
    }
}
