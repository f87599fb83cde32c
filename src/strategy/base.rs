use crate::models::{Band, Base, ExitReason};

use super::config::StrategyConfig;
use super::patterns::{is_strong_down, is_strong_up};
use super::state::{BaseSearch, Confirmation, EntryArm, SideState};

/// Fine bars scanned back for a base pattern
const BASE_WINDOW: usize = 6;
/// Maximum boundary extension steps
const BASE_EXTENSION_STEPS: usize = 3;
/// Minimum gap between bars for the boundary to extend
const BASE_GAP_MIN: f64 = 0.05;
/// Bars a breakout must hold before the window is scanned
const CONFIRMATION_BARS: u32 = 2;
/// Bars searched back for the candle that set the broken reference
const TRIGGER_LOOKBACK: usize = 20;

impl SideState {
    /// Push the previous bar's high when it closed as a strong down candle
    pub(crate) fn classify_candle(&mut self) {
        let (Some(prev), Some(cur)) = (self.fine.ago(1), self.fine.ago(0)) else {
            return;
        };
        if is_strong_down(prev, cur) {
            let reference = prev.high;
            self.strong_candles.push(reference);
        }
    }

    /// Advance the breakout confirmation and scan for a base once it holds
    pub(crate) fn search_base(&mut self, config: &StrategyConfig) {
        if self.search == BaseSearch::Idle {
            return;
        }
        let (Some(&reference), Some(&bar)) = (self.strong_candles.last(), self.current()) else {
            return;
        };
        if bar.high <= reference && self.confirmation.is_none() {
            return;
        }

        let mut confirmation = self.confirmation.unwrap_or_else(|| Confirmation {
            bars: 0,
            trigger_offset: self.trigger_offset(reference),
        });
        confirmation.bars += 1;
        if confirmation.bars <= CONFIRMATION_BARS {
            self.confirmation = Some(confirmation);
            return;
        }
        self.confirmation = None;

        if self.search == BaseSearch::FromZone {
            self.strong_candles.pop_last();
        }
        while self
            .strong_candles
            .last()
            .is_some_and(|&high| bar.high > high)
        {
            self.strong_candles.pop_last();
        }

        if let Some(band) = self.find_base_in_window(config.zone_touch_buffer) {
            let base = Base {
                side: self.side,
                band,
                touch_count: 0,
                created_at: bar.timestamp,
            };
            self.install_base(base, confirmation.trigger_offset);
        } else {
            tracing::trace!("{} breakout held but no base in window", self.side);
        }
    }

    fn trigger_offset(&self, reference: f64) -> usize {
        let limit = self.fine.len().saturating_sub(1).min(TRIGGER_LOOKBACK);
        (1..limit)
            .find(|&j| self.fine.ago(j).is_some_and(|bar| bar.high == reference))
            .unwrap_or(1)
    }

    /// Scan the last few fine bars for a strong-up candle that did not repeat one bar
    /// earlier, with a gap above it
    pub(crate) fn find_base_in_window(&self, buffer: f64) -> Option<Band> {
        for j in 0..BASE_WINDOW {
            let (Some(cur), Some(prev), Some(before)) =
                (self.fine.ago(j), self.fine.ago(j + 1), self.fine.ago(j + 2))
            else {
                break;
            };
            if self.remove_candle_open == Some(cur.open) {
                break;
            }
            if !is_strong_up(prev, cur) || is_strong_up(before, prev) {
                continue;
            }

            let bottom = prev.low.min(before.low);
            let Some(top) = self.extend_base_top(j) else {
                continue;
            };

            if self.search == BaseSearch::FromZone {
                let zone_top = self.zones.last().map(|zone| zone.band.top);
                let limit = match (zone_top, self.zone_remove_price) {
                    (Some(zone), Some(removed)) => Some(zone.max(removed)),
                    (zone, removed) => zone.or(removed),
                };
                if limit.is_some_and(|limit| bottom >= limit + buffer) {
                    return None;
                }
            }

            return Some(Band::new(bottom, top));
        }
        None
    }

    /// Upper boundary of a base whose pattern ends `j` bars ago
    fn extend_base_top(&self, j: usize) -> Option<f64> {
        let mut top = None;
        for step in 0..BASE_EXTENSION_STEPS {
            let Some(near) = j.checked_sub(step) else {
                break;
            };
            let (Some(gap), Some(middle), Some(far)) = (
                self.fine.ago(near),
                self.fine.ago(near + 1),
                self.fine.ago(near + 2),
            ) else {
                break;
            };

            if gap.low - far.high > BASE_GAP_MIN && middle.is_bullish() {
                top = Some(gap.low);
            } else {
                break;
            }
        }
        top
    }

    /// Timeouts, first touch and invalidation of the current base.
    /// Returns the exit to force on this side's position when the base is destroyed.
    pub(crate) fn update_base(&mut self, config: &StrategyConfig) -> Option<ExitReason> {
        let bar = *self.current()?;
        self.update_base_timeout(config);

        let base = self.base?;
        let band = base.band;
        let buffer = config.zone_touch_buffer;

        let inside = band.contains(bar.close) || band.contains(bar.low);
        if inside && self.entry == EntryArm::Idle && !self.base_fresh && base.touch_count == 0 {
            if let Some(base) = self.base.as_mut() {
                base.touch_count = 1;
            }
            self.entry = EntryArm::Armed;
            self.counters.entries_armed += 1;
            tracing::debug!(
                "{} base {:.2} - {:.2} touched, looking for entry",
                self.side,
                base.price_bottom(),
                base.price_top()
            );
        }

        let broken = bar.low < band.bottom - buffer;
        if broken && self.break_grace.is_none() {
            self.break_grace = Some(1);
        }
        if let Some(grace) = self.break_grace.as_mut() {
            *grace += 1;
        }

        if broken && self.break_grace > Some(config.base_break_grace_bars) {
            tracing::info!("{} base broken after grace period", self.side);
            self.drop_base(BaseSearch::FromLiquidity);
            return config
                .enable_base_breakdown_exit
                .then_some(ExitReason::BaseBroken);
        }

        if bar.low <= band.bottom - band.height() {
            tracing::info!("{} base resistance hit", self.side);
            self.drop_base(BaseSearch::FromZone);
            return config
                .enable_base_resistance_exit
                .then_some(ExitReason::BaseResistanceHit);
        }

        None
    }

    fn update_base_timeout(&mut self, config: &StrategyConfig) {
        if self.base_timeout > 0 {
            self.base_timeout += 1;
        }

        let armed_expired = self.base_timeout > config.max_entry_timeout_bars
            && self.base.is_some()
            && self.entry == EntryArm::Armed;
        let unarmed_expired =
            self.base_timeout > config.base_unarmed_timeout_bars && self.entry == EntryArm::Idle;

        if armed_expired || unarmed_expired {
            tracing::debug!(
                "{} base timed out after {} bars",
                self.side,
                self.base_timeout
            );
            self.clear_base();
            self.start_search(BaseSearch::Idle);
        }
    }

    /// Remove the base; the first base of a search gets one more attempt
    fn drop_base(&mut self, retry: BaseSearch) {
        self.clear_base();
        if self.base_attempts == 1 {
            self.base_attempts = 2;
            self.start_search(retry);
        }
    }
}
