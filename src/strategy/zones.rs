use crate::models::{Bar, LiquidityLevel, Zone};

use super::patterns::{detect_liquidity, detect_zone};
use super::state::{BaseSearch, SideState, StructureEvent};

impl SideState {
    /// Feed one closed coarse bar and run the structural detectors on the last three
    pub(crate) fn on_coarse_bar(&mut self, bar: &Bar, liquidity_offset: f64) {
        self.coarse.push(self.side.frame_bar(bar));

        let (Some(first), Some(second), Some(third)) =
            (self.coarse.ago(2), self.coarse.ago(1), self.coarse.ago(0))
        else {
            return;
        };
        let (first, second, third) = (*first, *second, *third);

        if let Some(signal) = detect_zone(&first, &second, &third) {
            if signal.cases.expansion {
                let subsumed = self.zones.last().is_some_and(|last| {
                    signal.band.top > last.band.top && signal.band.bottom < last.band.bottom
                });
                if subsumed {
                    if let Some(old) = self.zones.pop() {
                        tracing::debug!(
                            "{} zone {:.2} - {:.2} merged into expanding zone",
                            self.side.zone_name(),
                            old.price_bottom(),
                            old.price_top()
                        );
                    }
                }
            }

            let zone = Zone::new(self.side, signal.band, bar.timestamp);
            tracing::info!(
                "{} zone created: {:.2} - {:.2} {:?}",
                self.side.zone_name(),
                zone.price_bottom(),
                zone.price_top(),
                signal.cases
            );
            self.zones.push(zone);
            self.zone_created_this_bar = true;
            self.counters.zones_created += 1;
        }

        if let Some(level) = detect_liquidity(&first, &second, &third, liquidity_offset) {
            // A swing inside the latest zone is already covered by that zone
            let covered = self.zones.last().is_some_and(|zone| level < zone.band.top);
            if !covered {
                let level = LiquidityLevel {
                    side: self.side,
                    level,
                    created_at: bar.timestamp,
                };
                tracing::info!("{} liquidity at {:.2}", self.side, level.price());
                self.liquidity.push(level);
                self.counters.liquidity_created += 1;
            }
        }
    }

    /// Age zones, drop over-touched ones and evaluate a touch of the latest zone
    pub(crate) fn update_zones(&mut self) -> Option<StructureEvent> {
        let bar = *self.current()?;

        for zone in &mut self.zones {
            zone.age_in_bars += 1;
        }

        let before = self.zones.len();
        let mut removed_top = None;
        self.zones.retain_mut(|zone| {
            if zone.touch_count > 1 {
                zone.active = false;
                removed_top = Some(zone.band.top);
                false
            } else {
                true
            }
        });
        if let Some(top) = removed_top {
            self.counters.zones_removed += (before - self.zones.len()) as u32;
            self.zone_remove_price = Some(top);
            tracing::debug!(
                "{} zone removed after second touch, remove price {:.2}",
                self.side.zone_name(),
                self.side.from_frame(top)
            );
        }

        if self.zone_created_this_bar {
            return None;
        }

        let zone = self.zones.last_mut()?;
        let touching = zone.band.contains(bar.low) || zone.band.contains(bar.close);
        if !touching {
            if zone.touch_count == 1 {
                zone.retreated = true;
            }
            return None;
        }

        let fires = zone.touch_count == 0 || (zone.touch_count == 1 && zone.retreated);
        if !fires {
            return None;
        }
        zone.touch_count += 1;
        zone.retreated = false;
        let touch_count = zone.touch_count;
        let (bottom, top) = (zone.price_bottom(), zone.price_top());

        self.clear_base();
        self.remove_candle_open = self.fine.ago(2).map(|b| b.open);
        self.start_search(BaseSearch::FromZone);

        tracing::info!(
            "{} zone {:.2} - {:.2} touched (#{}), searching for base",
            self.side.zone_name(),
            bottom,
            top,
            touch_count
        );
        Some(StructureEvent::ZoneTouched { touch_count })
    }

    /// Detect a cross of the newest liquidity level below price and run the stale check
    pub(crate) fn update_liquidity(&mut self, stale_distance: f64) -> Option<StructureEvent> {
        let bar = *self.current()?;
        let mut event = None;

        if let Some(index) = self.liquidity.iter().rposition(|l| bar.low < l.level) {
            let crossed = self.liquidity.remove(index);

            let breaks_zone = self
                .zones
                .last()
                .is_some_and(|zone| bar.low < zone.band.bottom);
            if breaks_zone {
                if let Some(mut zone) = self.zones.pop() {
                    zone.active = false;
                    self.counters.zones_removed += 1;
                    tracing::debug!(
                        "{} zone {:.2} - {:.2} broken",
                        self.side.zone_name(),
                        zone.price_bottom(),
                        zone.price_top()
                    );
                }
            }

            self.clear_base();
            self.liquidity_reference = Some(crossed.level);
            self.remove_candle_open = Some(bar.open);
            self.start_search(BaseSearch::FromLiquidity);
            self.base_attempts = 0;
            self.counters.liquidity_crossed += 1;

            tracing::info!(
                "{} liquidity {:.2} crossed, searching for base",
                self.side,
                crossed.price()
            );
            event = Some(StructureEvent::LiquidityCrossed {
                level: crossed.price(),
            });
        }

        if self.search == BaseSearch::FromLiquidity {
            let stale = self
                .liquidity_reference
                .is_some_and(|reference| bar.low < reference - stale_distance);
            if stale {
                tracing::debug!("{} liquidity search abandoned, price ran away", self.side);
                self.clear_base();
                self.start_search(BaseSearch::Idle);
                self.base_attempts = 0;
                self.liquidity_reference = None;
            }
        }

        event
    }
}
