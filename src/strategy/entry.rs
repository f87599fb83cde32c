use crate::execution::OpposingLevels;

use super::config::StrategyConfig;
use super::state::{EntryArm, SideState};

/// Bars (current included) searched for the stop once the base has broken
const BROKEN_BASE_STOP_LOOKBACK: usize = 10;

/// Which confirmation pattern triggered the entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryBranch {
    /// Two bars back was bearish and the current close reclaimed its open
    ReclaimOpen,
    /// Bearish bar after a bullish one, current close above the bullish close
    ReclaimClose,
}

/// Confirmed entry in a side's frame
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EntrySignal {
    pub entry: f64,
    pub stop: f64,
    pub branch: EntryBranch,
}

/// Entry with its target, in a side's frame
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EntryPlan {
    pub entry: f64,
    pub stop: f64,
    pub take_profit: f64,
}

impl SideState {
    /// Check the armed base for a confirmation bar
    pub(crate) fn entry_signal(&self, config: &StrategyConfig, adx: f64) -> Option<EntrySignal> {
        if self.entry != EntryArm::Armed {
            return None;
        }
        let base = self.base.as_ref()?;
        let (Some(cur), Some(p1), Some(p2)) = (self.fine.ago(0), self.fine.ago(1), self.fine.ago(2))
        else {
            return None;
        };
        if !config.in_trading_session(cur.timestamp) {
            return None;
        }

        let buffer = config.zone_touch_buffer;
        let retested = cur.low.min(p1.low).min(p2.low) < base.band.top + buffer;
        if !cur.is_bullish() || !retested {
            return None;
        }

        let branch = if p2.is_bearish() {
            (cur.close >= p2.open).then_some(EntryBranch::ReclaimOpen)
        } else if p1.is_bearish() && p2.is_bullish() {
            (cur.close >= p2.close).then_some(EntryBranch::ReclaimClose)
        } else {
            None
        }?;

        let small_wick = (cur.high - cur.close) < (cur.close - cur.open);
        if !small_wick || adx >= config.adx_max_entry {
            return None;
        }
        if self.base_timeout > config.max_entry_timeout_bars {
            return None;
        }

        let stop_reference = if self.break_grace.is_some() {
            self.fine
                .recent(BROKEN_BASE_STOP_LOOKBACK)
                .map(|bar| bar.low)
                .fold(f64::INFINITY, f64::min)
        } else {
            base.band.bottom
        };

        Some(EntrySignal {
            entry: cur.close,
            stop: stop_reference - buffer,
            branch,
        })
    }
}

/// Size the target in R and cap it at the nearest opposing level.
/// Returns None when the cap leaves too little room.
pub fn plan_entry(
    signal: &EntrySignal,
    opposing: &OpposingLevels,
    config: &StrategyConfig,
) -> Option<EntryPlan> {
    let risk = signal.entry - signal.stop;
    if risk <= 0.0 {
        return None;
    }

    let target = signal.entry + config.r_r_ratio_target * risk;
    let take_profit = match opposing.nearest() {
        Some(cap) => {
            if signal.entry + config.r_r_ratio_min * risk >= cap {
                return None;
            }
            target.min(cap)
        }
        None => target,
    };
    if take_profit <= signal.entry {
        return None;
    }

    Some(EntryPlan {
        entry: signal.entry,
        stop: signal.stop,
        take_profit,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Band, Base, Side};
    use crate::strategy::state::test_support::*;

    fn no_session_filter() -> StrategyConfig {
        StrategyConfig {
            enable_timerange_filter: false,
            ..StrategyConfig::default()
        }
    }

    fn armed_state(prices: &[(f64, f64, f64, f64)]) -> SideState {
        let mut state = SideState::new(Side::Long);
        state.base = Some(Base {
            side: Side::Long,
            band: Band::new(99.0, 100.6),
            touch_count: 1,
            created_at: t0(),
        });
        state.entry = EntryArm::Armed;
        state.base_timeout = 5;
        for bar in create_test_bars(prices) {
            state.begin_bar(&bar);
        }
        state
    }

    // Bearish bar two back, then a bullish bar reclaiming its open
    const RECLAIM_OPEN: [(f64, f64, f64, f64); 3] = [
        (101.2, 101.3, 100.5, 100.7),
        (100.7, 100.9, 100.3, 100.8),
        (100.8, 101.5, 100.6, 101.4),
    ];

    #[test]
    fn test_reclaim_open_entry_uses_base_bottom() {
        let state = armed_state(&RECLAIM_OPEN);
        let signal = state.entry_signal(&no_session_filter(), 20.0).unwrap();

        assert_eq!(signal.branch, EntryBranch::ReclaimOpen);
        assert_eq!(signal.entry, 101.4);
        assert_eq!(signal.stop, 98.5);
    }

    #[test]
    fn test_reclaim_close_branch() {
        let state = armed_state(&[
            (100.4, 100.9, 100.3, 100.8),
            (100.8, 100.9, 100.4, 100.5),
            (100.5, 101.0, 100.45, 100.95),
        ]);
        let signal = state.entry_signal(&no_session_filter(), 20.0).unwrap();
        assert_eq!(signal.branch, EntryBranch::ReclaimClose);
    }

    #[test]
    fn test_broken_base_uses_recent_low() {
        let mut state = armed_state(&[
            (99.0, 99.2, 98.0, 98.9),
            (98.9, 101.0, 98.8, 100.9),
            (100.9, 101.3, 100.5, 100.7),
            (100.7, 100.9, 100.3, 100.8),
            (100.8, 101.5, 100.6, 101.4),
        ]);
        state.break_grace = Some(4);

        let signal = state.entry_signal(&no_session_filter(), 20.0).unwrap();
        assert_eq!(signal.stop, 97.5);
    }

    #[test]
    fn test_entry_gates() {
        let config = no_session_filter();

        let state = armed_state(&RECLAIM_OPEN);
        assert!(state.entry_signal(&config, 30.0).is_none());

        let mut state = armed_state(&RECLAIM_OPEN);
        state.base_timeout = 61;
        assert!(state.entry_signal(&config, 20.0).is_none());

        let mut state = armed_state(&RECLAIM_OPEN);
        state.entry = EntryArm::Idle;
        assert!(state.entry_signal(&config, 20.0).is_none());

        // Long upper wick
        let state = armed_state(&[
            (101.2, 101.3, 100.5, 100.7),
            (100.7, 100.9, 100.3, 100.8),
            (100.8, 102.5, 100.6, 101.4),
        ]);
        assert!(state.entry_signal(&config, 20.0).is_none());

        // Session filter: 2024-04-01 00:02 UTC is 07:02 at +07:00, inside 07:00-08:00
        let state = armed_state(&RECLAIM_OPEN);
        assert!(state
            .entry_signal(&StrategyConfig::default(), 20.0)
            .is_some());
        let late = StrategyConfig {
            session_utc_offset_minutes: 0,
            ..StrategyConfig::default()
        };
        assert!(state.entry_signal(&late, 20.0).is_none());
    }

    #[test]
    fn test_uncapped_target_is_two_r() {
        let signal = EntrySignal {
            entry: 2700.0,
            stop: 2695.0,
            branch: EntryBranch::ReclaimOpen,
        };
        let plan = plan_entry(&signal, &OpposingLevels::default(), &StrategyConfig::default())
            .unwrap();
        assert_eq!(plan.take_profit, 2710.0);
    }

    #[test]
    fn test_target_capped_by_opposing_level() {
        let signal = EntrySignal {
            entry: 2700.0,
            stop: 2695.0,
            branch: EntryBranch::ReclaimOpen,
        };
        let config = StrategyConfig::default();

        let capped = OpposingLevels {
            zone_edge: Some(2708.0),
            liquidity: Some(2712.0),
        };
        assert_eq!(
            plan_entry(&signal, &capped, &config).unwrap().take_profit,
            2708.0
        );

        // Less than 1R of room
        let tight = OpposingLevels {
            zone_edge: None,
            liquidity: Some(2704.0),
        };
        assert!(plan_entry(&signal, &tight, &config).is_none());

        // Exactly 1R is not enough
        let edge = OpposingLevels {
            zone_edge: Some(2705.0),
            liquidity: None,
        };
        assert!(plan_entry(&signal, &edge, &config).is_none());
    }
}
