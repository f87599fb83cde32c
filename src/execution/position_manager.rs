use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::{Bar, ExitReason, Side, Trade};
use crate::risk::{PaperModeConfig, PaperModeState, PaperStats, PaperTransition};
use crate::strategy::config::{PnlModel, StrategyConfig};

/// Open position. Prices are held in the side's frame.
#[derive(Debug, Clone, PartialEq)]
pub struct Position {
    pub side: Side,
    pub entry_price: f64,
    pub stop_loss: f64,
    pub take_profit: f64,
    pub lot_size: f64,
    pub entry_time: DateTime<Utc>,
    /// Trailing promotion not yet applied
    pub stop_promotable: bool,
    pub is_paper: bool,
}

impl Position {
    /// Distance from entry to the current stop
    pub fn risk(&self) -> f64 {
        self.entry_price - self.stop_loss
    }

    pub fn snapshot(&self) -> OpenPosition {
        OpenPosition {
            side: self.side,
            entry_time: self.entry_time,
            entry_price: self.side.from_frame(self.entry_price),
            stop_loss: self.side.from_frame(self.stop_loss),
            take_profit: self.side.from_frame(self.take_profit),
            lot_size: self.lot_size,
            is_paper: self.is_paper,
        }
    }
}

/// Position still open at the end of a run, in market prices
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpenPosition {
    pub side: Side,
    pub entry_time: DateTime<Utc>,
    pub entry_price: f64,
    pub stop_loss: f64,
    pub take_profit: f64,
    pub lot_size: f64,
    pub is_paper: bool,
}

/// Nearest structure of the other side, expressed in a position's frame
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct OpposingLevels {
    /// Facing edge of the other side's most recent zone
    pub zone_edge: Option<f64>,
    /// The other side's most recent liquidity level
    pub liquidity: Option<f64>,
}

impl OpposingLevels {
    /// Closest of the two levels, used to cap targets
    pub fn nearest(&self) -> Option<f64> {
        match (self.zone_edge, self.liquidity) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }
}

/// Per-bar exit rules for one position. `bar` is in the position's frame.
///
/// Order: early exit on opposing structure, one-shot trailing promotion,
/// then stop before target.
pub fn evaluate_exit(
    position: &mut Position,
    bar: &Bar,
    opposing: &OpposingLevels,
    config: &StrategyConfig,
) -> Option<(f64, ExitReason)> {
    if config.enable_early_exit_opposing_zone {
        let stop_distance = position.risk().abs();

        if let Some(edge) = opposing.zone_edge {
            if (edge - position.entry_price).abs() < stop_distance {
                return Some((bar.close, ExitReason::OpposingZoneTooClose));
            }
        }
        if let Some(level) = opposing.liquidity {
            if (level - position.entry_price).abs() < stop_distance {
                return Some((bar.close, ExitReason::OpposingLiquidityTooClose));
            }
        }
    }

    if position.stop_promotable {
        let risk = position.risk();
        let trigger = position.entry_price + risk * config.trailing_sl_trigger;

        if bar.high >= trigger {
            position.stop_loss = position.entry_price + risk * config.trailing_sl_level;
            position.stop_promotable = false;

            tracing::debug!(
                "{} stop promoted to {:.2}",
                position.side,
                position.side.from_frame(position.stop_loss)
            );
        }
    }

    if bar.low <= position.stop_loss {
        return Some((position.stop_loss, ExitReason::StopLoss));
    }
    if bar.high >= position.take_profit {
        return Some((position.take_profit, ExitReason::TakeProfit));
    }

    None
}

/// Owns open positions, equity and the trade ledgers
pub struct PositionManager {
    long: Option<Position>,
    short: Option<Position>,
    risk_per_trade: f64,
    unit_value: f64,
    pnl_model: PnlModel,
    initial_equity: f64,
    equity: f64,
    peak_equity: f64,
    equity_curve: Vec<f64>,
    trades: Vec<Trade>,
    paper_trades: Vec<Trade>,
    next_trade_id: u64,
    paper_mode: PaperModeState,
    paper_switches: Vec<PaperSwitch>,
}

/// Paper mode change and the close that caused it
#[derive(Debug, Clone, PartialEq)]
pub struct PaperSwitch {
    pub at: DateTime<Utc>,
    pub trade_id: u64,
    pub transition: PaperTransition,
}

impl PositionManager {
    pub fn new(config: &StrategyConfig) -> Self {
        Self {
            long: None,
            short: None,
            risk_per_trade: config.risk_per_trade,
            unit_value: config.unit_value,
            pnl_model: config.pnl_model,
            initial_equity: config.initial_capital,
            equity: config.initial_capital,
            peak_equity: config.initial_capital,
            equity_curve: vec![config.initial_capital],
            trades: Vec::new(),
            paper_trades: Vec::new(),
            next_trade_id: 1,
            paper_mode: PaperModeState::new(PaperModeConfig::from(config)),
            paper_switches: Vec::new(),
        }
    }

    pub fn position(&self, side: Side) -> Option<&Position> {
        match side {
            Side::Long => self.long.as_ref(),
            Side::Short => self.short.as_ref(),
        }
    }

    fn slot(&mut self, side: Side) -> &mut Option<Position> {
        match side {
            Side::Long => &mut self.long,
            Side::Short => &mut self.short,
        }
    }

    pub fn has_open_position(&self, side: Side) -> bool {
        self.position(side).is_some()
    }

    pub fn open_positions(&self) -> Vec<OpenPosition> {
        Side::BOTH
            .iter()
            .filter_map(|side| self.position(*side).map(Position::snapshot))
            .collect()
    }

    pub fn initial_equity(&self) -> f64 {
        self.initial_equity
    }

    pub fn equity(&self) -> f64 {
        self.equity
    }

    pub fn peak_equity(&self) -> f64 {
        self.peak_equity
    }

    pub fn equity_curve(&self) -> &[f64] {
        &self.equity_curve
    }

    /// Live trades in close order
    pub fn trades(&self) -> &[Trade] {
        &self.trades
    }

    /// Paper trades across every activation
    pub fn paper_trades(&self) -> &[Trade] {
        &self.paper_trades
    }

    pub fn is_paper_mode(&self) -> bool {
        self.paper_mode.is_active()
    }

    pub fn paper_stats(&self) -> PaperStats {
        self.paper_mode.stats()
    }

    /// Every live/paper mode change, oldest first
    pub fn paper_switches(&self) -> &[PaperSwitch] {
        &self.paper_switches
    }

    /// Risk-based size: a percentage of equity divided by the stop distance's value.
    /// Zero when the stop distance is not positive.
    pub fn lot_size(&self, risk: f64) -> f64 {
        if risk <= 0.0 || !risk.is_finite() {
            return 0.0;
        }
        (self.risk_per_trade / 100.0 * self.equity) / (risk * self.unit_value)
    }

    /// Open a position for `side` with prices in the side's frame.
    ///
    /// Returns `Ok(None)` when the computed size is zero.
    pub fn open_position(
        &mut self,
        side: Side,
        entry_price: f64,
        stop_loss: f64,
        take_profit: f64,
        entry_time: DateTime<Utc>,
    ) -> anyhow::Result<Option<&Position>> {
        if self.has_open_position(side) {
            anyhow::bail!("Already have open {} position", side);
        }

        let lot_size = self.lot_size(entry_price - stop_loss);
        if lot_size <= 0.0 {
            return Ok(None);
        }

        let position = Position {
            side,
            entry_price,
            stop_loss,
            take_profit,
            lot_size,
            entry_time,
            stop_promotable: true,
            is_paper: self.paper_mode.is_active(),
        };

        tracing::info!(
            "{}ENTRY {} @ {:.2} | SL {:.2} | TP {:.2} | lot {:.2}",
            if position.is_paper { "[paper] " } else { "" },
            side,
            side.from_frame(entry_price),
            side.from_frame(stop_loss),
            side.from_frame(take_profit),
            lot_size
        );

        let slot = self.slot(side);
        *slot = Some(position);
        Ok(slot.as_ref())
    }

    /// Apply the exit rules to `side`'s position, closing it if one fires
    pub fn check_exit(
        &mut self,
        side: Side,
        frame_bar: &Bar,
        opposing: &OpposingLevels,
        config: &StrategyConfig,
    ) -> Option<Trade> {
        let position = self.slot(side).as_mut()?;
        let (exit_price, reason) = evaluate_exit(position, frame_bar, opposing, config)?;
        self.close_position(side, exit_price, frame_bar.timestamp, reason)
    }

    /// Close `side`'s position at a price in the side's frame
    pub fn close_position(
        &mut self,
        side: Side,
        exit_price: f64,
        exit_time: DateTime<Utc>,
        reason: ExitReason,
    ) -> Option<Trade> {
        let position = self.slot(side).take()?;
        let pnl = self.pnl(&position, exit_price);

        let trade = Trade {
            id: self.next_trade_id,
            side,
            entry_time: position.entry_time,
            exit_time,
            entry_price: side.from_frame(position.entry_price),
            exit_price: side.from_frame(exit_price),
            stop_loss: side.from_frame(position.stop_loss),
            take_profit: side.from_frame(position.take_profit),
            lot_size: position.lot_size,
            pnl,
            is_paper: position.is_paper,
            exit_reason: reason,
        };
        self.next_trade_id += 1;

        if trade.is_paper {
            self.paper_trades.push(trade.clone());
        } else {
            self.equity += pnl;
            self.equity_curve.push(self.equity);
            if self.equity > self.peak_equity {
                self.peak_equity = self.equity;
            }
            self.trades.push(trade.clone());
        }

        tracing::info!(
            "{}EXIT {} ({}) @ {:.2} | pnl {:+.2} | equity {:.2}",
            if trade.is_paper { "[paper] " } else { "" },
            side,
            reason,
            trade.exit_price,
            pnl,
            self.equity
        );

        if let Some(transition) = self.paper_mode.on_trade_closed(&trade) {
            match &transition {
                PaperTransition::Activated(trip) => tracing::warn!(
                    "Paper mode ON at {}: {:?} (activation #{}, equity {:.2})",
                    exit_time,
                    trip,
                    self.paper_mode.activation_count(),
                    self.equity
                ),
                PaperTransition::Deactivated(recovery) => tracing::info!(
                    "Paper mode OFF at {}: {:?} ({:.0} min in paper so far)",
                    exit_time,
                    recovery,
                    self.paper_mode.stats().total_minutes_in_paper
                ),
            }
            self.paper_switches.push(PaperSwitch {
                at: exit_time,
                trade_id: trade.id,
                transition,
            });
        }

        Some(trade)
    }

    fn pnl(&self, position: &Position, exit_price: f64) -> f64 {
        // Frame differences are already signed for the side
        let move_in_favor = exit_price - position.entry_price;

        match self.pnl_model {
            PnlModel::PointValue => position.lot_size * move_in_favor * self.unit_value,
            PnlModel::PercentChange => {
                let market_entry = position.side.from_frame(position.entry_price).abs();
                if market_entry > 0.0 {
                    position.lot_size * move_in_favor / market_entry
                } else {
                    0.0
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 2, 5, 1, 0, 0).unwrap()
    }

    fn bar_at(minutes: i64, open: f64, high: f64, low: f64, close: f64) -> Bar {
        Bar::new(t0() + Duration::minutes(minutes), open, high, low, close, 1.0)
    }

    fn point_value_config() -> StrategyConfig {
        StrategyConfig {
            pnl_model: PnlModel::PointValue,
            ..Default::default()
        }
    }

    fn long_position() -> Position {
        Position {
            side: Side::Long,
            entry_price: 2700.0,
            stop_loss: 2695.0,
            take_profit: 2710.0,
            lot_size: 1.0,
            entry_time: t0(),
            stop_promotable: true,
            is_paper: false,
        }
    }

    #[test]
    fn test_lot_size_from_risk() {
        let manager = PositionManager::new(&StrategyConfig::default());
        // 4% of 1000 = 40 at risk, 5 points × 0.1 per unit
        assert!((manager.lot_size(5.0) - 80.0).abs() < 1e-9);
        assert_eq!(manager.lot_size(0.0), 0.0);
    }

    #[test]
    fn test_trailing_stop_promotes_once() {
        let config = StrategyConfig::default();
        let mut position = long_position();

        // 1.4R excursion: nothing happens
        let bar = bar_at(1, 2700.0, 2707.0, 2699.0, 2706.0);
        assert_eq!(
            evaluate_exit(&mut position, &bar, &OpposingLevels::default(), &config),
            None
        );
        assert_eq!(position.stop_loss, 2695.0);

        // 1.5R reached: stop moves to +1R
        let bar = bar_at(2, 2706.0, 2707.5, 2706.0, 2707.0);
        assert_eq!(
            evaluate_exit(&mut position, &bar, &OpposingLevels::default(), &config),
            None
        );
        assert_eq!(position.stop_loss, 2705.0);
        assert!(!position.stop_promotable);

        // Further excursion never moves it again
        let bar = bar_at(3, 2707.0, 2709.5, 2706.5, 2709.0);
        evaluate_exit(&mut position, &bar, &OpposingLevels::default(), &config);
        assert_eq!(position.stop_loss, 2705.0);
    }

    #[test]
    fn test_stop_checked_before_target() {
        let config = StrategyConfig::default();
        let mut position = long_position();
        position.stop_promotable = false;

        // Outside bar spanning both levels
        let bar = bar_at(1, 2700.0, 2712.0, 2690.0, 2705.0);
        assert_eq!(
            evaluate_exit(&mut position, &bar, &OpposingLevels::default(), &config),
            Some((2695.0, ExitReason::StopLoss))
        );
    }

    #[test]
    fn test_take_profit_at_level() {
        let config = StrategyConfig::default();
        let mut position = long_position();
        position.stop_promotable = false;

        let bar = bar_at(1, 2704.0, 2711.0, 2703.0, 2709.0);
        assert_eq!(
            evaluate_exit(&mut position, &bar, &OpposingLevels::default(), &config),
            Some((2710.0, ExitReason::TakeProfit))
        );
    }

    #[test]
    fn test_early_exit_on_close_opposing_zone() {
        let config = StrategyConfig::default();
        let mut position = long_position();
        let opposing = OpposingLevels {
            zone_edge: Some(2703.0),
            liquidity: None,
        };

        let bar = bar_at(1, 2700.0, 2701.0, 2699.0, 2700.5);
        assert_eq!(
            evaluate_exit(&mut position, &bar, &opposing, &config),
            Some((2700.5, ExitReason::OpposingZoneTooClose))
        );

        let disabled = StrategyConfig {
            enable_early_exit_opposing_zone: false,
            ..Default::default()
        };
        let mut position = long_position();
        assert_eq!(
            evaluate_exit(&mut position, &bar, &opposing, &disabled),
            None
        );
    }

    #[test]
    fn test_target_computed_for_short_frame() {
        let config = point_value_config();
        let mut manager = PositionManager::new(&config);

        // Short at 2700, stop 2705: frame prices are negated
        let side = Side::Short;
        manager
            .open_position(
                side,
                side.to_frame(2700.0),
                side.to_frame(2705.0),
                side.to_frame(2690.0),
                t0(),
            )
            .unwrap()
            .unwrap();

        let market_bar = bar_at(1, 2693.0, 2693.5, 2689.0, 2690.5);
        let trade = manager
            .check_exit(
                side,
                &side.frame_bar(&market_bar),
                &OpposingLevels::default(),
                &config,
            )
            .unwrap();

        assert_eq!(trade.exit_reason, ExitReason::TakeProfit);
        assert_eq!(trade.exit_price, 2690.0);
        assert!(trade.pnl > 0.0);
        // 80 lots × 10 points × 0.1
        assert!((trade.pnl - 80.0).abs() < 1e-9);
        assert_eq!(manager.equity_curve(), &[1000.0, 1080.0]);
    }

    #[test]
    fn test_close_updates_equity_and_ids() {
        let config = point_value_config();
        let mut manager = PositionManager::new(&config);

        manager
            .open_position(Side::Long, 100.0, 95.0, 110.0, t0())
            .unwrap();
        assert!(manager
            .open_position(Side::Long, 100.0, 95.0, 110.0, t0())
            .is_err());

        let trade = manager
            .close_position(Side::Long, 95.0, t0() + Duration::minutes(3), ExitReason::StopLoss)
            .unwrap();
        assert_eq!(trade.id, 1);
        assert!((trade.pnl + 40.0).abs() < 1e-9);
        assert!((manager.equity() - 960.0).abs() < 1e-9);
        assert_eq!(manager.peak_equity(), 1000.0);
        assert!(manager.close_position(Side::Long, 95.0, t0(), ExitReason::StopLoss).is_none());
    }

    #[test]
    fn test_percent_change_pnl() {
        let mut manager = PositionManager::new(&StrategyConfig::default());
        manager
            .open_position(Side::Long, 2000.0, 1995.0, 2010.0, t0())
            .unwrap();

        let trade = manager
            .close_position(Side::Long, 2010.0, t0(), ExitReason::TakeProfit)
            .unwrap();
        // 80 lots × 0.5%
        assert!((trade.pnl - 0.4).abs() < 1e-9);
    }

    #[test]
    fn test_position_managed_on_entry_bar() {
        let config = StrategyConfig::default();
        let mut manager = PositionManager::new(&config);
        manager
            .open_position(Side::Long, 2700.0, 2695.0, 2710.0, t0())
            .unwrap();

        let entry_bar = bar_at(0, 2699.0, 2700.0, 2690.0, 2700.0);
        let trade = manager
            .check_exit(Side::Long, &entry_bar, &OpposingLevels::default(), &config)
            .unwrap();

        assert_eq!(trade.exit_reason, ExitReason::StopLoss);
        assert_eq!(trade.exit_price, 2695.0);
        assert_eq!(trade.entry_time, trade.exit_time);
        assert!(!manager.has_open_position(Side::Long));
    }

    #[test]
    fn test_paper_trades_leave_equity_alone() {
        let config = StrategyConfig {
            paper_trigger_consecutive_losses: 1,
            pnl_model: PnlModel::PointValue,
            ..Default::default()
        };
        let mut manager = PositionManager::new(&config);

        manager
            .open_position(Side::Long, 100.0, 95.0, 110.0, t0())
            .unwrap();
        manager.close_position(Side::Long, 95.0, t0(), ExitReason::StopLoss);
        assert!(manager.is_paper_mode());
        let equity = manager.equity();

        manager
            .open_position(Side::Long, 100.0, 95.0, 110.0, t0())
            .unwrap();
        let trade = manager
            .close_position(Side::Long, 95.0, t0(), ExitReason::StopLoss)
            .unwrap();

        assert!(trade.is_paper);
        assert_eq!(manager.equity(), equity);
        assert_eq!(manager.trades().len(), 1);
        assert_eq!(manager.paper_trades().len(), 1);
        assert_eq!(manager.equity_curve().len(), 2);
    }

    #[test]
    fn test_paper_switches_recorded() {
        let config = StrategyConfig {
            paper_trigger_consecutive_losses: 1,
            paper_recovery_min_wins: 1,
            pnl_model: PnlModel::PointValue,
            ..Default::default()
        };
        let mut manager = PositionManager::new(&config);

        manager
            .open_position(Side::Long, 100.0, 95.0, 110.0, t0())
            .unwrap();
        manager.close_position(Side::Long, 95.0, t0() + Duration::minutes(5), ExitReason::StopLoss);

        manager
            .open_position(Side::Long, 100.0, 95.0, 110.0, t0() + Duration::minutes(6))
            .unwrap();
        manager.close_position(Side::Long, 110.0, t0() + Duration::minutes(9), ExitReason::TakeProfit);

        let switches = manager.paper_switches();
        assert_eq!(switches.len(), 2);
        assert_eq!(switches[0].at, t0() + Duration::minutes(5));
        assert_eq!(switches[0].trade_id, 1);
        assert!(matches!(switches[0].transition, PaperTransition::Activated(_)));
        assert_eq!(switches[1].trade_id, 2);
        assert_eq!(
            switches[1].transition,
            PaperTransition::Deactivated(crate::risk::PaperRecovery::Performance)
        );
        assert!(!manager.is_paper_mode());
    }
}
