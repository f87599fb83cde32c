use crate::models::{BoundedHistory, Trade};
use crate::strategy::config::StrategyConfig;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Thresholds for switching between live and shadow execution
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaperModeConfig {
    pub enabled: bool,
    pub trigger_consecutive_losses: u32,
    pub trigger_win_rate_window: usize,
    pub trigger_win_rate_threshold: f64,
    pub recovery_min_wins: u32,
    pub recovery_require_positive_pnl: bool,
    pub max_duration_minutes: i64,
}

impl Default for PaperModeConfig {
    fn default() -> Self {
        Self::from(&StrategyConfig::default())
    }
}

impl From<&StrategyConfig> for PaperModeConfig {
    fn from(config: &StrategyConfig) -> Self {
        Self {
            enabled: config.enable_paper_mode,
            trigger_consecutive_losses: config.paper_trigger_consecutive_losses,
            trigger_win_rate_window: config.paper_trigger_win_rate_window,
            trigger_win_rate_threshold: config.paper_trigger_win_rate_threshold,
            recovery_min_wins: config.paper_recovery_min_wins,
            recovery_require_positive_pnl: config.paper_recovery_require_positive_pnl,
            max_duration_minutes: config.paper_max_duration_minutes,
        }
    }
}

/// Why paper mode switched on
#[derive(Debug, Clone, PartialEq)]
pub enum PaperTrip {
    ConsecutiveLosses(u32),
    WinRate { wins: usize, window: usize },
}

/// Why paper mode switched off
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaperRecovery {
    Performance,
    MaxDuration,
}

/// Mode change produced by a closed trade
#[derive(Debug, Clone, PartialEq)]
pub enum PaperTransition {
    Activated(PaperTrip),
    Deactivated(PaperRecovery),
}

/// Statistics reported at the end of a run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PaperStats {
    pub is_active: bool,
    pub activation_count: u32,
    pub total_minutes_in_paper: f64,
    /// Paper trades of the current or most recent activation
    pub paper_trades: Vec<Trade>,
    pub paper_pnl: f64,
}

/// Paper-trading circuit breaker.
///
/// Live trades feed a consecutive-loss counter and a rolling outcome window;
/// tripping either switches execution to paper. Paper trades accumulate their
/// own pnl and win streak until performance (or elapsed time) restores live mode.
#[derive(Debug, Clone)]
pub struct PaperModeState {
    config: PaperModeConfig,
    is_active: bool,
    activated_at: Option<DateTime<Utc>>,
    recent_results: BoundedHistory<f64>,
    consecutive_losses: u32,
    paper_trades: Vec<Trade>,
    paper_pnl: f64,
    paper_consecutive_wins: u32,
    activation_count: u32,
    total_minutes_in_paper: f64,
}

impl PaperModeState {
    pub fn new(config: PaperModeConfig) -> Self {
        let window = config.trigger_win_rate_window;
        Self {
            config,
            is_active: false,
            activated_at: None,
            recent_results: BoundedHistory::new(window),
            consecutive_losses: 0,
            paper_trades: Vec::new(),
            paper_pnl: 0.0,
            paper_consecutive_wins: 0,
            activation_count: 0,
            total_minutes_in_paper: 0.0,
        }
    }

    pub fn is_active(&self) -> bool {
        self.config.enabled && self.is_active
    }

    pub fn consecutive_losses(&self) -> u32 {
        self.consecutive_losses
    }

    pub fn activation_count(&self) -> u32 {
        self.activation_count
    }

    pub fn stats(&self) -> PaperStats {
        PaperStats {
            is_active: self.is_active(),
            activation_count: self.activation_count,
            total_minutes_in_paper: self.total_minutes_in_paper,
            paper_trades: self.paper_trades.clone(),
            paper_pnl: self.paper_pnl,
        }
    }

    /// Post-trade hook. Paper trades can only recover, live trades can only trip.
    pub fn on_trade_closed(&mut self, trade: &Trade) -> Option<PaperTransition> {
        if trade.is_paper {
            self.record_paper(trade)
        } else {
            self.record_live(trade)
        }
    }

    fn record_live(&mut self, trade: &Trade) -> Option<PaperTransition> {
        self.recent_results.push(trade.pnl);

        if trade.is_win() {
            self.consecutive_losses = 0;
        } else {
            self.consecutive_losses += 1;
        }

        let trip = self.check_trigger()?;
        self.activate(trade.exit_time);
        Some(PaperTransition::Activated(trip))
    }

    fn record_paper(&mut self, trade: &Trade) -> Option<PaperTransition> {
        self.paper_trades.push(trade.clone());
        self.paper_pnl += trade.pnl;

        if trade.is_win() {
            self.paper_consecutive_wins += 1;
        } else {
            self.paper_consecutive_wins = 0;
        }

        tracing::debug!(
            "Paper trade #{} pnl {:+.2} | streak {}W | paper total {:+.2}",
            self.paper_trades.len(),
            trade.pnl,
            self.paper_consecutive_wins,
            self.paper_pnl
        );

        let recovery = self.check_recovery(trade.exit_time)?;
        self.deactivate(trade.exit_time);
        Some(PaperTransition::Deactivated(recovery))
    }

    fn check_trigger(&self) -> Option<PaperTrip> {
        if !self.config.enabled || self.is_active {
            return None;
        }

        // Check consecutive losses
        if self.consecutive_losses >= self.config.trigger_consecutive_losses {
            return Some(PaperTrip::ConsecutiveLosses(self.consecutive_losses));
        }

        // Check win rate over a full window
        let window = self.recent_results.len();
        if window > 0 && window >= self.config.trigger_win_rate_window {
            let wins = self.recent_results.iter().filter(|pnl| **pnl > 0.0).count();
            let win_rate = wins as f64 / window as f64;
            if win_rate < self.config.trigger_win_rate_threshold {
                return Some(PaperTrip::WinRate { wins, window });
            }
        }

        None
    }

    fn check_recovery(&self, now: DateTime<Utc>) -> Option<PaperRecovery> {
        if !self.is_active {
            return None;
        }

        if let Some(activated_at) = self.activated_at {
            if (now - activated_at).num_seconds() >= self.config.max_duration_minutes * 60 {
                return Some(PaperRecovery::MaxDuration);
            }
        }

        let pnl_ok = !self.config.recovery_require_positive_pnl || self.paper_pnl > 0.0;
        let wins_ok = self.paper_consecutive_wins >= self.config.recovery_min_wins;

        (pnl_ok && wins_ok).then_some(PaperRecovery::Performance)
    }

    fn activate(&mut self, now: DateTime<Utc>) {
        self.is_active = true;
        self.activated_at = Some(now);
        self.paper_pnl = 0.0;
        self.paper_consecutive_wins = 0;
        self.paper_trades.clear();
        self.activation_count += 1;
    }

    fn deactivate(&mut self, now: DateTime<Utc>) {
        if let Some(activated_at) = self.activated_at.take() {
            self.total_minutes_in_paper += (now - activated_at).num_seconds() as f64 / 60.0;
        }

        self.consecutive_losses = 0;
        self.is_active = false;
    }
}
