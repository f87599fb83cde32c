use chrono::{DateTime, Duration, Timelike, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Intraday trading window in minutes of the (offset) day, half-open `[start, end)`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TradingSession {
    pub start_minute: u32,
    pub end_minute: u32,
}

impl TradingSession {
    pub const fn new(start_minute: u32, end_minute: u32) -> Self {
        Self {
            start_minute,
            end_minute,
        }
    }

    pub fn contains(&self, minute_of_day: u32) -> bool {
        minute_of_day >= self.start_minute && minute_of_day < self.end_minute
    }
}

/// How a closed trade's pnl is derived from its lot size
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PnlModel {
    /// lot × signed fractional price change
    PercentChange,
    /// lot × signed price difference × unit value
    PointValue,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("adx_period must be at least 1")]
    AdxPeriod,
    #[error("{name} must be {expected}, got {value}")]
    OutOfRange {
        name: &'static str,
        expected: &'static str,
        value: f64,
    },
    #[error("trailing_sl_level ({level}) must be below trailing_sl_trigger ({trigger})")]
    TrailingLevel { level: f64, trigger: f64 },
    #[error("{0} must be at least 1 bar")]
    Timeout(&'static str),
    #[error("time range filter is enabled but no trading sessions are configured")]
    NoSessions,
    #[error("trading session {start}..{end} is not a valid minute-of-day range")]
    Session { start: u32, end: u32 },
    #[error("paper mode setting {0} must be at least 1")]
    PaperMode(&'static str),
}

/// Every tunable of the strategy. Prices are in quote units, times in bars or minutes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StrategyConfig {
    // R:R / TP logic
    pub r_r_ratio_min: f64,    // Capped target must offer at least this many R
    pub r_r_ratio_target: f64, // Uncapped target in R
    // Trailing stop
    pub trailing_sl_trigger: f64, // Excursion in R that promotes the stop
    pub trailing_sl_level: f64,   // Promoted stop level in R
    // Trend filter
    pub adx_max_entry: f64,
    pub adx_period: usize,
    // Sizing
    pub risk_per_trade: f64, // Percent of equity risked per trade
    pub unit_value: f64,
    pub pnl_model: PnlModel,
    // Base lifecycle
    pub max_entry_timeout_bars: u32,
    pub base_unarmed_timeout_bars: u32,
    pub base_break_grace_bars: u32,
    // Buffers
    pub zone_touch_buffer: f64,
    pub liquidity_offset: f64,
    pub liquidity_stale_distance: f64,
    // Session filter
    pub enable_timerange_filter: bool,
    pub session_utc_offset_minutes: i32,
    pub trading_sessions: Vec<TradingSession>,
    // Exit toggles
    pub enable_early_exit_opposing_zone: bool,
    pub enable_base_breakdown_exit: bool,
    pub enable_base_resistance_exit: bool,
    // Paper trading circuit breaker
    pub enable_paper_mode: bool,
    pub paper_trigger_consecutive_losses: u32,
    pub paper_trigger_win_rate_window: usize,
    pub paper_trigger_win_rate_threshold: f64,
    pub paper_recovery_min_wins: u32,
    pub paper_recovery_require_positive_pnl: bool,
    pub paper_max_duration_minutes: i64,
    pub initial_capital: f64,
}

impl Default for StrategyConfig {
    fn default() -> Self {
        Self {
            r_r_ratio_min: 1.0,
            r_r_ratio_target: 2.0,
            trailing_sl_trigger: 1.5, // At +1.5R...
            trailing_sl_level: 1.0,   // ...lock in +1R
            adx_max_entry: 30.0,
            adx_period: 14,
            risk_per_trade: 4.0, // 4% of equity
            unit_value: 0.1,
            pnl_model: PnlModel::PercentChange,
            max_entry_timeout_bars: 60,
            base_unarmed_timeout_bars: 80,
            base_break_grace_bars: 10,
            zone_touch_buffer: 0.5,
            liquidity_offset: 0.5,
            liquidity_stale_distance: 5.0,
            enable_timerange_filter: true,
            session_utc_offset_minutes: 7 * 60, // UTC+7
            trading_sessions: vec![
                TradingSession::new(7 * 60, 8 * 60),             // 07:00-08:00
                TradingSession::new(8 * 60 + 30, 9 * 60 + 30),   // 08:30-09:30
                TradingSession::new(12 * 60 + 30, 13 * 60 + 30), // 12:30-13:30
                TradingSession::new(14 * 60, 14 * 60 + 30),      // 14:00-14:30
                TradingSession::new(17 * 60, 18 * 60),           // 17:00-18:00
                TradingSession::new(20 * 60, 20 * 60 + 30),      // 20:00-20:30
            ],
            enable_early_exit_opposing_zone: true,
            enable_base_breakdown_exit: true,
            enable_base_resistance_exit: true,
            enable_paper_mode: true,
            paper_trigger_consecutive_losses: 3,
            paper_trigger_win_rate_window: 10,
            paper_trigger_win_rate_threshold: 0.3,
            paper_recovery_min_wins: 2,
            paper_recovery_require_positive_pnl: true,
            paper_max_duration_minutes: 24 * 60,
            initial_capital: 1000.0,
        }
    }
}

impl StrategyConfig {
    /// Whether entries are allowed at `timestamp` under the session filter
    pub fn in_trading_session(&self, timestamp: DateTime<Utc>) -> bool {
        if !self.enable_timerange_filter {
            return true;
        }

        let local = timestamp + Duration::minutes(self.session_utc_offset_minutes as i64);
        let minute_of_day = local.hour() * 60 + local.minute();

        self.trading_sessions
            .iter()
            .any(|session| session.contains(minute_of_day))
    }

    /// Check every parameter, returning the first violation found
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.adx_period == 0 {
            return Err(ConfigError::AdxPeriod);
        }

        check(
            "r_r_ratio_target",
            self.r_r_ratio_target,
            "positive",
            |v| v > 0.0,
        )?;
        check("r_r_ratio_min", self.r_r_ratio_min, "non-negative", |v| {
            v >= 0.0
        })?;
        check(
            "trailing_sl_trigger",
            self.trailing_sl_trigger,
            "positive",
            |v| v > 0.0,
        )?;
        check(
            "trailing_sl_level",
            self.trailing_sl_level,
            "finite",
            |_| true,
        )?;
        if self.trailing_sl_level >= self.trailing_sl_trigger {
            return Err(ConfigError::TrailingLevel {
                level: self.trailing_sl_level,
                trigger: self.trailing_sl_trigger,
            });
        }
        check("adx_max_entry", self.adx_max_entry, "non-negative", |v| {
            v >= 0.0
        })?;
        check("risk_per_trade", self.risk_per_trade, "in (0, 100]", |v| {
            v > 0.0 && v <= 100.0
        })?;
        check("unit_value", self.unit_value, "positive", |v| v > 0.0)?;
        check(
            "zone_touch_buffer",
            self.zone_touch_buffer,
            "non-negative",
            |v| v >= 0.0,
        )?;
        check(
            "liquidity_offset",
            self.liquidity_offset,
            "non-negative",
            |v| v >= 0.0,
        )?;
        check(
            "liquidity_stale_distance",
            self.liquidity_stale_distance,
            "non-negative",
            |v| v >= 0.0,
        )?;
        check("initial_capital", self.initial_capital, "positive", |v| {
            v > 0.0
        })?;

        if self.max_entry_timeout_bars == 0 {
            return Err(ConfigError::Timeout("max_entry_timeout_bars"));
        }
        if self.base_unarmed_timeout_bars == 0 {
            return Err(ConfigError::Timeout("base_unarmed_timeout_bars"));
        }
        if self.base_break_grace_bars == 0 {
            return Err(ConfigError::Timeout("base_break_grace_bars"));
        }

        if self.enable_timerange_filter && self.trading_sessions.is_empty() {
            return Err(ConfigError::NoSessions);
        }
        for session in &self.trading_sessions {
            if session.start_minute >= session.end_minute || session.end_minute > 24 * 60 {
                return Err(ConfigError::Session {
                    start: session.start_minute,
                    end: session.end_minute,
                });
            }
        }

        if self.paper_trigger_consecutive_losses == 0 {
            return Err(ConfigError::PaperMode("paper_trigger_consecutive_losses"));
        }
        if self.paper_trigger_win_rate_window == 0 {
            return Err(ConfigError::PaperMode("paper_trigger_win_rate_window"));
        }
        if self.paper_max_duration_minutes <= 0 {
            return Err(ConfigError::PaperMode("paper_max_duration_minutes"));
        }
        check(
            "paper_trigger_win_rate_threshold",
            self.paper_trigger_win_rate_threshold,
            "in [0, 1]",
            |v| (0.0..=1.0).contains(&v),
        )?;

        Ok(())
    }
}

fn check(
    name: &'static str,
    value: f64,
    expected: &'static str,
    ok: impl Fn(f64) -> bool,
) -> Result<(), ConfigError> {
    if value.is_finite() && ok(value) {
        Ok(())
    } else {
        Err(ConfigError::OutOfRange {
            name,
            expected,
            value,
        })
    }
}
