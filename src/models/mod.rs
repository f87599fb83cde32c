use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

pub mod history;

pub use history::BoundedHistory;

/// OHLCV bar, used for both the fine (execution) and coarse (structure) timeframes
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl Bar {
    pub fn new(
        timestamp: DateTime<Utc>,
        open: f64,
        high: f64,
        low: f64,
        close: f64,
        volume: f64,
    ) -> Self {
        Self {
            timestamp,
            open,
            high,
            low,
            close,
            volume,
        }
    }

    pub fn is_bullish(&self) -> bool {
        self.close > self.open
    }

    pub fn is_bearish(&self) -> bool {
        self.open > self.close
    }

    /// Reflects the bar through zero: prices are negated and high/low swap roles
    pub fn mirrored(&self) -> Bar {
        Bar {
            timestamp: self.timestamp,
            open: -self.open,
            high: -self.low,
            low: -self.high,
            close: -self.close,
            volume: self.volume,
        }
    }
}

/// Trade direction.
///
/// Every per-side structure in the strategy keeps its prices in the side's own
/// frame: Long prices as-is, Short prices negated (see [`Bar::mirrored`]).
/// In that frame "down" always points toward the side's zones, so each rule is
/// written once and applied to both sides.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Side {
    Long,
    Short,
}

impl Side {
    /// Evaluation order within a bar
    pub const BOTH: [Side; 2] = [Side::Long, Side::Short];

    pub fn opposite(self) -> Side {
        match self {
            Side::Long => Side::Short,
            Side::Short => Side::Long,
        }
    }

    /// Map a market price into this side's frame
    pub fn to_frame(self, price: f64) -> f64 {
        match self {
            Side::Long => price,
            Side::Short => -price,
        }
    }

    /// Map a price in this side's frame back to a market price
    pub fn from_frame(self, price: f64) -> f64 {
        self.to_frame(price)
    }

    pub fn frame_bar(self, bar: &Bar) -> Bar {
        match self {
            Side::Long => *bar,
            Side::Short => bar.mirrored(),
        }
    }

    pub fn zone_name(self) -> &'static str {
        match self {
            Side::Long => "demand",
            Side::Short => "supply",
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Long => write!(f, "Long"),
            Side::Short => write!(f, "Short"),
        }
    }
}

/// Price interval in a side's frame, `top >= bottom`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Band {
    pub top: f64,
    pub bottom: f64,
}

impl Band {
    /// Build from two edges in either order
    pub fn new(a: f64, b: f64) -> Self {
        Self {
            top: a.max(b),
            bottom: a.min(b),
        }
    }

    pub fn height(&self) -> f64 {
        self.top - self.bottom
    }

    /// Strictly between the edges
    pub fn contains(&self, price: f64) -> bool {
        price > self.bottom && price < self.top
    }

    /// Convert a band held in `side`'s frame to market prices
    pub fn to_market(self, side: Side) -> Band {
        match side {
            Side::Long => self,
            Side::Short => Band {
                top: -self.bottom,
                bottom: -self.top,
            },
        }
    }
}

/// Supply/demand zone detected on the coarse timeframe.
/// Long zones are demand zones, Short zones are supply zones.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Zone {
    pub side: Side,
    /// Bounds in the side's frame
    pub band: Band,
    pub touch_count: u32,
    pub age_in_bars: u32,
    pub active: bool,
    /// Price has left the zone since its first touch
    pub retreated: bool,
    pub created_at: DateTime<Utc>,
}

impl Zone {
    pub fn new(side: Side, band: Band, created_at: DateTime<Utc>) -> Self {
        Self {
            side,
            band,
            touch_count: 0,
            age_in_bars: 0,
            active: true,
            retreated: false,
            created_at,
        }
    }

    pub fn price_top(&self) -> f64 {
        self.band.to_market(self.side).top
    }

    pub fn price_bottom(&self) -> f64 {
        self.band.to_market(self.side).bottom
    }
}

/// Swing extreme on the coarse timeframe.
/// Long levels are buy-liquidity swing lows, Short levels are sell-liquidity swing highs.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LiquidityLevel {
    pub side: Side,
    /// Level in the side's frame
    pub level: f64,
    pub created_at: DateTime<Utc>,
}

impl LiquidityLevel {
    pub fn price(&self) -> f64 {
        self.side.from_frame(self.level)
    }
}

/// Micro-consolidation on the fine timeframe from which entries are armed
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Base {
    pub side: Side,
    /// Bounds in the side's frame
    pub band: Band,
    pub touch_count: u32,
    pub created_at: DateTime<Utc>,
}

impl Base {
    pub fn price_top(&self) -> f64 {
        self.band.to_market(self.side).top
    }

    pub fn price_bottom(&self) -> f64 {
        self.band.to_market(self.side).bottom
    }
}

/// Why a position was closed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ExitReason {
    StopLoss,
    TakeProfit,
    /// A zone of the other side was touched
    OpposingZoneTouched,
    /// A liquidity level of the other side was crossed
    OpposingLiquidityCrossed,
    /// The other side opened a position
    OppositeEntry,
    /// Nearest opposing zone is closer than the stop distance
    OpposingZoneTooClose,
    /// Nearest opposing liquidity level is closer than the stop distance
    OpposingLiquidityTooClose,
    BaseBroken,
    BaseResistanceHit,
}

impl ExitReason {
    /// Closed at the bar close rather than at a stop or target level
    pub fn is_forced(&self) -> bool {
        !matches!(self, ExitReason::StopLoss | ExitReason::TakeProfit)
    }
}

impl fmt::Display for ExitReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ExitReason::StopLoss => "stop_loss",
            ExitReason::TakeProfit => "take_profit",
            ExitReason::OpposingZoneTouched => "opposing_zone_touched",
            ExitReason::OpposingLiquidityCrossed => "opposing_liquidity_crossed",
            ExitReason::OppositeEntry => "opposite_entry",
            ExitReason::OpposingZoneTooClose => "opposing_zone_too_close",
            ExitReason::OpposingLiquidityTooClose => "opposing_liquidity_too_close",
            ExitReason::BaseBroken => "base_broken",
            ExitReason::BaseResistanceHit => "base_resistance_hit",
        };
        write!(f, "{}", name)
    }
}

/// Closed trade, all prices in market terms
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trade {
    pub id: u64,
    pub side: Side,
    pub entry_time: DateTime<Utc>,
    pub exit_time: DateTime<Utc>,
    pub entry_price: f64,
    pub exit_price: f64,
    pub stop_loss: f64,
    pub take_profit: f64,
    pub lot_size: f64,
    pub pnl: f64,
    pub is_paper: bool,
    pub exit_reason: ExitReason,
}

impl Trade {
    pub fn is_win(&self) -> bool {
        self.pnl > 0.0
    }

    pub fn holding_minutes(&self) -> i64 {
        (self.exit_time - self.entry_time).num_minutes()
    }
}
