//! Candle-shape predicates.
//!
//! Every function reads bars in a side's frame (see [`Side`](crate::models::Side)):
//! the demand-side reading is written out and the supply side gets it by mirroring.

use crate::models::{Band, Bar};

/// Slack allowed on the small wick of a strong candle
const WICK_TOLERANCE: f64 = 0.1;
/// Maximum follow-through of the next bar against a strong candle, as a fraction of its wick
const FOLLOW_THROUGH_RATIO: f64 = 0.33;
/// Minimum low-to-low displacement for the three-bar expansion case
const EXPANSION_MIN_STEP: f64 = 1.0;
/// Minimum sweep below the second candle for the stop-hunt case
const SWEEP_MIN_DEPTH: f64 = 0.5;

/// Which structural cases matched on a three-candle window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ZoneCases {
    /// Shallow counter candle engulfed by a strong reversal
    pub reversal: bool,
    /// Counter candle followed by two expanding candles
    pub expansion: bool,
    /// Reversal candle that sweeps beneath the counter candle and rejects
    pub sweep: bool,
}

impl ZoneCases {
    pub fn any(&self) -> bool {
        self.reversal || self.expansion || self.sweep
    }
}

/// Zone produced by a structural match
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ZoneSignal {
    pub band: Band,
    pub cases: ZoneCases,
}

/// Evaluate the structural zone cases on three closed coarse bars (oldest first)
pub fn detect_zone(first: &Bar, second: &Bar, third: &Bar) -> Option<ZoneSignal> {
    let body2 = second.open - second.close;
    let body3 = third.close - third.open;

    let reversal = second.is_bearish()
        && third.is_bullish()
        && (second.low - second.close).abs() > (second.close - second.open).abs()
        && body2 <= 0.5 * body3
        && third.close > second.high
        && second.low < third.low
        && (second.high - second.open) < body2
        && (third.high - third.close) < 0.25 * body3;

    let expansion = first.is_bearish()
        && second.is_bullish()
        && third.is_bullish()
        && (third.low - second.low) > EXPANSION_MIN_STEP
        && (third.high - third.close) < body3
        && third.close > first.open
        && (first.close - first.low) < (first.open - first.close);

    let sweep = second.is_bearish()
        && third.is_bullish()
        && third.low < second.low
        && third.close > second.high
        && (third.open - third.low) >= 0.5 * body3
        && (third.high - third.close) >= 0.5 * body3
        && (second.low - third.low) > SWEEP_MIN_DEPTH;

    let cases = ZoneCases {
        reversal,
        expansion,
        sweep,
    };
    if !cases.any() {
        return None;
    }

    // Both the reversal and expansion cases span the two lows, as does the sweep
    // once its edges are ordered
    Some(ZoneSignal {
        band: Band::new(second.low, third.low),
        cases,
    })
}

/// Swing low of the middle candle with the third closing near or above the first's open
pub fn detect_liquidity(first: &Bar, second: &Bar, third: &Bar, offset: f64) -> Option<f64> {
    let swing = second.low < first.low && second.low < third.low;
    (swing && third.close > first.open - offset).then_some(second.low)
}

/// `prev` is a strong down candle: it closed near its low, or rejected its high,
/// and `cur` did not reclaim much of the upper wick
pub fn is_strong_down(prev: &Bar, cur: &Bar) -> bool {
    let follow_through = cur.high - cur.open;

    let closes_low = prev.is_bearish()
        && (prev.close - prev.low) < (prev.open - prev.close) + WICK_TOLERANCE
        && follow_through < FOLLOW_THROUGH_RATIO * (prev.high - prev.close);

    let rejects_high = prev.is_bullish()
        && (prev.high - prev.close) > (prev.close - prev.open)
        && (prev.open - prev.low) < (prev.close - prev.open) + WICK_TOLERANCE
        && follow_through <= FOLLOW_THROUGH_RATIO * (prev.high - prev.open);

    closes_low || rejects_high
}

/// Mirror of [`is_strong_down`]
pub fn is_strong_up(prev: &Bar, cur: &Bar) -> bool {
    is_strong_down(&prev.mirrored(), &cur.mirrored())
}
