/// Average Directional Index (ADX) - Measures trend strength
///
/// ADX ranges from 0 to 100:
/// - ADX > 25: Strong trend (bull or bear)
/// - ADX 20-25: Moderate trend
/// - ADX < 20: Weak trend / choppy / ranging market
///
/// The strategy only enters while ADX stays below a ceiling, so the value is
/// maintained incrementally, one fine bar at a time.
use crate::models::{Bar, BoundedHistory};

/// Streaming ADX with Wilder's running-sum smoothing and a simple average of
/// the last `period` DX readings
#[derive(Debug, Clone)]
pub struct Adx {
    period: usize,
    smoothed_tr: f64,
    smoothed_plus_dm: f64,
    smoothed_minus_dm: f64,
    dx_buffer: BoundedHistory<f64>,
    prev: Option<Bar>,
    value: f64,
}

impl Adx {
    pub fn new(period: usize) -> Self {
        let period = period.max(1);
        Self {
            period,
            smoothed_tr: 0.0,
            smoothed_plus_dm: 0.0,
            smoothed_minus_dm: 0.0,
            dx_buffer: BoundedHistory::new(period),
            prev: None,
            value: 0.0,
        }
    }

    /// Current ADX. Stays at 0 until the DX buffer first fills, then holds the
    /// last computed average whenever a bar produces no DX.
    pub fn value(&self) -> f64 {
        self.value
    }

    pub fn period(&self) -> usize {
        self.period
    }

    /// Feed the next bar. The first bar only seeds the previous-bar reference.
    pub fn update(&mut self, bar: &Bar) -> f64 {
        let Some(prev) = self.prev.replace(*bar) else {
            return self.value;
        };

        // True Range = max(high - low, abs(high - prev_close), abs(low - prev_close))
        let tr = (bar.high - bar.low)
            .max((bar.high - prev.close).abs())
            .max((bar.low - prev.close).abs());

        // Directional Movement
        let up_move = bar.high - prev.high;
        let down_move = prev.low - bar.low;

        let plus_dm = if up_move > down_move {
            up_move.max(0.0)
        } else {
            0.0
        };

        let minus_dm = if down_move > up_move {
            down_move.max(0.0)
        } else {
            0.0
        };

        let n = self.period as f64;
        self.smoothed_tr = wilder_step(self.smoothed_tr, tr, n);
        self.smoothed_plus_dm = wilder_step(self.smoothed_plus_dm, plus_dm, n);
        self.smoothed_minus_dm = wilder_step(self.smoothed_minus_dm, minus_dm, n);

        if self.smoothed_tr > 0.0 {
            let plus_di = self.smoothed_plus_dm / self.smoothed_tr * 100.0;
            let minus_di = self.smoothed_minus_dm / self.smoothed_tr * 100.0;
            let di_sum = plus_di + minus_di;

            if di_sum > 0.0 {
                let dx = (plus_di - minus_di).abs() / di_sum * 100.0;
                self.dx_buffer.push(dx);
            }
        }

        if self.dx_buffer.is_full() {
            self.value = self.dx_buffer.iter().sum::<f64>() / self.dx_buffer.len() as f64;
        }

        self.value
    }
}

/// Wilder's running-sum smoothing step
fn wilder_step(smoothed: f64, value: f64, period: f64) -> f64 {
    smoothed - smoothed / period + value
}

/// Calculate ADX over a slice of bars
///
/// Returns None if the series is too short to fill the DX buffer
pub fn calculate_adx(bars: &[Bar], period: usize) -> Option<f64> {
    if bars.len() < period + 1 {
        return None;
    }

    let mut adx = Adx::new(period);
    for bar in bars {
        adx.update(bar);
    }

    adx.dx_buffer.is_full().then(|| adx.value())
}
