use crate::models::Bar;
use chrono::{DateTime, Duration, TimeZone, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

/// Market scenario types for synthetic data generation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MarketScenario {
    /// Steady uptrend with noise
    Uptrend,
    /// Steady downtrend with noise
    Downtrend,
    /// Mean-reverting chop around the base price
    Ranging,
    /// Large bar-to-bar swings
    Volatile,
    /// Slow oscillation that leaves swing highs and lows behind
    Swings,
    /// Swings with missing bars
    WithGaps,
}

impl MarketScenario {
    pub const ALL: [MarketScenario; 6] = [
        MarketScenario::Uptrend,
        MarketScenario::Downtrend,
        MarketScenario::Ranging,
        MarketScenario::Volatile,
        MarketScenario::Swings,
        MarketScenario::WithGaps,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MarketScenario::Uptrend => "uptrend",
            MarketScenario::Downtrend => "downtrend",
            MarketScenario::Ranging => "ranging",
            MarketScenario::Volatile => "volatile",
            MarketScenario::Swings => "swings",
            MarketScenario::WithGaps => "with_gaps",
        }
    }
}

impl std::str::FromStr for MarketScenario {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        MarketScenario::ALL
            .into_iter()
            .find(|scenario| scenario.as_str() == s)
            .ok_or_else(|| format!("unknown scenario: {}", s))
    }
}

/// Seeded minute-bar random walk.
///
/// Bars start at a fixed UTC date so that two generators with the same seed
/// produce identical series.
pub struct SyntheticDataGenerator {
    rng: StdRng,
    base_price: f64,
    start_time: DateTime<Utc>,
}

/// Price increment bars are rounded to
const TICK: f64 = 0.01;
/// Period of the oscillation in bars for the swing scenarios
const SWING_PERIOD: f64 = 240.0;
const SWING_AMPLITUDE: f64 = 12.0;

impl SyntheticDataGenerator {
    /// Create a new generator with a seed for reproducibility
    pub fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            base_price: 2700.0,
            start_time: Utc
                .with_ymd_and_hms(2024, 4, 1, 0, 0, 0)
                .single()
                .unwrap_or_default(),
        }
    }

    pub fn with_base_price(mut self, base_price: f64) -> Self {
        self.base_price = base_price;
        self
    }

    /// Generate `num_bars` bars `interval_minutes` apart (gaps excepted)
    pub fn generate(
        &mut self,
        scenario: MarketScenario,
        num_bars: usize,
        interval_minutes: i64,
    ) -> Vec<Bar> {
        let mut bars = Vec::with_capacity(num_bars);
        let mut close = self.base_price;

        for i in 0..num_bars {
            let timestamp = self.start_time + Duration::minutes(i as i64 * interval_minutes);

            if scenario == MarketScenario::WithGaps && i > 0 && self.rng.gen_bool(0.05) {
                continue;
            }

            let step = match scenario {
                MarketScenario::Uptrend => 0.05 + self.rng.gen_range(-1.0..1.0),
                MarketScenario::Downtrend => -0.05 + self.rng.gen_range(-1.0..1.0),
                MarketScenario::Ranging => {
                    (self.base_price - close) * 0.1 + self.rng.gen_range(-1.0..1.0)
                }
                MarketScenario::Volatile => self.rng.gen_range(-3.0..3.0),
                MarketScenario::Swings | MarketScenario::WithGaps => {
                    let phase = i as f64 / SWING_PERIOD * std::f64::consts::TAU;
                    let target = self.base_price + SWING_AMPLITUDE * phase.sin();
                    (target - close) * 0.2 + self.rng.gen_range(-0.8..0.8)
                }
            };

            let open = close;
            close = round_tick(open + step);
            bars.push(self.create_bar(timestamp, open, close));
        }

        bars
    }

    fn create_bar(&mut self, timestamp: DateTime<Utc>, open: f64, close: f64) -> Bar {
        let upper_wick = self.rng.gen_range(0.0..0.6);
        let lower_wick = self.rng.gen_range(0.0..0.6);
        let volume = self.rng.gen_range(50.0..500.0_f64).round();

        Bar::new(
            timestamp,
            open,
            round_tick(open.max(close) + upper_wick),
            round_tick(open.min(close) - lower_wick),
            close,
            volume,
        )
    }
}

fn round_tick(price: f64) -> f64 {
    (price / TICK).round() * TICK
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feed::validate_series;

    #[test]
    fn test_same_seed_same_series() {
        let a = SyntheticDataGenerator::new(7).generate(MarketScenario::Swings, 500, 1);
        let b = SyntheticDataGenerator::new(7).generate(MarketScenario::Swings, 500, 1);
        assert_eq!(a, b);

        let c = SyntheticDataGenerator::new(8).generate(MarketScenario::Swings, 500, 1);
        assert_ne!(a, c);
    }

    #[test]
    fn test_every_scenario_is_a_valid_series() {
        for scenario in MarketScenario::ALL {
            let bars = SyntheticDataGenerator::new(42).generate(scenario, 1000, 1);
            assert!(validate_series(&bars).is_ok(), "{:?}", scenario);
        }
    }

    #[test]
    fn test_scenario_names_round_trip() {
        for scenario in MarketScenario::ALL {
            assert_eq!(scenario.as_str().parse::<MarketScenario>(), Ok(scenario));
        }
        assert!("sideways".parse::<MarketScenario>().is_err());
    }

    #[test]
    fn test_gaps_drop_bars() {
        let bars = SyntheticDataGenerator::new(3).generate(MarketScenario::WithGaps, 2000, 1);
        assert!(bars.len() < 2000);
        assert!(bars
            .windows(2)
            .any(|w| w[1].timestamp - w[0].timestamp > Duration::minutes(1)));
    }

    #[test]
    fn test_trend_direction() {
        let up = SyntheticDataGenerator::new(1).generate(MarketScenario::Uptrend, 5000, 1);
        let down = SyntheticDataGenerator::new(1).generate(MarketScenario::Downtrend, 5000, 1);
        assert!(up.last().unwrap().close > down.last().unwrap().close);
    }
}
