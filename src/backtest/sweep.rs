//! Grid search over the R:R, trailing stop and trend filter parameters.

use rand::rngs::StdRng;
use rand::seq::index;
use rand::SeedableRng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::backtest::metrics::BacktestMetrics;
use crate::feed::BarFeed;
use crate::strategy::{Engine, StrategyConfig};

/// Values to try for each swept parameter.
///
/// An empty list keeps the base config's value for that parameter.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParamGrid {
    pub r_r_ratio_min: Vec<f64>,
    pub r_r_ratio_target: Vec<f64>,
    pub trailing_sl_trigger: Vec<f64>,
    pub trailing_sl_level: Vec<f64>,
    pub adx_max_entry: Vec<f64>,
}

impl ParamGrid {
    /// A small grid around the default parameters
    pub fn around_defaults() -> Self {
        Self {
            r_r_ratio_min: vec![0.5, 1.0],
            r_r_ratio_target: vec![1.5, 2.0, 3.0],
            trailing_sl_trigger: vec![1.0, 1.5, 2.0],
            trailing_sl_level: vec![0.5, 1.0],
            adx_max_entry: vec![25.0, 30.0, 40.0],
        }
    }

    /// Number of combinations before invalid ones are dropped
    pub fn size(&self) -> usize {
        [
            &self.r_r_ratio_min,
            &self.r_r_ratio_target,
            &self.trailing_sl_trigger,
            &self.trailing_sl_level,
            &self.adx_max_entry,
        ]
        .iter()
        .map(|values| values.len().max(1))
        .product()
    }

    /// Cartesian product over `base`. Combinations that fail validation are skipped.
    pub fn expand(&self, base: &StrategyConfig) -> Vec<StrategyConfig> {
        let or_base = |values: &[f64], fallback: f64| -> Vec<f64> {
            if values.is_empty() {
                vec![fallback]
            } else {
                values.to_vec()
            }
        };

        let mut configs = Vec::with_capacity(self.size());
        for &r_r_min in &or_base(&self.r_r_ratio_min, base.r_r_ratio_min) {
            for &r_r_target in &or_base(&self.r_r_ratio_target, base.r_r_ratio_target) {
                for &trigger in &or_base(&self.trailing_sl_trigger, base.trailing_sl_trigger) {
                    for &level in &or_base(&self.trailing_sl_level, base.trailing_sl_level) {
                        for &adx in &or_base(&self.adx_max_entry, base.adx_max_entry) {
                            let config = StrategyConfig {
                                r_r_ratio_min: r_r_min,
                                r_r_ratio_target: r_r_target,
                                trailing_sl_trigger: trigger,
                                trailing_sl_level: level,
                                adx_max_entry: adx,
                                ..base.clone()
                            };

                            match config.validate() {
                                Ok(()) => configs.push(config),
                                Err(e) => tracing::warn!(
                                    "Skipping sweep combination rr_min={} rr_target={} trigger={} level={} adx={}: {}",
                                    r_r_min, r_r_target, trigger, level, adx, e
                                ),
                            }
                        }
                    }
                }
            }
        }

        configs
    }
}

/// One ranked configuration
#[derive(Debug, Clone, Serialize)]
pub struct SweepResult {
    pub config: StrategyConfig,
    pub metrics: BacktestMetrics,
}

/// Keep at most `max` configs, picked with a seeded RNG and kept in grid order
fn sample_configs(configs: Vec<StrategyConfig>, max: usize, seed: u64) -> Vec<StrategyConfig> {
    if configs.len() <= max {
        return configs;
    }

    let mut rng = StdRng::seed_from_u64(seed);
    let mut keep = vec![false; configs.len()];
    for i in index::sample(&mut rng, configs.len(), max).into_vec() {
        keep[i] = true;
    }

    configs
        .into_iter()
        .zip(keep)
        .filter_map(|(config, kept)| kept.then_some(config))
        .collect()
}

/// Run one engine per grid configuration in parallel and rank the results by
/// profit factor, best first, with total pnl breaking ties.
pub fn run_sweep(
    feed: &BarFeed,
    base: &StrategyConfig,
    grid: &ParamGrid,
    max_configs: Option<usize>,
    seed: u64,
) -> Vec<SweepResult> {
    let mut configs = grid.expand(base);
    if let Some(max) = max_configs {
        configs = sample_configs(configs, max, seed);
    }

    tracing::info!(
        "Sweeping {} configurations over {} bars",
        configs.len(),
        feed.fine.len()
    );

    let mut results: Vec<SweepResult> = configs
        .into_par_iter()
        .filter_map(|config| match Engine::new(config.clone()) {
            Ok(engine) => {
                let output = engine.run(feed);
                let metrics = BacktestMetrics::from_output(&output);
                Some(SweepResult { config, metrics })
            }
            Err(e) => {
                tracing::warn!("Skipping sweep configuration: {}", e);
                None
            }
        })
        .collect();

    results.sort_by(|a, b| {
        b.metrics
            .profit_factor
            .total_cmp(&a.metrics.profit_factor)
            .then_with(|| b.metrics.total_pnl.total_cmp(&a.metrics.total_pnl))
    });

    results
}
