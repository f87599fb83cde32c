use anyhow::Context;

use crate::backtest::metrics::BacktestMetrics;
use crate::feed::BarFeed;
use crate::strategy::{Engine, RunOutput, StrategyConfig};

/// Backtest runner that drives the engine over a bar feed
pub struct BacktestRunner {
    config: StrategyConfig,
}

impl BacktestRunner {
    /// Create a new backtest runner
    pub fn new(config: StrategyConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &StrategyConfig {
        &self.config
    }

    /// Run a backtest over `feed`
    ///
    /// # Returns
    /// The engine's raw output and the metrics computed from its live ledger
    pub fn run(&self, feed: &BarFeed) -> anyhow::Result<(RunOutput, BacktestMetrics)> {
        if feed.fine.is_empty() {
            anyhow::bail!("Not enough bars for backtest: feed is empty");
        }

        tracing::info!(
            "Starting backtest: {} fine bars, {} coarse bars",
            feed.fine.len(),
            feed.coarse.len()
        );

        let engine =
            Engine::new(self.config.clone()).context("invalid strategy configuration")?;
        let output = engine.run(feed);
        let metrics = BacktestMetrics::from_output(&output);

        tracing::info!(
            "Backtest complete: {} trades, P&L: {:.2} ({:.2}%)",
            metrics.total_trades,
            metrics.total_pnl,
            metrics.total_return_pct
        );

        Ok((output, metrics))
    }

    /// Run backtest and print report
    pub fn run_and_report(
        &self,
        feed: &BarFeed,
        scenario_name: &str,
    ) -> anyhow::Result<(RunOutput, BacktestMetrics)> {
        println!("\n🔬 Running backtest: {}", scenario_name);
        println!("   Fine bars: {}", feed.fine.len());
        println!("   Coarse bars: {}", feed.coarse.len());

        let (output, metrics) = self.run(feed)?;
        metrics.print_report();

        if !output.open_positions.is_empty() {
            println!("   Still open at end of data: {}", output.open_positions.len());
        }

        Ok((output, metrics))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backtest::{MarketScenario, SyntheticDataGenerator};

    fn feed(scenario: MarketScenario) -> BarFeed {
        let bars = SyntheticDataGenerator::new(42).generate(scenario, 2000, 1);
        BarFeed::from_fine(bars, 15).unwrap()
    }

    #[test]
    fn test_run_reports_consistent_metrics() {
        let runner = BacktestRunner::new(StrategyConfig::default());
        let (output, metrics) = runner.run(&feed(MarketScenario::Swings)).unwrap();

        assert_eq!(metrics.total_trades, output.trades.len());
        assert_eq!(output.equity_curve.len(), output.trades.len() + 1);
        assert_eq!(output.counters.fine_bars, 2000);
        assert!((metrics.final_equity - output.final_equity).abs() < 1e-9);
    }

    #[test]
    fn test_empty_feed_is_an_error() {
        let runner = BacktestRunner::new(StrategyConfig::default());
        assert!(runner.run(&BarFeed::default()).is_err());
    }

    #[test]
    fn test_invalid_config_is_an_error() {
        let runner = BacktestRunner::new(StrategyConfig {
            risk_per_trade: 0.0,
            ..StrategyConfig::default()
        });
        let err = runner.run(&feed(MarketScenario::Ranging)).unwrap_err();
        assert!(err.to_string().contains("invalid strategy configuration"));
    }

    #[test]
    fn test_runs_are_deterministic() {
        let runner = BacktestRunner::new(StrategyConfig::default());
        let data = feed(MarketScenario::Volatile);
        let (first, _) = runner.run(&data).unwrap();
        let (second, _) = runner.run(&data).unwrap();
        assert_eq!(first, second);
    }
}
