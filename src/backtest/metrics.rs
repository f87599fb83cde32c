use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::models::{Side, Trade};
use crate::strategy::RunOutput;

/// Complete backtest performance metrics, computed from live trades only
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BacktestMetrics {
    // P&L Metrics
    pub total_pnl: f64,
    pub total_return_pct: f64,
    pub initial_equity: f64,
    pub final_equity: f64,

    // Trade Statistics
    pub total_trades: usize,
    pub long_trades: usize,
    pub short_trades: usize,
    pub winning_trades: usize,
    pub losing_trades: usize,
    pub breakeven_trades: usize,
    pub win_rate: f64,

    // P&L Distribution
    pub avg_win: f64,
    pub avg_loss: f64,
    pub largest_win: f64,
    pub largest_loss: f64,
    pub profit_factor: f64, // Total wins / Total losses

    // Risk Metrics
    pub max_drawdown: f64,
    pub max_drawdown_pct: f64,
    pub sharpe_ratio: f64,

    // Holding Period
    pub avg_holding_period_minutes: f64,
    pub max_holding_period_minutes: i64,
    pub min_holding_period_minutes: i64,

    // Exits
    pub exit_reasons: BTreeMap<String, usize>,

    // Paper mode
    pub paper_trades: usize,
    pub paper_pnl: f64,
    pub paper_activations: u32,
}

impl BacktestMetrics {
    /// Calculate metrics from a finished run
    pub fn from_output(output: &RunOutput) -> Self {
        let mut metrics =
            Self::from_trades(&output.trades, &output.equity_curve, output.initial_equity);
        metrics.paper_trades = output.paper_trades.len();
        metrics.paper_pnl = output.paper_trades.iter().map(|t| t.pnl).sum();
        metrics.paper_activations = output.paper.activation_count;
        metrics
    }

    /// Calculate metrics from a live ledger and its equity curve
    pub fn from_trades(trades: &[Trade], equity_curve: &[f64], initial_equity: f64) -> Self {
        let final_equity = equity_curve.last().copied().unwrap_or(initial_equity);
        let total_trades = trades.len();

        if total_trades == 0 {
            return Self::empty(initial_equity, final_equity);
        }

        let total_pnl: f64 = trades.iter().map(|t| t.pnl).sum();
        let total_return_pct = if initial_equity > 0.0 {
            ((final_equity - initial_equity) / initial_equity) * 100.0
        } else {
            0.0
        };

        // Win/Loss statistics
        let wins: Vec<f64> = trades.iter().map(|t| t.pnl).filter(|p| *p > 0.0).collect();
        let losses: Vec<f64> = trades.iter().map(|t| t.pnl).filter(|p| *p < 0.0).collect();
        let breakeven_trades = total_trades - wins.len() - losses.len();

        let win_rate = (wins.len() as f64 / total_trades as f64) * 100.0;

        let total_wins: f64 = wins.iter().sum();
        let total_losses: f64 = losses.iter().map(|p| p.abs()).sum();

        let avg_win = if wins.is_empty() {
            0.0
        } else {
            total_wins / wins.len() as f64
        };
        let avg_loss = if losses.is_empty() {
            0.0
        } else {
            total_losses / losses.len() as f64
        };

        let largest_win = wins.iter().copied().fold(0.0, f64::max);
        let largest_loss = losses.iter().copied().fold(0.0, f64::min);

        let profit_factor = if total_losses > 0.0 {
            total_wins / total_losses
        } else if total_wins > 0.0 {
            f64::INFINITY
        } else {
            0.0
        };

        let (max_drawdown, max_drawdown_pct) = Self::calculate_drawdown(equity_curve);
        let sharpe_ratio = Self::calculate_sharpe_ratio(trades);

        // Holding periods
        let holding_periods: Vec<i64> = trades.iter().map(Trade::holding_minutes).collect();
        let avg_holding_period_minutes =
            holding_periods.iter().sum::<i64>() as f64 / holding_periods.len() as f64;
        let max_holding_period_minutes = holding_periods.iter().copied().max().unwrap_or(0);
        let min_holding_period_minutes = holding_periods.iter().copied().min().unwrap_or(0);

        let mut exit_reasons = BTreeMap::new();
        for trade in trades {
            *exit_reasons
                .entry(trade.exit_reason.to_string())
                .or_insert(0) += 1;
        }

        Self {
            total_pnl,
            total_return_pct,
            initial_equity,
            final_equity,
            total_trades,
            long_trades: trades.iter().filter(|t| t.side == Side::Long).count(),
            short_trades: trades.iter().filter(|t| t.side == Side::Short).count(),
            winning_trades: wins.len(),
            losing_trades: losses.len(),
            breakeven_trades,
            win_rate,
            avg_win,
            avg_loss,
            largest_win,
            largest_loss,
            profit_factor,
            max_drawdown,
            max_drawdown_pct,
            sharpe_ratio,
            avg_holding_period_minutes,
            max_holding_period_minutes,
            min_holding_period_minutes,
            exit_reasons,
            paper_trades: 0,
            paper_pnl: 0.0,
            paper_activations: 0,
        }
    }

    /// Empty metrics for when no trades occurred
    fn empty(initial_equity: f64, final_equity: f64) -> Self {
        Self {
            total_pnl: 0.0,
            total_return_pct: 0.0,
            initial_equity,
            final_equity,
            total_trades: 0,
            long_trades: 0,
            short_trades: 0,
            winning_trades: 0,
            losing_trades: 0,
            breakeven_trades: 0,
            win_rate: 0.0,
            avg_win: 0.0,
            avg_loss: 0.0,
            largest_win: 0.0,
            largest_loss: 0.0,
            profit_factor: 0.0,
            max_drawdown: 0.0,
            max_drawdown_pct: 0.0,
            sharpe_ratio: 0.0,
            avg_holding_period_minutes: 0.0,
            max_holding_period_minutes: 0,
            min_holding_period_minutes: 0,
            exit_reasons: BTreeMap::new(),
            paper_trades: 0,
            paper_pnl: 0.0,
            paper_activations: 0,
        }
    }

    /// Largest peak-to-trough fall of the equity curve, absolute and relative to that peak
    fn calculate_drawdown(equity_curve: &[f64]) -> (f64, f64) {
        let mut peak = f64::NEG_INFINITY;
        let mut max_dd = 0.0;
        let mut max_dd_pct = 0.0;

        for &equity in equity_curve {
            if equity > peak {
                peak = equity;
            }

            let drawdown = peak - equity;
            if drawdown > max_dd {
                max_dd = drawdown;
                max_dd_pct = if peak > 0.0 {
                    (drawdown / peak) * 100.0
                } else {
                    0.0
                };
            }
        }

        (max_dd, max_dd_pct)
    }

    /// Calculate Sharpe ratio (simplified)
    /// Mean over standard deviation of per-trade pnl, scaled by sqrt(trade count)
    fn calculate_sharpe_ratio(trades: &[Trade]) -> f64 {
        if trades.len() < 2 {
            return 0.0;
        }

        let n = trades.len() as f64;
        let mean = trades.iter().map(|t| t.pnl).sum::<f64>() / n;

        let variance = trades
            .iter()
            .map(|t| {
                let diff = t.pnl - mean;
                diff * diff
            })
            .sum::<f64>()
            / n;

        let std_dev = variance.sqrt();

        if std_dev > 0.0 {
            mean / std_dev * n.sqrt()
        } else {
            0.0
        }
    }

    /// Print a formatted report to stdout
    pub fn print_report(&self) {
        println!("\n╔═══════════════════════════════════════════════════════╗");
        println!("║              BACKTEST PERFORMANCE REPORT              ║");
        println!("╚═══════════════════════════════════════════════════════╝\n");

        println!("📊 P&L SUMMARY");
        println!("  Initial Equity:        {:.2}", self.initial_equity);
        println!("  Final Equity:          {:.2}", self.final_equity);
        println!(
            "  Net P&L:               {:.2} ({:+.2}%)",
            self.total_pnl, self.total_return_pct
        );

        println!("\n📈 TRADE STATISTICS");
        println!(
            "  Total Trades:          {} (long {}, short {})",
            self.total_trades, self.long_trades, self.short_trades
        );
        println!(
            "  Winning Trades:        {} ({:.1}%)",
            self.winning_trades, self.win_rate
        );
        println!("  Losing Trades:         {}", self.losing_trades);
        println!("  Breakeven Trades:      {}", self.breakeven_trades);

        if self.total_trades > 0 {
            println!("\n💰 WIN/LOSS ANALYSIS");
            println!("  Average Win:           {:.2}", self.avg_win);
            println!("  Average Loss:          {:.2}", self.avg_loss);
            println!("  Largest Win:           {:.2}", self.largest_win);
            println!("  Largest Loss:          {:.2}", self.largest_loss);
            println!("  Profit Factor:         {:.2}", self.profit_factor);

            println!("\n⚠️  RISK METRICS");
            println!(
                "  Max Drawdown:          {:.2} ({:.2}%)",
                self.max_drawdown, self.max_drawdown_pct
            );
            println!("  Sharpe Ratio:          {:.2}", self.sharpe_ratio);

            println!("\n⏱️  HOLDING PERIODS");
            println!(
                "  Average:               {:.1} minutes",
                self.avg_holding_period_minutes
            );
            println!(
                "  Max:                   {} minutes",
                self.max_holding_period_minutes
            );
            println!(
                "  Min:                   {} minutes",
                self.min_holding_period_minutes
            );

            println!("\n🚪 EXIT REASONS");
            for (reason, count) in &self.exit_reasons {
                println!("  {:<26} {}", reason, count);
            }
        }

        println!("\n🛑 PAPER MODE");
        println!("  Activations:           {}", self.paper_activations);
        println!(
            "  Paper Trades:          {} (pnl {:.2})",
            self.paper_trades, self.paper_pnl
        );

        println!("\n═══════════════════════════════════════════════════════\n");
    }
}
