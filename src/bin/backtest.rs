use zonebot::backtest::{BacktestMetrics, BacktestRunner, MarketScenario, SyntheticDataGenerator};
use zonebot::feed::BarFeed;
use zonebot::strategy::StrategyConfig;
use zonebot::Result;

const BARS_PER_SCENARIO: usize = 20_000;
const COARSE_MINUTES: u32 = 15;

fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter("zonebot=info")
        .init();

    println!("\n╔═══════════════════════════════════════════════════════╗");
    println!("║           ZONEBOT BACKTESTING SUITE                   ║");
    println!("╚═══════════════════════════════════════════════════════╝");

    // Synthetic timestamps ignore the intraday sessions
    let config = StrategyConfig {
        enable_timerange_filter: false,
        ..StrategyConfig::default()
    };
    let runner = BacktestRunner::new(config);

    let scenarios = [
        (MarketScenario::Uptrend, "📈 Uptrend"),
        (MarketScenario::Downtrend, "📉 Downtrend"),
        (MarketScenario::Ranging, "↔️  Ranging (mean-reverting)"),
        (MarketScenario::Volatile, "⚡ Volatile"),
        (MarketScenario::Swings, "〰️  Swings"),
        (MarketScenario::WithGaps, "🕳️  Swings with gaps"),
    ];

    let mut all_metrics = Vec::new();

    for (scenario, name) in scenarios {
        // Generate synthetic data
        let mut generator = SyntheticDataGenerator::new(42);
        let bars = generator.generate(scenario, BARS_PER_SCENARIO, 1);
        let feed = BarFeed::from_fine(bars, COARSE_MINUTES)?;

        match runner.run_and_report(&feed, name) {
            Ok((_, metrics)) => all_metrics.push((name.to_string(), metrics)),
            Err(e) => eprintln!("❌ Backtest failed for {}: {}", name, e),
        }
    }

    print_summary_comparison(&all_metrics);

    Ok(())
}

fn print_summary_comparison(results: &[(String, BacktestMetrics)]) {
    println!("\n╔═══════════════════════════════════════════════════════╗");
    println!("║              SCENARIO COMPARISON                      ║");
    println!("╚═══════════════════════════════════════════════════════╝\n");

    println!(
        "{:<30} {:>10} {:>10} {:>8} {:>8} {:>8}",
        "Scenario", "P&L", "Return%", "Trades", "Win%", "Paper"
    );
    println!("{}", "─".repeat(78));

    for (name, metrics) in results {
        println!(
            "{:<30} {:>10.2} {:>10.2} {:>8} {:>8.1} {:>8}",
            name,
            metrics.total_pnl,
            metrics.total_return_pct,
            metrics.total_trades,
            metrics.win_rate,
            metrics.paper_trades
        );
    }

    println!("\n");

    if let Some((best_name, best_metrics)) = results
        .iter()
        .max_by(|a, b| a.1.total_return_pct.total_cmp(&b.1.total_return_pct))
    {
        println!(
            "🏆 Best Scenario: {} ({:+.2}%)",
            best_name, best_metrics.total_return_pct
        );
    }

    if let Some((worst_name, worst_metrics)) = results
        .iter()
        .min_by(|a, b| a.1.total_return_pct.total_cmp(&b.1.total_return_pct))
    {
        println!(
            "⚠️  Worst Scenario: {} ({:+.2}%)",
            worst_name, worst_metrics.total_return_pct
        );
    }

    let total_trades: usize = results.iter().map(|(_, m)| m.total_trades).sum();
    let total_paper: usize = results.iter().map(|(_, m)| m.paper_trades).sum();
    let activations: u32 = results.iter().map(|(_, m)| m.paper_activations).sum();
    let worst_drawdown = results
        .iter()
        .map(|(_, m)| m.max_drawdown_pct)
        .fold(0.0, f64::max);

    println!("\n📊 Across {} scenarios:", results.len());
    println!("   Live trades:            {}", total_trades);
    println!("   Paper trades:           {} ({} activations)", total_paper, activations);
    println!("   Deepest drawdown:       {:.2}%", worst_drawdown);

    println!("\n═══════════════════════════════════════════════════════\n");
}
