use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;

use zonebot::backtest::{
    run_sweep, BacktestMetrics, BacktestRunner, MarketScenario, ParamGrid, SweepResult,
    SyntheticDataGenerator,
};
use zonebot::feed::BarFeed;
use zonebot::settings;
use zonebot::strategy::{RunOutput, StrategyConfig};

#[derive(Parser)]
#[command(
    name = "zonebot",
    about = "Zone/base strategy backtester over fine and coarse bar series"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Args)]
struct DataArgs {
    /// Fine (execution timeframe) bars CSV: timestamp,open,high,low,close[,volume]
    #[arg(long)]
    data: PathBuf,

    /// Coarse bars CSV. Resampled from the fine bars when omitted.
    #[arg(long)]
    coarse: Option<PathBuf>,

    /// Coarse timeframe in minutes, used when resampling
    #[arg(long, default_value_t = 15)]
    timeframe: u32,

    /// TOML settings file layered over the defaults
    #[arg(long)]
    config: Option<PathBuf>,

    /// Seed equity, overriding the settings
    #[arg(long)]
    capital: Option<f64>,
}

#[derive(Subcommand)]
enum Commands {
    /// Backtest one configuration and print the report
    Run {
        #[command(flatten)]
        data: DataArgs,

        /// Write the run output and metrics as JSON
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Backtest a parameter grid in parallel and rank the results
    Sweep {
        #[command(flatten)]
        data: DataArgs,

        /// JSON parameter grid. Defaults to a small grid around the defaults.
        #[arg(long)]
        grid: Option<PathBuf>,

        /// Randomly keep at most this many configurations
        #[arg(long)]
        max_configs: Option<usize>,

        /// Seed for configuration sampling
        #[arg(long, default_value_t = 42)]
        seed: u64,

        /// Rows printed from the ranking
        #[arg(long, default_value_t = 10)]
        top: usize,

        /// Write the ranked results as JSON
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Write a synthetic minute-bar series to CSV
    Synth {
        /// uptrend, downtrend, ranging, volatile, swings or with_gaps
        #[arg(long, default_value = "swings")]
        scenario: MarketScenario,

        #[arg(long, default_value_t = 10_000)]
        bars: usize,

        #[arg(long, default_value_t = 42)]
        seed: u64,

        #[arg(long, default_value_t = 2700.0)]
        base_price: f64,

        /// Output CSV path
        #[arg(long)]
        output: PathBuf,
    },
}

#[derive(Serialize)]
struct RunReport<'a> {
    metrics: &'a BacktestMetrics,
    output: &'a RunOutput,
}

fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    setup_logging();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run { data, output } => {
            let config = load_config(&data)?;
            let feed = load_feed(&data)?;

            let runner = BacktestRunner::new(config);
            let name = data.data.display().to_string();
            let (run, metrics) = runner.run_and_report(&feed, &name)?;

            if let Some(path) = output {
                write_json(
                    &path,
                    &RunReport {
                        metrics: &metrics,
                        output: &run,
                    },
                )?;
            }
        }
        Commands::Sweep {
            data,
            grid,
            max_configs,
            seed,
            top,
            output,
        } => {
            let config = load_config(&data)?;
            let feed = load_feed(&data)?;
            let grid = match grid {
                Some(path) => load_grid(&path)?,
                None => ParamGrid::around_defaults(),
            };

            let results = run_sweep(&feed, &config, &grid, max_configs, seed);
            print_ranking(&results, top);

            if let Some(path) = output {
                write_json(&path, &results)?;
            }
        }
        Commands::Synth {
            scenario,
            bars,
            seed,
            base_price,
            output,
        } => {
            let series = SyntheticDataGenerator::new(seed)
                .with_base_price(base_price)
                .generate(scenario, bars, 1);

            let mut writer = csv::Writer::from_path(&output)
                .with_context(|| format!("failed to create {}", output.display()))?;
            for bar in &series {
                writer.serialize(bar)?;
            }
            writer.flush()?;

            tracing::info!(
                "Wrote {} {} bars to {}",
                series.len(),
                scenario.as_str(),
                output.display()
            );
        }
    }

    Ok(())
}

fn setup_logging() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("zonebot=info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn load_config(args: &DataArgs) -> Result<StrategyConfig> {
    let mut config = settings::load(args.config.as_deref()).context("failed to load settings")?;
    if let Some(capital) = args.capital {
        config.initial_capital = capital;
        config.validate().context("invalid --capital")?;
    }
    Ok(config)
}

fn load_feed(args: &DataArgs) -> Result<BarFeed> {
    let feed = BarFeed::load(&args.data, args.coarse.as_deref(), args.timeframe)
        .with_context(|| format!("failed to load bars from {}", args.data.display()))?;
    tracing::info!(
        "Loaded {} fine bars and {} coarse bars",
        feed.fine.len(),
        feed.coarse.len()
    );
    Ok(feed)
}

fn load_grid(path: &Path) -> Result<ParamGrid> {
    let file = File::open(path).with_context(|| format!("failed to open {}", path.display()))?;
    serde_json::from_reader(file).with_context(|| format!("invalid grid in {}", path.display()))
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let file =
        File::create(path).with_context(|| format!("failed to create {}", path.display()))?;
    serde_json::to_writer_pretty(BufWriter::new(file), value)?;
    tracing::info!("Wrote {}", path.display());
    Ok(())
}

fn print_ranking(results: &[SweepResult], top: usize) {
    println!("\n╔═══════════════════════════════════════════════════════╗");
    println!("║              PARAMETER SWEEP RANKING                  ║");
    println!("╚═══════════════════════════════════════════════════════╝\n");

    println!(
        "{:<4} {:>6} {:>6} {:>6} {:>6} {:>6} {:>8} {:>10} {:>7} {:>7}",
        "#", "rrMin", "rrTgt", "trig", "lvl", "adx", "PF", "P&L", "Trades", "Win%"
    );
    println!("{}", "─".repeat(78));

    for (rank, result) in results.iter().take(top).enumerate() {
        let c = &result.config;
        let m = &result.metrics;
        println!(
            "{:<4} {:>6.2} {:>6.2} {:>6.2} {:>6.2} {:>6.1} {:>8.2} {:>10.2} {:>7} {:>7.1}",
            rank + 1,
            c.r_r_ratio_min,
            c.r_r_ratio_target,
            c.trailing_sl_trigger,
            c.trailing_sl_level,
            c.adx_max_entry,
            m.profit_factor,
            m.total_pnl,
            m.total_trades,
            m.win_rate
        );
    }

    println!("\n{} configurations evaluated", results.len());
}
