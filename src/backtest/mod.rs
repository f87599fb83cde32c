pub mod metrics;
pub mod runner;
pub mod sweep;
pub mod synthetic;

pub use metrics::BacktestMetrics;
pub use runner::BacktestRunner;
pub use sweep::{run_sweep, ParamGrid, SweepResult};
pub use synthetic::{MarketScenario, SyntheticDataGenerator};
