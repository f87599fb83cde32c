// Trading strategy module
mod base;
pub mod config;
pub mod engine;
pub mod entry;
pub mod patterns;
pub mod state;
mod zones;

pub use config::{ConfigError, PnlModel, StrategyConfig, TradingSession};
pub use engine::{Engine, RunCounters, RunOutput};
pub use entry::{plan_entry, EntryBranch, EntryPlan, EntrySignal};
pub use state::{BaseSearch, EntryArm, SideCounters, SideState};
