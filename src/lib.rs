// Core modules
pub mod backtest;
pub mod execution;
pub mod feed;
pub mod indicators;
pub mod models;
pub mod risk;
pub mod settings;
pub mod strategy;

// Re-export commonly used types
pub use models::*;
pub use strategy::{Engine, RunOutput, StrategyConfig};

// Error handling
pub type Result<T> = std::result::Result<T, Box<dyn std::error::Error + Send + Sync>>;
