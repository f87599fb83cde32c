// Layered configuration: defaults, then an optional TOML file, then ZONEBOT__* env vars
use std::path::Path;

use config::{Config, Environment, File, FileFormat};
use thiserror::Error;

use crate::strategy::{ConfigError, StrategyConfig};

pub const ENV_PREFIX: &str = "ZONEBOT";
const ENV_SEPARATOR: &str = "__";

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("failed to load settings: {0}")]
    Load(#[from] config::ConfigError),
    #[error("invalid settings: {0}")]
    Invalid(#[from] ConfigError),
}

fn environment() -> Environment {
    Environment::with_prefix(ENV_PREFIX)
        .separator(ENV_SEPARATOR)
        .try_parsing(true)
}

/// Load the strategy configuration, layering `path` (if any) and the process
/// environment over the defaults, and validate the result
pub fn load(path: Option<&Path>) -> Result<StrategyConfig, SettingsError> {
    load_from(path, environment())
}

fn load_from(path: Option<&Path>, env: Environment) -> Result<StrategyConfig, SettingsError> {
    let mut builder = Config::builder().add_source(Config::try_from(&StrategyConfig::default())?);

    if let Some(path) = path {
        tracing::debug!("Loading settings from {}", path.display());
        builder = builder.add_source(File::from(path).format(FileFormat::Toml).required(true));
    }

    let config: StrategyConfig = builder.add_source(env).build()?.try_deserialize()?;
    config.validate()?;
    Ok(config)
}
