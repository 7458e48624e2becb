mod types;

pub use types::*;

use crate::{Error, Result, bundle::Convention};
use std::env;
use tracing::debug;

const DEFAULT_CONFIG_PATH: &str = "config.yaml";

pub async fn load() -> Result<Config> {
    let explicit_path = env::var("CONFIG_PATH").ok();
    let mut config = load_file(explicit_path.as_deref()).await?;

    apply_env_overrides(
        &mut config,
        env::var("MODEL_PATH").ok(),
        env::var("MODEL_CONVENTION").ok(),
    )?;

    Ok(config)
}

/// Reads the YAML config file. A missing default file yields the built-in
/// defaults, a missing file named explicitly is an error.
pub async fn load_file(explicit_path: Option<&str>) -> Result<Config> {
    let config_path = explicit_path.unwrap_or(DEFAULT_CONFIG_PATH);

    debug!("Loading configuration from: {}", config_path);

    if explicit_path.is_none() && !tokio::fs::try_exists(config_path).await.unwrap_or(false) {
        debug!("No configuration file found, using defaults");
        return Ok(Config::default());
    }

    let config_str = tokio::fs::read_to_string(config_path)
        .await
        .map_err(|e| Error::config(format!("cannot read {}: {}", config_path, e)))?;
    let config: Config = serde_yaml::from_str(&config_str)?;

    Ok(config)
}

pub fn apply_env_overrides(
    config: &mut Config,
    model_path: Option<String>,
    convention: Option<String>,
) -> Result<()> {
    if let Some(path) = model_path.filter(|p| !p.is_empty()) {
        debug!("MODEL_PATH overrides model path: {}", path);
        config.model.path = path;
    }

    if let Some(raw) = convention.filter(|c| !c.is_empty()) {
        let convention = raw.parse::<Convention>().map_err(Error::config)?;
        debug!("MODEL_CONVENTION overrides dispatch convention: {}", convention);
        config.model.convention = Some(convention);
    }

    Ok(())
}
