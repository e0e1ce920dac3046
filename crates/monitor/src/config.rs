//! Configuration loading for the monitor binary

use anyhow::Result;
use monitor_lib::MonitorConfig;

/// Load configuration from `MONITOR_*` environment variables, falling
/// back to defaults for anything unset.
pub fn load() -> Result<MonitorConfig> {
    let config = config::Config::builder()
        .add_source(config::Environment::with_prefix("MONITOR"))
        .build()?;

    Ok(config.try_deserialize().unwrap_or_default())
}
