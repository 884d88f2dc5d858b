use anyhow::{Context, Result};
use beacon_config::Config;
use beacon_server::constants;

/// Validates that the configuration has everything required to serve requests.
pub fn check_config(config: &Config) -> Result<()> {
    config
        .validate_serving()
        .context("the config is incomplete, see \"beacon config show\"")?;

    if config.max_concurrent_requests() == 0 {
        anyhow::bail!("limits.max_concurrent_requests must be greater than zero");
    }

    if config.rate_limit_window().is_zero() {
        anyhow::bail!("rate_limits.window must be greater than zero");
    }

    if !config.environment().is_production() {
        beacon_log::warn!(
            "running in {} environment, all points are written to {}",
            config.environment(),
            config.test_bucket()
        );
    }

    Ok(())
}

/// Print spawn infos to the log.
pub fn dump_spawn_infos(config: &Config) {
    if config.path().as_os_str().is_empty() {
        beacon_log::info!("launching beacon {} without config folder", constants::VERSION);
    } else {
        beacon_log::info!(
            "launching beacon {} from config folder {}",
            constants::VERSION,
            config.path().display()
        );
    }

    let layout = config.data_layout();
    beacon_log::info!("  environment: {}", config.environment());
    beacon_log::info!("  influxdb: {}", config.influxdb_url());
    beacon_log::info!(
        "  data layout: field {}, precision {}",
        layout.field,
        layout.precision
    );
    beacon_log::info!(
        "  rate limit: {} requests per {}s",
        config.rate_limit_permits(),
        config.rate_limit_window().as_secs()
    );
    beacon_log::info!("  log level: {}", config.logging().level);
}
