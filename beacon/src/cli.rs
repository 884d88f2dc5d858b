use std::io;
use std::path::{Path, PathBuf};

use anyhow::{Result, bail};
use beacon_config::{Config, OverridableConfig};
use clap::ArgMatches;
use clap_complete::Shell;

use crate::cliapp::make_app;
use crate::setup;

/// The config folder used if neither `--config` nor the environment specify one.
const DEFAULT_CONFIG_PATH: &str = ".beacon";

/// Loads the config from `path`, or falls back to defaults if there is none.
fn load_config(path: &Path) -> Result<Config> {
    match Config::config_exists(path) {
        true => Ok(Config::from_path(path)?),
        false => Ok(Config::default()),
    }
}

/// Runs the command line application.
pub fn execute() -> Result<()> {
    let app = make_app();
    let matches = app.get_matches();
    let config_path = matches
        .get_one::<String>("config")
        .map_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH), PathBuf::from);

    // Commands that do not need to load the config:
    if let Some(matches) = matches.subcommand_matches("config")
        && let Some(matches) = matches.subcommand_matches("init")
    {
        return init_config(&config_path, matches);
    } else if let Some(matches) = matches.subcommand_matches("generate-completions") {
        return generate_completions(matches);
    }

    let mut config = load_config(&config_path)?;
    // Override file config with environment variables and CLI arguments.
    if let Some(matches) = matches.subcommand_matches("run") {
        config.apply_override(extract_config_args(matches))?;
    }

    beacon_log::init(config.logging(), config.sentry());

    if let Some(matches) = matches.subcommand_matches("config") {
        manage_config(&config, matches)
    } else if matches.subcommand_matches("run").is_some() {
        run(config)
    } else {
        unreachable!();
    }
}

/// Extracts config overrides from parsed command line arguments.
///
/// Values from environment variables are included by clap.
pub fn extract_config_args(matches: &ArgMatches) -> OverridableConfig {
    let value = |name: &str| matches.get_one::<String>(name).cloned();

    OverridableConfig {
        host: value("host"),
        port: value("port"),
        environment: value("environment"),
        influxdb_url: value("influxdb_url"),
        influxdb_token: value("influxdb_token"),
        influxdb_org: value("influxdb_org"),
        postgres_url: value("postgres_url"),
    }
}

pub fn manage_config(config: &Config, matches: &ArgMatches) -> Result<()> {
    if let Some(matches) = matches.subcommand_matches("show") {
        show_config(config, matches)
    } else {
        unreachable!();
    }
}

pub fn init_config(config_path: &Path, matches: &ArgMatches) -> Result<()> {
    if Config::config_exists(config_path) && !matches.get_flag("overwrite") {
        bail!(
            "a config already exists in {}. Pass --overwrite to replace it.",
            config_path.display()
        );
    }

    let config = Config::init(config_path)?;

    #[allow(clippy::print_stdout)]
    {
        println!("Initialized config in {}", config.path().display());
        println!("Set influxdb.org and postgres.url before running the gateway.");
    }

    Ok(())
}

pub fn show_config(config: &Config, matches: &ArgMatches) -> Result<()> {
    let output = match matches.get_one::<String>("format").map(String::as_str) {
        Some("debug") => format!("{config:#?}"),
        Some("yaml") | None => config.to_yaml_string()?,
        Some(other) => bail!("unsupported format {other:?}"),
    };

    #[allow(clippy::print_stdout)]
    {
        println!("{output}");
    }

    Ok(())
}

pub fn generate_completions(matches: &ArgMatches) -> Result<()> {
    let shell = match matches.get_one::<Shell>("format").copied().or_else(Shell::from_env) {
        Some(shell) => shell,
        None => bail!("could not detect the current shell, pass it with --format"),
    };

    let mut app = make_app();
    let name = app.get_name().to_owned();
    clap_complete::generate(shell, &mut app, name, &mut io::stdout());

    Ok(())
}

pub fn run(config: Config) -> Result<()> {
    setup::dump_spawn_infos(&config);
    setup::check_config(&config)?;

    beacon_server::run(config)?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_config_args() {
        let matches = make_app()
            .try_get_matches_from([
                "beacon",
                "run",
                "--port",
                "8080",
                "--environment",
                "Development",
                "--influxdb-org",
                "labs",
            ])
            .unwrap();

        let (_, matches) = matches.subcommand().unwrap();
        let overrides = extract_config_args(matches);

        assert_eq!(overrides.port.as_deref(), Some("8080"));
        assert_eq!(overrides.influxdb_org.as_deref(), Some("labs"));

        let mut config = Config::default();
        config.apply_override(overrides).unwrap();
        assert!(!config.environment().is_production());
        assert_eq!(config.listen_addr().port(), 8080);
    }

    #[test]
    fn test_unknown_environment() {
        let result = make_app().try_get_matches_from(["beacon", "run", "--environment", "staging"]);
        assert!(result.is_err());
    }
}
