//! Definition of the command line app.

use clap::{Arg, ArgAction, Command, value_parser};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const ABOUT: &str = "Telemetry ingestion gateway for the Bloxstrap desktop client.";

pub fn make_app() -> Command {
    Command::new("beacon")
        .disable_help_subcommand(true)
        .subcommand_required(true)
        .arg_required_else_help(true)
        .propagate_version(true)
        .max_term_width(79)
        .version(VERSION)
        .about(ABOUT)
        .arg(
            Arg::new("config")
                .value_name("CONFIG")
                .long("config")
                .short('c')
                .global(true)
                .env("BEACON_CONFIG_PATH")
                .help("The path to the config folder."),
        )
        .subcommand(
            Command::new("run")
                .about("Run the gateway")
                .after_help(
                    "This runs the gateway in the foreground until it's shut down. It will \
                     bind to the port and network interface configured in the config file.",
                )
                .arg(
                    Arg::new("host")
                        .value_name("HOST")
                        .long("host")
                        .short('H')
                        .env("BEACON_HOST")
                        .help("The host the gateway should bind to (network interface)."),
                )
                .arg(
                    Arg::new("port")
                        .value_name("PORT")
                        .long("port")
                        .short('P')
                        .env("BEACON_PORT")
                        .help("The port to bind for the HTTP server."),
                )
                .arg(
                    Arg::new("environment")
                        .value_name("ENVIRONMENT")
                        .long("environment")
                        .env("BEACON_ENVIRONMENT")
                        .value_parser(["production", "development"])
                        .ignore_case(true)
                        .help("The deployment environment."),
                )
                .arg(
                    Arg::new("influxdb_url")
                        .value_name("URL")
                        .long("influxdb-url")
                        .env("BEACON_INFLUXDB_URL")
                        .help("The base URL of the InfluxDB instance."),
                )
                .arg(
                    Arg::new("influxdb_token")
                        .value_name("TOKEN")
                        .long("influxdb-token")
                        .env("BEACON_INFLUXDB_TOKEN")
                        .hide_env_values(true)
                        .help("The InfluxDB API token."),
                )
                .arg(
                    Arg::new("influxdb_org")
                        .value_name("ORG")
                        .long("influxdb-org")
                        .env("BEACON_INFLUXDB_ORG")
                        .help("The InfluxDB organization owning the buckets."),
                )
                .arg(
                    Arg::new("postgres_url")
                        .value_name("URL")
                        .long("postgres-url")
                        .env("BEACON_POSTGRES_URL")
                        .hide_env_values(true)
                        .help("The PostgreSQL connection URL for crash reports."),
                ),
        )
        .subcommand(
            Command::new("config")
                .about("Manage the gateway config")
                .after_help(
                    "This command provides basic config management. It can be used primarily \
                     to initialize a new config and to print out the current config.",
                )
                .subcommand_required(true)
                .arg_required_else_help(true)
                .subcommand(
                    Command::new("init")
                        .about("Initialize a new gateway config")
                        .after_help(
                            "This writes a config with all default values into the config \
                             folder. The command fails if a config already exists, unless \
                             '--overwrite' is passed.",
                        )
                        .arg(
                            Arg::new("overwrite")
                                .long("overwrite")
                                .action(ArgAction::SetTrue)
                                .help("Overwrite an existing config instead of failing."),
                        ),
                )
                .subcommand(
                    Command::new("show")
                        .about("Show the entire config out for debugging purposes")
                        .after_help(
                            "This dumps out the entire config including the values which are \
                             not in the config file but filled in from defaults. The default \
                             output format is YAML but a debug format can also be specified.",
                        )
                        .arg(
                            Arg::new("format")
                                .short('f')
                                .long("format")
                                .value_parser(["debug", "yaml"])
                                .default_value("yaml")
                                .help("The output format"),
                        ),
                ),
        )
        .subcommand(
            Command::new("generate-completions")
                .about("Generate shell completion file")
                .after_help(
                    "This generates a completions file for the shell of the current user. \
                     An explicit shell can be passed with '--format'.",
                )
                .arg(
                    Arg::new("format")
                        .short('f')
                        .long("format")
                        .value_name("SHELL")
                        .value_parser(value_parser!(clap_complete::Shell))
                        .help("Explicitly pick the shell to generate a completion file for."),
                ),
        )
}
