//! The beacon gateway.
//!
//! Accepts anonymous usage beacons and crash traces from the Bloxstrap desktop client, validates
//! them against a closed metric schema and writes them to InfluxDB and PostgreSQL.
//!
//! # Usage
//!
//! ```text
//! beacon config init           # write a default config to ./.beacon/config.yml
//! beacon config show           # print the effective config
//! beacon run                   # serve until SIGINT
//! ```
//!
//! All connection settings of `beacon run` can be overridden with command line flags or with
//! `BEACON_*` environment variables, for example `BEACON_POSTGRES_URL`.

mod cli;
mod cliapp;
mod setup;

use std::process;

use beacon_log::Hub;

pub fn main() {
    let exit_code = match cli::execute() {
        Ok(()) => 0,
        Err(err) => {
            beacon_log::ensure_error(&err);
            1
        }
    };

    if let Some(client) = Hub::current().client() {
        client.close(None);
    }

    process::exit(exit_code);
}
