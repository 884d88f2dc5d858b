//! The beacon gateway server.
//!
//! The gateway accepts anonymous usage beacons and crash traces from the desktop client and
//! forwards them to storage:
//!
//! ```text
//!   client ──► admission ──► identity ──► pipeline ──┬──► InfluxDB (metric beacons)
//!                                            │       └──► PostgreSQL (crash traces)
//!                                            └──► channel registry (corroboration)
//! ```
//!
//! # Endpoints
//!
//! - `GET /metrics/post?key=&value=` accepts a single metric beacon. The key must be part of the
//!   [`MetricSchema`](beacon_schema::MetricSchema) and the value must be accepted by its
//!   definition. Values of channel metrics are additionally corroborated against the external
//!   channel registry.
//! - `POST /metrics/post-exception` accepts a crash trace as raw text body.
//! - `GET /health` reports liveness.
//!
//! Both ingestion endpoints are rate limited per client address and require a `User-Agent`
//! identifying a production build of the desktop client.
//!
//! # Storage
//!
//! Every accepted beacon becomes one time series point with a single integer field, tagged with
//! the full client identity. Depending on the metric and channel visibility, the point is written
//! to one or two buckets. Outside of production, all points go to a single test bucket.
//!
//! Crash traces are inserted into the `exception_reports` table, see
//! [`PostgresCrashStore`](services::crash_store::PostgresCrashStore).

#![warn(missing_docs)]

mod endpoints;
mod extractors;
mod middlewares;
mod processing;
mod service;
mod utils;

pub mod constants;
pub mod services;

#[cfg(test)]
mod testutils;

use std::sync::Arc;

use anyhow::{Context, Result};
use beacon_config::Config;

pub use self::processing::{IngestError, IngestionPipeline};
pub use self::service::{ServiceError, ServiceState, create_runtime};

/// Runs the gateway until a shutdown signal is received.
///
/// Blocks the current thread.
pub fn run(config: Config) -> Result<()> {
    let config = Arc::new(config);
    beacon_log::info!("beacon server starting");

    let runtime = create_runtime("beacon-rt", None)?;
    runtime.block_on(async {
        let state = ServiceState::start(config.clone())?;
        services::server::serve(&config, state)
            .await
            .context("http server failed")
    })?;

    beacon_log::info!("beacon server shut down");
    Ok(())
}
