use std::fmt;
use std::net::IpAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use beacon_config::Config;
use beacon_quotas::{FixedWindow, FixedWindowRateLimiter};
use beacon_ua::IdentityParser;
use tokio::runtime::Runtime;

use crate::processing::IngestionPipeline;
use crate::services::channels::{
    ChannelRegistry, ChannelValidator, HttpChannelRegistry, RegistryEndpoint,
};
use crate::services::crash_store::{CrashReportSink, PostgresCrashStore};
use crate::services::timeseries::{InfluxDbSink, TimeSeriesSink};

/// Indicates the type of failure of the server.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, thiserror::Error)]
pub enum ServiceError {
    /// Initializing the InfluxDB client failed.
    #[error("could not initialize influxdb client")]
    InfluxDb,

    /// Initializing the PostgreSQL pool failed.
    #[error("could not initialize postgres pool")]
    Postgres,

    /// Initializing the channel registry client failed.
    #[error("could not initialize channel registry client")]
    ChannelRegistry,
}

/// Constructs a multi-threaded tokio [`Runtime`] with all drivers enabled.
pub fn create_runtime(name: &'static str, threads: Option<usize>) -> Result<Runtime> {
    let mut builder = tokio::runtime::Builder::new_multi_thread();
    builder.thread_name(name).enable_all();

    if let Some(threads) = threads {
        builder.worker_threads(threads);
    }

    builder.build().context("could not create runtime")
}

/// Admission partitions are keyed by client address. Requests without a resolvable address
/// share the `None` partition.
pub type AdmissionLimiter = FixedWindowRateLimiter<Option<IpAddr>>;

struct StateInner {
    config: Arc<Config>,
    rate_limiter: AdmissionLimiter,
    identity: IdentityParser,
    pipeline: IngestionPipeline,
}

/// Server state.
#[derive(Clone)]
pub struct ServiceState {
    inner: Arc<StateInner>,
}

impl ServiceState {
    /// Creates all clients from configuration.
    ///
    /// Does not connect to any backend. Connections are established on first use. Must be called
    /// within a tokio runtime.
    pub fn start(config: Arc<Config>) -> Result<Self> {
        let layout = config.data_layout();
        let time_series = InfluxDbSink::new(
            config.influxdb_url(),
            config.influxdb_token(),
            config.influxdb_org(),
            layout.precision,
            config.http_timeout(),
        )
        .context(ServiceError::InfluxDb)?;

        let postgres_url = config
            .postgres_url()
            .context("postgres.url is not configured")
            .context(ServiceError::Postgres)?;
        let crash_store =
            PostgresCrashStore::connect_lazy(postgres_url, config.postgres_max_connections())
                .context(ServiceError::Postgres)?;

        let channels = config.channels();
        let existence = RegistryEndpoint::new(&channels.existence_url, &channels.existence_field)
            .context(ServiceError::ChannelRegistry)?;
        let visibility =
            RegistryEndpoint::new(&channels.visibility_url, &channels.visibility_field)
                .context(ServiceError::ChannelRegistry)?;
        let registry = HttpChannelRegistry::new(existence, visibility, config.http_timeout())
            .context(ServiceError::ChannelRegistry)?;

        Ok(Self::new(
            config,
            Arc::new(registry),
            Arc::new(time_series),
            Arc::new(crash_store),
        ))
    }

    /// Creates the state from explicit backends.
    pub fn new(
        config: Arc<Config>,
        registry: Arc<dyn ChannelRegistry>,
        time_series: Arc<dyn TimeSeriesSink>,
        crash_store: Arc<dyn CrashReportSink>,
    ) -> Self {
        let rate_limiter = FixedWindowRateLimiter::new(FixedWindow {
            limit: config.rate_limit_permits(),
            window: config.rate_limit_window(),
        });

        let channels = ChannelValidator::from_config(&config, registry);
        let pipeline = IngestionPipeline::new(&config, channels, time_series, crash_store);

        Self {
            inner: Arc::new(StateInner {
                identity: IdentityParser::new(config.identity_product()),
                config,
                rate_limiter,
                pipeline,
            }),
        }
    }

    /// Returns an atomically counted reference to the config.
    pub fn config(&self) -> &Arc<Config> {
        &self.inner.config
    }

    /// Returns the per-client admission limiter.
    pub fn rate_limiter(&self) -> &AdmissionLimiter {
        &self.inner.rate_limiter
    }

    /// Returns the parser of client identities.
    pub fn identity(&self) -> &IdentityParser {
        &self.inner.identity
    }

    /// Returns the ingestion pipeline.
    pub fn pipeline(&self) -> &IngestionPipeline {
        &self.inner.pipeline
    }
}

impl fmt::Debug for ServiceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceState")
            .field("config", &self.inner.config.path())
            .field("rate_limited_clients", &self.inner.rate_limiter.len())
            .finish_non_exhaustive()
    }
}
