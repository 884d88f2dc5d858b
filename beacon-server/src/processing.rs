//! The ingestion pipeline for metric beacons and crash traces.
//!
//! Requests reach the pipeline only after admission control and the identity check passed, see
//! [`middlewares`](crate::middlewares). The pipeline then runs the remaining stages in order and
//! stops at the first failing stage:
//!
//!  1. Reject empty payloads.
//!  2. Validate against the [`MetricSchema`].
//!  3. Corroborate channel values with the [`ChannelValidator`].
//!  4. Select destinations with the [`BucketRouter`].
//!  5. Write one point per destination bucket, in order.
//!
//! Writes are not rolled back. If the write to a later bucket fails, earlier buckets keep their
//! point and the request fails.

use std::sync::Arc;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use beacon_common::UnixTimestamp;
use beacon_config::Config;
use beacon_log::LogError;
use beacon_schema::{BucketRouter, DataLayout, MetricSchema, SchemaError};
use beacon_ua::IdentityError;
use chrono::Utc;

use crate::services::channels::{ChannelError, ChannelValidator};
use crate::services::crash_store::{CrashReport, CrashReportSink, StoreError};
use crate::services::timeseries::{Point, TimeSeriesSink, WriteError};
use crate::utils::{ApiErrorResponse, BodyError};

/// The tag carrying the full client identity on every point.
const VERSION_TAG: &str = "version";

/// Reasons for rejecting or failing an ingestion request.
#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    /// The client exceeded its rate limit.
    #[error("too many requests")]
    AdmissionRejected,
    /// The client identity is missing, malformed, or not a production build.
    #[error("invalid client identity")]
    IdentityRejected(#[source] IdentityError),
    /// The key, value, or body is missing or empty.
    #[error("empty payload")]
    EmptyPayload,
    /// The request body could not be read.
    #[error("failed to read request body")]
    BodyRead(#[source] axum::Error),
    /// The key or value is not accepted by the schema.
    #[error("metric rejected")]
    SchemaRejected(#[from] SchemaError),
    /// The value failed external corroboration.
    #[error("external validation failed")]
    ExternalValidationFailed(#[from] ChannelError),
    /// The crash trace exceeds the size limit.
    #[error("payload exceeds {limit} bytes")]
    PayloadTooLarge {
        /// The maximum accepted size in bytes.
        limit: usize,
    },
    /// Writing to the time series store failed.
    #[error("failed to write metric")]
    TimeSeriesWrite(#[from] WriteError),
    /// Storing the crash report failed.
    #[error("failed to store crash report")]
    CrashStore(#[from] StoreError),
}

impl IngestError {
    /// Returns the HTTP status code of this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::AdmissionRejected => StatusCode::TOO_MANY_REQUESTS,
            Self::IdentityRejected(_)
            | Self::EmptyPayload
            | Self::BodyRead(_)
            | Self::SchemaRejected(_)
            | Self::ExternalValidationFailed(_) => StatusCode::BAD_REQUEST,
            Self::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            Self::TimeSeriesWrite(_) | Self::CrashStore(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<BodyError> for IngestError {
    fn from(error: BodyError) -> Self {
        match error {
            BodyError::Overflow { limit } => Self::PayloadTooLarge { limit },
            BodyError::Read(error) => Self::BodyRead(error),
        }
    }
}

impl IntoResponse for IngestError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        let body = if status.is_server_error() {
            beacon_log::error!(
                error = &self as &dyn std::error::Error,
                "ingestion failed: {}",
                LogError(&self)
            );
            // Internal causes are logged, not exposed.
            ApiErrorResponse::with_detail(self.to_string())
        } else {
            match &self {
                Self::PayloadTooLarge { limit } => {
                    beacon_log::warn!(limit, "dropped crash trace exceeding size limit");
                }
                Self::ExternalValidationFailed(ChannelError::Unknown(channel)) => {
                    beacon_log::warn!(%channel, "requested nonexistent channel");
                }
                _ => beacon_log::debug!("rejected request: {}", LogError(&self)),
            }
            ApiErrorResponse::from_error(&self)
        };

        (status, body).into_response()
    }
}

/// Validates and routes metric beacons and crash traces to their sinks.
pub struct IngestionPipeline {
    schema: MetricSchema,
    router: BucketRouter,
    layout: DataLayout,
    channels: ChannelValidator,
    time_series: Arc<dyn TimeSeriesSink>,
    crash_store: Arc<dyn CrashReportSink>,
    max_trace_size: usize,
}

impl IngestionPipeline {
    /// Creates a pipeline from configuration and its collaborators.
    pub fn new(
        config: &Config,
        channels: ChannelValidator,
        time_series: Arc<dyn TimeSeriesSink>,
        crash_store: Arc<dyn CrashReportSink>,
    ) -> Self {
        Self {
            schema: config.metric_schema().clone(),
            router: BucketRouter::new(config.environment(), config.test_bucket()),
            layout: config.data_layout(),
            channels,
            time_series,
            crash_store,
            max_trace_size: config.max_trace_size(),
        }
    }

    /// Returns the channel validator.
    pub fn channels(&self) -> &ChannelValidator {
        &self.channels
    }

    /// Returns the maximum size of a crash trace in bytes.
    pub fn max_trace_size(&self) -> usize {
        self.max_trace_size
    }

    /// Ingests a single metric beacon.
    ///
    /// `client_version` is the full identity of the client, recorded as a tag.
    pub async fn ingest_metric(
        &self,
        key: Option<&str>,
        value: Option<&str>,
        client_version: &str,
    ) -> Result<(), IngestError> {
        let (Some(key), Some(value)) = (key, value) else {
            return Err(IngestError::EmptyPayload);
        };

        if key.is_empty() || value.is_empty() {
            return Err(IngestError::EmptyPayload);
        }

        let definition = self.schema.validate(key, value)?;

        let (value, public) = if definition.channel {
            let channel = self
                .channels
                .corroborate(value, UnixTimestamp::now())
                .await?;
            (channel.name, channel.public)
        } else {
            (value.to_owned(), false)
        };

        let placement = self.layout.place(key, &value);
        let point = Point::new(placement.measurement)
            .field(placement.field, 1)
            .tag(VERSION_TAG, client_version)
            .timestamp(self.layout.precision.timestamp(Utc::now()));

        for bucket in self.router.route(definition, public) {
            self.time_series.write(bucket, &point).await?;
        }

        beacon_log::trace!(key, %value, "metric ingested");
        Ok(())
    }

    /// Ingests a crash trace.
    ///
    /// The trace is decoded as UTF-8, replacing invalid sequences. Traces of exactly the maximum
    /// size are accepted.
    pub async fn ingest_crash(&self, trace: &[u8]) -> Result<(), IngestError> {
        if trace.is_empty() {
            return Err(IngestError::EmptyPayload);
        }

        if trace.len() > self.max_trace_size {
            return Err(IngestError::PayloadTooLarge {
                limit: self.max_trace_size,
            });
        }

        let report = CrashReport {
            timestamp: Utc::now(),
            trace: String::from_utf8_lossy(trace).into_owned(),
        };

        self.crash_store.insert(&report).await?;

        beacon_log::trace!(size = trace.len(), "crash trace stored");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use beacon_schema::{CHANNEL, INSTALL_ACTION};
    use similar_asserts::assert_eq;

    use crate::services::channels::existence_key;
    use crate::testutils::{MockChannelRegistry, MockCrashStore, MockTimeSeriesSink};

    use super::*;

    const CLIENT: &str = "Bloxstrap/2.8.0 (Production)";

    struct Fixture {
        pipeline: IngestionPipeline,
        registry: Arc<MockChannelRegistry>,
        time_series: Arc<MockTimeSeriesSink>,
        crash_store: Arc<MockCrashStore>,
    }

    fn fixture_with(config: Config, time_series: MockTimeSeriesSink) -> Fixture {
        beacon_log::init_test!();

        let registry = Arc::new(MockChannelRegistry::new(["zbeta1", "zlive"], ["zlive"]));
        let time_series = Arc::new(time_series);
        let crash_store = Arc::new(MockCrashStore::new());

        let pipeline = IngestionPipeline::new(
            &config,
            ChannelValidator::from_config(&config, registry.clone()),
            time_series.clone(),
            crash_store.clone(),
        );

        Fixture {
            pipeline,
            registry,
            time_series,
            crash_store,
        }
    }

    fn fixture() -> Fixture {
        fixture_with(Config::default(), MockTimeSeriesSink::new())
    }

    #[tokio::test]
    async fn test_install_action() {
        let f = fixture();

        f.pipeline
            .ingest_metric(Some(INSTALL_ACTION), Some("install"), CLIENT)
            .await
            .unwrap();

        let writes = f.time_series.writes();
        assert_eq!(writes.len(), 1);

        let (bucket, point) = &writes[0];
        assert_eq!(bucket, "bloxstrap-90d");
        assert_eq!(point.measurement(), INSTALL_ACTION);
        assert_eq!(point.get_field("install"), Some(1));
        assert_eq!(point.get_tag("version"), Some(CLIENT));
        assert!(point.get_timestamp().is_some());
        assert_eq!(f.registry.calls(), 0);
    }

    #[tokio::test]
    async fn test_empty_payload() {
        let f = fixture();

        for (key, value) in [
            (None, Some("install")),
            (Some(INSTALL_ACTION), None),
            (Some(""), Some("install")),
            (Some(INSTALL_ACTION), Some("")),
        ] {
            let result = f.pipeline.ingest_metric(key, value, CLIENT).await;
            assert!(matches!(result, Err(IngestError::EmptyPayload)));
        }

        assert!(f.time_series.writes().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_key() {
        let f = fixture();

        let result = f
            .pipeline
            .ingest_metric(Some("launchCount"), Some("install"), CLIENT)
            .await;

        assert!(matches!(
            result,
            Err(IngestError::SchemaRejected(SchemaError::UnknownMetric))
        ));
        assert!(f.time_series.writes().is_empty());
    }

    #[tokio::test]
    async fn test_value_outside_closed_set() {
        let f = fixture();

        let result = f
            .pipeline
            .ingest_metric(Some(INSTALL_ACTION), Some("reinstall"), CLIENT)
            .await;

        assert!(matches!(
            result,
            Err(IngestError::SchemaRejected(SchemaError::ValueNotAllowed(_)))
        ));
        assert!(f.time_series.writes().is_empty());
    }

    #[tokio::test]
    async fn test_unstorable_channel_value() {
        let f = fixture();

        for value in ["zbeta\\", "zbeta\n"] {
            let result = f
                .pipeline
                .ingest_metric(Some(CHANNEL), Some(value), CLIENT)
                .await;

            assert!(matches!(
                result,
                Err(IngestError::SchemaRejected(SchemaError::UnstorableValue(_)))
            ));
        }

        assert!(f.time_series.writes().is_empty());
        assert_eq!(f.registry.calls(), 0);
    }

    #[tokio::test]
    async fn test_private_channel() {
        let f = fixture();

        f.pipeline
            .ingest_metric(Some(CHANNEL), Some("Zbeta1"), CLIENT)
            .await
            .unwrap();

        assert_eq!(f.time_series.buckets(), vec!["bloxstrap-14d"]);
        let (_, point) = &f.time_series.writes()[0];
        assert_eq!(point.get_field("zbeta1"), Some(1));
    }

    #[tokio::test]
    async fn test_public_channel() {
        let f = fixture();

        f.pipeline
            .ingest_metric(Some(CHANNEL), Some("zlive"), CLIENT)
            .await
            .unwrap();

        assert_eq!(
            f.time_series.buckets(),
            vec!["bloxstrap-14d", "bloxstrap-14d-public"]
        );
    }

    #[tokio::test]
    async fn test_channel_without_sentinel() {
        let f = fixture();

        let result = f
            .pipeline
            .ingest_metric(Some(CHANNEL), Some("beta"), CLIENT)
            .await;

        assert!(matches!(
            result,
            Err(IngestError::ExternalValidationFailed(
                ChannelError::InvalidPrefix(_)
            ))
        ));
        assert_eq!(f.registry.calls(), 0);
        assert!(f.time_series.writes().is_empty());
    }

    #[tokio::test]
    async fn test_cached_negative_channel() {
        let f = fixture();
        f.pipeline.channels().cache().insert(
            existence_key("zalpha"),
            false,
            Duration::from_secs(3600),
            UnixTimestamp::now(),
        );

        let result = f
            .pipeline
            .ingest_metric(Some(CHANNEL), Some("zalpha"), CLIENT)
            .await;

        assert!(matches!(
            result,
            Err(IngestError::ExternalValidationFailed(ChannelError::Unknown(_)))
        ));
        assert_eq!(f.registry.calls(), 0);
        assert!(f.time_series.writes().is_empty());
    }

    #[tokio::test]
    async fn test_development_uses_test_bucket() {
        let config = Config::from_json_value(serde_json::json!({
            "server": {"environment": "development"},
        }))
        .unwrap();
        let f = fixture_with(config, MockTimeSeriesSink::new());

        f.pipeline
            .ingest_metric(Some(CHANNEL), Some("zlive"), CLIENT)
            .await
            .unwrap();

        assert_eq!(f.time_series.buckets(), vec!["test-bucket"]);
    }

    #[tokio::test]
    async fn test_swapped_layout() {
        let config = Config::from_json_value(serde_json::json!({
            "influxdb": {"layout": {"field": "key", "precision": "s"}},
        }))
        .unwrap();
        let f = fixture_with(config, MockTimeSeriesSink::new());

        f.pipeline
            .ingest_metric(Some(INSTALL_ACTION), Some("upgrade"), CLIENT)
            .await
            .unwrap();

        let (_, point) = &f.time_series.writes()[0];
        assert_eq!(point.measurement(), "upgrade");
        assert_eq!(point.get_field(INSTALL_ACTION), Some(1));

        // Seconds precision stays well below millisecond magnitudes.
        assert!(point.get_timestamp().unwrap() < 10_000_000_000);
    }

    #[tokio::test]
    async fn test_partial_write_failure() {
        let f = fixture_with(
            Config::default(),
            MockTimeSeriesSink::failing_on("bloxstrap-14d-public"),
        );

        let result = f
            .pipeline
            .ingest_metric(Some(CHANNEL), Some("zlive"), CLIENT)
            .await;

        assert!(matches!(result, Err(IngestError::TimeSeriesWrite(_))));
        // The first write is kept.
        assert_eq!(f.time_series.buckets(), vec!["bloxstrap-14d"]);
    }

    #[tokio::test]
    async fn test_first_write_failure_short_circuits() {
        let f = fixture_with(
            Config::default(),
            MockTimeSeriesSink::failing_on("bloxstrap-14d"),
        );

        let result = f
            .pipeline
            .ingest_metric(Some(CHANNEL), Some("zlive"), CLIENT)
            .await;

        assert!(matches!(result, Err(IngestError::TimeSeriesWrite(_))));
        assert!(f.time_series.writes().is_empty());
    }

    #[tokio::test]
    async fn test_crash_trace_limits() {
        let f = fixture();
        let limit = f.pipeline.max_trace_size();
        assert_eq!(limit, 50 * 1024);

        f.pipeline.ingest_crash(&vec![b'a'; limit]).await.unwrap();

        let result = f.pipeline.ingest_crash(&vec![b'a'; limit + 1]).await;
        assert!(matches!(
            result,
            Err(IngestError::PayloadTooLarge { limit: 51200 })
        ));

        let result = f.pipeline.ingest_crash(&vec![b'a'; 60 * 1024]).await;
        assert!(matches!(result, Err(IngestError::PayloadTooLarge { .. })));

        let result = f.pipeline.ingest_crash(b"").await;
        assert!(matches!(result, Err(IngestError::EmptyPayload)));

        assert_eq!(f.crash_store.reports().len(), 1);
    }

    #[tokio::test]
    async fn test_crash_trace_lossy_utf8() {
        let f = fixture();

        f.pipeline
            .ingest_crash(b"System.Exception\xff at Main()")
            .await
            .unwrap();

        let reports = f.crash_store.reports();
        assert_eq!(reports[0].trace, "System.Exception\u{fffd} at Main()");
    }

    #[tokio::test]
    async fn test_crash_store_failure() {
        let f = fixture();
        f.crash_store.fail();

        let error = f.pipeline.ingest_crash(b"trace").await.unwrap_err();
        assert_eq!(error.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(
            IngestError::AdmissionRejected.status_code(),
            StatusCode::TOO_MANY_REQUESTS
        );
        assert_eq!(
            IngestError::IdentityRejected(IdentityError::NotProduction).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            IngestError::PayloadTooLarge { limit: 1 }.status_code(),
            StatusCode::PAYLOAD_TOO_LARGE
        );
    }
}
