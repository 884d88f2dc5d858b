//! Ingestion endpoints for metric beacons and crash traces.

use axum::body::Body;
use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode, header};
use serde::Deserialize;

use crate::extractors::ClientVersion;
use crate::processing::IngestError;
use crate::service::ServiceState;
use crate::utils;

#[derive(Debug, Deserialize)]
pub struct MetricQuery {
    key: Option<String>,
    value: Option<String>,
}

/// Accepts a single metric beacon.
pub async fn handle_metric(
    State(state): State<ServiceState>,
    version: ClientVersion,
    Query(query): Query<MetricQuery>,
) -> Result<StatusCode, IngestError> {
    state
        .pipeline()
        .ingest_metric(
            query.key.as_deref(),
            query.value.as_deref(),
            version.as_str(),
        )
        .await?;

    Ok(StatusCode::OK)
}

/// Accepts a crash trace as raw text body.
pub async fn handle_exception(
    State(state): State<ServiceState>,
    headers: HeaderMap,
    body: Body,
) -> Result<StatusCode, IngestError> {
    let limit = state.pipeline().max_trace_size();

    let content_length = headers
        .get(header::CONTENT_LENGTH)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.parse::<u64>().ok());

    // Skip reading bodies that announce their excess size upfront.
    if content_length.is_some_and(|length| length > limit as u64) {
        return Err(IngestError::PayloadTooLarge { limit });
    }

    let trace = utils::read_limited(body, limit).await?;
    state.pipeline().ingest_crash(&trace).await?;

    Ok(StatusCode::OK)
}
