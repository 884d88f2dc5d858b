use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::Response;
use beacon_common::UnixTimestamp;

use crate::extractors::ClientAddr;
use crate::processing::IngestError;
use crate::service::ServiceState;

/// Fixed window admission control per client address.
///
/// Use this with [`axum::middleware::from_fn_with_state`]. Rejected requests do not reach any
/// later stage and do not consume a permit.
pub async fn admission(
    State(state): State<ServiceState>,
    client: ClientAddr,
    request: Request,
    next: Next,
) -> Result<Response, IngestError> {
    let now = UnixTimestamp::now();
    let limiter = state.rate_limiter();

    let result = limiter.check(client.ip(), now);
    limiter.try_vacuum(now);

    if let Err(limited) = result {
        beacon_log::debug!(%client, reset_at = %limited.reset_at, "client is rate limited");
        return Err(IngestError::AdmissionRejected);
    }

    Ok(next.run(request).await)
}
