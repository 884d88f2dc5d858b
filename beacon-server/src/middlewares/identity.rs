use axum::extract::{Request, State};
use axum::http::header;
use axum::middleware::Next;
use axum::response::Response;
use beacon_ua::IdentityError;

use crate::extractors::ClientVersion;
use crate::processing::IngestError;
use crate::service::ServiceState;

/// Rejects requests from anything but production builds of the desktop client.
///
/// On success, the full identity is available to handlers as [`ClientVersion`]. Use this with
/// [`axum::middleware::from_fn_with_state`].
pub async fn identity(
    State(state): State<ServiceState>,
    mut request: Request,
    next: Next,
) -> Result<Response, IngestError> {
    let header = request
        .headers()
        .get(header::USER_AGENT)
        .map(|value| value.to_str().map_err(|_| IdentityError::Malformed))
        .transpose()
        .map_err(IngestError::IdentityRejected)?;

    let version = state
        .identity()
        .parse_production(header)
        .map(|identity| ClientVersion::new(identity.as_str()))
        .map_err(IngestError::IdentityRejected)?;

    request.extensions_mut().insert(version);
    Ok(next.run(request).await)
}
