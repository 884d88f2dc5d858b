//! A liveness endpoint for load balancers and orchestrators.

use axum::Json;
use axum::response::IntoResponse;
use serde::Serialize;

#[derive(Serialize)]
struct Status {
    status: &'static str,
}

/// Always responds with `200 OK`. Backends are not probed.
pub async fn handle() -> impl IntoResponse {
    Json(Status { status: "healthy" })
}
