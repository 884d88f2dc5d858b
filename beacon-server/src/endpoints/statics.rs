use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Redirect, Response};

use crate::service::ServiceState;

/// Redirects to the configured root target, or responds with `404 Not Found`.
pub async fn root(State(state): State<ServiceState>) -> Response {
    match state.config().root_redirect() {
        Some(target) => Redirect::temporary(target).into_response(),
        None => not_found().await.into_response(),
    }
}

/// An endpoint function that always responds with `404 Not Found`.
pub async fn not_found() -> impl IntoResponse {
    StatusCode::NOT_FOUND
}
