//! Web server endpoints.
//!
//! The ingestion endpoints live under `/metrics`. Requests to them pass admission control and the
//! identity check before reaching a handler. The remaining routes are neither rate limited nor
//! identity checked.

use axum::Router;
use axum::middleware;
use axum::routing::{get, post};

use crate::middlewares;
use crate::service::ServiceState;

mod health_check;
mod metrics;
mod statics;

/// Returns all routes of the gateway.
pub fn routes(state: ServiceState) -> Router<ServiceState> {
    // Layers run bottom to top, so admission runs before identity.
    let ingestion = Router::new()
        .route("/metrics/post", get(metrics::handle_metric))
        .route("/metrics/post-exception", post(metrics::handle_exception))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            middlewares::identity,
        ))
        .route_layer(middleware::from_fn_with_state(state, middlewares::admission));

    Router::new()
        .route("/", get(statics::root))
        .route("/health", get(health_check::handle))
        .merge(ingestion)
        .fallback(statics::not_found)
}
