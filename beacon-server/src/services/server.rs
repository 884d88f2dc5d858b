//! The HTTP server hosting all [endpoints](crate::endpoints).

use std::net::SocketAddr;

use axum::ServiceExt;
use axum::extract::Request;
use axum::http::{HeaderValue, header};
use axum_server::Handle;
use beacon_config::Config;
use sentry::integrations::tower::{NewSentryLayer, SentryHttpLayer};
use tower::ServiceBuilder;
use tower::limit::GlobalConcurrencyLimitLayer;
use tower_http::set_header::SetResponseHeaderLayer;

use crate::constants;
use crate::middlewares::{self, CatchPanicLayer};
use crate::service::ServiceState;

/// Indicates the type of failure of the server.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// Binding or serving failed.
    #[error("failed to serve on {0}")]
    Io(SocketAddr, #[source] std::io::Error),
}

/// Builds the axum application with all routes and middleware.
pub fn make_app(state: ServiceState) -> axum::Router {
    // Service builder order defines layers added first will be called first. This means:
    //  - Requests go from top to bottom
    //  - Responses go from bottom to top
    let middleware = ServiceBuilder::new()
        .layer(CatchPanicLayer::custom(middlewares::handle_panic))
        .layer(SetResponseHeaderLayer::overriding(
            header::SERVER,
            HeaderValue::from_static(constants::SERVER),
        ))
        .layer(NewSentryLayer::new_from_top())
        .layer(SentryHttpLayer::new().enable_transaction())
        .layer(middlewares::trace_http_layer());

    crate::endpoints::routes(state.clone())
        .layer(middleware)
        .with_state(state)
}

/// Serves the application until a shutdown signal is received.
///
/// On `SIGINT`, the server stops accepting connections and waits for in-flight requests up to the
/// configured shutdown timeout.
pub async fn serve(config: &Config, state: ServiceState) -> Result<(), ServerError> {
    let addr = config.listen_addr();
    let handle = Handle::new();

    // The limit spans all routes, so it wraps the router instead of each route.
    let app = ServiceBuilder::new()
        .layer(GlobalConcurrencyLimitLayer::new(
            config.max_concurrent_requests(),
        ))
        .service(make_app(state));
    let service = ServiceExt::<Request>::into_make_service_with_connect_info::<SocketAddr>(app);

    let shutdown_timeout = config.shutdown_timeout();
    let shutdown_handle = handle.clone();
    tokio::spawn(async move {
        if let Err(error) = tokio::signal::ctrl_c().await {
            beacon_log::error!(
                error = &error as &dyn std::error::Error,
                "failed to listen for shutdown signal"
            );
            return;
        }

        beacon_log::info!("shutting down http server");
        shutdown_handle.graceful_shutdown(Some(shutdown_timeout));
    });

    let listening = handle.clone();
    tokio::spawn(async move {
        if let Some(addr) = listening.listening().await {
            beacon_log::info!("listening on http://{addr}/");
        }
    });

    axum_server::bind(addr)
        .handle(handle)
        .serve(service)
        .await
        .map_err(|error| ServerError::Io(addr, error))
}
