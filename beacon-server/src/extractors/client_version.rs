use std::fmt;

use axum::extract::FromRequestParts;
use axum::http::StatusCode;
use axum::http::request::Parts;

/// The verified identity of a production client, as reported in its `User-Agent`.
///
/// Inserted into request extensions by the [`identity`](crate::middlewares::identity) middleware.
/// Extraction fails with `500` on routes without that middleware.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ClientVersion(String);

impl ClientVersion {
    pub fn new(identity: impl Into<String>) -> Self {
        Self(identity.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ClientVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl<S> FromRequestParts<S> for ClientVersion
where
    S: Send + Sync,
{
    type Rejection = StatusCode;

    async fn from_request_parts(parts: &mut Parts, _: &S) -> Result<Self, Self::Rejection> {
        match parts.extensions.get::<ClientVersion>() {
            Some(version) => Ok(version.clone()),
            None => {
                beacon_log::error!("identity middleware is not configured");
                Err(StatusCode::INTERNAL_SERVER_ERROR)
            }
        }
    }
}
