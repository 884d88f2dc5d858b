//! Corroboration of reported deployment channels.
//!
//! Clients report the deployment channel they are running on. Since the value is free-form, it is
//! checked against the channel registry of the platform before it is accepted. A channel must
//! exist to be recorded at all. Channels that are also publicly visible are additionally recorded
//! in the public bucket.
//!
//! Both checks are cached in a [`ValidationCache`], including negative outcomes.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use beacon_common::UnixTimestamp;
use beacon_config::Config;
use url::Url;

use crate::services::validation::ValidationCache;

/// The placeholder for the channel name in endpoint URLs.
const PLACEHOLDER: &str = "{channel}";

/// The [`PLACEHOLDER`] after percent-encoding by [`Url::parse`].
const PLACEHOLDER_ENCODED: &str = "%7Bchannel%7D";

/// Reasons for rejecting a reported channel.
#[derive(Clone, Debug, Eq, PartialEq, thiserror::Error)]
pub enum ChannelError {
    /// The channel name does not start with the expected prefix.
    #[error("channel name {0:?} has an invalid prefix")]
    InvalidPrefix(String),
    /// The registry does not know the channel.
    #[error("channel {0:?} does not exist")]
    Unknown(String),
}

/// The outcome of a successful corroboration.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Channel {
    /// The normalized, lowercase channel name.
    pub name: String,
    /// Whether the channel is publicly visible.
    pub public: bool,
}

/// The external registry of deployment channels.
#[async_trait]
pub trait ChannelRegistry: Send + Sync {
    /// Returns `true` if the channel exists.
    ///
    /// Any failure to reach the registry results in `false`.
    async fn exists(&self, channel: &str) -> bool;

    /// Returns `true` if the channel is publicly visible.
    ///
    /// Any failure to reach the registry results in `false`.
    async fn is_public(&self, channel: &str) -> bool;
}

/// Error parsing a [`RegistryEndpoint`] template.
#[derive(Debug, thiserror::Error)]
pub enum EndpointError {
    /// The template is not a valid URL.
    #[error("invalid endpoint url")]
    InvalidUrl(#[from] url::ParseError),
    /// The URL cannot carry path segments.
    #[error("endpoint url cannot be a base")]
    CannotBeABase,
    /// The template has no path segment holding the channel placeholder.
    #[error("endpoint url has no {{channel}} path segment")]
    MissingPlaceholder,
}

/// A registry endpoint answering with a JSON object for a single channel.
#[derive(Clone, Debug)]
pub struct RegistryEndpoint {
    template: Url,
    field: String,
}

impl RegistryEndpoint {
    /// Creates an endpoint from a URL template with a `{channel}` path segment.
    ///
    /// The check succeeds if the response carries `field` with a non-null value.
    pub fn new(template: &str, field: impl Into<String>) -> Result<Self, EndpointError> {
        let template = Url::parse(template)?;

        let has_placeholder = template
            .path_segments()
            .ok_or(EndpointError::CannotBeABase)?
            .any(is_placeholder);

        if !has_placeholder {
            return Err(EndpointError::MissingPlaceholder);
        }

        Ok(Self {
            template,
            field: field.into(),
        })
    }

    /// Returns the URL for the given channel.
    ///
    /// The channel name is inserted as a single, percent-encoded path segment.
    pub fn url(&self, channel: &str) -> Url {
        let segments = self
            .template
            .path_segments()
            .map(|segments| segments.map(str::to_owned).collect::<Vec<_>>())
            .unwrap_or_default();

        let mut url = self.template.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.clear();
            for segment in &segments {
                path.push(if is_placeholder(segment) {
                    channel
                } else {
                    segment
                });
            }
        }

        url
    }
}

fn is_placeholder(segment: &str) -> bool {
    segment == PLACEHOLDER || segment == PLACEHOLDER_ENCODED
}

/// Queries the channel registry over HTTP.
#[derive(Clone, Debug)]
pub struct HttpChannelRegistry {
    client: reqwest::Client,
    existence: RegistryEndpoint,
    visibility: RegistryEndpoint,
}

impl HttpChannelRegistry {
    /// Creates a registry client with the given request timeout.
    pub fn new(
        existence: RegistryEndpoint,
        visibility: RegistryEndpoint,
        timeout: Duration,
    ) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            existence,
            visibility,
        })
    }

    async fn check(&self, endpoint: &RegistryEndpoint, channel: &str) -> bool {
        let url = endpoint.url(channel);

        match self.fetch(url.clone(), &endpoint.field).await {
            Ok(found) => found,
            Err(error) => {
                beacon_log::debug!(
                    %url,
                    error = &error as &dyn std::error::Error,
                    "channel registry request failed"
                );
                false
            }
        }
    }

    async fn fetch(&self, url: Url, field: &str) -> Result<bool, reqwest::Error> {
        let body = self
            .client
            .get(url)
            .send()
            .await?
            .error_for_status()?
            .json::<serde_json::Value>()
            .await?;

        Ok(body.get(field).is_some_and(|value| !value.is_null()))
    }
}

#[async_trait]
impl ChannelRegistry for HttpChannelRegistry {
    async fn exists(&self, channel: &str) -> bool {
        self.check(&self.existence, channel).await
    }

    async fn is_public(&self, channel: &str) -> bool {
        self.check(&self.visibility, channel).await
    }
}

/// Corroborates reported channels using a cached [`ChannelRegistry`].
pub struct ChannelValidator {
    sentinel: String,
    registry: Arc<dyn ChannelRegistry>,
    cache: ValidationCache,
    existence_ttl: Duration,
    visibility_ttl: Duration,
}

impl ChannelValidator {
    /// Creates a validator with default sentinel and TTLs.
    pub fn new(registry: Arc<dyn ChannelRegistry>) -> Self {
        Self::from_config(&Config::default(), registry)
    }

    /// Creates a validator from the `channels` config section.
    pub fn from_config(config: &Config, registry: Arc<dyn ChannelRegistry>) -> Self {
        Self {
            sentinel: config.channels().sentinel.to_lowercase(),
            registry,
            cache: ValidationCache::new(),
            existence_ttl: config.channel_existence_ttl(),
            visibility_ttl: config.channel_visibility_ttl(),
        }
    }

    /// Returns the outcome cache.
    pub fn cache(&self) -> &ValidationCache {
        &self.cache
    }

    /// Corroborates a reported channel.
    ///
    /// The name is lowercased first. Names without the sentinel prefix are rejected without
    /// consulting the registry. The visibility check only runs for existing channels.
    pub async fn corroborate(
        &self,
        value: &str,
        now: UnixTimestamp,
    ) -> Result<Channel, ChannelError> {
        let name = value.to_lowercase();

        if !name.starts_with(self.sentinel.as_str()) {
            return Err(ChannelError::InvalidPrefix(name));
        }

        let registry = &self.registry;

        let exists = self
            .cache
            .get_or_check(existence_key(&name), self.existence_ttl, now, || {
                registry.exists(&name)
            })
            .await;

        if !exists {
            return Err(ChannelError::Unknown(name));
        }

        let public = self
            .cache
            .get_or_check(visibility_key(&name), self.visibility_ttl, now, || {
                registry.is_public(&name)
            })
            .await;

        Ok(Channel { name, public })
    }
}

/// Returns the cache key of the existence check of a lowercase channel name.
pub fn existence_key(channel: &str) -> String {
    format!("channel-{channel}-valid")
}

/// Returns the cache key of the visibility check of a lowercase channel name.
pub fn visibility_key(channel: &str) -> String {
    format!("channel-{channel}-public")
}

#[cfg(test)]
mod tests {
    use std::net::SocketAddr;

    use axum::Router;
    use axum::extract::Path;
    use axum::http::StatusCode;
    use axum::response::IntoResponse;
    use axum::routing::get;

    use crate::testutils::{MockChannelRegistry, spawn_upstream};

    use super::*;

    #[test]
    fn test_endpoint_url() {
        let endpoint =
            RegistryEndpoint::new("https://example.com/v2/bucket/{channel}", "field").unwrap();

        assert_eq!(
            endpoint.url("zbeta").as_str(),
            "https://example.com/v2/bucket/zbeta"
        );
        // The name cannot escape its path segment.
        assert_eq!(
            endpoint.url("z/../../admin?x").as_str(),
            "https://example.com/v2/bucket/z%2F..%2F..%2Fadmin%3Fx"
        );
    }

    #[test]
    fn test_endpoint_requires_placeholder() {
        assert!(matches!(
            RegistryEndpoint::new("https://example.com/v2/bucket", "field"),
            Err(EndpointError::MissingPlaceholder)
        ));
        assert!(matches!(
            RegistryEndpoint::new("not a url", "field"),
            Err(EndpointError::InvalidUrl(_))
        ));
    }

    #[tokio::test]
    async fn test_sentinel_rejects_without_lookup() {
        let registry = Arc::new(MockChannelRegistry::new(["zbeta"], []));
        let validator = ChannelValidator::new(registry.clone());

        let result = validator.corroborate("beta", UnixTimestamp::now()).await;

        assert_eq!(result, Err(ChannelError::InvalidPrefix("beta".to_owned())));
        assert_eq!(registry.calls(), 0);
    }

    #[tokio::test]
    async fn test_cached_negative_outcome() {
        let registry = Arc::new(MockChannelRegistry::new(["zalpha"], []));
        let validator = ChannelValidator::new(registry.clone());
        let now = UnixTimestamp::now();

        validator
            .cache()
            .insert(existence_key("zalpha"), false, Duration::from_secs(60), now);

        let result = validator.corroborate("zalpha", now).await;

        assert_eq!(result, Err(ChannelError::Unknown("zalpha".to_owned())));
        assert_eq!(registry.calls(), 0);
    }

    #[tokio::test]
    async fn test_lowercase_and_visibility() {
        let registry = Arc::new(MockChannelRegistry::new(["zbeta1", "zlive"], ["zlive"]));
        let validator = ChannelValidator::new(registry.clone());
        let now = UnixTimestamp::now();

        assert_eq!(
            validator.corroborate("Zbeta1", now).await,
            Ok(Channel {
                name: "zbeta1".to_owned(),
                public: false
            })
        );
        assert_eq!(
            validator.corroborate("ZLIVE", now).await,
            Ok(Channel {
                name: "zlive".to_owned(),
                public: true
            })
        );
        assert_eq!(registry.calls(), 4);

        // Served from the cache.
        validator.corroborate("zbeta1", now).await.unwrap();
        assert_eq!(registry.calls(), 4);
    }

    #[tokio::test]
    async fn test_visibility_skipped_for_unknown() {
        let registry = Arc::new(MockChannelRegistry::new([], ["zghost"]));
        let validator = ChannelValidator::new(registry.clone());

        let result = validator.corroborate("zghost", UnixTimestamp::now()).await;

        assert_eq!(result, Err(ChannelError::Unknown("zghost".to_owned())));
        assert_eq!(registry.calls(), 1);
    }

    async fn settings(Path(channel): Path<String>) -> axum::response::Response {
        match channel.as_str() {
            "zbeta" => axum::Json(serde_json::json!({"applicationSettings": {}})).into_response(),
            "znull" => axum::Json(serde_json::json!({"applicationSettings": null})).into_response(),
            "zmissing" => axum::Json(serde_json::json!({"other": 1})).into_response(),
            "zgarbage" => "not json".into_response(),
            "zslow" => {
                tokio::time::sleep(Duration::from_secs(5)).await;
                axum::Json(serde_json::json!({"applicationSettings": {}})).into_response()
            }
            _ => StatusCode::NOT_FOUND.into_response(),
        }
    }

    async fn registry_upstream() -> SocketAddr {
        let router = Router::new().route("/settings/{channel}", get(settings));
        spawn_upstream(router).await
    }

    fn http_registry(addr: SocketAddr, timeout: Duration) -> HttpChannelRegistry {
        let endpoint = |path: &str, field: &str| {
            RegistryEndpoint::new(&format!("http://{addr}/{path}/{{channel}}"), field).unwrap()
        };

        HttpChannelRegistry::new(
            endpoint("settings", "applicationSettings"),
            endpoint("versions", "clientVersionUpload"),
            timeout,
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_http_registry_field_check() {
        let addr = registry_upstream().await;
        let registry = http_registry(addr, Duration::from_secs(2));

        assert!(registry.exists("zbeta").await);
        assert!(!registry.exists("znull").await);
        assert!(!registry.exists("zmissing").await);
        assert!(!registry.exists("zgarbage").await);
        assert!(!registry.exists("zunknown").await);
        // The visibility route does not exist upstream.
        assert!(!registry.is_public("zbeta").await);
    }

    #[tokio::test]
    async fn test_http_registry_timeout_fails_closed() {
        let addr = registry_upstream().await;
        let registry = http_registry(addr, Duration::from_millis(100));

        assert!(!registry.exists("zslow").await);
    }

    #[tokio::test]
    async fn test_http_registry_unreachable() {
        let addr: SocketAddr = "127.0.0.1:1".parse().unwrap();
        let registry = http_registry(addr, Duration::from_secs(1));

        assert!(!registry.exists("zbeta").await);
    }
}
