//! Writes accepted beacons to the InfluxDB v2 write API.
//!
//! Each beacon becomes a single [`Point`] rendered in line protocol. Points are written
//! individually per destination bucket. There is no batching and no retry, a failed write is
//! reported to the caller.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use beacon_schema::TimestampPrecision;
use influxdb_line_protocol::LineProtocolBuilder;
use reqwest::header;
use url::Url;

/// A single time series point with integer fields.
///
/// Tags and fields are rendered in sorted order. Tags with empty values are not written.
#[derive(Clone, Debug, PartialEq)]
pub struct Point {
    measurement: String,
    tags: BTreeMap<String, String>,
    fields: BTreeMap<String, i64>,
    timestamp: Option<i64>,
}

impl Point {
    /// Creates a point for the given measurement without tags or fields.
    pub fn new(measurement: impl Into<String>) -> Self {
        Self {
            measurement: measurement.into(),
            tags: BTreeMap::new(),
            fields: BTreeMap::new(),
            timestamp: None,
        }
    }

    /// Adds a tag.
    pub fn tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.insert(key.into(), value.into());
        self
    }

    /// Adds an integer field.
    pub fn field(mut self, key: impl Into<String>, value: i64) -> Self {
        self.fields.insert(key.into(), value);
        self
    }

    /// Sets the timestamp in the precision of the write.
    pub fn timestamp(mut self, timestamp: i64) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    /// Returns the measurement name.
    pub fn measurement(&self) -> &str {
        &self.measurement
    }

    /// Returns the value of a tag.
    pub fn get_tag(&self, key: &str) -> Option<&str> {
        self.tags.get(key).map(String::as_str)
    }

    /// Returns the value of a field.
    pub fn get_field(&self, key: &str) -> Option<i64> {
        self.fields.get(key).copied()
    }

    /// Returns the timestamp, if set.
    pub fn get_timestamp(&self) -> Option<i64> {
        self.timestamp
    }

    /// Renders the point as a single line of line protocol, including the trailing newline.
    ///
    /// Fails if the point has no fields.
    pub fn to_line_protocol(&self) -> Result<Vec<u8>, WriteError> {
        let mut fields = self.fields.iter();
        let Some((first_key, first_value)) = fields.next() else {
            return Err(WriteError::NoFields(self.measurement.clone()));
        };

        let mut builder = LineProtocolBuilder::new().measurement(&self.measurement);
        for (key, value) in self.tags.iter().filter(|(_, v)| !v.is_empty()) {
            builder = builder.tag(key, value);
        }

        let mut builder = builder.field(first_key, *first_value);
        for (key, value) in fields {
            builder = builder.field(key, *value);
        }

        let lines = match self.timestamp {
            Some(timestamp) => builder.timestamp(timestamp).close_line(),
            None => builder.close_line(),
        };

        Ok(lines.build())
    }
}

/// Errors writing to the time series store.
#[derive(Debug, thiserror::Error)]
pub enum WriteError {
    /// The point has no fields and cannot be written.
    #[error("point {0:?} has no fields")]
    NoFields(String),
    /// The request could not be sent or the response could not be read.
    #[error("failed to send write request")]
    Request(#[from] reqwest::Error),
    /// The store responded with an error status.
    #[error("write request returned {status}: {text}")]
    Status {
        /// The response status.
        status: reqwest::StatusCode,
        /// The response body.
        text: String,
    },
}

/// A destination for time series points.
#[async_trait]
pub trait TimeSeriesSink: Send + Sync {
    /// Writes a single point into `bucket`.
    async fn write(&self, bucket: &str, point: &Point) -> Result<(), WriteError>;
}

/// Writes points to an InfluxDB v2 instance.
#[derive(Debug, Clone)]
pub struct InfluxDbSink {
    client: reqwest::Client,
    write_url: String,
    token: Option<String>,
    org: String,
    precision: TimestampPrecision,
}

impl InfluxDbSink {
    /// Creates a sink writing to the instance at `url`.
    pub fn new(
        url: &Url,
        token: Option<&str>,
        org: &str,
        precision: TimestampPrecision,
        timeout: Duration,
    ) -> Result<Self, WriteError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            write_url: format!("{}/api/v2/write", url.as_str().trim_end_matches('/')),
            token: token.map(str::to_owned),
            org: org.to_owned(),
            precision,
        })
    }
}

#[async_trait]
impl TimeSeriesSink for InfluxDbSink {
    async fn write(&self, bucket: &str, point: &Point) -> Result<(), WriteError> {
        let body = point.to_line_protocol()?;

        let mut request = self
            .client
            .post(&self.write_url)
            .query(&[
                ("org", self.org.as_str()),
                ("bucket", bucket),
                ("precision", self.precision.as_str()),
            ])
            .header(header::CONTENT_TYPE, "text/plain; charset=utf-8")
            .body(body);

        if let Some(ref token) = self.token {
            request = request.header(header::AUTHORIZATION, format!("Token {token}"));
        }

        let response = request.send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await?;
            return Err(WriteError::Status { status, text });
        }

        Ok(())
    }
}
