//! The closed schema of metrics accepted by the beacon gateway.
//!
//! This crate holds the versionable configuration data of the ingestion pipeline:
//!
//!  - [`MetricSchema`] is the registry of accepted metric names and their value sets.
//!  - [`BucketRouter`] selects the storage buckets an accepted beacon is written to.
//!  - [`DataLayout`] describes how a beacon maps onto a time series point.
//!
//! Deployment generations differ only in this data, so they are expressed as configuration diffs.

#![warn(missing_docs)]

mod environment;
mod layout;
mod router;
mod schema;

pub use self::environment::*;
pub use self::layout::*;
pub use self::router::*;
pub use self::schema::*;
