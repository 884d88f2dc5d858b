//! Backends of the ingestion pipeline and the HTTP server.
//!
//! All outbound integrations are hidden behind traits, so the pipeline can be tested against
//! in-memory implementations:
//!
//!  - [`channels::ChannelRegistry`] corroborates reported deployment channels.
//!  - [`timeseries::TimeSeriesSink`] receives accepted metric beacons.
//!  - [`crash_store::CrashReportSink`] durably stores crash traces.

pub mod channels;
pub mod crash_store;
pub mod server;
pub mod timeseries;
pub mod validation;
