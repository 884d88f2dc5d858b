//! Durable storage of crash traces.

use std::fmt;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions};

/// A crash trace submitted by a client.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CrashReport {
    /// Time the report was received.
    pub timestamp: DateTime<Utc>,
    /// The raw trace text.
    pub trace: String,
}

/// Error inserting a [`CrashReport`].
#[derive(Debug, thiserror::Error)]
#[error("failed to insert crash report")]
pub struct StoreError(#[from] sqlx::Error);

/// A destination for crash reports.
#[async_trait]
pub trait CrashReportSink: Send + Sync {
    /// Durably stores a single report.
    async fn insert(&self, report: &CrashReport) -> Result<(), StoreError>;
}

/// Stores crash reports in the `exception_reports` table of a PostgreSQL database.
///
/// The table is expected to exist:
///
/// ```sql
/// CREATE TABLE exception_reports (
///     id serial PRIMARY KEY,
///     timestamp timestamptz NOT NULL,
///     trace text NOT NULL
/// );
/// ```
#[derive(Clone)]
pub struct PostgresCrashStore {
    pool: PgPool,
}

impl PostgresCrashStore {
    /// Creates a store with a lazily connecting pool.
    ///
    /// Connections are established on first use, so an unreachable database does not prevent
    /// startup. Metric ingestion remains available in that case.
    pub fn connect_lazy(url: &str, max_connections: u32) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect_lazy(url)?;

        Ok(Self { pool })
    }
}

impl fmt::Debug for PostgresCrashStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PostgresCrashStore")
            .field("size", &self.pool.size())
            .finish()
    }
}

#[async_trait]
impl CrashReportSink for PostgresCrashStore {
    async fn insert(&self, report: &CrashReport) -> Result<(), StoreError> {
        sqlx::query("INSERT INTO exception_reports (timestamp, trace) VALUES ($1, $2)")
            .bind(report.timestamp)
            .bind(&report.trace)
            .execute(&self.pool)
            .await?;

        Ok(())
    }
}
