use std::collections::BTreeSet;
use std::net::SocketAddr;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use axum::Router;

use crate::services::channels::ChannelRegistry;
use crate::services::crash_store::{CrashReport, CrashReportSink, StoreError};
use crate::services::timeseries::{Point, TimeSeriesSink, WriteError};

/// Serves `router` on an ephemeral local port and returns its address.
pub async fn spawn_upstream(router: Router) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });

    addr
}

/// A channel registry with a fixed set of known channels that counts its lookups.
#[derive(Debug, Default)]
pub struct MockChannelRegistry {
    existing: BTreeSet<String>,
    public: BTreeSet<String>,
    calls: AtomicUsize,
}

impl MockChannelRegistry {
    pub fn new(
        existing: impl IntoIterator<Item = &'static str>,
        public: impl IntoIterator<Item = &'static str>,
    ) -> Self {
        Self {
            existing: existing.into_iter().map(str::to_owned).collect(),
            public: public.into_iter().map(str::to_owned).collect(),
            calls: AtomicUsize::new(0),
        }
    }

    /// Returns the total number of lookups.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl ChannelRegistry for MockChannelRegistry {
    async fn exists(&self, channel: &str) -> bool {
        self.calls.fetch_add(1, Ordering::Relaxed);
        self.existing.contains(channel)
    }

    async fn is_public(&self, channel: &str) -> bool {
        self.calls.fetch_add(1, Ordering::Relaxed);
        self.public.contains(channel)
    }
}

/// A time series sink recording all writes.
#[derive(Debug, Default)]
pub struct MockTimeSeriesSink {
    writes: Mutex<Vec<(String, Point)>>,
    fail_bucket: Option<String>,
}

impl MockTimeSeriesSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a sink that rejects all writes into `bucket`.
    pub fn failing_on(bucket: &str) -> Self {
        Self {
            writes: Mutex::default(),
            fail_bucket: Some(bucket.to_owned()),
        }
    }

    /// Returns all successful writes as bucket and point.
    pub fn writes(&self) -> Vec<(String, Point)> {
        self.writes.lock().unwrap().clone()
    }

    /// Returns the buckets of all successful writes in order.
    pub fn buckets(&self) -> Vec<String> {
        self.writes().into_iter().map(|(bucket, _)| bucket).collect()
    }
}

#[async_trait]
impl TimeSeriesSink for MockTimeSeriesSink {
    async fn write(&self, bucket: &str, point: &Point) -> Result<(), WriteError> {
        if self.fail_bucket.as_deref() == Some(bucket) {
            return Err(WriteError::NoFields(point.measurement().to_owned()));
        }

        self.writes
            .lock()
            .unwrap()
            .push((bucket.to_owned(), point.clone()));

        Ok(())
    }
}

/// A crash report sink recording all inserts.
#[derive(Debug, Default)]
pub struct MockCrashStore {
    reports: Mutex<Vec<CrashReport>>,
    fail: AtomicBool,
}

impl MockCrashStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes all subsequent inserts fail.
    pub fn fail(&self) {
        self.fail.store(true, Ordering::Relaxed);
    }

    /// Returns all stored reports.
    pub fn reports(&self) -> Vec<CrashReport> {
        self.reports.lock().unwrap().clone()
    }
}

#[async_trait]
impl CrashReportSink for MockCrashStore {
    async fn insert(&self, report: &CrashReport) -> Result<(), StoreError> {
        if self.fail.load(Ordering::Relaxed) {
            return Err(StoreError::from(sqlx::Error::PoolTimedOut));
        }

        self.reports.lock().unwrap().push(report.clone());
        Ok(())
    }
}
