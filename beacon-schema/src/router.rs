use smallvec::SmallVec;

use crate::{Environment, MetricDefinition};

/// The bucket all writes are redirected to outside of production.
pub const DEFAULT_TEST_BUCKET: &str = "test-bucket";

/// Destination buckets of a single beacon.
pub type Destinations<'a> = SmallVec<[&'a str; 2]>;

/// Selects the storage buckets of accepted beacons.
#[derive(Clone, Debug)]
pub struct BucketRouter {
    environment: Environment,
    test_bucket: String,
}

impl BucketRouter {
    /// Creates a router for the given environment.
    pub fn new(environment: Environment, test_bucket: impl Into<String>) -> Self {
        Self {
            environment,
            test_bucket: test_bucket.into(),
        }
    }

    /// Returns the buckets a beacon of metric `definition` is written to.
    ///
    /// In production this is the primary bucket, followed by the public bucket if `public` is set
    /// and the metric has one. In any other environment it is always the test bucket alone.
    pub fn route<'a>(&'a self, definition: &'a MetricDefinition, public: bool) -> Destinations<'a> {
        let mut destinations = Destinations::new();

        if !self.environment.is_production() {
            destinations.push(self.test_bucket.as_str());
            return destinations;
        }

        destinations.push(definition.bucket.as_str());
        if let Some(public_bucket) = definition.public_bucket.as_ref().filter(|_| public) {
            destinations.push(public_bucket.as_str());
        }

        destinations
    }
}

impl Default for BucketRouter {
    fn default() -> Self {
        Self::new(Environment::default(), DEFAULT_TEST_BUCKET)
    }
}
