use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

/// Name of the metric reporting installer actions.
pub const INSTALL_ACTION: &str = "installAction";

/// Name of the metric reporting the deployment channel a client runs on.
pub const CHANNEL: &str = "robloxChannel";

/// The definition of a single accepted metric.
#[derive(Clone, Debug, Eq, PartialEq, Deserialize, Serialize)]
pub struct MetricDefinition {
    /// The unique name of the metric, passed as `key` by clients.
    pub name: String,

    /// The closed set of accepted values.
    ///
    /// If `None`, any non-empty value is accepted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allowed_values: Option<BTreeSet<String>>,

    /// The bucket every accepted beacon is written to.
    pub bucket: String,

    /// An additional bucket for beacons whose value passed the public visibility check.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub public_bucket: Option<String>,

    /// Whether values must be corroborated as existing deployment channels.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub channel: bool,
}

impl MetricDefinition {
    /// Returns `true` if `value` is accepted for this metric.
    pub fn accepts(&self, value: &str) -> bool {
        match self.allowed_values {
            Some(ref allowed) => allowed.contains(value),
            None => !value.is_empty(),
        }
    }
}

/// Returns `true` if `value` can be written as a measurement or field key.
///
/// Control characters cannot be escaped in line protocol, and a trailing backslash would escape
/// the separator that follows the value.
pub fn is_storable(value: &str) -> bool {
    !value.ends_with('\\') && !value.chars().any(char::is_control)
}

/// Returns the metric definitions of the deployed schema.
pub fn default_definitions() -> Vec<MetricDefinition> {
    vec![
        MetricDefinition {
            name: INSTALL_ACTION.to_owned(),
            allowed_values: Some(
                ["install", "upgrade", "uninstall"]
                    .into_iter()
                    .map(String::from)
                    .collect(),
            ),
            bucket: "bloxstrap-90d".to_owned(),
            public_bucket: None,
            channel: false,
        },
        MetricDefinition {
            name: CHANNEL.to_owned(),
            allowed_values: None,
            bucket: "bloxstrap-14d".to_owned(),
            public_bucket: Some("bloxstrap-14d-public".to_owned()),
            channel: true,
        },
    ]
}

/// Errors raised while building or validating against a [`MetricSchema`].
#[derive(Clone, Debug, Eq, PartialEq, thiserror::Error)]
pub enum SchemaError {
    /// Two definitions share a name.
    #[error("duplicate metric definition {0:?}")]
    DuplicateMetric(String),
    /// A definition has an empty name or bucket.
    #[error("metric definition {0:?} requires a name and a bucket")]
    IncompleteDefinition(String),
    /// The key is not part of the schema.
    #[error("unknown metric key")]
    UnknownMetric,
    /// The value is not in the closed value set of the metric.
    #[error("value not allowed for metric {0:?}")]
    ValueNotAllowed(String),
    /// The value contains characters that cannot be written to the time series store.
    #[error("value of metric {0:?} cannot be stored")]
    UnstorableValue(String),
}

/// The static registry of accepted metrics.
///
/// Lookups are exact and case-sensitive. The schema is immutable after construction.
#[derive(Clone, Debug)]
pub struct MetricSchema {
    metrics: BTreeMap<String, MetricDefinition>,
}

impl MetricSchema {
    /// Builds a schema from a list of definitions.
    ///
    /// Fails if names are not unique or a definition lacks a name or bucket.
    pub fn new(definitions: impl IntoIterator<Item = MetricDefinition>) -> Result<Self, SchemaError> {
        let mut metrics = BTreeMap::new();

        for definition in definitions {
            if definition.name.is_empty() || definition.bucket.is_empty() {
                return Err(SchemaError::IncompleteDefinition(definition.name));
            }

            if metrics.contains_key(&definition.name) {
                return Err(SchemaError::DuplicateMetric(definition.name));
            }

            metrics.insert(definition.name.clone(), definition);
        }

        Ok(Self { metrics })
    }

    /// Returns the definition of the metric with the given name.
    pub fn get(&self, name: &str) -> Option<&MetricDefinition> {
        self.metrics.get(name)
    }

    /// Iterates all definitions ordered by name.
    pub fn iter(&self) -> impl Iterator<Item = &MetricDefinition> {
        self.metrics.values()
    }

    /// Validates a reported key and value, returning the matching definition.
    pub fn validate(&self, key: &str, value: &str) -> Result<&MetricDefinition, SchemaError> {
        let definition = self.get(key).ok_or(SchemaError::UnknownMetric)?;

        if !definition.accepts(value) {
            return Err(SchemaError::ValueNotAllowed(definition.name.clone()));
        }

        if !is_storable(value) {
            return Err(SchemaError::UnstorableValue(definition.name.clone()));
        }

        Ok(definition)
    }
}

impl Default for MetricSchema {
    fn default() -> Self {
        let metrics = default_definitions()
            .into_iter()
            .map(|definition| (definition.name.clone(), definition))
            .collect();

        Self { metrics }
    }
}
