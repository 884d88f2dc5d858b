use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// The deployment environment of the gateway.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    /// A production deployment writing to the configured buckets.
    #[default]
    Production,
    /// Any other deployment. All writes are redirected to the test bucket.
    Development,
}

impl Environment {
    /// Returns `true` for production deployments.
    pub fn is_production(self) -> bool {
        self == Self::Production
    }

    /// Returns the name of this environment as used in configuration.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Production => "production",
            Self::Development => "development",
        }
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing an unknown [`Environment`].
#[derive(Clone, Copy, Debug, Eq, PartialEq, thiserror::Error)]
#[error("unknown environment, expected \"production\" or \"development\"")]
pub struct ParseEnvironmentError;

impl FromStr for Environment {
    type Err = ParseEnvironmentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "production" | "prod" => Ok(Self::Production),
            "development" | "dev" => Ok(Self::Development),
            _ => Err(ParseEnvironmentError),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse() {
        assert_eq!("prod".parse(), Ok(Environment::Production));
        assert_eq!("development".parse(), Ok(Environment::Development));
        assert_eq!("staging".parse::<Environment>(), Err(ParseEnvironmentError));
    }
}
