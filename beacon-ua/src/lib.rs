//! Client identity parser for the desktop client's user agent.
//!
//! The desktop client identifies itself with a user agent of the form
//! `<product>/<version> (<qualifier>)`, where the qualifier denotes the build provenance:
//!
//! - `Production` for official releases,
//! - `Build <token>` for internal builds,
//! - `Artifact <commit>, <branch>` for CI artifact builds.
//!
//! The identity is self-reported and not authenticated. It is only trusted to the extent that it
//! proves the request originated from a build matching the expected signature.
//!
//! # Example
//!
//! ```
//! use beacon_ua::{DEFAULT_PRODUCT, IdentityParser, Qualifier};
//!
//! let parser = IdentityParser::new(DEFAULT_PRODUCT);
//! let identity = parser.parse("Bloxstrap/2.8.0 (Production)").unwrap();
//! assert_eq!(identity.qualifier(), Qualifier::Production);
//! ```

#![warn(missing_docs)]

use regex::Regex;

/// The product name the desktop client reports in its user agent.
pub const DEFAULT_PRODUCT: &str = "Bloxstrap";

/// Reasons for rejecting a client identity.
#[derive(Clone, Copy, Debug, Eq, PartialEq, thiserror::Error)]
pub enum IdentityError {
    /// The request carried no identity header.
    #[error("missing client identity")]
    Missing,
    /// The header does not follow the identity grammar.
    #[error("malformed client identity")]
    Malformed,
    /// The identity is well-formed, but belongs to a non-production build.
    #[error("client identity is not a production build")]
    NotProduction,
}

/// The build provenance of a client, parsed from the parenthesized part of the identity.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Qualifier<'a> {
    /// An official release.
    Production,
    /// An internal build, identified by an opaque base64-like token.
    Build {
        /// The build token.
        token: &'a str,
    },
    /// A CI artifact build.
    Artifact {
        /// The full 40 character commit hash.
        commit: &'a str,
        /// The branch or path the artifact was built from.
        path: &'a str,
    },
}

/// A parsed client identity borrowing from the original header.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct ClientIdentity<'a> {
    raw: &'a str,
    qualifier: Qualifier<'a>,
}

impl<'a> ClientIdentity<'a> {
    /// Returns the full, unmodified identity header.
    ///
    /// This is the value recorded as client version tag on accepted beacons.
    pub fn as_str(&self) -> &'a str {
        self.raw
    }

    /// Returns the build provenance.
    pub fn qualifier(&self) -> Qualifier<'a> {
        self.qualifier
    }

    /// Returns `true` if this identity belongs to an official release build.
    pub fn is_production(&self) -> bool {
        self.qualifier == Qualifier::Production
    }
}

/// Parser for the identity grammar of a specific product.
#[derive(Clone, Debug)]
pub struct IdentityParser {
    regex: Regex,
}

impl IdentityParser {
    /// Creates a parser that accepts identities reported by `product`.
    pub fn new(product: &str) -> Self {
        let pattern = format!(
            r"^{}/[0-9]+(?:\.[0-9]+)* \((?:Production|Build ([a-zA-Z0-9=+/]+)|Artifact ([0-9a-f]{{40}}), ([a-zA-Z0-9/\-]+))\)$",
            regex::escape(product)
        );

        Self {
            regex: Regex::new(&pattern).expect("identity grammar is a valid regex"),
        }
    }

    /// Parses an identity header of any build provenance.
    pub fn parse<'a>(&self, header: &'a str) -> Result<ClientIdentity<'a>, IdentityError> {
        let captures = self.regex.captures(header).ok_or(IdentityError::Malformed)?;

        let qualifier = if let Some(token) = captures.get(1) {
            Qualifier::Build {
                token: token.as_str(),
            }
        } else if let (Some(commit), Some(path)) = (captures.get(2), captures.get(3)) {
            Qualifier::Artifact {
                commit: commit.as_str(),
                path: path.as_str(),
            }
        } else {
            Qualifier::Production
        };

        Ok(ClientIdentity {
            raw: header,
            qualifier,
        })
    }

    /// Parses an identity header and only accepts production builds.
    ///
    /// This is the check applied before any ingestion. A missing header is reported as
    /// [`IdentityError::Missing`].
    pub fn parse_production<'a>(
        &self,
        header: Option<&'a str>,
    ) -> Result<ClientIdentity<'a>, IdentityError> {
        let identity = self.parse(header.ok_or(IdentityError::Missing)?)?;

        match identity.is_production() {
            true => Ok(identity),
            false => Err(IdentityError::NotProduction),
        }
    }
}
