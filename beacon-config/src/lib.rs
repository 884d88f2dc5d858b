//! Configuration for the beacon CLI and server.
//!
//! The configuration lives in a folder containing a `config.yml` file. All sections are optional
//! and fall back to defaults, so an empty file is a valid configuration for local development.
//! Individual values can be overridden from the command line or environment variables through
//! [`OverridableConfig`].

#![warn(missing_docs)]

mod config;

pub use self::config::*;
