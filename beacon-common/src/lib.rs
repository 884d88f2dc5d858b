//! Common functionality for the beacon gateway.

#![warn(missing_docs)]

mod time;

pub use crate::time::*;
