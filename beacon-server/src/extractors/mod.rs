//! Request extractors for the ingestion endpoints.

mod client_addr;
mod client_version;

pub use self::client_addr::*;
pub use self::client_version::*;
