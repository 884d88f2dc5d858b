/// The version of the gateway.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// The value of the `Server` response header.
pub const SERVER: &str = concat!("beacon/", env!("CARGO_PKG_VERSION"));
