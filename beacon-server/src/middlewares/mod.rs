//! Middlewares for the HTTP server.
//!
//! The ingestion routes run [`admission`] before [`identity`], so rate limited requests are
//! rejected before their identity is inspected. See [`server`](crate::services::server) for
//! the middlewares wrapping all routes.

mod admission;
mod handle_panic;
mod identity;
mod trace;

pub use self::admission::*;
pub use self::handle_panic::*;
pub use self::identity::*;
pub use self::trace::*;
