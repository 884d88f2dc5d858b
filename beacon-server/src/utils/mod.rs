mod api;
mod body;

pub use self::api::*;
pub use self::body::*;
