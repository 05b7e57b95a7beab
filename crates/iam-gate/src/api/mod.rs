//! Host HTTP surface: health endpoint and gated upstream routes.

mod error;
pub mod proxy;
mod routes;

pub use error::RouteError;
pub use proxy::{UpstreamProxy, proxy_upstream};
pub use routes::{HEALTH_PATH, create_router};
