//! HTTP surface
//!
//! Health and greeting routes, the rate-limited answer and image routes,
//! and the middleware (CORS, panic recovery, JSON 404) wrapped around them.

pub mod error;
pub mod server;

pub use error::ApiError;
pub use server::{router, AppState, Server};
