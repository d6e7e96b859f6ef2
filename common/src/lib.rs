//! Shared building blocks for the DMS connection registry service.
//!
//! Holds the database entity, query results, the error taxonomy, the
//! operation context used to bound network calls, configuration loading and
//! the HTTP envelope shared by every handler.

pub mod config;
pub mod context;
pub mod errors;
pub mod middleware;
pub mod models;
pub mod response;
pub mod utils;

pub use context::{Interrupted, OpContext};
pub use errors::{AppError, AppResult};
