//! Utility functions and helpers.

pub mod query_validator;

pub use query_validator::QueryValidator;
