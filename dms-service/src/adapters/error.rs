//! Driver-level errors raised by vendor adapters.

use std::time::Duration;

use common::Interrupted;

#[derive(Debug, thiserror::Error)]
pub enum DriverError {
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),

    #[error(transparent)]
    Oracle(#[from] oracle::Error),

    #[error("blocking driver call failed: {0}")]
    Blocking(#[from] tokio::task::JoinError),

    #[error("health probe did not answer within {0:?}")]
    ProbeTimeout(Duration),

    #[error(transparent)]
    Interrupted(#[from] Interrupted),

    #[error("pool handle does not belong to the {0} adapter")]
    HandleMismatch(&'static str),

    #[error("cannot decode column {column} of type {type_name}")]
    Decode { column: String, type_name: String },
}

impl DriverError {
    pub fn decode(column: impl Into<String>, type_name: impl Into<String>) -> Self {
        Self::Decode {
            column: column.into(),
            type_name: type_name.into(),
        }
    }

    /// The interruption behind this error, if the context stopped the call.
    pub fn interruption(&self) -> Option<Interrupted> {
        match self {
            DriverError::Interrupted(reason) => Some(*reason),
            _ => None,
        }
    }
}

pub type DriverResult<T> = Result<T, DriverError>;
