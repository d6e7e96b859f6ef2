//! SQL statement validator.

use crate::errors::AppError;

/// Longest statement accepted, in characters.
pub const MAX_QUERY_LENGTH: usize = 10_000;

/// Checks query text before it reaches a database.
pub struct QueryValidator;

impl QueryValidator {
    /// Rejects blank statements and statements over [`MAX_QUERY_LENGTH`].
    ///
    /// # Errors
    /// Returns `AppError::Validation` describing the first problem found.
    pub fn validate(query: &str) -> Result<(), AppError> {
        if query.trim().is_empty() {
            return Err(AppError::Validation("query is required".into()));
        }
        let length = query.chars().count();
        if length > MAX_QUERY_LENGTH {
            return Err(AppError::Validation(format!(
                "query too long ({length} characters, max {MAX_QUERY_LENGTH})"
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_select_is_allowed() {
        assert!(QueryValidator::validate("SELECT 1").is_ok());
    }

    #[test]
    fn test_blank_query_is_rejected() {
        assert!(QueryValidator::validate("").is_err());
        assert!(QueryValidator::validate("   \n").is_err());
    }

    #[test]
    fn test_length_limit() {
        let ok = "x".repeat(MAX_QUERY_LENGTH);
        assert!(QueryValidator::validate(&ok).is_ok());
        let too_long = "x".repeat(MAX_QUERY_LENGTH + 1);
        assert!(matches!(
            QueryValidator::validate(&too_long),
            Err(AppError::Validation(_))
        ));
    }
}
