//! Domain error model.

use thiserror::Error;

/// Result type used across the domain layer.
pub type DomainResult<T> = Result<T, DomainError>;

/// Domain-level error.
///
/// Returned by request validation, repositories and read-side queries.
/// Infrastructure failures that surface through a repository are folded into
/// [`DomainError::Internal`] so that callers only ever match on domain kinds.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// A value failed validation (e.g. malformed input).
    #[error("validation failed: {0}")]
    Validation(String),

    /// An identifier was invalid (e.g. empty).
    #[error("invalid identifier: {0}")]
    InvalidId(String),

    /// A requested resource was not found.
    #[error("{0} was not found")]
    NotFound(String),

    /// A uniqueness rule was violated (duplicate name, email, id).
    #[error("conflict: {0}")]
    Conflict(String),

    /// Authorization failure at the domain boundary.
    #[error("unauthorized")]
    Unauthorized,

    /// The backing store failed.
    #[error("internal error: {0}")]
    Internal(String),
}

impl DomainError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn invalid_id(msg: impl Into<String>) -> Self {
        Self::InvalidId(msg.into())
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    /// HTTP status code an outer API layer should answer with.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::Validation(_) | Self::InvalidId(_) => 400,
            Self::Unauthorized => 403,
            Self::NotFound(_) => 404,
            Self::Conflict(_) => 409,
            Self::Internal(_) => 500,
        }
    }

    /// Stable machine-readable code for error bodies.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation_error",
            Self::InvalidId(_) => "invalid_id",
            Self::NotFound(_) => "not_found",
            Self::Conflict(_) => "conflict",
            Self::Unauthorized => "unauthorized",
            Self::Internal(_) => "internal_error",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_follow_error_kind() {
        assert_eq!(DomainError::validation("x").status_code(), 400);
        assert_eq!(DomainError::not_found("product p1").status_code(), 404);
        assert_eq!(DomainError::conflict("dup").status_code(), 409);
        assert_eq!(DomainError::internal("db down").status_code(), 500);
        assert_eq!(DomainError::Unauthorized.status_code(), 403);
    }

    #[test]
    fn not_found_message_names_the_subject() {
        let err = DomainError::not_found("product with id=p1");
        assert!(err.is_not_found());
        assert_eq!(err.to_string(), "product with id=p1 was not found");
    }
}
