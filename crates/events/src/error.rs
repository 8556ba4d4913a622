use thiserror::Error;

use storefront_core::DomainError;

use crate::publisher::PublishError;

/// Failure of a command-side operation (validate → check → publish).
#[derive(Debug, Error)]
pub enum CommandError {
    #[error(transparent)]
    Domain(#[from] DomainError),

    /// Validation passed but the event was not accepted by the broker; the
    /// operation did not take effect.
    #[error(transparent)]
    Publish(#[from] PublishError),
}

impl CommandError {
    /// HTTP-style status code for this error kind.
    pub fn status_code(&self) -> u16 {
        match self {
            CommandError::Domain(err) => err.status_code(),
            CommandError::Publish(_) => 502,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            CommandError::Domain(err) => err.code(),
            CommandError::Publish(_) => "publish_failed",
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, CommandError::Domain(err) if err.is_not_found())
    }
}

pub type CommandResult<T> = Result<T, CommandError>;
