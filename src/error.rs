#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![forbid(unsafe_code)]

use thiserror::Error;

/// Error code constants for type-safe error handling
pub mod code {
    pub const INVALID: &str = "INVALID";
    pub const NOTFOUND: &str = "NOTFOUND";
    pub const CONFLICT: &str = "CONFLICT";
    pub const UNAUTHORIZED: &str = "UNAUTHORIZED";
    pub const UNAVAILABLE: &str = "UNAVAILABLE";
    pub const DEPENDENCY: &str = "DEPENDENCY";
    pub const INTERNAL: &str = "INTERNAL";
}

#[derive(Error, Debug)]
pub enum GastownError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("External collaborator unavailable: {0}")]
    ExternalUnavailable(String),

    #[error("Rig actor unavailable: {0}")]
    ActorUnavailable(String),

    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("SQLx error: {0}")]
    SqlxError(#[from] sqlx::Error),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl GastownError {
    /// Returns the protocol error code for this error
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::Validation(_) | Self::ConfigError(_) | Self::SerializationError(_) => {
                code::INVALID
            }
            Self::NotFound(_) => code::NOTFOUND,
            Self::Conflict(_) => code::CONFLICT,
            Self::Unauthorized(_) => code::UNAUTHORIZED,
            Self::ExternalUnavailable(_) | Self::ActorUnavailable(_) => code::UNAVAILABLE,
            Self::IoError(_) => code::DEPENDENCY,
            Self::DatabaseError(_) | Self::SqlxError(_) | Self::Internal(_) => code::INTERNAL,
        }
    }

    /// HTTP status used when this error crosses the API boundary.
    #[must_use]
    pub const fn http_status(&self) -> u16 {
        match self {
            Self::Validation(_) | Self::SerializationError(_) => 400,
            Self::Unauthorized(_) => 401,
            Self::NotFound(_) => 404,
            Self::Conflict(_) => 409,
            Self::ExternalUnavailable(_) | Self::ActorUnavailable(_) => 503,
            Self::ConfigError(_)
            | Self::DatabaseError(_)
            | Self::SqlxError(_)
            | Self::IoError(_)
            | Self::Internal(_) => 500,
        }
    }

    /// Returns the exit code for this error
    #[must_use]
    pub const fn exit_code(&self) -> i32 {
        match self {
            Self::ConfigError(_) => 2,
            Self::DatabaseError(_) | Self::SqlxError(_) => 3,
            Self::Validation(_) => 4,
            Self::NotFound(_) => 5,
            Self::Conflict(_) | Self::Unauthorized(_) => 6,
            Self::IoError(_) => 7,
            Self::SerializationError(_) => 8,
            Self::ExternalUnavailable(_) | Self::ActorUnavailable(_) => 9,
            Self::Internal(_) => 10,
        }
    }

    /// Whether a retry on the next timer fire can clear this error.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::ExternalUnavailable(_) | Self::ActorUnavailable(_) | Self::IoError(_)
        )
    }
}

/// Protocol error codes with a description and a suggested fix.
pub const ERROR_CODES: &[(&str, &str, &str)] = &[
    (
        code::INVALID,
        "Invalid request payload",
        "Validate JSON syntax and ensure all required fields are present",
    ),
    (
        code::NOTFOUND,
        "Resource was not found",
        "List resources in the rig and verify the identifier",
    ),
    (
        code::CONFLICT,
        "Conflicting state transition",
        "Fetch the bead or agent to inspect its current status",
    ),
    (
        code::UNAUTHORIZED,
        "Operation not authorized",
        "Send a valid bearer token",
    ),
    (
        code::UNAVAILABLE,
        "Collaborator or rig actor is unavailable",
        "Retry; timer fires retry external work automatically",
    ),
    (
        code::DEPENDENCY,
        "Missing system dependency",
        "Install the configured sandbox or git command and retry",
    ),
    (
        code::INTERNAL,
        "Unexpected internal failure",
        "Inspect logs and retry",
    ),
];

/// Get error code details (description and fix) for a given error code
#[must_use]
pub fn get_error_info(error_code: &str) -> Option<(&'static str, &'static str)> {
    ERROR_CODES
        .iter()
        .find(|(code, _, _)| *code == error_code)
        .map(|(_, desc, fix)| (*desc, *fix))
}

pub type Result<T> = std::result::Result<T, GastownError>;

#[cfg(test)]
mod tests {
    use super::{code, get_error_info, GastownError};

    #[test]
    fn taxonomy_maps_to_http_statuses() {
        assert_eq!(GastownError::Validation("x".into()).http_status(), 400);
        assert_eq!(GastownError::NotFound("x".into()).http_status(), 404);
        assert_eq!(GastownError::Conflict("x".into()).http_status(), 409);
        assert_eq!(
            GastownError::ExternalUnavailable("x".into()).http_status(),
            503
        );
        assert_eq!(GastownError::Internal("x".into()).http_status(), 500);
    }

    #[test]
    fn every_code_has_documentation() {
        let errors = [
            GastownError::Validation(String::new()),
            GastownError::NotFound(String::new()),
            GastownError::Conflict(String::new()),
            GastownError::Unauthorized(String::new()),
            GastownError::ExternalUnavailable(String::new()),
            GastownError::DatabaseError(String::new()),
        ];
        for error in errors {
            assert!(get_error_info(error.code()).is_some(), "{}", error.code());
        }
        assert!(get_error_info("NOPE").is_none());
    }

    #[test]
    fn only_external_failures_are_retryable() {
        assert!(GastownError::ExternalUnavailable("sandbox".into()).is_retryable());
        assert!(!GastownError::Conflict("double hook".into()).is_retryable());
        assert_eq!(GastownError::Conflict(String::new()).code(), code::CONFLICT);
    }
}
