use thiserror::Error;

/// Rejected user input. Surfaced to the caller as-is, never retried.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("{field} is required")]
    Required { field: &'static str },

    #[error("{field} must be at most {max} characters")]
    TooLong { field: &'static str, max: usize },

    #[error("{field} must be at least {min} characters")]
    TooShort { field: &'static str, min: usize },

    #[error("Invalid email address")]
    InvalidEmail,

    #[error("Unknown item category: {0}")]
    UnknownCategory(String),

    #[error("Unknown backend: {0}")]
    UnknownBackend(String),

    #[error("{0}")]
    Rule(String),
}
