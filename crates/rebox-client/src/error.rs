use rebox_shared::ValidationError;
use rebox_store::StoreError;
use thiserror::Error;

/// Errors surfaced by the ReBox services.
#[derive(Error, Debug)]
pub enum ServiceError {
    /// Rejected input.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// The record already exists (e.g. an email that is already registered).
    #[error("{0}")]
    Conflict(String),

    #[error("{what} not found: {id}")]
    NotFound { what: &'static str, id: String },

    /// The caller is authenticated but may not touch this record.
    #[error("{0}")]
    Forbidden(String),

    /// Credentials were rejected.
    #[error("{0}")]
    Unauthorized(String),

    #[error("No user is signed in")]
    NotAuthenticated,

    /// The active backend cannot do this (e.g. push on the local store).
    #[error("Not supported by the {backend} backend: {operation}")]
    Unsupported {
        backend: rebox_shared::Backend,
        operation: &'static str,
    },

    /// The external identity provider failed or returned garbage.
    #[error("Identity provider error: {0}")]
    Identity(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Coarse classification of a [`ServiceError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    Conflict,
    NotFound,
    Forbidden,
    Unauthorized,
    NotAuthenticated,
    Unsupported,
    Identity,
    Storage,
}

impl ServiceError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ServiceError::Validation(_) => ErrorKind::Validation,
            ServiceError::Conflict(_) => ErrorKind::Conflict,
            ServiceError::NotFound { .. } => ErrorKind::NotFound,
            ServiceError::Forbidden(_) => ErrorKind::Forbidden,
            ServiceError::Unauthorized(_) => ErrorKind::Unauthorized,
            ServiceError::NotAuthenticated => ErrorKind::NotAuthenticated,
            ServiceError::Unsupported { .. } => ErrorKind::Unsupported,
            ServiceError::Identity(_) => ErrorKind::Identity,
            ServiceError::Store(e) if e.is_conflict() => ErrorKind::Conflict,
            ServiceError::Store(e) if e.is_not_found() => ErrorKind::NotFound,
            ServiceError::Store(_) => ErrorKind::Storage,
        }
    }

    pub(crate) fn not_found(what: &'static str, id: impl Into<String>) -> Self {
        ServiceError::NotFound {
            what,
            id: id.into(),
        }
    }
}

impl From<reqwest::Error> for ServiceError {
    fn from(e: reqwest::Error) -> Self {
        ServiceError::Identity(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, ServiceError>;
