use thiserror::Error;

/// Errors produced by the store layer.
#[derive(Error, Debug)]
pub enum StoreError {
    /// SQLite error.
    #[error("Database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Generic I/O error (e.g. reading or writing the local store file).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A stored value did not decode into the expected shape.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// An update or delete addressed a record that does not exist.
    #[error("Record not found: {collection}/{id}")]
    NotFound { collection: &'static str, id: String },

    /// An insert violated a uniqueness rule. The desired state already
    /// exists; callers usually treat this as a no-op.
    #[error("Duplicate record in {collection}")]
    Conflict { collection: &'static str },

    /// A filter or patch named a field the collection does not have.
    #[error("Unknown field `{field}` in {collection}")]
    UnknownField {
        collection: &'static str,
        field: String,
    },

    /// A filter or patch that the backend cannot express.
    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    /// Migration failure.
    #[error("Migration error: {0}")]
    Migration(String),

    /// Chrono parsing error.
    #[error("Timestamp parse error: {0}")]
    Timestamp(#[from] chrono::ParseError),
}

impl StoreError {
    pub fn is_conflict(&self) -> bool {
        matches!(self, StoreError::Conflict { .. })
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound { .. })
    }
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, StoreError>;
