use thiserror::Error;

/// All errors that can occur in readshelf-core.
///
/// Callers match on a closed set: absent resources, conflicts, authorization
/// failures and validation are distinct variants; everything else is an
/// opaque datastore failure.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Book not found: {0}")]
    BookNotFound(String),

    #[error("Review not found: {0}")]
    ReviewNotFound(String),

    #[error("External identifier already claimed by another book: {0}")]
    IdentifierConflict(String),

    #[error("User {user_id} has already reviewed book {book_id}")]
    DuplicateReview { user_id: String, book_id: String },

    #[error("Not authorized: {0}")]
    Forbidden(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),
}

impl StoreError {
    /// True for errors a caller may resolve by retrying or re-reading
    /// (unique-constraint races).
    pub fn is_conflict(&self) -> bool {
        matches!(
            self,
            StoreError::IdentifierConflict(_) | StoreError::DuplicateReview { .. }
        )
    }
}

/// True when a rusqlite error is a uniqueness/constraint violation; call
/// sites map this onto the conflict variant they know applies.
pub(crate) fn is_constraint_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _) if e.code == rusqlite::ErrorCode::ConstraintViolation
    )
}

pub type Result<T> = std::result::Result<T, StoreError>;
