use thiserror::Error;

/// Errors crossing the catalog boundary, plus everything the resolver can
/// surface. A closed set: callers can distinguish "unknown upstream" from
/// "upstream unreachable" from datastore failures.
#[derive(Debug, Error)]
pub enum CatalogError {
    /// The external catalog does not know this identifier (HTTP 404).
    #[error("work not found in external catalog: {0}")]
    WorkNotFound(String),

    /// Network failure, timeout or upstream 5xx; retryable.
    #[error("external catalog unavailable: {0}")]
    Unavailable(String),

    #[error("rate limited by external catalog, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("parse error: {0}")]
    Parse(String),

    #[error(transparent)]
    Store(#[from] readshelf_core::StoreError),
}

impl CatalogError {
    /// True when falling back to a cached local record is the right move.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            CatalogError::Unavailable(_) | CatalogError::RateLimited { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, CatalogError>;
