use chrono::{DateTime, Duration, Utc};

use readshelf_core::Book;

/// Decides when a resolution needs a catalog round-trip.
#[derive(Debug, Clone, Copy)]
pub struct StalenessPolicy {
    window: Duration,
}

impl StalenessPolicy {
    pub fn new(window: Duration) -> Self {
        Self { window }
    }

    pub fn with_days(days: i64) -> Self {
        Self::new(Duration::days(days))
    }

    /// A fetch is required when there is no local record at all, when the
    /// record has aged out of the window, or when the queried identifier is
    /// not yet linked to it (a new alias should trigger enrichment even if
    /// the data is fresh).
    pub fn needs_refresh(
        &self,
        book: Option<&Book>,
        external_id: &str,
        now: DateTime<Utc>,
    ) -> bool {
        let Some(book) = book else {
            return true;
        };

        let is_stale = now.signed_duration_since(book.updated_at) > self.window;
        is_stale || !book.is_linked(external_id)
    }
}

impl Default for StalenessPolicy {
    fn default() -> Self {
        Self::with_days(7)
    }
}
