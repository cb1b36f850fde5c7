use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Canonical record for one logical work, regardless of how many external
/// catalog identifiers map to it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Book {
    pub id: Uuid,

    /// Primary external catalog identifier.
    pub external_id: String,

    /// Further catalog identifiers observed for the same work. Grows over
    /// time, never shrinks; must not overlap with any other book's set.
    #[serde(default)]
    pub alternative_ids: Vec<String>,

    pub title: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subtitle: Option<String>,

    #[serde(default)]
    pub authors: Vec<String>,

    #[serde(default)]
    pub genres: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cover_image: Option<String>,

    /// Numeric catalog cover reference paired with `cover_image`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cover_id: Option<i64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub release_date: Option<String>,

    /// Derived mean of all review ratings, one fractional digit.
    #[serde(default)]
    pub average_rating: f64,

    #[serde(default)]
    pub rating_count: u32,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Book {
    pub fn new(external_id: impl Into<String>, title: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::now_v7(),
            external_id: external_id.into(),
            alternative_ids: Vec::new(),
            title: title.into(),
            subtitle: None,
            authors: Vec::new(),
            genres: Vec::new(),
            description: None,
            cover_image: None,
            cover_id: None,
            release_date: None,
            average_rating: 0.0,
            rating_count: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// Whether `external_id` is the primary identifier or an alternative.
    pub fn is_linked(&self, external_id: &str) -> bool {
        self.external_id == external_id
            || self.alternative_ids.iter().any(|id| id == external_id)
    }

    /// Every identifier this book claims, primary first.
    pub fn all_identifiers(&self) -> impl Iterator<Item = (&str, bool)> {
        std::iter::once((self.external_id.as_str(), true))
            .chain(self.alternative_ids.iter().map(|id| (id.as_str(), false)))
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_book_starts_with_zero_aggregate() {
        let book = Book::new("OL1W", "Dune");
        assert_eq!(book.average_rating, 0.0);
        assert_eq!(book.rating_count, 0);
        assert!(book.alternative_ids.is_empty());
    }

    #[test]
    fn is_linked_covers_primary_and_alternatives() {
        let mut book = Book::new("OL1W", "Dune");
        book.alternative_ids.push("OL2W".to_string());

        assert!(book.is_linked("OL1W"));
        assert!(book.is_linked("OL2W"));
        assert!(!book.is_linked("OL3W"));
    }

    #[test]
    fn all_identifiers_lists_primary_first() {
        let mut book = Book::new("OL1W", "Dune");
        book.alternative_ids.push("OL2W".to_string());

        let ids: Vec<_> = book.all_identifiers().collect();
        assert_eq!(ids, vec![("OL1W", true), ("OL2W", false)]);
    }
}
