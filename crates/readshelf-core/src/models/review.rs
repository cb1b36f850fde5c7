use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One user's opinion of one book. At most one review exists per
/// (user, book) pair; the datastore enforces it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Review {
    pub id: Uuid,
    pub user_id: Uuid,
    pub book_id: Uuid,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,

    /// Star rating, 1–5 inclusive.
    pub rating: u8,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Review {
    pub fn new(user_id: Uuid, book_id: Uuid, content: Option<String>, rating: u8) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::now_v7(),
            user_id,
            book_id,
            content,
            rating,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

/// Role of the acting user, as supplied by the auth layer. Librarians and
/// admins may remove reviews they do not own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    Member,
    Librarian,
    Admin,
}

impl UserRole {
    pub fn can_moderate(&self) -> bool {
        matches!(self, UserRole::Librarian | UserRole::Admin)
    }
}
