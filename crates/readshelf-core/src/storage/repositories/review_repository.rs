use std::sync::MutexGuard;

use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, params};
use uuid::Uuid;

use crate::error::{Result, StoreError, is_constraint_violation};
use crate::models::Review;

use super::Repository;

const REVIEW_COLUMNS: &str = "id, user_id, book_id, content, rating, created_at, updated_at";

pub trait ReviewRepository: Repository<Entity = Review, Id = Uuid> {
    fn find_by_user_and_book(&self, user_id: &Uuid, book_id: &Uuid) -> Result<Option<Review>>;
    fn list_for_book(&self, book_id: &Uuid) -> Result<Vec<Review>>;
}

pub struct SqliteReviewRepository<'a> {
    conn: MutexGuard<'a, Connection>,
}

impl<'a> SqliteReviewRepository<'a> {
    pub fn new(conn: MutexGuard<'a, Connection>) -> Self {
        Self { conn }
    }

    pub(crate) fn row_to_review(row: &rusqlite::Row) -> rusqlite::Result<Review> {
        let created_at: String = row.get(5)?;
        let updated_at: String = row.get(6)?;
        Ok(Review {
            id: Uuid::parse_str(&row.get::<_, String>(0)?).unwrap_or_default(),
            user_id: Uuid::parse_str(&row.get::<_, String>(1)?).unwrap_or_default(),
            book_id: Uuid::parse_str(&row.get::<_, String>(2)?).unwrap_or_default(),
            content: row.get(3)?,
            rating: row.get::<_, i64>(4)?.clamp(0, 5) as u8,
            created_at: parse_timestamp(&created_at),
            updated_at: parse_timestamp(&updated_at),
        })
    }
}

fn parse_timestamp(raw: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
}

impl<'a> Repository for SqliteReviewRepository<'a> {
    type Entity = Review;
    type Id = Uuid;

    fn find_by_id(&self, id: &Self::Id) -> Result<Option<Self::Entity>> {
        let mut stmt = self
            .conn
            .prepare(&format!("SELECT {REVIEW_COLUMNS} FROM reviews WHERE id = ?1"))?;
        let review = stmt
            .query_row(params![id.to_string()], Self::row_to_review)
            .optional()?;
        Ok(review)
    }

    /// Insert or rewrite a review by id. A different review for the same
    /// (user, book) pair trips the unique constraint and surfaces as
    /// `DuplicateReview`.
    fn save(&self, review: &Self::Entity) -> Result<()> {
        self.conn
            .execute(
                "INSERT INTO reviews (id, user_id, book_id, content, rating, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                 ON CONFLICT(id) DO UPDATE SET
                    content    = excluded.content,
                    rating     = excluded.rating,
                    updated_at = excluded.updated_at",
                params![
                    review.id.to_string(),
                    review.user_id.to_string(),
                    review.book_id.to_string(),
                    review.content,
                    review.rating as i64,
                    review.created_at.to_rfc3339(),
                    review.updated_at.to_rfc3339(),
                ],
            )
            .map_err(|e| {
                if is_constraint_violation(&e) {
                    StoreError::DuplicateReview {
                        user_id: review.user_id.to_string(),
                        book_id: review.book_id.to_string(),
                    }
                } else {
                    StoreError::Database(e)
                }
            })?;
        Ok(())
    }

    fn delete(&self, id: &Self::Id) -> Result<bool> {
        let deleted = self
            .conn
            .execute("DELETE FROM reviews WHERE id = ?1", params![id.to_string()])?;
        Ok(deleted > 0)
    }
}

impl<'a> ReviewRepository for SqliteReviewRepository<'a> {
    fn find_by_user_and_book(&self, user_id: &Uuid, book_id: &Uuid) -> Result<Option<Review>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {REVIEW_COLUMNS} FROM reviews WHERE user_id = ?1 AND book_id = ?2"
        ))?;
        let review = stmt
            .query_row(
                params![user_id.to_string(), book_id.to_string()],
                Self::row_to_review,
            )
            .optional()?;
        Ok(review)
    }

    fn list_for_book(&self, book_id: &Uuid) -> Result<Vec<Review>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {REVIEW_COLUMNS} FROM reviews WHERE book_id = ?1 ORDER BY created_at DESC"
        ))?;
        let rows = stmt
            .query_map(params![book_id.to_string()], Self::row_to_review)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }
}
