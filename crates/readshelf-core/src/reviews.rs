//! Review mutations and the rating aggregate they maintain.
//!
//! Every create/update/delete runs inside one datastore transaction that
//! writes the review row and the book's `(average_rating, rating_count)`
//! pair together, or neither. Ownership checks happen before the
//! transaction begins.

use rusqlite::{OptionalExtension, params};
use uuid::Uuid;

use crate::error::{Result, StoreError, is_constraint_violation};
use crate::models::{Review, UserRole};
use crate::storage::database::Store;
use crate::storage::repositories::SqliteReviewRepository;

/// Stateless maintainer of the per-book rating aggregate.
pub struct ReviewService;

/// The stored average carries exactly one fractional digit, so the running
/// total is rebuilt in integer tenths; this keeps delete/update arithmetic
/// exact and lets a removed rating revert the average to its prior value.
fn total_tenths(average: f64, count: i64) -> i64 {
    (average * 10.0).round() as i64 * count
}

fn round_to_tenth(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

fn validate_rating(rating: u8) -> Result<()> {
    if !(1..=5).contains(&rating) {
        return Err(StoreError::Validation(format!(
            "rating must be between 1 and 5, got {rating}"
        )));
    }
    Ok(())
}

impl ReviewService {
    /// Create a review and fold its rating into the book aggregate.
    ///
    /// A second review by the same user for the same book is reported as
    /// `DuplicateReview`, distinct from any other failure.
    pub fn add_review(
        store: &Store,
        user_id: Uuid,
        book_id: Uuid,
        content: Option<String>,
        rating: u8,
    ) -> Result<Review> {
        validate_rating(rating)?;

        let conn = store.connection();
        let tx = conn.unchecked_transaction()?;

        let (average, count): (f64, i64) = tx
            .query_row(
                "SELECT average_rating, rating_count FROM books WHERE id = ?1",
                params![book_id.to_string()],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?
            .ok_or_else(|| StoreError::BookNotFound(book_id.to_string()))?;

        let review = Review::new(user_id, book_id, content, rating);
        tx.execute(
            "INSERT INTO reviews (id, user_id, book_id, content, rating, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
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
                    user_id: user_id.to_string(),
                    book_id: book_id.to_string(),
                }
            } else {
                StoreError::Database(e)
            }
        })?;

        let new_count = count + 1;
        let new_total = total_tenths(average, count) + i64::from(rating) * 10;
        let new_average = round_to_tenth(new_total as f64 / 10.0 / new_count as f64);

        tx.execute(
            "UPDATE books SET average_rating = ?1, rating_count = ?2 WHERE id = ?3",
            params![new_average, new_count, book_id.to_string()],
        )?;

        tx.commit()?;
        Ok(review)
    }

    /// Update a review's content and/or rating; the aggregate is touched
    /// only when the rating actually changes (count stays constant).
    pub fn update_review(
        store: &Store,
        user_id: Uuid,
        review_id: Uuid,
        content: Option<String>,
        rating: Option<u8>,
    ) -> Result<Review> {
        if let Some(rating) = rating {
            validate_rating(rating)?;
        }

        let conn = store.connection();
        let tx = conn.unchecked_transaction()?;

        let mut review = tx
            .query_row(
                "SELECT id, user_id, book_id, content, rating, created_at, updated_at
                 FROM reviews WHERE id = ?1 AND user_id = ?2",
                params![review_id.to_string(), user_id.to_string()],
                SqliteReviewRepository::row_to_review,
            )
            .optional()?
            .ok_or_else(|| {
                StoreError::ReviewNotFound(format!("{review_id} (missing or not owned)"))
            })?;

        let old_rating = review.rating;
        if let Some(content) = content {
            review.content = Some(content);
        }
        if let Some(rating) = rating {
            review.rating = rating;
        }
        review.touch();

        tx.execute(
            "UPDATE reviews SET content = ?1, rating = ?2, updated_at = ?3 WHERE id = ?4",
            params![
                review.content,
                review.rating as i64,
                review.updated_at.to_rfc3339(),
                review.id.to_string(),
            ],
        )?;

        if review.rating != old_rating {
            let (average, count): (f64, i64) = tx.query_row(
                "SELECT average_rating, rating_count FROM books WHERE id = ?1",
                params![review.book_id.to_string()],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )?;

            let adjusted = total_tenths(average, count) - i64::from(old_rating) * 10
                + i64::from(review.rating) * 10;
            let new_average = round_to_tenth(adjusted as f64 / 10.0 / count.max(1) as f64);

            tx.execute(
                "UPDATE books SET average_rating = ?1 WHERE id = ?2",
                params![new_average, review.book_id.to_string()],
            )?;
        }

        tx.commit()?;
        Ok(review)
    }

    /// Delete a review and subtract its rating from the book aggregate.
    ///
    /// Owners may always delete their own review; librarians and admins may
    /// delete anyone's. The check runs before the transaction starts.
    pub fn remove_review(
        store: &Store,
        user_id: Uuid,
        review_id: Uuid,
        role: UserRole,
    ) -> Result<()> {
        let review = store.get_review(&review_id)?;

        if review.user_id != user_id && !role.can_moderate() {
            return Err(StoreError::Forbidden(
                "only the review owner or a moderator may delete a review".to_string(),
            ));
        }

        let conn = store.connection();
        let tx = conn.unchecked_transaction()?;

        let deleted = tx.execute(
            "DELETE FROM reviews WHERE id = ?1",
            params![review_id.to_string()],
        )?;
        if deleted == 0 {
            return Err(StoreError::ReviewNotFound(review_id.to_string()));
        }

        let aggregate: Option<(f64, i64)> = tx
            .query_row(
                "SELECT average_rating, rating_count FROM books WHERE id = ?1",
                params![review.book_id.to_string()],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        // The book may already be gone (cascade); the review delete alone
        // is then the whole transaction.
        if let Some((average, count)) = aggregate {
            let new_count = (count - 1).max(0);
            let new_average = if new_count > 0 {
                let new_total = total_tenths(average, count) - i64::from(review.rating) * 10;
                round_to_tenth(new_total as f64 / 10.0 / new_count as f64)
            } else {
                0.0
            };

            tx.execute(
                "UPDATE books SET average_rating = ?1, rating_count = ?2 WHERE id = ?3",
                params![new_average, new_count, review.book_id.to_string()],
            )?;
        }

        tx.commit()?;
        Ok(())
    }
}
