use std::sync::MutexGuard;

use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, params};
use uuid::Uuid;

use crate::error::{Result, StoreError, is_constraint_violation};
use crate::models::Book;

use super::Repository;

const BOOK_COLUMNS: &str = "id, external_id, alternative_ids, title, subtitle, authors, genres,
         description, cover_image, cover_id, release_date, average_rating,
         rating_count, created_at, updated_at";

pub trait BookRepository: Repository<Entity = Book, Id = Uuid> {
    /// Single lookup across the primary identifier and every alternative.
    fn find_by_any_identifier(&self, external_id: &str) -> Result<Option<Book>>;

    /// All books whose title matches exactly, case-insensitively.
    fn find_by_title(&self, title: &str) -> Result<Vec<Book>>;

    /// All books listing at least one of the given author names verbatim.
    fn find_by_authors(&self, authors: &[String]) -> Result<Vec<Book>>;

    /// Rewrite only `updated_at`, resetting the staleness clock without a
    /// full-row write.
    fn touch(&self, id: &Uuid, at: DateTime<Utc>) -> Result<()>;

    fn count(&self) -> Result<usize>;
}

pub struct SqliteBookRepository<'a> {
    conn: MutexGuard<'a, Connection>,
}

impl<'a> SqliteBookRepository<'a> {
    pub fn new(conn: MutexGuard<'a, Connection>) -> Self {
        Self { conn }
    }

    fn row_to_book(row: &rusqlite::Row) -> rusqlite::Result<Book> {
        let alternative_ids: String = row.get(2)?;
        let authors: String = row.get(5)?;
        let genres: String = row.get(6)?;
        let created_at: String = row.get(13)?;
        let updated_at: String = row.get(14)?;

        Ok(Book {
            id: Uuid::parse_str(&row.get::<_, String>(0)?).unwrap_or_default(),
            external_id: row.get(1)?,
            alternative_ids: serde_json::from_str(&alternative_ids).unwrap_or_default(),
            title: row.get(3)?,
            subtitle: row.get(4)?,
            authors: serde_json::from_str(&authors).unwrap_or_default(),
            genres: serde_json::from_str(&genres).unwrap_or_default(),
            description: row.get(7)?,
            cover_image: row.get(8)?,
            cover_id: row.get(9)?,
            release_date: row.get(10)?,
            average_rating: row.get(11)?,
            rating_count: row.get::<_, i64>(12)?.max(0) as u32,
            created_at: parse_timestamp(&created_at),
            updated_at: parse_timestamp(&updated_at),
        })
    }
}

/// Unparseable timestamps collapse to the epoch, which makes the record
/// maximally stale rather than silently fresh.
fn parse_timestamp(raw: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
}

impl<'a> Repository for SqliteBookRepository<'a> {
    type Entity = Book;
    type Id = Uuid;

    fn find_by_id(&self, id: &Self::Id) -> Result<Option<Self::Entity>> {
        let mut stmt = self
            .conn
            .prepare(&format!("SELECT {BOOK_COLUMNS} FROM books WHERE id = ?1"))?;
        let book = stmt
            .query_row(params![id.to_string()], Self::row_to_book)
            .optional()?;
        Ok(book)
    }

    /// Insert or fully rewrite a book together with its identifier rows.
    ///
    /// Identifier rows are reconciled inside one transaction: an identifier
    /// already owned by a different book aborts the whole write with
    /// `IdentifierConflict`, leaving both records untouched.
    fn save(&self, book: &Self::Entity) -> Result<()> {
        let alternative_ids = serde_json::to_string(&book.alternative_ids)?;
        let authors = serde_json::to_string(&book.authors)?;
        let genres = serde_json::to_string(&book.genres)?;
        let book_id = book.id.to_string();

        let tx = self.conn.unchecked_transaction()?;

        tx.execute(
            "INSERT INTO books
                (id, external_id, alternative_ids, title, subtitle, authors, genres,
                 description, cover_image, cover_id, release_date, average_rating,
                 rating_count, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)
             ON CONFLICT(id) DO UPDATE SET
                external_id     = excluded.external_id,
                alternative_ids = excluded.alternative_ids,
                title           = excluded.title,
                subtitle        = excluded.subtitle,
                authors         = excluded.authors,
                genres          = excluded.genres,
                description     = excluded.description,
                cover_image     = excluded.cover_image,
                cover_id        = excluded.cover_id,
                release_date    = excluded.release_date,
                updated_at      = excluded.updated_at",
            params![
                book_id,
                book.external_id,
                alternative_ids,
                book.title,
                book.subtitle,
                authors,
                genres,
                book.description,
                book.cover_image,
                book.cover_id,
                book.release_date,
                book.average_rating,
                book.rating_count as i64,
                book.created_at.to_rfc3339(),
                book.updated_at.to_rfc3339(),
            ],
        )
        .map_err(|e| {
            if is_constraint_violation(&e) {
                StoreError::IdentifierConflict(book.external_id.clone())
            } else {
                StoreError::Database(e)
            }
        })?;

        for (external_id, is_primary) in book.all_identifiers() {
            let owner: Option<String> = tx
                .query_row(
                    "SELECT book_id FROM book_identifiers WHERE external_id = ?1",
                    params![external_id],
                    |row| row.get(0),
                )
                .optional()?;

            match owner.as_deref() {
                Some(existing) if existing != book_id => {
                    return Err(StoreError::IdentifierConflict(external_id.to_string()));
                }
                Some(_) => {
                    tx.execute(
                        "UPDATE book_identifiers SET is_primary = ?2 WHERE external_id = ?1",
                        params![external_id, is_primary],
                    )?;
                }
                None => {
                    tx.execute(
                        "INSERT INTO book_identifiers (external_id, book_id, is_primary)
                         VALUES (?1, ?2, ?3)",
                        params![external_id, book_id, is_primary],
                    )
                    .map_err(|e| {
                        if is_constraint_violation(&e) {
                            StoreError::IdentifierConflict(external_id.to_string())
                        } else {
                            StoreError::Database(e)
                        }
                    })?;
                }
            }
        }

        tx.commit()?;
        Ok(())
    }

    fn delete(&self, id: &Self::Id) -> Result<bool> {
        let deleted = self
            .conn
            .execute("DELETE FROM books WHERE id = ?1", params![id.to_string()])?;
        Ok(deleted > 0)
    }
}

impl<'a> BookRepository for SqliteBookRepository<'a> {
    fn find_by_any_identifier(&self, external_id: &str) -> Result<Option<Book>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {BOOK_COLUMNS} FROM books
             WHERE id = (SELECT book_id FROM book_identifiers WHERE external_id = ?1)"
        ))?;
        let book = stmt
            .query_row(params![external_id], Self::row_to_book)
            .optional()?;
        Ok(book)
    }

    fn find_by_title(&self, title: &str) -> Result<Vec<Book>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {BOOK_COLUMNS} FROM books WHERE title = ?1 COLLATE NOCASE"
        ))?;
        let rows = stmt
            .query_map(params![title], Self::row_to_book)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    fn find_by_authors(&self, authors: &[String]) -> Result<Vec<Book>> {
        if authors.is_empty() {
            return Ok(Vec::new());
        }

        // Authors are stored as a JSON array; match the quoted member the
        // same way tags are matched elsewhere.
        let clauses = (1..=authors.len())
            .map(|i| format!("authors LIKE ?{i}"))
            .collect::<Vec<_>>()
            .join(" OR ");
        let patterns: Vec<String> = authors
            .iter()
            .map(|author| format!("%{}%", serde_json::to_string(author).unwrap_or_default()))
            .collect();

        let mut stmt = self
            .conn
            .prepare(&format!("SELECT {BOOK_COLUMNS} FROM books WHERE {clauses}"))?;
        let rows = stmt
            .query_map(rusqlite::params_from_iter(patterns.iter()), Self::row_to_book)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    fn touch(&self, id: &Uuid, at: DateTime<Utc>) -> Result<()> {
        let changed = self.conn.execute(
            "UPDATE books SET updated_at = ?1 WHERE id = ?2",
            params![at.to_rfc3339(), id.to_string()],
        )?;
        if changed == 0 {
            return Err(StoreError::BookNotFound(id.to_string()));
        }
        Ok(())
    }

    fn count(&self) -> Result<usize> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM books", [], |row| row.get(0))?;
        Ok(count as usize)
    }
}
