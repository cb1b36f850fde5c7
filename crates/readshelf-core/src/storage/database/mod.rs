mod connection;
mod migrations;
mod schema;

pub use connection::ConnectionPool;
pub use migrations::{Migration, get_applied_versions, run_migrations};
pub use schema::{SCHEMA_VERSION, init_schema};

use std::path::Path;
use std::sync::MutexGuard;

use chrono::{DateTime, Utc};
use rusqlite::Connection;
use uuid::Uuid;

use crate::error::{Result, StoreError};
use crate::models::{Book, Review};
use crate::storage::repositories::{
    BookRepository, Repository, ReviewRepository, SqliteBookRepository, SqliteReviewRepository,
};

pub fn open_database(path: &Path) -> Result<ConnectionPool> {
    let pool = ConnectionPool::open(path)?;
    {
        let conn = pool.get_connection();
        migrations::run_migrations(&conn)?;
    }
    Ok(pool)
}

pub fn open_in_memory() -> Result<ConnectionPool> {
    let pool = ConnectionPool::open_in_memory()?;
    {
        let conn = pool.get_connection();
        migrations::run_migrations(&conn)?;
    }
    Ok(pool)
}

/// Shared datastore handle. Components hold no connection state of their
/// own; they receive a `&Store` per call.
pub struct Store {
    pool: ConnectionPool,
}

impl Store {
    pub fn open(path: &Path) -> Result<Self> {
        let pool = open_database(path)?;
        Ok(Self { pool })
    }

    pub fn open_in_memory() -> Result<Self> {
        let pool = open_in_memory()?;
        Ok(Self { pool })
    }

    pub(crate) fn connection(&self) -> MutexGuard<'_, Connection> {
        self.pool.get_connection()
    }

    pub fn get_book(&self, id: &Uuid) -> Result<Book> {
        let repo = SqliteBookRepository::new(self.pool.get_connection());
        repo.find_by_id(id)?
            .ok_or_else(|| StoreError::BookNotFound(id.to_string()))
    }

    pub fn find_by_any_identifier(&self, external_id: &str) -> Result<Option<Book>> {
        let repo = SqliteBookRepository::new(self.pool.get_connection());
        repo.find_by_any_identifier(external_id)
    }

    pub fn find_by_title(&self, title: &str) -> Result<Vec<Book>> {
        let repo = SqliteBookRepository::new(self.pool.get_connection());
        repo.find_by_title(title)
    }

    pub fn find_by_authors(&self, authors: &[String]) -> Result<Vec<Book>> {
        let repo = SqliteBookRepository::new(self.pool.get_connection());
        repo.find_by_authors(authors)
    }

    pub fn save_book(&self, book: &Book) -> Result<()> {
        let repo = SqliteBookRepository::new(self.pool.get_connection());
        repo.save(book)
    }

    pub fn touch_book(&self, id: &Uuid, at: DateTime<Utc>) -> Result<()> {
        let repo = SqliteBookRepository::new(self.pool.get_connection());
        repo.touch(id, at)
    }

    pub fn count_books(&self) -> Result<usize> {
        let repo = SqliteBookRepository::new(self.pool.get_connection());
        repo.count()
    }

    pub fn get_review(&self, id: &Uuid) -> Result<Review> {
        let repo = SqliteReviewRepository::new(self.pool.get_connection());
        repo.find_by_id(id)?
            .ok_or_else(|| StoreError::ReviewNotFound(id.to_string()))
    }

    pub fn find_review_by_user_and_book(
        &self,
        user_id: &Uuid,
        book_id: &Uuid,
    ) -> Result<Option<Review>> {
        let repo = SqliteReviewRepository::new(self.pool.get_connection());
        repo.find_by_user_and_book(user_id, book_id)
    }

    pub fn list_reviews_for_book(&self, book_id: &Uuid) -> Result<Vec<Review>> {
        let repo = SqliteReviewRepository::new(self.pool.get_connection());
        repo.list_for_book(book_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dune() -> Book {
        let mut book = Book::new("OL1W", "Dune");
        book.authors = vec!["Frank Herbert".to_string()];
        book
    }

    #[test]
    fn save_then_find_by_primary_and_alternative_identifier() {
        let store = Store::open_in_memory().unwrap();
        let mut book = dune();
        book.alternative_ids.push("OL2W".to_string());
        store.save_book(&book).unwrap();

        let by_primary = store.find_by_any_identifier("OL1W").unwrap().unwrap();
        let by_alias = store.find_by_any_identifier("OL2W").unwrap().unwrap();
        assert_eq!(by_primary.id, book.id);
        assert_eq!(by_alias.id, book.id);
        assert!(store.find_by_any_identifier("OL9W").unwrap().is_none());
    }

    #[test]
    fn identifier_claimed_by_another_book_is_a_conflict() {
        let store = Store::open_in_memory().unwrap();
        store.save_book(&dune()).unwrap();

        let mut rival = Book::new("OL3W", "Dune Messiah");
        rival.alternative_ids.push("OL1W".to_string());
        let err = store.save_book(&rival).unwrap_err();
        assert!(matches!(err, StoreError::IdentifierConflict(id) if id == "OL1W"));

        // The failed write must not leave partial identifier rows behind.
        assert!(store.find_by_any_identifier("OL3W").unwrap().is_none());
        assert_eq!(store.count_books().unwrap(), 1);
    }

    #[test]
    fn duplicate_primary_identifier_is_a_conflict() {
        let store = Store::open_in_memory().unwrap();
        store.save_book(&dune()).unwrap();

        let err = store.save_book(&Book::new("OL1W", "Dune, again")).unwrap_err();
        assert!(err.is_conflict());
    }

    #[test]
    fn title_lookup_is_case_insensitive() {
        let store = Store::open_in_memory().unwrap();
        store.save_book(&dune()).unwrap();

        let found = store.find_by_title("dune").unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].title, "Dune");
    }

    #[test]
    fn author_lookup_matches_any_listed_author() {
        let store = Store::open_in_memory().unwrap();
        store.save_book(&dune()).unwrap();

        let mut other = Book::new("OL5W", "Consider Phlebas");
        other.authors = vec!["Iain M. Banks".to_string()];
        store.save_book(&other).unwrap();

        let found = store
            .find_by_authors(&["Frank Herbert".to_string(), "Nobody".to_string()])
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].external_id, "OL1W");
    }

    #[test]
    fn touch_updates_only_the_staleness_clock() {
        let store = Store::open_in_memory().unwrap();
        let book = dune();
        store.save_book(&book).unwrap();

        let later = Utc::now() + chrono::Duration::hours(1);
        store.touch_book(&book.id, later).unwrap();

        let reloaded = store.get_book(&book.id).unwrap();
        assert_eq!(reloaded.updated_at.timestamp(), later.timestamp());
        assert_eq!(reloaded.title, "Dune");
    }

    #[test]
    fn reopening_a_store_on_disk_preserves_books() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("readshelf.db");
        {
            let store = Store::open(&path).unwrap();
            store.save_book(&dune()).unwrap();
        }

        let store = Store::open(&path).unwrap();
        assert_eq!(store.count_books().unwrap(), 1);
        assert!(store.find_by_any_identifier("OL1W").unwrap().is_some());
    }

    #[test]
    fn resaving_a_book_keeps_its_identifier_rows_consistent() {
        let store = Store::open_in_memory().unwrap();
        let mut book = dune();
        store.save_book(&book).unwrap();

        book.alternative_ids.push("OL2W".to_string());
        book.description = Some("Arrakis.".to_string());
        store.save_book(&book).unwrap();

        let reloaded = store.find_by_any_identifier("OL2W").unwrap().unwrap();
        assert_eq!(reloaded.id, book.id);
        assert_eq!(reloaded.description.as_deref(), Some("Arrakis."));
    }
}
