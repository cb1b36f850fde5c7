use rusqlite::Connection;

use crate::error::Result;

pub const SCHEMA_VERSION: u32 = 1;

pub fn apply_pragmas(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        PRAGMA journal_mode = WAL;
        PRAGMA synchronous = NORMAL;
        PRAGMA foreign_keys = ON;
        ",
    )?;
    Ok(())
}

pub fn create_tables(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS schema_migrations (
            version    INTEGER PRIMARY KEY,
            applied_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS books (
            id              TEXT PRIMARY KEY,
            external_id     TEXT NOT NULL UNIQUE,
            alternative_ids TEXT NOT NULL DEFAULT '[]',
            title           TEXT NOT NULL,
            subtitle        TEXT,
            authors         TEXT NOT NULL DEFAULT '[]',
            genres          TEXT NOT NULL DEFAULT '[]',
            description     TEXT,
            cover_image     TEXT,
            cover_id        INTEGER,
            release_date    TEXT,
            average_rating  REAL NOT NULL DEFAULT 0.0,
            rating_count    INTEGER NOT NULL DEFAULT 0,
            created_at      TEXT NOT NULL,
            updated_at      TEXT NOT NULL
        );

        -- One row per external identifier, primary or alternative. The
        -- primary key is what makes it impossible for two books to claim
        -- the same identifier, however the writes interleave.
        CREATE TABLE IF NOT EXISTS book_identifiers (
            external_id TEXT PRIMARY KEY,
            book_id     TEXT NOT NULL REFERENCES books(id) ON DELETE CASCADE,
            is_primary  INTEGER NOT NULL DEFAULT 0
        );

        CREATE TABLE IF NOT EXISTS reviews (
            id         TEXT PRIMARY KEY,
            user_id    TEXT NOT NULL,
            book_id    TEXT NOT NULL REFERENCES books(id) ON DELETE CASCADE,
            content    TEXT,
            rating     INTEGER NOT NULL CHECK(rating BETWEEN 1 AND 5),
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            UNIQUE(user_id, book_id)
        );
        ",
    )?;
    Ok(())
}

pub fn create_indexes(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE INDEX IF NOT EXISTS idx_books_title       ON books(title COLLATE NOCASE);
        CREATE INDEX IF NOT EXISTS idx_identifiers_book  ON book_identifiers(book_id);
        CREATE INDEX IF NOT EXISTS idx_reviews_book      ON reviews(book_id);
        CREATE INDEX IF NOT EXISTS idx_reviews_user      ON reviews(user_id);
        ",
    )?;
    Ok(())
}

pub fn init_schema(conn: &Connection) -> Result<()> {
    create_tables(conn)?;
    create_indexes(conn)?;
    Ok(())
}
