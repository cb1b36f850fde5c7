pub mod config;
pub mod error;
pub mod models;
pub mod reviews;
pub mod storage;

pub use config::AppConfig;
pub use error::{Result, StoreError};
pub use models::*;
pub use reviews::ReviewService;

pub use storage::database::{
    ConnectionPool, Store, open_database, open_in_memory, run_migrations,
};
pub use storage::repositories::{
    BookRepository, Repository, ReviewRepository, SqliteBookRepository, SqliteReviewRepository,
};
