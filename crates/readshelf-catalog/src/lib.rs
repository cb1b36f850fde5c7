//! readshelf-catalog — external catalog client, book identity resolution
//! and non-destructive enrichment.

pub mod client;
pub mod config;
pub mod error;
pub mod http;
pub mod matching;
pub mod merge;
pub mod normalize;
pub mod resolver;
pub mod staleness;

pub use client::{CatalogClient, RawWork, WorkCatalog};
pub use config::CatalogConfig;
pub use error::{CatalogError, Result};
pub use normalize::{ResolveHints, WorkCandidate, normalize_work};
pub use resolver::{BookResolver, ResolveRequest};
pub use staleness::StalenessPolicy;
