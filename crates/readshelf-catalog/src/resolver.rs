//! Identity resolution: one entry point that always hands back the single
//! canonical record for an external identifier, creating or enriching it as
//! needed.

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, warn};

use readshelf_core::{Book, Store, StoreError};

use crate::client::{CatalogClient, WorkCatalog};
use crate::config::CatalogConfig;
use crate::error::{CatalogError, Result};
use crate::matching;
use crate::merge;
use crate::normalize::{ResolveHints, normalize_work};
use crate::staleness::StalenessPolicy;

/// Typed resolution request; the validation layer guarantees a non-empty
/// identifier before this is built.
#[derive(Debug, Clone, Default)]
pub struct ResolveRequest {
    pub external_id: String,
    pub hints: ResolveHints,
}

impl ResolveRequest {
    pub fn new(external_id: impl Into<String>) -> Self {
        Self {
            external_id: external_id.into(),
            hints: ResolveHints::default(),
        }
    }

    pub fn with_hints(external_id: impl Into<String>, hints: ResolveHints) -> Self {
        Self {
            external_id: external_id.into(),
            hints,
        }
    }
}

/// Stateless resolver; the datastore handle comes in per call.
pub struct BookResolver {
    catalog: Arc<dyn WorkCatalog>,
    staleness: StalenessPolicy,
}

impl BookResolver {
    pub fn new(config: &CatalogConfig) -> Self {
        Self {
            catalog: Arc::new(CatalogClient::new(config)),
            staleness: StalenessPolicy::with_days(config.staleness_days),
        }
    }

    /// Swap in another catalog implementation (tests, other providers).
    pub fn with_catalog(catalog: Arc<dyn WorkCatalog>, staleness: StalenessPolicy) -> Self {
        Self { catalog, staleness }
    }

    /// Resolve an external identifier to the canonical local book.
    ///
    /// Lookup order: identifier table, then the title/author fallback
    /// tiers. The staleness policy then decides whether the catalog is
    /// consulted at all; a failed fetch degrades to the local record when
    /// one exists.
    pub async fn resolve(&self, store: &Store, request: &ResolveRequest) -> Result<Book> {
        let external_id = request.external_id.as_str();

        let mut found = store.find_by_any_identifier(external_id)?;

        if found.is_none()
            && let Some(title) = request.hints.title.as_deref()
            && !request.hints.authors.is_empty()
        {
            found = matching::find_by_title_and_authors(store, title, &request.hints.authors)?;
        }

        let now = Utc::now();
        if let Some(book) = &found
            && !self.staleness.needs_refresh(Some(book), external_id, now)
        {
            debug!(external_id, "resolution served from local store");
            return Ok(book.clone());
        }

        let raw = match self.catalog.fetch_work(external_id).await {
            Ok(raw) => raw,
            Err(err) => return self.degrade(store, found, external_id, err),
        };

        let candidate = normalize_work(&raw, &request.hints);

        match found {
            Some(mut book) => {
                if merge::merge_into(&mut book, &candidate, external_id) {
                    book.touch();
                    store.save_book(&book)?;
                } else {
                    // Nothing semantically changed; reset only the
                    // staleness clock instead of rewriting the record.
                    store.touch_book(&book.id, now)?;
                    book.updated_at = now;
                }
                Ok(book)
            }
            None => {
                let book = merge::book_from_candidate(&candidate, external_id);
                match store.save_book(&book) {
                    Ok(()) => Ok(book),
                    Err(StoreError::IdentifierConflict(_)) => {
                        // Lost the creation race; the winner's record is
                        // canonical and already carries this identifier.
                        debug!(external_id, "creation race lost, re-reading winner");
                        store
                            .find_by_any_identifier(external_id)?
                            .ok_or_else(|| {
                                CatalogError::Store(StoreError::BookNotFound(
                                    external_id.to_string(),
                                ))
                            })
                    }
                    Err(err) => Err(err.into()),
                }
            }
        }
    }

    /// Catalog fetch failed. With a local record in hand the resolution
    /// still succeeds: link the queried alias if new (so the next lookup is
    /// an exact hit) and hand the stale record back without resetting its
    /// staleness clock. Without one, the failure propagates.
    fn degrade(
        &self,
        store: &Store,
        found: Option<Book>,
        external_id: &str,
        err: CatalogError,
    ) -> Result<Book> {
        let Some(mut book) = found else {
            return Err(err);
        };

        warn!(external_id, error = %err, "catalog fetch failed, returning local record");
        if !book.is_linked(external_id) {
            book.alternative_ids.push(external_id.to_string());
            store.save_book(&book)?;
        }
        Ok(book)
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use serde_json::json;

    use super::*;
    use crate::client::RawWork;

    struct DownCatalog;

    #[async_trait]
    impl WorkCatalog for DownCatalog {
        async fn fetch_work(&self, _external_id: &str) -> Result<RawWork> {
            Err(CatalogError::Unavailable("connection refused".to_string()))
        }
    }

    fn mock_resolver(base_url: String) -> BookResolver {
        BookResolver::new(&CatalogConfig {
            base_url,
            min_interval_ms: 1,
            timeout_secs: 2,
            max_retries: 0,
            ..Default::default()
        })
    }

    fn dune_hints() -> ResolveHints {
        ResolveHints {
            title: Some("Dune".to_string()),
            authors: vec!["Frank Herbert".to_string()],
            ..Default::default()
        }
    }

    fn dune_work_body() -> String {
        json!({
            "key": "/works/OL1W",
            "title": "Dune",
            "description": "Arrakis, the desert planet.",
            "covers": [101],
            "subjects": ["Science fiction"],
            "first_publish_date": "1965"
        })
        .to_string()
    }

    #[tokio::test]
    async fn unseen_identifier_creates_a_book_from_catalog_data() {
        let mut server = mockito::Server::new_async().await;
        let _m = server
            .mock("GET", "/works/OL1W.json")
            .with_status(200)
            .with_body(dune_work_body())
            .create_async()
            .await;

        let store = Store::open_in_memory().unwrap();
        let resolver = mock_resolver(server.url());

        let book = resolver
            .resolve(&store, &ResolveRequest::with_hints("OL1W", dune_hints()))
            .await
            .unwrap();

        assert_eq!(book.external_id, "OL1W");
        assert_eq!(book.title, "Dune");
        assert_eq!(book.authors, vec!["Frank Herbert".to_string()]);
        assert_eq!(book.genres, vec!["Science fiction".to_string()]);
        assert_eq!(store.count_books().unwrap(), 1);
    }

    #[tokio::test]
    async fn fresh_record_is_served_without_a_second_fetch() {
        let mut server = mockito::Server::new_async().await;
        let fetch = server
            .mock("GET", "/works/OL1W.json")
            .with_status(200)
            .with_body(dune_work_body())
            .expect(1)
            .create_async()
            .await;

        let store = Store::open_in_memory().unwrap();
        let resolver = mock_resolver(server.url());
        let request = ResolveRequest::with_hints("OL1W", dune_hints());

        let first = resolver.resolve(&store, &request).await.unwrap();
        let second = resolver.resolve(&store, &request).await.unwrap();

        assert_eq!(first.id, second.id);
        fetch.assert_async().await;
    }

    #[tokio::test]
    async fn alternative_identifier_merges_instead_of_duplicating() {
        let mut server = mockito::Server::new_async().await;
        let _m = server
            .mock("GET", "/works/OL2W.json")
            .with_status(200)
            .with_body(
                json!({
                    "key": "/works/OL2W",
                    "title": "Dune",
                    "description": "A far longer description than the one on file.",
                })
                .to_string(),
            )
            .create_async()
            .await;

        let store = Store::open_in_memory().unwrap();
        let mut existing = Book::new("OL1W", "Dune");
        existing.authors = vec!["Frank Herbert".to_string()];
        existing.description = Some("Short.".to_string());
        store.save_book(&existing).unwrap();

        let resolver = mock_resolver(server.url());
        let book = resolver
            .resolve(&store, &ResolveRequest::with_hints("OL2W", dune_hints()))
            .await
            .unwrap();

        assert_eq!(book.id, existing.id);
        assert!(book.alternative_ids.contains(&"OL2W".to_string()));
        assert_eq!(
            book.description.as_deref(),
            Some("A far longer description than the one on file.")
        );
        assert_eq!(store.count_books().unwrap(), 1);

        // Both identifiers now resolve to the same record.
        let via_alias = store.find_by_any_identifier("OL2W").unwrap().unwrap();
        assert_eq!(via_alias.id, existing.id);
    }

    #[tokio::test]
    async fn unreachable_catalog_still_links_the_alias_via_fuzzy_match() {
        let store = Store::open_in_memory().unwrap();
        let mut existing = Book::new("OL1W", "Dune");
        existing.authors = vec!["Frank Herbert".to_string()];
        store.save_book(&existing).unwrap();

        let resolver =
            BookResolver::with_catalog(Arc::new(DownCatalog), StalenessPolicy::default());
        let book = resolver
            .resolve(&store, &ResolveRequest::with_hints("OL2W", dune_hints()))
            .await
            .unwrap();

        assert_eq!(book.id, existing.id);
        assert!(book.alternative_ids.contains(&"OL2W".to_string()));
        assert_eq!(store.count_books().unwrap(), 1);
    }

    #[tokio::test]
    async fn stale_record_survives_an_outage() {
        let store = Store::open_in_memory().unwrap();
        let mut existing = Book::new("OL1W", "Dune");
        existing.updated_at = Utc::now() - chrono::Duration::days(30);
        store.save_book(&existing).unwrap();

        let resolver =
            BookResolver::with_catalog(Arc::new(DownCatalog), StalenessPolicy::default());
        let book = resolver
            .resolve(&store, &ResolveRequest::new("OL1W"))
            .await
            .unwrap();
        assert_eq!(book.id, existing.id);

        // The clock was not reset: the next resolution keeps retrying the
        // catalog rather than trusting month-old data for another week.
        let reloaded = store.get_book(&existing.id).unwrap();
        assert!(Utc::now().signed_duration_since(reloaded.updated_at) > chrono::Duration::days(7));
    }

    #[tokio::test]
    async fn unknown_identifier_with_no_local_record_fails_as_not_found() {
        let mut server = mockito::Server::new_async().await;
        let _m = server
            .mock("GET", "/works/OLNOPE.json")
            .with_status(404)
            .create_async()
            .await;

        let store = Store::open_in_memory().unwrap();
        let resolver = mock_resolver(server.url());

        let err = resolver
            .resolve(&store, &ResolveRequest::new("OLNOPE"))
            .await
            .unwrap_err();
        assert!(matches!(err, CatalogError::WorkNotFound(_)));
        assert_eq!(store.count_books().unwrap(), 0);
    }

    #[tokio::test]
    async fn outage_with_no_local_record_propagates_unavailable() {
        let store = Store::open_in_memory().unwrap();
        let resolver =
            BookResolver::with_catalog(Arc::new(DownCatalog), StalenessPolicy::default());

        let err = resolver
            .resolve(&store, &ResolveRequest::new("OL1W"))
            .await
            .unwrap_err();
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn clean_refetch_resets_only_the_staleness_clock() {
        let mut server = mockito::Server::new_async().await;
        let fetch = server
            .mock("GET", "/works/OL1W.json")
            .with_status(200)
            .with_body(dune_work_body())
            .expect(2)
            .create_async()
            .await;

        let store = Store::open_in_memory().unwrap();
        let resolver = mock_resolver(server.url());
        let request = ResolveRequest::with_hints("OL1W", dune_hints());

        let first = resolver.resolve(&store, &request).await.unwrap();

        // Age the record out of the window; the re-fetch returns identical
        // data, so only the timestamp moves.
        let stale_at = Utc::now() - chrono::Duration::days(8);
        let mut aged = store.get_book(&first.id).unwrap();
        aged.updated_at = stale_at;
        store.save_book(&aged).unwrap();

        let second = resolver.resolve(&store, &request).await.unwrap();
        assert_eq!(second.id, first.id);
        assert!(second.updated_at > stale_at);

        // Freshened now: a third resolution stays local.
        let third = resolver.resolve(&store, &request).await.unwrap();
        assert_eq!(third.id, first.id);
        fetch.assert_async().await;
    }

    #[tokio::test]
    async fn resolved_book_accepts_reviews_through_the_core() {
        use readshelf_core::ReviewService;

        let mut server = mockito::Server::new_async().await;
        let _m = server
            .mock("GET", "/works/OL1W.json")
            .with_status(200)
            .with_body(dune_work_body())
            .create_async()
            .await;

        let store = Store::open_in_memory().unwrap();
        let resolver = mock_resolver(server.url());

        let book = resolver
            .resolve(&store, &ResolveRequest::with_hints("OL1W", dune_hints()))
            .await
            .unwrap();

        ReviewService::add_review(&store, uuid::Uuid::new_v4(), book.id, None, 5).unwrap();
        let reloaded = store.get_book(&book.id).unwrap();
        assert_eq!(reloaded.average_rating, 5.0);
        assert_eq!(reloaded.rating_count, 1);
    }

    #[tokio::test]
    async fn catalog_reporting_a_different_canonical_id_links_the_queried_one() {
        let mut server = mockito::Server::new_async().await;
        let _m = server
            .mock("GET", "/works/OL2W.json")
            .with_status(200)
            .with_body(dune_work_body()) // canonical key is OL1W
            .create_async()
            .await;

        let store = Store::open_in_memory().unwrap();
        let resolver = mock_resolver(server.url());

        let book = resolver
            .resolve(&store, &ResolveRequest::with_hints("OL2W", dune_hints()))
            .await
            .unwrap();

        assert_eq!(book.external_id, "OL1W");
        assert_eq!(book.alternative_ids, vec!["OL2W".to_string()]);
        assert!(store.find_by_any_identifier("OL2W").unwrap().is_some());
        assert!(store.find_by_any_identifier("OL1W").unwrap().is_some());
    }
}
