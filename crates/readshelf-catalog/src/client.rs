use std::time::Duration;

use async_trait::async_trait;
use reqwest::Url;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::CatalogConfig;
use crate::error::{CatalogError, Result};
use crate::http::RateLimitedClient;

/// Raw work record as returned by the external catalog, before
/// normalization. Field extraction is defensive: the catalog omits fields
/// freely and has shipped more than one shape for `description`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawWork {
    /// Canonical identifier the catalog itself uses for this record.
    pub key: Option<String>,
    pub title: Option<String>,
    pub subtitle: Option<String>,
    pub description: Option<String>,
    pub cover_ids: Vec<i64>,
    pub subjects: Vec<String>,
    pub first_publish_date: Option<String>,
}

impl RawWork {
    pub fn from_json(v: &Value) -> Self {
        let key = v
            .get("key")
            .and_then(Value::as_str)
            .map(|key| key.trim_start_matches("/works/").to_string());

        let title = v
            .get("title")
            .and_then(Value::as_str)
            .map(ToOwned::to_owned);

        let subtitle = v
            .get("subtitle")
            .and_then(Value::as_str)
            .map(ToOwned::to_owned);

        // Either a bare string or {"type": "/type/text", "value": "..."}.
        let description = v.get("description").and_then(|d| {
            d.as_str()
                .map(ToOwned::to_owned)
                .or_else(|| d.get("value").and_then(Value::as_str).map(ToOwned::to_owned))
        });

        let cover_ids = v
            .get("covers")
            .and_then(Value::as_array)
            .map(|arr| {
                arr.iter()
                    .filter_map(Value::as_i64)
                    .filter(|id| *id > 0)
                    .collect::<Vec<_>>()
            })
            .unwrap_or_default();

        let subjects = v
            .get("subjects")
            .and_then(Value::as_array)
            .map(|arr| {
                arr.iter()
                    .filter_map(|item| {
                        item.as_str()
                            .or_else(|| item.get("name").and_then(Value::as_str))
                    })
                    .map(ToOwned::to_owned)
                    .collect::<Vec<_>>()
            })
            .unwrap_or_default();

        let first_publish_date = v
            .get("first_publish_date")
            .and_then(Value::as_str)
            .map(ToOwned::to_owned)
            .or_else(|| {
                v.get("first_publish_year")
                    .and_then(Value::as_i64)
                    .map(|year| year.to_string())
            });

        Self {
            key,
            title,
            subtitle,
            description,
            cover_ids,
            subjects,
            first_publish_date,
        }
    }
}

/// The external works catalog, behind a trait so the resolver can be
/// exercised without the network.
#[async_trait]
pub trait WorkCatalog: Send + Sync {
    async fn fetch_work(&self, external_id: &str) -> Result<RawWork>;
}

pub struct CatalogClient {
    client: RateLimitedClient,
    base_url: String,
}

impl CatalogClient {
    pub fn new(config: &CatalogConfig) -> Self {
        Self {
            client: RateLimitedClient::new(
                Duration::from_millis(config.min_interval_ms),
                Duration::from_secs(config.timeout_secs),
                config.max_retries,
                &config.user_agent,
            ),
            base_url: config.base_url.clone(),
        }
    }

    fn work_url(&self, external_id: &str) -> Result<Url> {
        let mut url = Url::parse(&self.base_url)
            .map_err(|e| CatalogError::Parse(format!("invalid catalog base URL: {e}")))?;
        {
            let mut segs = url
                .path_segments_mut()
                .map_err(|_| CatalogError::Parse("invalid catalog base URL".to_string()))?;
            segs.push("works");
            segs.push(&format!("{external_id}.json"));
        }
        Ok(url)
    }
}

#[async_trait]
impl WorkCatalog for CatalogClient {
    async fn fetch_work(&self, external_id: &str) -> Result<RawWork> {
        let url = self.work_url(external_id)?;
        let body = self.client.get(url.as_str()).await.map_err(|e| match e {
            // Rewrite the URL-bearing variant so callers see the identifier
            // they asked for, not our request internals.
            CatalogError::WorkNotFound(_) => CatalogError::WorkNotFound(external_id.to_string()),
            other => other,
        })?;
        let json: Value =
            serde_json::from_str(&body).map_err(|e| CatalogError::Parse(e.to_string()))?;
        Ok(RawWork::from_json(&json))
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn test_client(base_url: String) -> CatalogClient {
        CatalogClient::new(&CatalogConfig {
            base_url,
            min_interval_ms: 1,
            timeout_secs: 2,
            max_retries: 0,
            ..Default::default()
        })
    }

    #[test]
    fn parses_work_with_object_description_and_covers() {
        let doc = json!({
            "key": "/works/OL45883W",
            "title": "Dune",
            "subtitle": "a novel",
            "description": {"type": "/type/text", "value": "Arrakis, the desert planet."},
            "covers": [11481354, -1, 11481355],
            "subjects": ["Science fiction", "Deserts"],
            "first_publish_date": "1965"
        });

        let work = RawWork::from_json(&doc);
        assert_eq!(work.key.as_deref(), Some("OL45883W"));
        assert_eq!(work.title.as_deref(), Some("Dune"));
        assert_eq!(
            work.description.as_deref(),
            Some("Arrakis, the desert planet.")
        );
        assert_eq!(work.cover_ids, vec![11481354, 11481355]);
        assert_eq!(work.subjects.len(), 2);
    }

    #[test]
    fn parses_work_with_string_description_and_missing_fields() {
        let doc = json!({
            "title": "Dune",
            "description": "Plain string."
        });

        let work = RawWork::from_json(&doc);
        assert_eq!(work.key, None);
        assert_eq!(work.description.as_deref(), Some("Plain string."));
        assert!(work.cover_ids.is_empty());
        assert!(work.subjects.is_empty());
    }

    #[tokio::test]
    async fn fetch_work_hits_the_works_endpoint() {
        let mut server = mockito::Server::new_async().await;
        let _m = server
            .mock("GET", "/works/OL45883W.json")
            .with_status(200)
            .with_body(
                json!({"key": "/works/OL45883W", "title": "Dune"}).to_string(),
            )
            .create_async()
            .await;

        let client = test_client(server.url());
        let work = client.fetch_work("OL45883W").await.unwrap();
        assert_eq!(work.title.as_deref(), Some("Dune"));
    }

    #[tokio::test]
    async fn upstream_404_names_the_queried_identifier() {
        let mut server = mockito::Server::new_async().await;
        let _m = server
            .mock("GET", "/works/OLNOPE.json")
            .with_status(404)
            .create_async()
            .await;

        let client = test_client(server.url());
        let err = client.fetch_work("OLNOPE").await.unwrap_err();
        assert!(matches!(err, CatalogError::WorkNotFound(id) if id == "OLNOPE"));
    }
}
