use serde::{Deserialize, Serialize};

/// Tunables for the external catalog boundary and the staleness policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CatalogConfig {
    pub base_url: String,
    pub user_agent: String,

    /// Whole-request budget; this sits on a synchronous request path, so it
    /// stays in the low single-digit seconds.
    pub timeout_secs: u64,

    /// Minimum spacing between requests to the catalog.
    pub min_interval_ms: u64,

    pub max_retries: u32,

    /// Days after which a cached record is eligible for re-fetch.
    pub staleness_days: i64,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            base_url: "https://openlibrary.org".to_string(),
            user_agent: "readshelf/0.1 (readshelf.contact@gmail.com)".to_string(),
            timeout_secs: 3,
            min_interval_ms: 500,
            max_retries: 2,
            staleness_days: 7,
        }
    }
}
