use std::sync::Arc;
use std::time::{Duration, Instant};

use reqwest::StatusCode;
use reqwest::header::RETRY_AFTER;
use tokio::sync::Mutex;
use tokio::time::sleep;

use crate::error::{CatalogError, Result};

/// HTTP client that spaces requests at least `min_interval` apart and
/// retries transient failures with exponential backoff. Status codes are
/// mapped onto the catalog error taxonomy here so callers never see raw
/// transport errors.
pub struct RateLimitedClient {
    client: reqwest::Client,
    min_interval: Duration,
    last_request: Arc<Mutex<Option<Instant>>>,
    max_retries: u32,
}

impl RateLimitedClient {
    pub fn new(
        min_interval: Duration,
        timeout: Duration,
        max_retries: u32,
        user_agent: &str,
    ) -> Self {
        let client = reqwest::Client::builder()
            .user_agent(user_agent)
            .gzip(true)
            .timeout(timeout)
            .build()
            .expect("failed to build reqwest client");
        Self {
            client,
            min_interval,
            last_request: Arc::new(Mutex::new(None)),
            max_retries,
        }
    }

    async fn wait_for_rate_limit(&self) {
        let mut last = self.last_request.lock().await;
        if let Some(t) = *last {
            let elapsed = t.elapsed();
            if elapsed < self.min_interval {
                sleep(self.min_interval - elapsed).await;
            }
        }
        *last = Some(Instant::now());
    }

    pub async fn get(&self, url: &str) -> Result<String> {
        let mut attempt = 0u32;
        loop {
            self.wait_for_rate_limit().await;
            let resp = self.client.get(url).send().await;
            match resp {
                Ok(r) if r.status() == StatusCode::TOO_MANY_REQUESTS => {
                    if attempt >= self.max_retries {
                        return Err(CatalogError::RateLimited {
                            retry_after_secs: 60,
                        });
                    }
                    let wait = r
                        .headers()
                        .get(RETRY_AFTER)
                        .and_then(|v| v.to_str().ok())
                        .and_then(|s| s.parse::<u64>().ok())
                        .unwrap_or(1);
                    sleep(Duration::from_secs(wait)).await;
                    attempt += 1;
                }
                Ok(r) if r.status() == StatusCode::NOT_FOUND => {
                    return Err(CatalogError::WorkNotFound(url.to_string()));
                }
                Ok(r) if !r.status().is_success() => {
                    let status = r.status().as_u16();
                    if attempt >= self.max_retries {
                        return Err(CatalogError::Unavailable(format!("HTTP {status} from {url}")));
                    }
                    let backoff = 2u64.pow(attempt);
                    sleep(Duration::from_secs(backoff)).await;
                    attempt += 1;
                }
                Ok(r) => {
                    return r
                        .text()
                        .await
                        .map_err(|e| CatalogError::Unavailable(e.to_string()));
                }
                Err(e) => {
                    if attempt >= self.max_retries {
                        return Err(CatalogError::Unavailable(e.to_string()));
                    }
                    let backoff = 2u64.pow(attempt);
                    sleep(Duration::from_secs(backoff)).await;
                    attempt += 1;
                }
            }
        }
    }
}
