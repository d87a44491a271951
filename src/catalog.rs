//! Upstream catalog client.
//!
//! HTTP client for the third-party author search API. One pooled
//! `reqwest::Client` is shared by all requests; each call is bounded by a
//! timeout. No retries, no caching.

use std::time::{Duration, Instant};

use reqwest::Url;
use tracing::{debug, instrument, warn};

use crate::config::Config;
use crate::error::{AppError, AppResult};
use crate::metrics;
use crate::models::SearchResults;

/// Catalog search client.
#[derive(Clone)]
pub struct CatalogClient {
    client: reqwest::Client,
    search_url: Url,
    default_timeout: Duration,
}

impl CatalogClient {
    /// Create a catalog client from configuration.
    ///
    /// # Errors
    ///
    /// Returns `AppError::ConfigError` if the search URL does not parse and
    /// `AppError::Internal` if the HTTP client cannot be built.
    pub fn new(config: &Config) -> AppResult<Self> {
        let search_url = Url::parse(&config.upstream_search_url).map_err(|e| {
            AppError::ConfigError(format!("Invalid UPSTREAM_SEARCH_URL: {e}"))
        })?;

        let client = reqwest::Client::builder()
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| AppError::Internal(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            search_url,
            default_timeout: config.upstream_timeout,
        })
    }

    /// Build the upstream URL for an author, percent-encoding the value.
    pub fn search_url_for(&self, author: &str) -> Url {
        let mut url = self.search_url.clone();
        url.query_pairs_mut().append_pair("author", author);
        url
    }

    /// Search the catalog by author.
    ///
    /// `timeout` may only shorten the configured upstream timeout.
    ///
    /// An empty result list is returned as `Ok`; deciding that it means
    /// "not found" is the caller's business.
    #[instrument(skip(self))]
    pub async fn search_by_author(
        &self,
        author: &str,
        timeout: Option<Duration>,
    ) -> AppResult<SearchResults> {
        let url = self.search_url_for(author);
        let timeout = timeout
            .map(|t| t.min(self.default_timeout))
            .unwrap_or(self.default_timeout);

        debug!(url = %url, timeout_ms = timeout.as_millis() as u64, "Querying catalog");
        let started = Instant::now();

        let result = self.fetch(url, timeout).await;

        let outcome = match &result {
            Ok(results) if results.is_empty() => "empty",
            Ok(_) => "success",
            Err(AppError::UpstreamDecode(_)) => "decode_error",
            Err(_) => "fetch_error",
        };
        metrics::record_upstream_request(outcome, started.elapsed().as_secs_f64());

        result
    }

    async fn fetch(&self, url: Url, timeout: Duration) -> AppResult<SearchResults> {
        let response = self
            .client
            .get(url)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| {
                warn!(error = %e, "Catalog request failed");
                AppError::UpstreamFetch(e.to_string())
            })?;

        let status = response.status();
        debug!(status = %status, "Catalog response status");

        if !status.is_success() {
            warn!(status = %status, "Catalog returned non-success status");
            return Err(AppError::UpstreamFetch(format!(
                "catalog responded with status {status}"
            )));
        }

        let body = response
            .text()
            .await
            .map_err(|e| AppError::UpstreamFetch(e.to_string()))?;

        let results: SearchResults = serde_json::from_str(&body).map_err(|e| {
            warn!(error = %e, body_len = body.len(), "Failed to parse catalog response");
            AppError::UpstreamDecode(e.to_string())
        })?;

        debug!(results = results.len(), "Catalog search complete");
        Ok(results)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn client_for(url: &str) -> CatalogClient {
        CatalogClient::new(&Config {
            upstream_search_url: url.to_string(),
            ..Config::default()
        })
        .unwrap()
    }

    #[test]
    fn test_search_url_encodes_author() {
        let client = client_for("https://openlibrary.org/search.json");

        let url = client.search_url_for("J.R.R. Tolkien & Co");
        assert_eq!(
            url.as_str(),
            "https://openlibrary.org/search.json?author=J.R.R.+Tolkien+%26+Co"
        );
    }

    #[test]
    fn test_search_url_keeps_existing_query() {
        let client = client_for("https://catalog.example.com/search.json?limit=20");

        let url = client.search_url_for("tolkien");
        assert_eq!(url.query(), Some("limit=20&author=tolkien"));
    }

    #[test]
    fn test_search_url_cannot_inject_params() {
        let client = client_for("https://openlibrary.org/search.json");

        let url = client.search_url_for("x&title=y");
        let pairs: Vec<_> = url.query_pairs().collect();
        assert_eq!(pairs.len(), 1);
        assert_eq!(pairs[0].1, "x&title=y");
    }

    #[test]
    fn test_invalid_url_is_config_error() {
        let result = CatalogClient::new(&Config {
            upstream_search_url: "::nope".to_string(),
            ..Config::default()
        });
        assert!(matches!(result, Err(AppError::ConfigError(_))));
    }
}
