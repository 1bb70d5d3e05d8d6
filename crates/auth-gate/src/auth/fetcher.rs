//! Key-set fetching from the identity provider's JWKS endpoint.
//!
//! The fetcher is a pure I/O boundary: one outbound request per call, no
//! caching. Caching and retries live in the resolver.
//!
//! # Security
//!
//! - HTTPS should be used in production (rustls; enforced by deployment config)
//! - Requests carry an explicit timeout so a slow provider cannot pin requests
//! - Key material is never logged, only key counts and IDs

use crate::auth::keyset::{JwksDocument, KeySet};
use crate::errors::FetchError;
use crate::observability::metrics;
use async_trait::async_trait;
use std::time::{Duration, Instant};
use tracing::instrument;

/// Default timeout for one JWKS request.
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(5);

/// Google's published OAuth2 signing keys.
pub const DEFAULT_JWKS_URL: &str = "https://www.googleapis.com/oauth2/v3/certs";

/// Source of the provider's current key set.
///
/// Implemented over HTTP by [`HttpKeySetFetcher`]; tests substitute in-memory
/// fetchers.
#[async_trait]
pub trait KeySetFetcher: Send + Sync {
    /// Retrieve and validate the current key set.
    ///
    /// # Errors
    ///
    /// Returns `FetchError` on transport failure, non-2xx status, or a
    /// malformed document.
    async fn fetch(&self) -> Result<KeySet, FetchError>;
}

/// Fetches the key set with a GET to a JWKS URL.
#[derive(Debug, Clone)]
pub struct HttpKeySetFetcher {
    /// URL to the JWKS endpoint.
    jwks_url: String,

    /// HTTP client for fetching JWKS.
    http_client: reqwest::Client,
}

impl HttpKeySetFetcher {
    /// Create a fetcher with the default request timeout.
    pub fn new(jwks_url: String) -> Self {
        Self::with_timeout(jwks_url, DEFAULT_FETCH_TIMEOUT)
    }

    /// Create a fetcher with a custom request timeout.
    pub fn with_timeout(jwks_url: String, timeout: Duration) -> Self {
        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|e| {
                tracing::warn!(target: "gate.auth.jwks", error = %e, "Failed to build HTTP client with custom config, using defaults");
                reqwest::Client::new()
            });

        Self {
            jwks_url,
            http_client,
        }
    }

    pub fn jwks_url(&self) -> &str {
        &self.jwks_url
    }

    async fn fetch_once(&self) -> Result<KeySet, FetchError> {
        let response = self
            .http_client
            .get(&self.jwks_url)
            .send()
            .await
            .map_err(|e| {
                tracing::error!(target: "gate.auth.jwks", error = %e, "Failed to fetch JWKS");
                FetchError::Request(e.to_string())
            })?;

        let status = response.status();
        if !status.is_success() {
            tracing::error!(
                target: "gate.auth.jwks",
                status = %status,
                "JWKS endpoint returned error"
            );
            return Err(FetchError::Status(status.as_u16()));
        }

        let body = response.bytes().await.map_err(|e| {
            tracing::error!(target: "gate.auth.jwks", error = %e, "Failed to read JWKS response");
            FetchError::Request(e.to_string())
        })?;

        let document: JwksDocument = serde_json::from_slice(&body).map_err(|e| {
            tracing::error!(target: "gate.auth.jwks", error = %e, "Failed to parse JWKS response");
            FetchError::Malformed(e.to_string())
        })?;

        KeySet::try_from(document).map_err(|e| {
            tracing::error!(target: "gate.auth.jwks", error = %e, "JWKS response failed validation");
            e
        })
    }
}

#[async_trait]
impl KeySetFetcher for HttpKeySetFetcher {
    #[instrument(skip_all, fields(url = %self.jwks_url))]
    async fn fetch(&self) -> Result<KeySet, FetchError> {
        tracing::debug!(target: "gate.auth.jwks", url = %self.jwks_url, "Fetching JWKS");

        let started = Instant::now();
        let result = self.fetch_once().await;
        let status = match &result {
            Ok(_) => "success",
            Err(e) => e.reason(),
        };
        metrics::record_jwks_fetch(status, started.elapsed());

        if let Ok(keys) = &result {
            tracing::debug!(
                target: "gate.auth.jwks",
                key_count = keys.len(),
                "JWKS fetched"
            );
        }

        result
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const JWKS_PATH: &str = "/oauth2/v3/certs";

    fn google_style_jwks() -> serde_json::Value {
        serde_json::json!({
            "keys": [
                {
                    "kty": "RSA",
                    "kid": "rsa-key-1",
                    "alg": "RS256",
                    "use": "sig",
                    "n": "sXchDaQebHnPiGvyDOAT4saGEUetSyo9MKLOoWFsueri",
                    "e": "AQAB"
                },
                {
                    "kty": "RSA",
                    "kid": "rsa-key-2",
                    "alg": "RS256",
                    "use": "sig",
                    "n": "ofgWCuLjybRlzo0tZWJjNiuSfb4p4fAkd_wWJcyQoTbj",
                    "e": "AQAB"
                }
            ]
        })
    }

    async fn serve(template: ResponseTemplate) -> MockServer {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(JWKS_PATH))
            .respond_with(template)
            .mount(&server)
            .await;
        server
    }

    fn fetcher_for(server: &MockServer) -> HttpKeySetFetcher {
        HttpKeySetFetcher::new(format!("{}{}", server.uri(), JWKS_PATH))
    }

    #[test]
    fn test_fetcher_creation() {
        let fetcher = HttpKeySetFetcher::new(DEFAULT_JWKS_URL.to_string());
        assert_eq!(fetcher.jwks_url(), "https://www.googleapis.com/oauth2/v3/certs");
    }

    #[tokio::test]
    async fn test_fetch_success() {
        let server = serve(ResponseTemplate::new(200).set_body_json(google_style_jwks())).await;

        let keys = fetcher_for(&server).fetch().await.unwrap();

        assert_eq!(keys.kids().collect::<Vec<_>>(), vec!["rsa-key-1", "rsa-key-2"]);
    }

    #[tokio::test]
    async fn test_fetch_non_2xx_is_status_error() {
        let server = serve(ResponseTemplate::new(503)).await;

        let err = fetcher_for(&server).fetch().await.unwrap_err();
        assert_eq!(err, FetchError::Status(503));
    }

    #[tokio::test]
    async fn test_fetch_invalid_json_is_malformed() {
        let server = serve(ResponseTemplate::new(200).set_body_string("<html>oops</html>")).await;

        let err = fetcher_for(&server).fetch().await.unwrap_err();
        assert!(matches!(err, FetchError::Malformed(_)));
    }

    #[tokio::test]
    async fn test_fetch_entry_missing_material_is_malformed() {
        let body = serde_json::json!({
            "keys": [{"kty": "RSA", "kid": "rsa-key-1", "alg": "RS256", "n": "abc"}]
        });
        let server = serve(ResponseTemplate::new(200).set_body_json(body)).await;

        let err = fetcher_for(&server).fetch().await.unwrap_err();
        assert!(matches!(err, FetchError::Malformed(msg) if msg.contains("rsa-key-1")));
    }

    #[tokio::test]
    async fn test_fetch_entry_missing_alg_is_malformed() {
        let body = serde_json::json!({
            "keys": [{"kty": "RSA", "kid": "rsa-key-1", "n": "abc", "e": "AQAB"}]
        });
        let server = serve(ResponseTemplate::new(200).set_body_json(body)).await;

        let err = fetcher_for(&server).fetch().await.unwrap_err();
        assert!(matches!(err, FetchError::Malformed(_)));
    }

    #[tokio::test]
    async fn test_fetch_times_out() {
        let server = serve(
            ResponseTemplate::new(200)
                .set_body_json(google_style_jwks())
                .set_delay(Duration::from_secs(2)),
        )
        .await;
        let fetcher = HttpKeySetFetcher::with_timeout(
            format!("{}{}", server.uri(), JWKS_PATH),
            Duration::from_millis(100),
        );

        let err = fetcher.fetch().await.unwrap_err();
        assert!(matches!(err, FetchError::Request(_)));
    }

    #[tokio::test]
    async fn test_fetch_unreachable_provider() {
        let fetcher = HttpKeySetFetcher::with_timeout(
            "http://127.0.0.1:1/certs".to_string(),
            Duration::from_secs(1),
        );

        let err = fetcher.fetch().await.unwrap_err();
        assert!(matches!(err, FetchError::Request(_)));
    }

    #[tokio::test]
    async fn test_each_fetch_hits_the_network() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(JWKS_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(google_style_jwks()))
            .expect(2)
            .mount(&server)
            .await;

        let fetcher = fetcher_for(&server);
        fetcher.fetch().await.unwrap();
        fetcher.fetch().await.unwrap();

        server.verify().await;
    }
}
