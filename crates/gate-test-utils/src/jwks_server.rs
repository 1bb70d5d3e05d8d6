//! Mock JWKS endpoint backed by wiremock.

use crate::crypto_fixtures::{jwks_body, TestKeypair};
use std::time::Duration;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Path the mock serves its document on.
pub const JWKS_PATH: &str = "/oauth2/v3/certs";

/// A provider JWKS endpoint whose published keys can be swapped at runtime.
///
/// Every change of behaviour resets the underlying server, which also
/// clears its request journal.
pub struct MockJwksServer {
    server: MockServer,
}

impl MockJwksServer {
    /// Start a server that publishes no mock yet (requests get 404).
    pub async fn start() -> Self {
        Self {
            server: MockServer::start().await,
        }
    }

    /// Start a server already publishing `keys`.
    pub async fn with_keys(keys: &[&TestKeypair]) -> Self {
        let server = Self::start().await;
        server.serve(keys).await;
        server
    }

    pub fn url(&self) -> String {
        format!("{}{}", self.server.uri(), JWKS_PATH)
    }

    /// Publish exactly `keys` from now on.
    pub async fn serve(&self, keys: &[&TestKeypair]) {
        self.mount(ResponseTemplate::new(200).set_body_json(jwks_body(keys)))
            .await;
    }

    /// Answer every fetch with `status`.
    pub async fn fail_with(&self, status: u16) {
        self.mount(ResponseTemplate::new(status)).await;
    }

    /// Publish `keys`, but only after `delay`.
    pub async fn serve_slowly(&self, keys: &[&TestKeypair], delay: Duration) {
        self.mount(
            ResponseTemplate::new(200)
                .set_body_json(jwks_body(keys))
                .set_delay(delay),
        )
        .await;
    }

    /// Number of JWKS requests received since the last reset.
    pub async fn fetch_count(&self) -> usize {
        self.server
            .received_requests()
            .await
            .map(|requests| requests.len())
            .unwrap_or(0)
    }

    async fn mount(&self, response: ResponseTemplate) {
        self.server.reset().await;
        Mock::given(method("GET"))
            .and(path(JWKS_PATH))
            .respond_with(response)
            .mount(&self.server)
            .await;
    }
}
