//! Authorization gate for wrapped HTTP services.
//!
//! Reads the `Authorization` header, verifies the bearer token with the
//! shared [`TokenVerifier`], and either forwards the request with the verified
//! claims in its extensions or answers 401 without touching the wrapped
//! service.

use crate::auth::{HttpKeySetFetcher, KeyResolver, KeySetCache, TokenVerifier, VerifiedClaims};
use crate::config::GateConfig;
use crate::errors::unauthorized_response;
use crate::observability::metrics;
use axum::http::{header, Request};
use axum::response::Response;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tower::{Layer, Service};
use tracing::Instrument;

/// Tower layer that puts an [`AuthorizationGate`] in front of a service.
#[derive(Clone)]
pub struct AuthorizationLayer {
    verifier: Arc<TokenVerifier>,
    domain: Option<Arc<str>>,
}

impl AuthorizationLayer {
    /// Create a layer around an existing verifier.
    ///
    /// An empty `domain` is treated as no restriction.
    pub fn new(verifier: Arc<TokenVerifier>, domain: Option<String>) -> Self {
        Self {
            verifier,
            domain: domain.filter(|d| !d.is_empty()).map(Arc::from),
        }
    }

    /// Build the whole verification pipeline (HTTP fetcher, cache, resolver,
    /// verifier) from configuration.
    pub fn from_config(config: &GateConfig) -> Self {
        let fetcher = Arc::new(HttpKeySetFetcher::with_timeout(
            config.jwks_url.clone(),
            config.fetch_timeout(),
        ));
        let resolver = KeyResolver::new(Arc::new(KeySetCache::new()), fetcher)
            .with_cache_ttl(config.cache_ttl());

        let mut verifier = TokenVerifier::new(Arc::new(resolver))
            .with_issuers(config.issuers.clone())
            .with_clock_skew(config.clock_skew());
        if let Some(audience) = &config.audience {
            verifier = verifier.with_audience(audience.clone());
        }

        tracing::info!(
            target: "gate.middleware.auth",
            jwks_url = %config.jwks_url,
            domain = config.domain.as_deref().unwrap_or("<any>"),
            "Authorization gate configured"
        );

        Self::new(Arc::new(verifier), config.domain.clone())
    }

    pub fn verifier(&self) -> &Arc<TokenVerifier> {
        &self.verifier
    }

    pub fn domain(&self) -> Option<&str> {
        self.domain.as_deref()
    }
}

impl<S> Layer<S> for AuthorizationLayer {
    type Service = AuthorizationGate<S>;

    fn layer(&self, inner: S) -> Self::Service {
        AuthorizationGate {
            inner,
            verifier: Arc::clone(&self.verifier),
            domain: self.domain.clone(),
        }
    }
}

/// Tower service that rejects requests without a valid bearer token.
#[derive(Clone)]
pub struct AuthorizationGate<S> {
    inner: S,
    verifier: Arc<TokenVerifier>,
    domain: Option<Arc<str>>,
}

impl<S, B> Service<Request<B>> for AuthorizationGate<S>
where
    S: Service<Request<B>, Response = Response> + Clone + Send + 'static,
    S::Future: Send + 'static,
    B: Send + 'static,
{
    type Response = Response;
    type Error = S::Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut req: Request<B>) -> Self::Future {
        // Keep the service that was polled ready; leave a fresh clone behind.
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);
        let verifier = Arc::clone(&self.verifier);
        let domain = self.domain.clone();

        let span = tracing::debug_span!(
            "gate.middleware.auth",
            method = %req.method(),
            path = %req.uri().path()
        );

        Box::pin(
            async move {
                let header_value = match req.headers().get(header::AUTHORIZATION) {
                    Some(value) => value,
                    None => {
                        tracing::debug!(target: "gate.middleware.auth", "Missing Authorization header");
                        return Ok(reject("missing_header"));
                    }
                };

                // Owned so the request can be mutated after verification.
                let token = match header_value.to_str() {
                    Ok(token) => token.to_owned(),
                    Err(_) => {
                        tracing::debug!(target: "gate.middleware.auth", "Invalid Authorization header encoding");
                        return Ok(reject("invalid_header"));
                    }
                };

                match verifier.check(&token, domain.as_deref()).await {
                    Ok(claims) => {
                        metrics::record_gate_outcome("forwarded");
                        req.extensions_mut().insert(claims);
                        inner.call(req).await
                    }
                    Err(e) => {
                        tracing::debug!(
                            target: "gate.middleware.auth",
                            reason = e.reason(),
                            "Request rejected"
                        );
                        Ok(reject(e.reason()))
                    }
                }
            }
            .instrument(span),
        )
    }
}

fn reject(reason: &'static str) -> Response {
    metrics::record_gate_outcome("rejected");
    metrics::record_rejection(reason);
    unauthorized_response()
}

/// Access to the claims the gate attached to a forwarded request.
pub trait ClaimsExt {
    /// Returns `None` if the request did not pass through the gate.
    fn verified_claims(&self) -> Option<&VerifiedClaims>;
}

impl<B> ClaimsExt for Request<B> {
    fn verified_claims(&self) -> Option<&VerifiedClaims> {
        self.extensions().get::<VerifiedClaims>()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::auth::{KeySet, KeySetFetcher};
    use crate::errors::{FetchError, UNAUTHORIZED_BODY};
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::StatusCode;
    use axum::response::IntoResponse;
    use http_body_util::BodyExt;
    use std::convert::Infallible;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tower::ServiceExt;

    struct EmptyFetcher {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl KeySetFetcher for EmptyFetcher {
        async fn fetch(&self) -> Result<KeySet, FetchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            KeySet::from_keys(Vec::new())
        }
    }

    fn test_layer(domain: Option<&str>) -> (AuthorizationLayer, Arc<EmptyFetcher>) {
        let fetcher = Arc::new(EmptyFetcher {
            calls: AtomicUsize::new(0),
        });
        let resolver = KeyResolver::new(Arc::new(KeySetCache::new()), fetcher.clone());
        let verifier = Arc::new(TokenVerifier::new(Arc::new(resolver)));
        (
            AuthorizationLayer::new(verifier, domain.map(ToString::to_string)),
            fetcher,
        )
    }

    /// Wrapped service that counts calls.
    #[derive(Clone)]
    struct CountingHandler {
        hits: Arc<AtomicUsize>,
    }

    impl Service<Request<Body>> for CountingHandler {
        type Response = Response;
        type Error = Infallible;
        type Future = std::future::Ready<Result<Response, Infallible>>;

        fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
            Poll::Ready(Ok(()))
        }

        fn call(&mut self, _req: Request<Body>) -> Self::Future {
            self.hits.fetch_add(1, Ordering::SeqCst);
            std::future::ready(Ok("ok".into_response()))
        }
    }

    fn counting_handler(hits: Arc<AtomicUsize>) -> CountingHandler {
        CountingHandler { hits }
    }

    async fn assert_unauthorized(response: Response) {
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert!(response.headers().contains_key(header::WWW_AUTHENTICATE));
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(bytes.as_ref(), UNAUTHORIZED_BODY.as_bytes());
    }

    #[test]
    fn test_layer_and_gate_are_clone() {
        fn assert_clone<T: Clone>() {}
        assert_clone::<AuthorizationLayer>();
        assert_clone::<AuthorizationGate<()>>();
    }

    #[test]
    fn test_empty_domain_is_no_restriction() {
        let (layer, _) = test_layer(Some(""));
        assert_eq!(layer.domain(), None);

        let (layer, _) = test_layer(Some("example.com"));
        assert_eq!(layer.domain(), Some("example.com"));
    }

    #[test]
    fn test_from_config_carries_domain() {
        let layer = AuthorizationLayer::from_config(&GateConfig::for_domain("example.com"));
        assert_eq!(layer.domain(), Some("example.com"));
        assert_eq!(
            layer.verifier().resolver().cache_ttl(),
            GateConfig::default().cache_ttl()
        );
    }

    #[tokio::test]
    async fn test_missing_header_rejected_without_verification() {
        let (layer, fetcher) = test_layer(None);
        let hits = Arc::new(AtomicUsize::new(0));
        let gate = layer.layer(counting_handler(Arc::clone(&hits)));

        let request = Request::builder().uri("/").body(Body::empty()).unwrap();
        let response = gate.oneshot(request).await.unwrap();

        assert_unauthorized(response).await;
        assert_eq!(hits.load(Ordering::SeqCst), 0);
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_non_utf8_header_rejected() {
        let (layer, fetcher) = test_layer(None);
        let hits = Arc::new(AtomicUsize::new(0));
        let gate = layer.layer(counting_handler(Arc::clone(&hits)));

        let request = Request::builder()
            .uri("/")
            .header(
                header::AUTHORIZATION,
                header::HeaderValue::from_bytes(b"Bearer \xff\xfe").unwrap(),
            )
            .body(Body::empty())
            .unwrap();
        let response = gate.oneshot(request).await.unwrap();

        assert_unauthorized(response).await;
        assert_eq!(hits.load(Ordering::SeqCst), 0);
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_malformed_token_rejected() {
        let (layer, fetcher) = test_layer(None);
        let hits = Arc::new(AtomicUsize::new(0));
        let gate = layer.layer(counting_handler(Arc::clone(&hits)));

        let request = Request::builder()
            .uri("/")
            .header(header::AUTHORIZATION, "Bearer not-a-token")
            .body(Body::empty())
            .unwrap();
        let response = gate.oneshot(request).await.unwrap();

        assert_unauthorized(response).await;
        assert_eq!(hits.load(Ordering::SeqCst), 0);
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 0, "parse fails before any fetch");
    }

    #[test]
    fn test_claims_ext_absent_without_gate() {
        let request = Request::builder().body(Body::empty()).unwrap();
        assert!(request.verified_claims().is_none());
    }
}
