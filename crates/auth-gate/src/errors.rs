//! Auth gate error types.
//!
//! Every failure in the verification pipeline has a distinct variant so it can
//! be logged and counted, but all of them map to the same generic
//! `401 Unauthorized` response via the `IntoResponse` impl. Clients never learn
//! which step rejected their token.

use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};
use common::jwt::JwtValidationError;
use thiserror::Error;

/// Fixed body of every rejection.
pub const UNAUTHORIZED_BODY: &str = "Unauthorized";

/// `WWW-Authenticate` challenge sent with every rejection.
pub const WWW_AUTHENTICATE_CHALLENGE: &str = "Bearer realm=\"auth-gate\", error=\"invalid_token\"";

/// Failure to obtain a key set from the identity provider.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FetchError {
    #[error("JWKS request failed: {0}")]
    Request(String),

    #[error("JWKS endpoint returned status {0}")]
    Status(u16),

    #[error("Malformed key set: {0}")]
    Malformed(String),
}

impl FetchError {
    /// Bounded label for logs and metrics.
    pub fn reason(&self) -> &'static str {
        match self {
            FetchError::Request(_) => "request",
            FetchError::Status(_) => "status",
            FetchError::Malformed(_) => "malformed",
        }
    }
}

/// A claim did not satisfy the gate's constraints.
#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
pub enum ClaimError {
    #[error("domain claim does not match")]
    DomainMismatch,

    #[error("token expired")]
    Expired,

    #[error("token not yet valid")]
    NotYetValid,

    #[error("audience does not match")]
    InvalidAudience,

    #[error("issuer does not match")]
    InvalidIssuer,
}

/// Verification pipeline error.
///
/// - Parse: token structure, header or payload is malformed
/// - Claim: a claim constraint failed (domain, time, audience, issuer)
/// - Fetch: the key set could not be obtained
/// - KeyNotFound: the kid was absent after the bounded refresh
/// - SignatureInvalid: no resolved key verified the signature
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Malformed token: {0}")]
    Parse(#[from] JwtValidationError),

    #[error("Claim check failed: {0}")]
    Claim(#[from] ClaimError),

    #[error("Key set unavailable: {0}")]
    Fetch(#[from] FetchError),

    #[error("Signing key not found: {kid}")]
    KeyNotFound { kid: String },

    #[error("Signature verification failed")]
    SignatureInvalid,
}

impl AuthError {
    /// Bounded label for logs and metrics.
    pub fn reason(&self) -> &'static str {
        match self {
            AuthError::Parse(e) => e.reason(),
            AuthError::Claim(ClaimError::DomainMismatch) => "domain_mismatch",
            AuthError::Claim(ClaimError::Expired) => "expired",
            AuthError::Claim(ClaimError::NotYetValid) => "not_yet_valid",
            AuthError::Claim(ClaimError::InvalidAudience) => "invalid_audience",
            AuthError::Claim(ClaimError::InvalidIssuer) => "invalid_issuer",
            AuthError::Fetch(_) => "key_set_unavailable",
            AuthError::KeyNotFound { .. } => "key_not_found",
            AuthError::SignatureInvalid => "signature_invalid",
        }
    }
}

/// Build the generic rejection response.
pub fn unauthorized_response() -> Response {
    let mut response = (StatusCode::UNAUTHORIZED, UNAUTHORIZED_BODY).into_response();
    response.headers_mut().insert(
        header::WWW_AUTHENTICATE,
        HeaderValue::from_static(WWW_AUTHENTICATE_CHALLENGE),
    );
    response
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        unauthorized_response()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use axum::body::Body;
    use http_body_util::BodyExt;

    async fn read_body_string(body: Body) -> String {
        let bytes = body.collect().await.unwrap().to_bytes();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[test]
    fn test_display_fetch_errors() {
        assert_eq!(
            FetchError::Status(503).to_string(),
            "JWKS endpoint returned status 503"
        );
        assert_eq!(
            FetchError::Malformed("missing kid".to_string()).to_string(),
            "Malformed key set: missing kid"
        );
    }

    #[test]
    fn test_display_key_not_found() {
        let error = AuthError::KeyNotFound {
            kid: "rotated-key".to_string(),
        };
        assert_eq!(error.to_string(), "Signing key not found: rotated-key");
    }

    #[test]
    fn test_from_conversions() {
        let parse: AuthError = JwtValidationError::MissingKid.into();
        assert!(matches!(parse, AuthError::Parse(JwtValidationError::MissingKid)));

        let claim: AuthError = ClaimError::DomainMismatch.into();
        assert!(matches!(claim, AuthError::Claim(ClaimError::DomainMismatch)));

        let fetch: AuthError = FetchError::Status(500).into();
        assert!(matches!(fetch, AuthError::Fetch(FetchError::Status(500))));
    }

    #[test]
    fn test_reasons() {
        assert_eq!(
            AuthError::Parse(JwtValidationError::MalformedPayload).reason(),
            "malformed_payload"
        );
        assert_eq!(
            AuthError::Claim(ClaimError::DomainMismatch).reason(),
            "domain_mismatch"
        );
        assert_eq!(
            AuthError::Fetch(FetchError::Request("timeout".to_string())).reason(),
            "key_set_unavailable"
        );
        assert_eq!(
            AuthError::KeyNotFound {
                kid: "k".to_string()
            }
            .reason(),
            "key_not_found"
        );
        assert_eq!(AuthError::SignatureInvalid.reason(), "signature_invalid");
        assert_eq!(FetchError::Status(404).reason(), "status");
    }

    #[tokio::test]
    async fn test_every_error_is_a_generic_401() {
        let errors = vec![
            AuthError::Parse(JwtValidationError::MalformedToken),
            AuthError::Claim(ClaimError::DomainMismatch),
            AuthError::Fetch(FetchError::Status(503)),
            AuthError::KeyNotFound {
                kid: "secret-kid".to_string(),
            },
            AuthError::SignatureInvalid,
        ];

        for error in errors {
            let response = error.into_response();
            assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

            let www_auth = response
                .headers()
                .get(header::WWW_AUTHENTICATE)
                .unwrap()
                .to_str()
                .unwrap();
            assert!(www_auth.contains("Bearer realm=\"auth-gate\""));

            let body = read_body_string(response.into_body()).await;
            assert_eq!(body, "Unauthorized");
        }
    }
}
