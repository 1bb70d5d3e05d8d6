//! Bearer token verification against the provider's JWKS.
//!
//! # Security
//!
//! - Tokens are size-checked BEFORE parsing (DoS prevention, in `common::jwt`)
//! - The algorithm comes from the JWK, never from the token alone; a header
//!   `alg` that disagrees with the key is rejected
//! - `exp` and `nbf` are enforced when present, with clock skew tolerance
//! - The domain constraint is checked before the signature as a cheap filter.
//!   Both failures produce the same rejection, so the ordering reveals nothing
//!   to the caller.
//! - Every failure collapses to `false` in [`TokenVerifier::verify`]; the
//!   reason is only logged

use crate::auth::claims::{VerifiedClaims, DOMAIN_CLAIM};
use crate::auth::keyset::Jwk;
use crate::auth::resolver::KeyResolver;
use crate::errors::{AuthError, ClaimError};
use common::jwt::{parse_token, strip_bearer};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde_json::{Map, Value};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tracing::instrument;

/// Default tolerance for `exp`/`nbf` checks.
pub const DEFAULT_CLOCK_SKEW: Duration = Duration::from_secs(60);

/// Largest clock skew tolerance accepted from configuration.
pub const MAX_CLOCK_SKEW: Duration = Duration::from_secs(600);

/// Verifies compact signed tokens using keys from a [`KeyResolver`].
pub struct TokenVerifier {
    /// Resolver owning the shared key-set cache.
    resolver: Arc<KeyResolver>,

    /// Required `aud`, if any.
    audience: Option<String>,

    /// Accepted `iss` values; empty means any.
    issuers: Vec<String>,

    /// Leeway for time-based claims.
    clock_skew: Duration,
}

impl TokenVerifier {
    /// Create a verifier with no audience or issuer restriction.
    pub fn new(resolver: Arc<KeyResolver>) -> Self {
        Self {
            resolver,
            audience: None,
            issuers: Vec::new(),
            clock_skew: DEFAULT_CLOCK_SKEW,
        }
    }

    /// Require the token's `aud` to contain `audience`.
    pub fn with_audience(mut self, audience: impl Into<String>) -> Self {
        self.audience = Some(audience.into());
        self
    }

    /// Require the token's `iss` to be one of `issuers` (ignored if empty).
    pub fn with_issuers(mut self, issuers: Vec<String>) -> Self {
        self.issuers = issuers;
        self
    }

    pub fn with_clock_skew(mut self, clock_skew: Duration) -> Self {
        self.clock_skew = clock_skew;
        self
    }

    pub fn resolver(&self) -> &Arc<KeyResolver> {
        &self.resolver
    }

    /// Decide whether `token` is authorized.
    ///
    /// `token` may carry a leading `"Bearer "`. A `domain` of `None` or `""`
    /// means no domain restriction. Never fails: every error is logged and
    /// reported as `false`.
    pub async fn verify(&self, token: &str, domain: Option<&str>) -> bool {
        match self.check(token, domain).await {
            Ok(_) => true,
            Err(e) => {
                tracing::debug!(
                    target: "gate.auth.verifier",
                    reason = e.reason(),
                    error = %e,
                    "Token rejected"
                );
                false
            }
        }
    }

    /// Verify `token` and return its claims.
    ///
    /// # Steps
    ///
    /// 1. Strip an optional `"Bearer "` prefix
    /// 2. Parse header, payload and signature (kid required)
    /// 3. Compare the `hd` claim to `domain`, if one is configured
    /// 4. Resolve the signing keys for the kid
    /// 5. Verify the signature and time/audience/issuer claims; any key may match
    ///
    /// # Errors
    ///
    /// Returns the `AuthError` of the first failing step. When several keys
    /// are resolved and none verifies, the error from the last key is returned.
    #[instrument(skip_all)]
    pub async fn check(
        &self,
        token: &str,
        domain: Option<&str>,
    ) -> Result<VerifiedClaims, AuthError> {
        let token = strip_bearer(token);
        let parsed = parse_token(token)?;

        if let Some(expected) = domain.filter(|d| !d.is_empty()) {
            if parsed.claim_str(DOMAIN_CLAIM) != Some(expected) {
                tracing::debug!(
                    target: "gate.auth.verifier",
                    kid = %parsed.kid(),
                    "Domain claim does not match configured domain"
                );
                return Err(ClaimError::DomainMismatch.into());
            }
        }

        let keys = self.resolver.resolve(parsed.kid()).await?;

        let mut last_error = AuthError::SignatureInvalid;
        for jwk in keys.iter().filter(|jwk| jwk.is_signing_key()) {
            match self.verify_with_key(token, jwk) {
                Ok(()) => {
                    tracing::debug!(target: "gate.auth.verifier", kid = %jwk.kid, "Token validated successfully");
                    return Ok(VerifiedClaims::new(parsed.claims));
                }
                Err(e) => last_error = e,
            }
        }

        Err(last_error)
    }

    fn validation_for(&self, algorithm: Algorithm) -> Validation {
        let mut validation = Validation::new(algorithm);
        // Time claims are checked when present, not required
        validation.required_spec_claims.clear();
        validation.validate_exp = true;
        validation.validate_nbf = true;
        validation.leeway = self.clock_skew.as_secs();

        // A configured audience or issuer list also makes the claim mandatory
        match &self.audience {
            Some(audience) => {
                validation.set_audience(&[audience]);
                validation.required_spec_claims.insert("aud".to_string());
            }
            None => validation.validate_aud = false,
        }
        if !self.issuers.is_empty() {
            validation.set_issuer(&self.issuers);
            validation.required_spec_claims.insert("iss".to_string());
        }

        validation
    }

    /// Verify signature and claims with a single key.
    fn verify_with_key(&self, token: &str, jwk: &Jwk) -> Result<(), AuthError> {
        let algorithm = Algorithm::from_str(&jwk.alg).map_err(|_| {
            tracing::warn!(target: "gate.auth.verifier", kid = %jwk.kid, alg = %jwk.alg, "Unsupported JWK algorithm");
            AuthError::SignatureInvalid
        })?;

        let decoding_key = decoding_key(jwk)?;

        decode::<Map<String, Value>>(token, &decoding_key, &self.validation_for(algorithm))
            .map(|_| ())
            .map_err(|e| {
                tracing::debug!(target: "gate.auth.verifier", kid = %jwk.kid, error = %e, "Token verification failed");
                map_jwt_error(&e)
            })
    }
}

/// Build a decoding key from the JWK's public components.
fn decoding_key(jwk: &Jwk) -> Result<DecodingKey, AuthError> {
    let result = match (jwk.kty.as_str(), &jwk.n, &jwk.e, &jwk.x, &jwk.y) {
        ("RSA", Some(n), Some(e), _, _) => DecodingKey::from_rsa_components(n, e),
        ("EC", _, _, Some(x), Some(y)) => DecodingKey::from_ec_components(x, y),
        ("OKP", _, _, Some(x), _) => DecodingKey::from_ed_components(x),
        _ => {
            tracing::error!(target: "gate.auth.verifier", kid = %jwk.kid, kty = %jwk.kty, "JWK missing key material");
            return Err(AuthError::SignatureInvalid);
        }
    };

    result.map_err(|e| {
        tracing::error!(target: "gate.auth.verifier", kid = %jwk.kid, error = %e, "Invalid public key encoding");
        AuthError::SignatureInvalid
    })
}

fn map_jwt_error(error: &jsonwebtoken::errors::Error) -> AuthError {
    match error.kind() {
        ErrorKind::ExpiredSignature => ClaimError::Expired.into(),
        ErrorKind::ImmatureSignature => ClaimError::NotYetValid.into(),
        ErrorKind::InvalidAudience => ClaimError::InvalidAudience.into(),
        ErrorKind::InvalidIssuer => ClaimError::InvalidIssuer.into(),
        ErrorKind::MissingRequiredClaim(claim) if claim == "aud" => ClaimError::InvalidAudience.into(),
        ErrorKind::MissingRequiredClaim(claim) if claim == "iss" => ClaimError::InvalidIssuer.into(),
        _ => AuthError::SignatureInvalid,
    }
}
