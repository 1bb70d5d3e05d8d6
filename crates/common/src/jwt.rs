//! Compact JWT utilities shared by the gate and its test harness.
//!
//! This module provides the parts of token handling that do not need a key:
//! - Size limits for DoS prevention
//! - Splitting a compact token into its three segments
//! - Key ID extraction from the protected header
//! - Payload claim decoding
//! - Bearer prefix stripping
//!
//! # Security
//!
//! - Tokens are size-checked BEFORE parsing (DoS prevention)
//! - Nothing here verifies a signature; a [`ParsedToken`] is untrusted until
//!   the caller has verified it against a key from a trusted JWKS
//! - Generic error messages prevent information leakage
//!
//! # Usage
//!
//! ```rust,ignore
//! use common::jwt::{parse_token, strip_bearer};
//!
//! let parsed = parse_token(strip_bearer(header_value))?;
//! let keys = resolver.resolve(parsed.kid()).await?;
//! ```

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use serde_json::{Map, Value};
use std::fmt;
use thiserror::Error;

// =============================================================================
// Constants
// =============================================================================

/// Maximum allowed JWT size in bytes (8KB).
///
/// JWTs larger than this size are rejected BEFORE any base64 decoding or
/// cryptographic operations.
///
/// - Typical provider ID tokens are 800-1500 bytes (RS256 signature, profile claims)
/// - 8KB allows for reasonable expansion while preventing abuse
pub const MAX_JWT_SIZE_BYTES: usize = 8192; // 8KB

/// Authorization scheme prefix, including the separating space.
pub const BEARER_PREFIX: &str = "Bearer ";

// =============================================================================
// Error Types
// =============================================================================

/// Errors that can occur while parsing a compact token.
///
/// Note: Error messages are intentionally generic to prevent information leakage.
/// Use [`JwtValidationError::reason`] for a log-friendly label.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum JwtValidationError {
    /// Token size exceeds maximum allowed.
    #[error("The access token is invalid or expired")]
    TokenTooLarge,

    /// Token format is invalid (segment count, base64, header JSON).
    #[error("The access token is invalid or expired")]
    MalformedToken,

    /// Token is missing required `kid` header.
    #[error("The access token is invalid or expired")]
    MissingKid,

    /// Signature segment is empty.
    #[error("The access token is invalid or expired")]
    MissingSignature,

    /// Payload is not a JSON object.
    #[error("The access token is invalid or expired")]
    MalformedPayload,
}

impl JwtValidationError {
    /// Bounded label for logs and metrics.
    #[must_use]
    pub fn reason(&self) -> &'static str {
        match self {
            Self::TokenTooLarge => "token_too_large",
            Self::MalformedToken => "malformed_token",
            Self::MissingKid => "missing_kid",
            Self::MissingSignature => "missing_signature",
            Self::MalformedPayload => "malformed_payload",
        }
    }
}

// =============================================================================
// Parsed token
// =============================================================================

/// Decoded protected header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenHeader {
    /// Signing algorithm named by the token (e.g. `RS256`).
    pub alg: String,

    /// Key ID used to select the verification key.
    pub kid: String,

    /// Token type, usually `JWT`.
    pub typ: Option<String>,
}

/// A compact token split and decoded, but NOT verified.
///
/// Created per verification attempt and dropped once a decision is made.
/// The Debug output lists claim names only and the signature length, so a
/// stray `{:?}` never writes token contents to the logs.
#[derive(Clone)]
pub struct ParsedToken {
    /// Decoded protected header.
    pub header: TokenHeader,

    /// Decoded payload claims.
    pub claims: Map<String, Value>,

    /// Raw signature bytes (never empty).
    pub signature: Vec<u8>,
}

impl fmt::Debug for ParsedToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ParsedToken")
            .field("header", &self.header)
            .field("claims", &self.claims.keys().collect::<Vec<_>>())
            .field("signature_len", &self.signature.len())
            .finish()
    }
}

impl ParsedToken {
    /// Key ID from the protected header.
    #[must_use]
    pub fn kid(&self) -> &str {
        &self.header.kid
    }

    /// Look up a claim that is expected to be a string.
    ///
    /// Returns `None` if the claim is absent or not a string.
    #[must_use]
    pub fn claim_str(&self, name: &str) -> Option<&str> {
        self.claims.get(name).and_then(Value::as_str)
    }
}

// =============================================================================
// Functions
// =============================================================================

/// Strip a leading `"Bearer "` from an Authorization header value.
///
/// The scheme is matched case-insensitively (RFC 7235). A value without the
/// prefix is returned unchanged; the caller then treats it as a bare token.
#[must_use]
pub fn strip_bearer(value: &str) -> &str {
    match value.get(..BEARER_PREFIX.len()) {
        Some(scheme) if scheme.eq_ignore_ascii_case(BEARER_PREFIX) => {
            value.get(BEARER_PREFIX.len()..).unwrap_or(value)
        }
        _ => value,
    }
}

/// Split a compact token into `(header, payload, signature)` segments.
///
/// # Errors
///
/// - `TokenTooLarge` - Token exceeds `MAX_JWT_SIZE_BYTES`
/// - `MalformedToken` - Token does not have exactly three segments
fn split_segments(token: &str) -> Result<(&str, &str, &str), JwtValidationError> {
    // Check token size first (DoS prevention)
    if token.len() > MAX_JWT_SIZE_BYTES {
        tracing::debug!(
            target: "common.jwt",
            token_size = token.len(),
            max_size = MAX_JWT_SIZE_BYTES,
            "Token rejected: size exceeds maximum allowed"
        );
        return Err(JwtValidationError::TokenTooLarge);
    }

    // JWT format: header.payload.signature
    let mut parts = token.split('.');
    match (parts.next(), parts.next(), parts.next(), parts.next()) {
        (Some(header), Some(payload), Some(signature), None) => Ok((header, payload, signature)),
        _ => {
            tracing::debug!(
                target: "common.jwt",
                parts = token.split('.').count(),
                "Token rejected: invalid JWT format"
            );
            Err(JwtValidationError::MalformedToken)
        }
    }
}

fn decode_header(segment: &str) -> Result<TokenHeader, JwtValidationError> {
    let header_bytes = URL_SAFE_NO_PAD.decode(segment).map_err(|e| {
        tracing::debug!(target: "common.jwt", error = %e, "Failed to decode JWT header base64");
        JwtValidationError::MalformedToken
    })?;

    let header: Value = serde_json::from_slice(&header_bytes).map_err(|e| {
        tracing::debug!(target: "common.jwt", error = %e, "Failed to parse JWT header JSON");
        JwtValidationError::MalformedToken
    })?;

    let alg = header
        .get("alg")
        .and_then(Value::as_str)
        .map(ToString::to_string)
        .ok_or(JwtValidationError::MalformedToken)?;

    // Extract kid as string, rejecting empty values
    let kid = header
        .get("kid")
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(ToString::to_string)
        .ok_or(JwtValidationError::MissingKid)?;

    let typ = header
        .get("typ")
        .and_then(Value::as_str)
        .map(ToString::to_string);

    Ok(TokenHeader { alg, kid, typ })
}

fn decode_claims(segment: &str) -> Result<Map<String, Value>, JwtValidationError> {
    let payload_bytes = URL_SAFE_NO_PAD.decode(segment).map_err(|e| {
        tracing::debug!(target: "common.jwt", error = %e, "Failed to decode JWT payload base64");
        JwtValidationError::MalformedToken
    })?;

    serde_json::from_slice::<Map<String, Value>>(&payload_bytes).map_err(|e| {
        tracing::debug!(target: "common.jwt", error = %e, "Failed to parse JWT payload JSON");
        JwtValidationError::MalformedPayload
    })
}

/// Parse a compact token into header, claims and signature.
///
/// Check order: size, segment count, signature presence, header (including
/// `kid`), payload.
///
/// # Errors
///
/// Returns `JwtValidationError` variants:
/// - `TokenTooLarge` - Token exceeds size limit
/// - `MalformedToken` - Wrong structure, bad base64, invalid header JSON, no `alg`
/// - `MissingSignature` - Empty signature segment
/// - `MissingKid` - Header missing `kid`, or `kid` empty/not a string
/// - `MalformedPayload` - Payload is not a JSON object
pub fn parse_token(token: &str) -> Result<ParsedToken, JwtValidationError> {
    let (header_part, payload_part, signature_part) = split_segments(token)?;

    if signature_part.is_empty() {
        tracing::debug!(target: "common.jwt", "Token rejected: empty signature segment");
        return Err(JwtValidationError::MissingSignature);
    }

    let header = decode_header(header_part)?;
    let claims = decode_claims(payload_part)?;

    let signature = URL_SAFE_NO_PAD.decode(signature_part).map_err(|e| {
        tracing::debug!(target: "common.jwt", error = %e, "Failed to decode JWT signature base64");
        JwtValidationError::MalformedToken
    })?;

    Ok(ParsedToken {
        header,
        claims,
        signature,
    })
}

// =============================================================================
// Tests
// =============================================================================
