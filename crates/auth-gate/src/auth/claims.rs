//! Claims of a verified token.
//!
//! Handed to the wrapped handler through request extensions. Identity claims
//! (`sub`, `email`) are redacted in Debug output to keep them out of logs.

use serde_json::{Map, Value};
use std::fmt;

/// Claim carrying the organizational (hosted) domain.
pub const DOMAIN_CLAIM: &str = "hd";

const REDACTED_CLAIMS: [&str; 2] = ["sub", "email"];

/// Payload claims of a token whose signature has been verified.
#[derive(Clone, PartialEq)]
pub struct VerifiedClaims {
    claims: Map<String, Value>,
}

impl fmt::Debug for VerifiedClaims {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut map = f.debug_map();
        for (name, value) in &self.claims {
            if REDACTED_CLAIMS.contains(&name.as_str()) {
                map.entry(name, &"[REDACTED]");
            } else {
                map.entry(name, value);
            }
        }
        map.finish()
    }
}

impl VerifiedClaims {
    pub(crate) fn new(claims: Map<String, Value>) -> Self {
        Self { claims }
    }

    /// Raw claim value.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.claims.get(name)
    }

    /// Claim value if it is a string.
    pub fn get_str(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(Value::as_str)
    }

    /// Subject (`sub`).
    pub fn subject(&self) -> Option<&str> {
        self.get_str("sub")
    }

    /// Organizational domain (`hd`).
    pub fn domain(&self) -> Option<&str> {
        self.get_str(DOMAIN_CLAIM)
    }

    /// Email address (`email`).
    pub fn email(&self) -> Option<&str> {
        self.get_str("email")
    }

    /// Expiration timestamp (`exp`), if present and numeric.
    pub fn expires_at(&self) -> Option<i64> {
        self.get("exp").and_then(Value::as_i64)
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.claims
    }
}
