//! Signing keys as published by the identity provider.
//!
//! A [`KeySet`] is only ever built from a complete, validated JWKS document:
//! every entry carries a non-empty `kid`, a `kty`, an `alg` and the key
//! material its `kty` requires, and no two entries share a `kid`.

use crate::errors::FetchError;
use serde::Deserialize;
use std::collections::HashSet;

/// JSON Web Key from the JWKS endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Jwk {
    /// Key type: "RSA", "EC" or "OKP".
    pub kty: String,

    /// Key ID - used to select the correct key for verification.
    pub kid: String,

    /// Algorithm this key signs with (e.g. "RS256").
    pub alg: String,

    /// Key use (should be "sig" for signing).
    #[serde(default, rename = "use")]
    pub key_use: Option<String>,

    /// RSA modulus (base64url).
    #[serde(default)]
    pub n: Option<String>,

    /// RSA public exponent (base64url).
    #[serde(default)]
    pub e: Option<String>,

    /// Curve name for EC/OKP keys.
    #[serde(default)]
    pub crv: Option<String>,

    /// EC x coordinate or OKP public key (base64url).
    #[serde(default)]
    pub x: Option<String>,

    /// EC y coordinate (base64url).
    #[serde(default)]
    pub y: Option<String>,
}

fn present(field: Option<&String>) -> bool {
    field.is_some_and(|v| !v.is_empty())
}

impl Jwk {
    /// Whether this key may be used to verify signatures.
    ///
    /// Keys without a `use` member are treated as signing keys.
    pub fn is_signing_key(&self) -> bool {
        self.key_use.as_deref().map_or(true, |u| u == "sig")
    }

    /// Check that the entry carries the material its key type needs.
    fn validate(&self) -> Result<(), FetchError> {
        if self.kid.is_empty() {
            return Err(FetchError::Malformed("key with empty kid".to_string()));
        }
        if self.alg.is_empty() {
            return Err(FetchError::Malformed(format!(
                "key {} has empty alg",
                self.kid
            )));
        }

        let complete = match self.kty.as_str() {
            "RSA" => present(self.n.as_ref()) && present(self.e.as_ref()),
            "EC" => {
                present(self.crv.as_ref()) && present(self.x.as_ref()) && present(self.y.as_ref())
            }
            "OKP" => present(self.crv.as_ref()) && present(self.x.as_ref()),
            other => {
                return Err(FetchError::Malformed(format!(
                    "key {} has unsupported kty {}",
                    self.kid, other
                )))
            }
        };

        if !complete {
            return Err(FetchError::Malformed(format!(
                "key {} is missing {} key material",
                self.kid, self.kty
            )));
        }

        Ok(())
    }
}

/// JWKS document as served by the provider.
#[derive(Debug, Clone, Deserialize)]
pub struct JwksDocument {
    /// List of JSON Web Keys.
    pub keys: Vec<Jwk>,
}

/// Validated, ordered collection of signing keys with unique key IDs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeySet {
    keys: Vec<Jwk>,
}

impl KeySet {
    /// Build a key set, validating every entry.
    ///
    /// # Errors
    ///
    /// Returns `FetchError::Malformed` if any entry is incomplete or two
    /// entries share a key ID.
    pub fn from_keys(keys: Vec<Jwk>) -> Result<Self, FetchError> {
        let mut seen = HashSet::with_capacity(keys.len());
        for key in &keys {
            key.validate()?;
            if !seen.insert(key.kid.as_str()) {
                return Err(FetchError::Malformed(format!(
                    "duplicate kid {}",
                    key.kid
                )));
            }
        }
        Ok(Self { keys })
    }

    /// Key with the given ID, if any.
    pub fn get(&self, kid: &str) -> Option<&Jwk> {
        self.keys.iter().find(|key| key.kid == kid)
    }

    /// Whether the set contains a key with the given ID.
    pub fn contains(&self, kid: &str) -> bool {
        self.get(kid).is_some()
    }

    /// All keys with the given ID, in document order.
    pub fn matching(&self, kid: &str) -> Vec<Jwk> {
        self.keys.iter().filter(|key| key.kid == kid).cloned().collect()
    }

    /// Key IDs in document order.
    pub fn kids(&self) -> impl Iterator<Item = &str> {
        self.keys.iter().map(|key| key.kid.as_str())
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

impl TryFrom<JwksDocument> for KeySet {
    type Error = FetchError;

    fn try_from(document: JwksDocument) -> Result<Self, Self::Error> {
        Self::from_keys(document.keys)
    }
}
