//! Deterministic signing fixtures.
//!
//! Ed25519 keypairs derived from a one-byte seed, the JWK the provider would
//! publish for them, and ID-token style claims.

use auth_gate::auth::{Jwk, KeySet};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::Utc;
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use ring::signature::{Ed25519KeyPair, KeyPair};
use serde::{Deserialize, Serialize};

/// ID token claims as issued by a hosted-domain identity provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestClaims {
    pub sub: String,
    pub email: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hd: Option<String>,
    pub iat: i64,
    pub exp: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nbf: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub aud: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub iss: Option<String>,
}

impl TestClaims {
    /// Claims for a user of `domain`, valid for one hour.
    pub fn for_domain(domain: &str) -> Self {
        let now = Utc::now().timestamp();
        Self {
            sub: "user-123".to_string(),
            email: format!("alice@{}", domain),
            hd: Some(domain.to_string()),
            iat: now,
            exp: now + 3600,
            nbf: None,
            aud: None,
            iss: None,
        }
    }

    /// Claims without an `hd` claim (consumer accounts).
    pub fn without_domain() -> Self {
        Self {
            email: "bob@gmail.com".to_string(),
            hd: None,
            ..Self::for_domain("gmail.com")
        }
    }

    /// Shift `exp` so the token expired `seconds_ago`.
    pub fn expired(mut self, seconds_ago: i64) -> Self {
        let now = Utc::now().timestamp();
        self.iat = now - seconds_ago - 3600;
        self.exp = now - seconds_ago;
        self
    }

    /// Set `nbf` `seconds_ahead` into the future.
    pub fn not_before(mut self, seconds_ahead: i64) -> Self {
        self.nbf = Some(Utc::now().timestamp() + seconds_ahead);
        self
    }

    pub fn with_audience(mut self, aud: &str) -> Self {
        self.aud = Some(aud.to_string());
        self
    }

    pub fn with_issuer(mut self, iss: &str) -> Self {
        self.iss = Some(iss.to_string());
        self
    }
}

/// Deterministic Ed25519 keypair for signing test tokens.
pub struct TestKeypair {
    pub kid: String,
    public_key_bytes: Vec<u8>,
    private_key_pkcs8: Vec<u8>,
}

impl TestKeypair {
    /// The same seed always produces the same keypair.
    pub fn new(seed: u8, kid: &str) -> Self {
        let mut seed_bytes = [0u8; 32];
        seed_bytes[0] = seed;
        for (i, byte) in seed_bytes.iter_mut().enumerate().skip(1) {
            *byte = seed.wrapping_mul(i as u8).wrapping_add(i as u8);
        }

        let key_pair = Ed25519KeyPair::from_seed_unchecked(&seed_bytes)
            .expect("Failed to create test keypair");

        Self {
            kid: kid.to_string(),
            public_key_bytes: key_pair.public_key().as_ref().to_vec(),
            private_key_pkcs8: build_pkcs8_from_seed(&seed_bytes),
        }
    }

    /// Sign `claims` with this key, advertising this key's kid.
    pub fn sign_token(&self, claims: &TestClaims) -> String {
        self.sign_token_with_kid(claims, &self.kid)
    }

    /// Sign `claims` with this key but advertise `kid` in the header.
    pub fn sign_token_with_kid(&self, claims: &TestClaims, kid: &str) -> String {
        let encoding_key = EncodingKey::from_ed_der(&self.private_key_pkcs8);
        let mut header = Header::new(Algorithm::EdDSA);
        header.typ = Some("JWT".to_string());
        header.kid = Some(kid.to_string());

        encode(&header, claims, &encoding_key).expect("Failed to sign token")
    }

    /// JWK entry as the provider would publish it.
    pub fn jwk_json(&self) -> serde_json::Value {
        serde_json::json!({
            "kty": "OKP",
            "kid": self.kid,
            "crv": "Ed25519",
            "x": URL_SAFE_NO_PAD.encode(&self.public_key_bytes),
            "alg": "EdDSA",
            "use": "sig"
        })
    }

    pub fn jwk(&self) -> Jwk {
        serde_json::from_value(self.jwk_json()).expect("Test JWK should deserialize")
    }
}

/// JWKS document publishing `keys`.
pub fn jwks_body(keys: &[&TestKeypair]) -> serde_json::Value {
    serde_json::json!({
        "keys": keys.iter().map(|key| key.jwk_json()).collect::<Vec<_>>()
    })
}

/// Validated key set publishing `keys`.
pub fn key_set(keys: &[&TestKeypair]) -> KeySet {
    KeySet::from_keys(keys.iter().map(|key| key.jwk()).collect()).expect("Test key set should be valid")
}

/// Build PKCS#8 v1 document from Ed25519 seed.
///
/// Ring doesn't expose the PKCS#8 encoding of a seeded keypair, so it is
/// assembled by hand (RFC 5208 / RFC 8410).
fn build_pkcs8_from_seed(seed: &[u8; 32]) -> Vec<u8> {
    let mut pkcs8 = Vec::with_capacity(48);

    // SEQUENCE, 46 bytes
    pkcs8.extend_from_slice(&[0x30, 0x2e]);
    // version INTEGER 0
    pkcs8.extend_from_slice(&[0x02, 0x01, 0x00]);
    // AlgorithmIdentifier { OID 1.3.101.112 }
    pkcs8.extend_from_slice(&[0x30, 0x05, 0x06, 0x03, 0x2b, 0x65, 0x70]);
    // privateKey OCTET STRING wrapping OCTET STRING(seed)
    pkcs8.extend_from_slice(&[0x04, 0x22, 0x04, 0x20]);
    pkcs8.extend_from_slice(seed);

    pkcs8
}
