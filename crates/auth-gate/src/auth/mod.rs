//! Token verification against an identity provider's JWKS.
//!
//! # Components
//!
//! - `keyset` - JWK and validated key-set types
//! - `cache` - shared key-set cache with expiry and generation-scoped invalidation
//! - `fetcher` - `KeySetFetcher` trait and its HTTP implementation
//! - `resolver` - kid to key resolution with bounded refresh
//! - `verifier` - compact token verification and domain constraint
//! - `claims` - claims of a verified token

pub mod cache;
pub mod claims;
pub mod fetcher;
pub mod keyset;
pub mod resolver;
pub mod verifier;

pub use cache::KeySetCache;
pub use claims::VerifiedClaims;
pub use fetcher::{HttpKeySetFetcher, KeySetFetcher};
pub use keyset::{Jwk, KeySet};
pub use resolver::KeyResolver;
pub use verifier::TokenVerifier;
