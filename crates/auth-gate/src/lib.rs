//! Auth Gate Library
//!
//! HTTP bearer-token authorization backed by an identity provider's JSON Web
//! Key Set. Requests reach the wrapped service only if their token:
//!
//! - is signed by a key currently published by the provider
//! - carries the configured organizational domain (`hd` claim), if any
//! - is within its validity window
//!
//! Everything else gets a plain 401.
//!
//! # Architecture
//!
//! ```text
//! AuthorizationLayer -> TokenVerifier -> KeyResolver -> KeySetCache
//!                                                    -> KeySetFetcher (HTTP)
//! ```
//!
//! # Modules
//!
//! - `auth` - Key sets, cache, fetcher, resolver and verifier
//! - `config` - Gate configuration from environment
//! - `errors` - Error types and the rejection response
//! - `middleware` - Tower layer wrapping any HTTP service
//! - `observability` - Metrics

pub mod auth;
pub mod config;
pub mod errors;
pub mod middleware;
pub mod observability;

pub use auth::{TokenVerifier, VerifiedClaims};
pub use config::GateConfig;
pub use errors::AuthError;
pub use middleware::{AuthorizationGate, AuthorizationLayer, ClaimsExt};
