//! # Gate Test Utilities
//!
//! Shared test utilities for the auth gate.
//!
//! This crate provides:
//! - Deterministic Ed25519 signing keys and token builders (`crypto_fixtures`)
//! - A wiremock-backed JWKS endpoint (`jwks_server`)
//! - An in-memory, call-counting `KeySetFetcher` (`fetchers`)
//! - Test tracing setup (`init_test_tracing`)
//!
//! ## Usage
//!
//! ```rust,ignore
//! use gate_test_utils::*;
//!
//! #[tokio::test]
//! async fn test_example() {
//!     let key = TestKeypair::new(1, "key-1");
//!     let jwks = MockJwksServer::start().await;
//!     jwks.serve(&[&key]).await;
//!
//!     let token = key.sign_token(&TestClaims::for_domain("example.com"));
//!     // build an AuthorizationLayer against jwks.url() ...
//! }
//! ```

pub mod crypto_fixtures;
pub mod fetchers;
pub mod jwks_server;

// Re-export commonly used items
pub use crypto_fixtures::*;
pub use fetchers::*;
pub use jwks_server::*;

use std::sync::Once;

static TRACING: Once = Once::new();

/// Install a test subscriber honouring `RUST_LOG` (default `warn`).
///
/// Safe to call from every test; only the first call installs anything.
pub fn init_test_tracing() {
    TRACING.call_once(|| {
        let filter = tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"));
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .try_init();
    });
}
