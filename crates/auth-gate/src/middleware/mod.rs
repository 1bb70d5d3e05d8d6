//! Middleware for the auth gate.
//!
//! # Components
//!
//! - `auth` - Authorization gate (tower layer and service)

pub mod auth;

pub use auth::{AuthorizationGate, AuthorizationLayer, ClaimsExt};
