//! Common utilities shared across the auth gate crates.

#![warn(clippy::pedantic)]

/// Module for compact JWT utilities (size limit, parsing, kid extraction)
pub mod jwt;
