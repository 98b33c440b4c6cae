//! Domain types shared across Latchkey crates.
//!
//! This crate contains only pure types with no framework dependencies.
//! Used from every layer of the auth service.

pub mod email;
pub mod id;
