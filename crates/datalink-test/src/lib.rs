//! Data Link Test Harness
//!
//! This crate provides:
//! - A recording scene adapter
//! - A raw socket peer that speaks the wire protocol
//! - Helpers that tick a service until a condition holds
//! - End-to-end tests over localhost sockets

pub mod mock_scene;
pub mod peer;

#[cfg(test)]
mod integration;

pub use mock_scene::*;
pub use peer::*;
