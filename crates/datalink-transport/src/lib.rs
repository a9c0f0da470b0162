//! Data Link Transport Layer - single-peer TCP link
//!
//! This crate provides:
//! - Listening and outbound connection setup
//! - Non-blocking accept and receive polling
//! - Header-framed message draining with a per-call cap
//! - Keepalive and ping countdowns

pub mod keepalive;
pub mod tcp;

pub use keepalive::*;
pub use tcp::*;
