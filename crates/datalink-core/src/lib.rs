//! Data Link Core - Fundamental types and primitives
//!
//! This crate defines the types shared by every layer of the link:
//! - Identifiers (LinkId, EntityId)
//! - Opcodes and protocol constants
//! - Transforms and actor templates
//! - The link error taxonomy

pub mod id;
pub mod opcode;
pub mod transform;
pub mod template;
pub mod error;

pub use id::*;
pub use opcode::*;
pub use transform::*;
pub use template::*;
pub use error::*;
