//! Data Link Runtime - link service orchestration and tick loop
//!
//! Each scheduler tick runs the same fixed stages:
//! 1. Advance keepalive and ping countdowns
//! 2. Accept one pending inbound connection
//! 3. Drain received messages up to the per-tick cap
//! 4. Dispatch each message through the opcode route table
//! 5. Advance one outbound sequence step
//! 6. Report the delay until the next tick

pub mod cache;
pub mod config;
pub mod dispatch;
pub mod events;
pub mod logging;
pub mod registry;
pub mod scene;
pub mod sequence;
pub mod service;

#[cfg(test)]
mod testing;

pub use cache::*;
pub use config::*;
pub use dispatch::*;
pub use events::*;
pub use logging::*;
pub use registry::*;
pub use scene::*;
pub use sequence::*;
pub use service::*;
