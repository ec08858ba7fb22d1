//! upset: agentless configuration management.
//!
//! A plan is an ordered list of tasks. Each task names a plugin that upset
//! copies to a temporary workspace on the target and runs under `sudo`, once
//! per `foreach` binding. Plugins reconcile the target through the
//! idempotent primitives in [`resources`].

pub mod cli;
pub mod core;
pub mod plugin;
pub mod resources;
pub mod transport;

pub use crate::core::error::{Error, Result};
