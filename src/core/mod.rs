//! Core logic: task model, plan loading, expansion and orchestration.

pub mod artifacts;
pub mod error;
pub mod expander;
pub mod interrupt;
pub mod orchestrator;
pub mod parser;
pub mod types;
