//! Orchestration entry point and its options

pub mod options;
pub mod orchestrate;

pub use orchestrate::Orchestrator;
