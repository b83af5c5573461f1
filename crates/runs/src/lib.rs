//! The Run Registry: authoritative per-run state for external observers,
//! decoupled from in-flight workflow execution.

pub mod registry;

pub use registry::{RunRegistry, RunReport};
