//! The agent runtime: tool dispatch (C1), the research turn loop (C2),
//! the risk classifier (C3), and the tool gap detector (C7).
//!
//! This crate owns everything that happens *inside* one agent turn. It
//! knows nothing about runs, workflows, or approvals — those live in
//! `fathom-workflow`, `fathom-approval`, and `fathom-runs`, which drive
//! [`engine::run_agent`] as a building block.

pub mod capability;
pub mod dispatch;
pub mod engine;
pub mod gap;
pub mod risk;

pub use dispatch::{CachePolicy, DispatchOutcome, RunContext};
pub use engine::{run_agent, TurnResult};
