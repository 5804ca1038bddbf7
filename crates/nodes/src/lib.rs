//! Flywheel stage transforms and pipeline orchestrator.
//!
//! This crate provides the five stage transforms (plan, execute, audit,
//! logic review, polish), the [`Flywheel`] orchestrator that sequences them,
//! and the small decorators and adapters the orchestrator needs by default
//! (generator timeout, tracing sink, closure approver).
//!
//! ## Architectural Layer
//!
//! **Orchestration layer.** Stages sequence calls between business logic in
//! the [`pipeline`] crate (schema guard, trust gate) and the collaborator
//! traits (generator, knowledge, verification). They contain no validation
//! or decision rules of their own.

mod approval;
mod flywheel;
mod observability;
mod prompts;
mod stages;
mod timeout;

pub use approval::FnApprover;
pub use flywheel::{Flywheel, FlywheelBuilder, RunOptions};
pub use observability::TracingSink;
pub use timeout::TimeoutGenerator;
