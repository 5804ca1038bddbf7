//! Core orchestration domain for Flywheel.
//!
//! This crate contains every entity contract, newtype identifier, shared value
//! type, and error type used throughout the pipeline, plus the two pieces of
//! pure decision logic: the [`SchemaGuard`] (validation with bounded
//! self-correction) and the [`trust_gate`]. Infrastructure crates implement
//! the port traits defined here; they never add domain rules.
//!
//! ## Architectural Layer
//!
//! **Business logic + port definitions.** This crate has no I/O dependencies.
//! It defines *what* is needed; infrastructure crates define *how* to supply it.
//!
//! ## Module Layout
//!
//! | Module | Contents |
//! |--------|----------|
//! | [`identifiers`] | Newtype identifiers (`RunId`, `SpecId`, `PartitionName`, etc.) |
//! | [`types`] | Shared value types (`Severity`, `Stage`, `Timestamp`) |
//! | [`entities`] | Immutable pipeline records (`TechSpec` … `PipelineResult`) |
//! | [`contracts`] | Generator payload contracts and the [`Contract`] trait |
//! | [`schema`] | Field/type rules checked on raw JSON |
//! | [`guard`] | Payload extraction, validation, self-correction |
//! | [`trust_gate`] | Dual-sentinel autonomous-merge decision |
//! | [`ports`] | Collaborator traits (generator, knowledge, approval, …) |
//! | [`config`] | `FlywheelConfig` and `RoleConfig` value objects |
//! | [`errors`] | Run-level and collaborator error types |
//! | [`fakes`] | In-memory collaborator fakes for tests |

pub mod config;
pub mod contracts;
pub mod entities;
pub mod errors;
pub mod fakes;
pub mod guard;
pub mod identifiers;
pub mod ports;
pub mod schema;
pub mod trust_gate;
pub mod types;

// Re-export everything at the crate root for ergonomic usage by downstream crates.
pub use config::{FlywheelConfig, GuardConfig, Role, RoleConfig, RoleDefinition};
pub use contracts::{ArtifactPayload, AuditPayload, Contract, PolishPayload, SpecPayload};
pub use entities::{
    AuditReport, CodeArtifact, Finding, LogicReview, MergeOutcome, PipelineResult,
    PolishedArtifact, TechSpec,
};
pub use errors::{
    ConfigError, ErrorKind, FlywheelError, GeneratorError, KnowledgeError, RetrievalError,
    RetryPolicy,
};
pub use guard::{
    extract_payload, validate, CorrectionContext, GuardError, SchemaGuard, ValidationFailure,
};
pub use identifiers::{ArtifactId, AuditId, PartitionName, RunId, SnippetId, SpecId};
pub use ports::{
    merge_snippets, ApprovalCheckpoint, ApprovalRejection, Generator, KnowledgeDocument,
    KnowledgeRetriever, KnowledgeSeeder, KnowledgeWriter, ObservabilitySink,
    PassthroughSanitizer, RoleConfigLoader, SeedReport, Snippet, SpecApprover, TextSanitizer,
    VerificationOutcome, VerificationRunner,
};
pub use schema::Violation;
pub use trust_gate::TrustDecision;
pub use types::{Severity, Stage, Timestamp};
