//! Error taxonomy and retry-policy types for the Flywheel pipeline domain.
//!
//! [`FlywheelError`] covers conditions that abort a run. Every variant names
//! the responsible [`Stage`] and carries enough detail for an operator (or
//! another agent) to act without re-reading raw generator output.
//!
//! Collaborator errors ([`GeneratorError`], [`RetrievalError`],
//! [`KnowledgeError`], [`ConfigError`]) are defined here because the port
//! traits that return them live in this crate.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{Finding, Stage};

// ---------------------------------------------------------------------------
// Retry semantics
// ---------------------------------------------------------------------------

/// Whether a collaborator error is safe to retry and, if so, after what delay.
///
/// Generator clients use this to drive their own back-off. The pipeline core
/// never retries a [`GeneratorError`]; it only re-invokes the generator for
/// self-correction after a *validation* failure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RetryPolicy {
    /// The operation may be retried.
    Retryable {
        /// Minimum back-off before the next attempt. `None` means apply the
        /// caller's own back-off schedule.
        after: Option<Duration>,
    },
    /// The operation must not be retried.
    NonRetryable,
}

// ---------------------------------------------------------------------------
// Collaborator errors
// ---------------------------------------------------------------------------

/// Failure of a single external generator call.
#[derive(Debug, Error)]
pub enum GeneratorError {
    /// The request never produced an HTTP response (DNS, TLS, connection reset).
    #[error("generator request failed: {message}")]
    Transport { message: String },

    /// The provider answered with a non-success status.
    #[error("generator returned HTTP {status}: {body}")]
    Status {
        status: u16,
        body: String,
        /// Parsed from `retry-after` when the provider supplied one.
        retry_after: Option<Duration>,
    },

    /// The provider answered but the body was not in the expected shape.
    #[error("generator response could not be decoded: {message}")]
    Decode { message: String },

    /// The call did not complete within the configured bound.
    #[error("generator call timed out after {}s", .after.as_secs())]
    Timeout { after: Duration },

    /// The generator could not be constructed or is missing configuration.
    #[error("generator misconfigured: {message}")]
    Configuration { message: String },
}

impl GeneratorError {
    /// Classifies this error for the client's own back-off logic.
    pub fn retry_policy(&self) -> RetryPolicy {
        match self {
            GeneratorError::Transport { .. } => RetryPolicy::Retryable { after: None },
            GeneratorError::Status {
                status,
                retry_after,
                ..
            } if *status == 429 || *status >= 500 => RetryPolicy::Retryable {
                after: *retry_after,
            },
            _ => RetryPolicy::NonRetryable,
        }
    }
}

/// Failure of a knowledge retrieval call.
#[derive(Debug, Error)]
pub enum RetrievalError {
    #[error("unknown knowledge partition '{partition}'")]
    UnknownPartition { partition: String },
}

/// Failure of a knowledge write-back or seeding call.
#[derive(Debug, Error)]
pub enum KnowledgeError {
    #[error("knowledge store rejected document '{id}': {message}")]
    Rejected { id: String, message: String },

    #[error("knowledge store I/O failed: {message}")]
    Io { message: String },
}

/// Invalid or unloadable configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("role '{role}' has an empty system prompt")]
    EmptyPrompt { role: String },

    #[error("configuration could not be loaded from '{path}': {message}")]
    Load { path: String, message: String },

    #[error("invalid configuration: {message}")]
    Invalid { message: String },
}

// ---------------------------------------------------------------------------
// Run-level errors
// ---------------------------------------------------------------------------

/// Stable tag for each [`FlywheelError`] variant, for matching and logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    GeneratorFailure,
    SelfCorrectionExhausted,
    AuditHalt,
    TrustGateFailure,
    ApprovalRejected,
    SeedingFailed,
    InvalidInput,
    Configuration,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::GeneratorFailure => "generator_failure",
            ErrorKind::SelfCorrectionExhausted => "self_correction_exhausted",
            ErrorKind::AuditHalt => "audit_halt",
            ErrorKind::TrustGateFailure => "trust_gate_failure",
            ErrorKind::ApprovalRejected => "approval_rejected",
            ErrorKind::SeedingFailed => "seeding_failed",
            ErrorKind::InvalidInput => "invalid_input",
            ErrorKind::Configuration => "configuration",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors that abort a pipeline run.
///
/// A failed run yields exactly one of these; it never yields a partially
/// populated [`crate::PipelineResult`].
#[derive(Debug, Error)]
pub enum FlywheelError {
    /// The external generator call itself failed. Not retried by the core.
    #[error("Stage '{stage}' failed: generator error: {source}")]
    GeneratorFailure {
        stage: Stage,
        #[source]
        source: GeneratorError,
    },

    /// Every self-correction attempt produced output that failed validation.
    #[error(
        "Stage '{stage}' failed: {contract} output still invalid after {attempts} attempt(s): {diagnostic}"
    )]
    SelfCorrectionExhausted {
        stage: Stage,
        contract: &'static str,
        attempts: u32,
        /// Diagnostic from the last failed attempt.
        diagnostic: String,
    },

    /// The audit failed and the caller asked to halt on audit failure.
    #[error(
        "Audit failed: {} critical/high finding(s): {}; {summary}",
        .blocking.len(),
        render_findings(.blocking)
    )]
    AuditHalt {
        blocking: Vec<Finding>,
        summary: String,
    },

    /// The trust gate refused autonomous merge and no approval fallback was
    /// configured.
    #[error("Trust gate refused autonomous merge: {reason}")]
    TrustGateFailure { reason: String },

    /// An approval callback declined.
    #[error("Approval rejected at '{stage}': {reason}")]
    ApprovalRejected { stage: Stage, reason: String },

    /// The knowledge seeder failed while refreshing before planning.
    #[error("Seeding failed: {message}")]
    SeedingFailed { message: String },

    /// The run was invoked with unusable input.
    #[error("Invalid input: {message}")]
    InvalidInput { message: String },

    /// The orchestrator configuration or a reloaded role configuration is
    /// invalid. `stage` is `Seeding` for a reload, `Aborted` at construction.
    #[error("Stage '{stage}' failed: configuration error: {source}")]
    Configuration {
        stage: Stage,
        #[source]
        source: ConfigError,
    },
}

impl FlywheelError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            FlywheelError::GeneratorFailure { .. } => ErrorKind::GeneratorFailure,
            FlywheelError::SelfCorrectionExhausted { .. } => ErrorKind::SelfCorrectionExhausted,
            FlywheelError::AuditHalt { .. } => ErrorKind::AuditHalt,
            FlywheelError::TrustGateFailure { .. } => ErrorKind::TrustGateFailure,
            FlywheelError::ApprovalRejected { .. } => ErrorKind::ApprovalRejected,
            FlywheelError::SeedingFailed { .. } => ErrorKind::SeedingFailed,
            FlywheelError::InvalidInput { .. } => ErrorKind::InvalidInput,
            FlywheelError::Configuration { .. } => ErrorKind::Configuration,
        }
    }

    /// The stage responsible for the failure.
    pub fn stage(&self) -> Stage {
        match self {
            FlywheelError::GeneratorFailure { stage, .. }
            | FlywheelError::SelfCorrectionExhausted { stage, .. }
            | FlywheelError::ApprovalRejected { stage, .. }
            | FlywheelError::Configuration { stage, .. } => *stage,
            FlywheelError::AuditHalt { .. } => Stage::Auditing,
            FlywheelError::TrustGateFailure { .. } => Stage::TrustGateEval,
            FlywheelError::SeedingFailed { .. } => Stage::Seeding,
            FlywheelError::InvalidInput { .. } => Stage::Aborted,
        }
    }
}

fn render_findings(findings: &[Finding]) -> String {
    findings
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Severity;

    #[test]
    fn audit_halt_message_lists_blocking_findings() {
        let err = FlywheelError::AuditHalt {
            blocking: vec![Finding {
                severity: Severity::Critical,
                category: "sql-injection".into(),
                description: "query built by string concatenation".into(),
                location: None,
                suggestion: None,
            }],
            summary: "not safe to ship".into(),
        };
        let message = err.to_string();
        assert!(message.starts_with("Audit failed: 1 critical/high finding(s)"));
        assert!(message.contains("[critical] sql-injection"));
        assert_eq!(err.kind(), ErrorKind::AuditHalt);
        assert_eq!(err.stage(), Stage::Auditing);
    }

    #[test]
    fn role_reload_failure_names_the_seeding_stage() {
        let err = FlywheelError::Configuration {
            stage: Stage::Seeding,
            source: ConfigError::EmptyPrompt {
                role: "critic".into(),
            },
        };
        assert_eq!(err.kind(), ErrorKind::Configuration);
        assert_eq!(err.stage(), Stage::Seeding);
        assert_eq!(
            err.to_string(),
            "Stage 'seeding' failed: configuration error: role 'critic' has an empty system prompt"
        );
    }

    #[test]
    fn rate_limits_and_server_errors_are_retryable() {
        let limited = GeneratorError::Status {
            status: 429,
            body: String::new(),
            retry_after: Some(Duration::from_secs(3)),
        };
        assert_eq!(
            limited.retry_policy(),
            RetryPolicy::Retryable {
                after: Some(Duration::from_secs(3))
            }
        );
        let bad_request = GeneratorError::Status {
            status: 400,
            body: String::new(),
            retry_after: None,
        };
        assert_eq!(bad_request.retry_policy(), RetryPolicy::NonRetryable);
        let timeout = GeneratorError::Timeout {
            after: Duration::from_secs(1),
        };
        assert_eq!(timeout.retry_policy(), RetryPolicy::NonRetryable);
    }
}
