//! Shared value types for the Flywheel pipeline domain.
//!
//! Unlike the newtype identifiers in [`crate::identifiers`], these types carry
//! meaningful values that participate in domain decisions (finding severity
//! gates the audit verdict, the stage drives progress reporting).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Severity
// ---------------------------------------------------------------------------

/// Severity level of an audit [`crate::Finding`].
///
/// `Critical` and `High` are *blocking*: an audit report containing either
/// cannot pass, whatever its producer claims.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Critical,
    High,
    Medium,
    Low,
    Info,
}

impl Severity {
    /// Wire names accepted by the audit contract, most severe first.
    pub const NAMES: &'static [&'static str] = &["critical", "high", "medium", "low", "info"];

    /// Returns `true` for severities that fail an audit.
    pub fn is_blocking(self) -> bool {
        matches!(self, Severity::Critical | Severity::High)
    }

    /// Returns the wire name of this severity.
    pub fn as_str(self) -> &'static str {
        match self {
            Severity::Critical => "critical",
            Severity::High => "high",
            Severity::Medium => "medium",
            Severity::Low => "low",
            Severity::Info => "info",
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Stage
// ---------------------------------------------------------------------------

/// A state of the pipeline run state machine.
///
/// Every transition into a stage is reported to the observability sink, and
/// every fatal error names the stage responsible for it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Seeding,
    Planning,
    AwaitingApproval,
    Executing,
    Auditing,
    TrustGateEval,
    AwaitingApprovalFallback,
    Polishing,
    Done,
    Aborted,
}

impl Stage {
    /// Returns the stable snake_case name used in progress markers and logs.
    pub fn as_str(self) -> &'static str {
        match self {
            Stage::Seeding => "seeding",
            Stage::Planning => "planning",
            Stage::AwaitingApproval => "awaiting_approval",
            Stage::Executing => "executing",
            Stage::Auditing => "auditing",
            Stage::TrustGateEval => "trust_gate_eval",
            Stage::AwaitingApprovalFallback => "awaiting_approval_fallback",
            Stage::Polishing => "polishing",
            Stage::Done => "done",
            Stage::Aborted => "aborted",
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Time
// ---------------------------------------------------------------------------

/// A UTC wall-clock timestamp.
///
/// Wraps [`chrono::DateTime<Utc>`] so callers never depend on `chrono` types
/// directly; the underlying representation can change without affecting the
/// domain API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Timestamp(DateTime<Utc>);

impl Timestamp {
    /// Returns the current UTC time as a [`Timestamp`].
    pub fn now() -> Self {
        Self(Utc::now())
    }
}

impl std::fmt::Display for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.to_rfc3339())
    }
}
