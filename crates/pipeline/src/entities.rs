//! Entity records produced by the pipeline stages.
//!
//! Entities are plain immutable records once constructed: later stages
//! produce new entities rather than editing earlier ones. Each entity is built
//! from a validated payload (see [`crate::contracts`]) by the stage that owns
//! it, which stamps its identity and provenance.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::contracts::{ArtifactPayload, AuditPayload, PolishPayload, SpecPayload};
use crate::{ArtifactId, AuditId, RunId, Severity, SpecId, Timestamp};

// ---------------------------------------------------------------------------
// TechSpec
// ---------------------------------------------------------------------------

/// The plan-stage output: what is to be built and how success is judged.
///
/// Invariant: `acceptance_criteria` is never empty (enforced by the
/// [`SpecPayload`] contract).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TechSpec {
    pub id: SpecId,
    pub title: String,
    pub brief: String,
    pub acceptance_criteria: Vec<String>,
    pub affected_paths: BTreeSet<String>,
    #[serde(rename = "referencedADRs")]
    pub referenced_adrs: BTreeSet<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    pub created_at: Timestamp,
}

impl TechSpec {
    /// Stamps a validated payload with a fresh identity.
    pub fn from_payload(payload: SpecPayload, brief: impl Into<String>) -> Self {
        Self {
            id: SpecId::new_random(),
            title: payload.title,
            brief: brief.into(),
            acceptance_criteria: payload.acceptance_criteria,
            affected_paths: payload.affected_paths,
            referenced_adrs: payload.referenced_adrs,
            notes: payload.notes,
            created_at: Timestamp::now(),
        }
    }
}

// ---------------------------------------------------------------------------
// CodeArtifact
// ---------------------------------------------------------------------------

/// The execute-stage output: full file contents keyed by relative path.
///
/// `spec_id` references the [`TechSpec`] the artifact implements; it is kept
/// for traceability and is not enforced as a foreign key. An empty `files`
/// map is valid but degenerate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CodeArtifact {
    pub id: ArtifactId,
    pub spec_id: SpecId,
    pub files: BTreeMap<String, String>,
    pub summary: String,
    pub verification_steps: Vec<String>,
    pub created_at: Timestamp,
}

impl CodeArtifact {
    pub fn from_payload(payload: ArtifactPayload, spec_id: SpecId) -> Self {
        Self {
            id: ArtifactId::new_random(),
            spec_id,
            files: payload.files,
            summary: payload.summary,
            verification_steps: payload.verification_steps,
            created_at: Timestamp::now(),
        }
    }
}

// ---------------------------------------------------------------------------
// Audit
// ---------------------------------------------------------------------------

/// One security/quality finding reported by the audit stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Finding {
    pub severity: Severity,
    pub category: String,
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<String>,
}

impl std::fmt::Display for Finding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}: {}", self.severity, self.category, self.description)?;
        if let Some(location) = &self.location {
            write!(f, " ({location})")?;
        }
        Ok(())
    }
}

/// The audit-stage output.
///
/// Invariant: `passed` is `true` if and only if no finding is blocking
/// (`critical` or `high`). [`AuditReport::from_payload`] enforces it; the
/// trust gate re-checks it through [`AuditReport::is_clean`] rather than
/// trusting the flag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditReport {
    pub id: AuditId,
    pub artifact_id: ArtifactId,
    pub passed: bool,
    pub findings: Vec<Finding>,
    pub summary: String,
    pub created_at: Timestamp,
}

impl AuditReport {
    /// Builds the report, deriving `passed` from the findings.
    ///
    /// The generator's own `passed` claim is discarded; callers that want to
    /// log a disagreement compare it against the returned report.
    pub fn from_payload(payload: AuditPayload, artifact_id: ArtifactId) -> Self {
        let passed = !payload.findings.iter().any(|f| f.severity.is_blocking());
        Self {
            id: AuditId::new_random(),
            artifact_id,
            passed,
            findings: payload.findings,
            summary: payload.summary,
            created_at: Timestamp::now(),
        }
    }

    /// Findings with `critical` or `high` severity.
    pub fn blocking_findings(&self) -> impl Iterator<Item = &Finding> {
        self.findings.iter().filter(|f| f.severity.is_blocking())
    }

    /// `true` only when the report claims to pass *and* lists no blocking
    /// finding.
    pub fn is_clean(&self) -> bool {
        self.passed && self.blocking_findings().next().is_none()
    }
}

// ---------------------------------------------------------------------------
// LogicReview
// ---------------------------------------------------------------------------

/// Verdict of the logic/acceptance critic. `issues` is empty iff `passed`.
///
/// The generator payload and the entity are the same shape, so this type is
/// its own contract.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogicReview {
    pub passed: bool,
    pub issues: Vec<String>,
}

impl LogicReview {
    /// `true` only when the review passes and lists no issue.
    pub fn is_clean(&self) -> bool {
        self.passed && self.issues.is_empty()
    }
}

// ---------------------------------------------------------------------------
// PolishedArtifact
// ---------------------------------------------------------------------------

/// The polish-stage output: a final [`CodeArtifact`] plus an optional
/// nomination as a golden example for future runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PolishedArtifact {
    #[serde(flatten)]
    pub artifact: CodeArtifact,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nominate_as_golden: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub golden_title: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub golden_tags: BTreeSet<String>,
}

impl PolishedArtifact {
    pub fn from_payload(payload: PolishPayload, spec_id: SpecId) -> Self {
        let artifact = CodeArtifact::from_payload(
            ArtifactPayload {
                files: payload.files,
                summary: payload.summary,
                verification_steps: payload.verification_steps,
            },
            spec_id,
        );
        Self {
            artifact,
            nominate_as_golden: payload.nominate_as_golden,
            golden_title: payload.golden_title,
            golden_tags: payload.golden_tags,
        }
    }

    /// Returns `true` when the polisher nominated this artifact as golden.
    pub fn is_golden(&self) -> bool {
        self.nominate_as_golden.unwrap_or(false)
    }

    pub fn summary(&self) -> &str {
        &self.artifact.summary
    }
}

// ---------------------------------------------------------------------------
// PipelineResult
// ---------------------------------------------------------------------------

/// Whether autonomous merge was requested for a run, and what the trust gate
/// decided.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum MergeOutcome {
    /// Autonomous merge was not requested.
    Standard,
    /// The trust gate was evaluated.
    #[serde(rename_all = "camelCase")]
    AutoMergeAttempted {
        auto_merged: bool,
        logic_review_passed: bool,
    },
}

/// Aggregate of every entity produced by a completed run.
///
/// Only ever returned for a run that reached `Done`; aborted runs yield a
/// [`crate::FlywheelError`] instead.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineResult {
    pub run_id: RunId,
    pub brief: String,
    pub spec: TechSpec,
    pub artifact: CodeArtifact,
    pub audit: AuditReport,
    pub polished: PolishedArtifact,
    pub completed_at: Timestamp,
    pub duration_ms: u64,
    pub merge: MergeOutcome,
}

impl PipelineResult {
    /// `None` unless autonomous merge was requested.
    pub fn auto_merged(&self) -> Option<bool> {
        match self.merge {
            MergeOutcome::Standard => None,
            MergeOutcome::AutoMergeAttempted { auto_merged, .. } => Some(auto_merged),
        }
    }

    /// `None` unless autonomous merge was requested.
    pub fn logic_review_passed(&self) -> Option<bool> {
        match self.merge {
            MergeOutcome::Standard => None,
            MergeOutcome::AutoMergeAttempted {
                logic_review_passed,
                ..
            } => Some(logic_review_passed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn finding(severity: Severity) -> Finding {
        Finding {
            severity,
            category: "injection".into(),
            description: "unsanitised input".into(),
            location: Some("src/handler.rs:12".into()),
            suggestion: None,
        }
    }

    #[test]
    fn audit_passed_is_derived_from_findings() {
        let payload = AuditPayload {
            passed: true,
            findings: vec![finding(Severity::Low), finding(Severity::High)],
            summary: "one high".into(),
        };
        let report = AuditReport::from_payload(payload, ArtifactId::new_random());
        assert!(!report.passed);
        assert_eq!(report.blocking_findings().count(), 1);
    }

    #[test]
    fn audit_with_only_minor_findings_passes() {
        let payload = AuditPayload {
            passed: false,
            findings: vec![finding(Severity::Medium), finding(Severity::Info)],
            summary: "minor".into(),
        };
        let report = AuditReport::from_payload(payload, ArtifactId::new_random());
        assert!(report.passed);
        assert!(report.is_clean());
    }

    #[test]
    fn finding_display_includes_location() {
        assert_eq!(
            finding(Severity::Critical).to_string(),
            "[critical] injection: unsanitised input (src/handler.rs:12)"
        );
    }

    #[test]
    fn polished_artifact_flattens_code_artifact_fields() {
        let polished = PolishedArtifact::from_payload(
            PolishPayload {
                files: BTreeMap::from([("src/lib.rs".to_string(), "// ok".to_string())]),
                summary: "tidy".into(),
                verification_steps: vec!["cargo test".into()],
                nominate_as_golden: Some(true),
                golden_title: Some("Hello endpoint".into()),
                golden_tags: BTreeSet::from(["http".to_string()]),
            },
            SpecId::new_random(),
        );
        let json = serde_json::to_value(&polished).unwrap();
        assert_eq!(json["summary"], "tidy");
        assert_eq!(json["nominateAsGolden"], true);
        assert!(polished.is_golden());
    }

    #[test]
    fn merge_outcome_accessors() {
        let attempted = MergeOutcome::AutoMergeAttempted {
            auto_merged: false,
            logic_review_passed: false,
        };
        let json = serde_json::to_value(attempted).unwrap();
        assert_eq!(json["mode"], "auto_merge_attempted");
        assert_eq!(json["autoMerged"], false);
    }
}
