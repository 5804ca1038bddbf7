//! Dual-sentinel trust gate.
//!
//! Fuses the security audit verdict and the logic review verdict into a
//! single decision on whether human review may be skipped. The gate is a pure
//! function of two already-computed verdicts: it performs no retries and no
//! I/O, and the orchestrator evaluates it at most once per run.

use serde::{Deserialize, Serialize};

use crate::{AuditReport, LogicReview};

/// Outcome of [`evaluate`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrustDecision {
    pub auto_merged: bool,
    /// Aggregated reasons from every failing sentinel. `None` iff
    /// `auto_merged`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fallback_reason: Option<String>,
}

/// Evaluates both sentinels.
///
/// The audit's `passed` flag is not trusted on its own: a report listing any
/// `critical` or `high` finding fails the gate even if it claims to pass.
/// Likewise a logic review claiming to pass while listing issues fails.
pub fn evaluate(audit: &AuditReport, review: &LogicReview) -> TrustDecision {
    let mut reasons = Vec::new();

    if !audit.is_clean() {
        let blocking: Vec<String> = audit.blocking_findings().map(ToString::to_string).collect();
        let mut reason = format!(
            "security audit failed with {} critical/high finding(s)",
            blocking.len()
        );
        if audit.passed {
            reason.push_str(" despite reporting passed");
        }
        if !blocking.is_empty() {
            reason.push_str(": ");
            reason.push_str(&blocking.join("; "));
        }
        reasons.push(reason);
    }

    if !review.is_clean() {
        let mut reason = format!("logic review failed with {} issue(s)", review.issues.len());
        if !review.issues.is_empty() {
            reason.push_str(": ");
            reason.push_str(&review.issues.join("; "));
        }
        reasons.push(reason);
    }

    if reasons.is_empty() {
        TrustDecision {
            auto_merged: true,
            fallback_reason: None,
        }
    } else {
        TrustDecision {
            auto_merged: false,
            fallback_reason: Some(reasons.join(" | ")),
        }
    }
}
