//! Typed contracts that generator output must satisfy.
//!
//! Each stage asks the generator for a *payload*: the content-bearing fields of
//! an entity, without identity or provenance. A payload type implements
//! [`Contract`], which couples the structural [`Schema`] checked on the raw
//! JSON with any cross-field rule that can only be checked once typed.

use std::collections::{BTreeMap, BTreeSet};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};

use crate::schema::{KeyRule, Rule, Schema, Violation};
use crate::{Finding, LogicReview, Severity};

/// A typed target for [`crate::SchemaGuard`] validation.
pub trait Contract: DeserializeOwned + Send {
    /// Human-readable contract name used in diagnostics.
    const NAME: &'static str;

    /// Field/type rules checked on the untyped JSON value.
    fn schema() -> Schema;

    /// Cross-field rules checked after typed deserialisation.
    fn check(&self) -> Vec<Violation> {
        Vec::new()
    }

    /// A compact example of the expected JSON shape, quoted in prompts.
    fn shape_hint() -> &'static str;
}

/// Reads an explicit JSON `null` the same way as an absent field.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

// ---------------------------------------------------------------------------
// Plan
// ---------------------------------------------------------------------------

/// Generator payload for a [`crate::TechSpec`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpecPayload {
    pub title: String,
    pub acceptance_criteria: Vec<String>,
    #[serde(default)]
    pub affected_paths: BTreeSet<String>,
    #[serde(
        default,
        rename = "referencedADRs",
        deserialize_with = "null_as_default"
    )]
    pub referenced_adrs: BTreeSet<String>,
    #[serde(default)]
    pub notes: Option<String>,
}

impl Contract for SpecPayload {
    const NAME: &'static str = "TechSpec";

    fn schema() -> Schema {
        Schema::new()
            .required("title", Rule::non_empty_string())
            .required(
                "acceptanceCriteria",
                Rule::non_empty_array_of(Rule::non_empty_string()),
            )
            .required("affectedPaths", Rule::array_of(Rule::string()))
            .optional("referencedADRs", Rule::array_of(Rule::string()))
            .optional("notes", Rule::string())
    }

    fn shape_hint() -> &'static str {
        r#"{"title": "...", "acceptanceCriteria": ["..."], "affectedPaths": ["src/..."], "referencedADRs": ["ADR-001"], "notes": "optional"}"#
    }
}

// ---------------------------------------------------------------------------
// Execute
// ---------------------------------------------------------------------------

fn artifact_schema() -> Schema {
    Schema::new()
        .required(
            "files",
            Rule::map_of(KeyRule::RelativePath, Rule::string()),
        )
        .required("summary", Rule::non_empty_string())
        .required(
            "verificationSteps",
            Rule::array_of(Rule::non_empty_string()),
        )
}

/// Generator payload for a [`crate::CodeArtifact`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArtifactPayload {
    pub files: BTreeMap<String, String>,
    pub summary: String,
    pub verification_steps: Vec<String>,
}

impl Contract for ArtifactPayload {
    const NAME: &'static str = "CodeArtifact";

    fn schema() -> Schema {
        artifact_schema()
    }

    fn shape_hint() -> &'static str {
        r#"{"files": {"relative/path.ext": "full file content"}, "summary": "...", "verificationSteps": ["command to run"]}"#
    }
}

// ---------------------------------------------------------------------------
// Audit
// ---------------------------------------------------------------------------

/// Generator payload for a [`crate::AuditReport`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditPayload {
    pub passed: bool,
    pub findings: Vec<Finding>,
    pub summary: String,
}

impl AuditPayload {
    /// `true` when the producer's `passed` flag agrees with its findings.
    pub fn is_consistent(&self) -> bool {
        self.passed == !self.findings.iter().any(|f| f.severity.is_blocking())
    }
}

impl Contract for AuditPayload {
    const NAME: &'static str = "AuditReport";

    fn schema() -> Schema {
        let finding = Schema::new()
            .required("severity", Rule::Enum(Severity::NAMES))
            .required("category", Rule::non_empty_string())
            .required("description", Rule::non_empty_string())
            .optional("location", Rule::string())
            .optional("suggestion", Rule::string());
        Schema::new()
            .required("passed", Rule::Bool)
            .required("findings", Rule::array_of(Rule::Object(finding)))
            .required("summary", Rule::non_empty_string())
    }

    fn shape_hint() -> &'static str {
        r#"{"passed": true, "findings": [{"severity": "critical|high|medium|low|info", "category": "...", "description": "...", "location": "optional", "suggestion": "optional"}], "summary": "..."}"#
    }
}

// ---------------------------------------------------------------------------
// Logic review
// ---------------------------------------------------------------------------

impl Contract for LogicReview {
    const NAME: &'static str = "LogicReview";

    fn schema() -> Schema {
        Schema::new()
            .required("passed", Rule::Bool)
            .required("issues", Rule::array_of(Rule::non_empty_string()))
    }

    fn check(&self) -> Vec<Violation> {
        match (self.passed, self.issues.is_empty()) {
            (true, false) => vec![Violation::new(
                "issues",
                format!(
                    "expected no issues when passed is true, got {}",
                    self.issues.len()
                ),
            )],
            (false, true) => vec![Violation::new(
                "issues",
                "expected at least 1 issue when passed is false, got 0",
            )],
            _ => Vec::new(),
        }
    }

    fn shape_hint() -> &'static str {
        r#"{"passed": false, "issues": ["acceptance criterion not met: ..."]}"#
    }
}

// ---------------------------------------------------------------------------
// Polish
// ---------------------------------------------------------------------------

/// Generator payload for a [`crate::PolishedArtifact`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PolishPayload {
    pub files: BTreeMap<String, String>,
    pub summary: String,
    pub verification_steps: Vec<String>,
    #[serde(default)]
    pub nominate_as_golden: Option<bool>,
    #[serde(default)]
    pub golden_title: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub golden_tags: BTreeSet<String>,
}

impl Contract for PolishPayload {
    const NAME: &'static str = "PolishedArtifact";

    fn schema() -> Schema {
        artifact_schema()
            .optional("nominateAsGolden", Rule::Bool)
            .optional("goldenTitle", Rule::non_empty_string())
            .optional("goldenTags", Rule::array_of(Rule::non_empty_string()))
    }

    fn shape_hint() -> &'static str {
        r#"{"files": {"relative/path.ext": "full file content"}, "summary": "...", "verificationSteps": ["..."], "nominateAsGolden": false, "goldenTitle": "optional", "goldenTags": ["optional"]}"#
    }
}
