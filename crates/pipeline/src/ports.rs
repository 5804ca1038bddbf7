//! Port traits for every external collaborator the pipeline core talks to.
//!
//! Infrastructure crates implement these; the orchestrator receives them by
//! injection at construction time. Nothing in this crate reaches for a
//! process-wide handle.

use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::errors::{ConfigError, GeneratorError, KnowledgeError, RetrievalError};
use crate::{PartitionName, RoleConfig, SnippetId, Stage, TechSpec};

// ---------------------------------------------------------------------------
// Generator
// ---------------------------------------------------------------------------

/// The external text generator (an LLM call).
///
/// Each call is treated as atomic. A stage may call it several times: once
/// for the original request, then once per self-correction round.
#[async_trait]
pub trait Generator: Send + Sync {
    async fn generate(&self, system_context: &str, prompt: &str) -> Result<String, GeneratorError>;
}

// ---------------------------------------------------------------------------
// Knowledge retrieval and write-back
// ---------------------------------------------------------------------------

/// A ranked text snippet returned by a [`KnowledgeRetriever`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snippet {
    pub id: SnippetId,
    pub content: String,
    pub relevance_score: f64,
}

/// Read side of the shared knowledge base.
#[async_trait]
pub trait KnowledgeRetriever: Send + Sync {
    /// Returns at most `top_k` snippets from one partition, best first.
    async fn retrieve(
        &self,
        query: &str,
        partition: &PartitionName,
        top_k: usize,
    ) -> Result<Vec<Snippet>, RetrievalError>;

    /// Queries every partition concurrently and returns the de-duplicated
    /// union sorted by descending relevance.
    ///
    /// A failing partition is skipped with a warning; the call fails only
    /// when every partition failed.
    async fn retrieve_multi(
        &self,
        query: &str,
        partitions: &[PartitionName],
        top_k_each: usize,
    ) -> Result<Vec<Snippet>, RetrievalError> {
        let results = futures::future::join_all(
            partitions
                .iter()
                .map(|partition| self.retrieve(query, partition, top_k_each)),
        )
        .await;

        let mut batches = Vec::with_capacity(results.len());
        let mut last_error = None;
        for (partition, result) in partitions.iter().zip(results) {
            match result {
                Ok(batch) => batches.push(batch),
                Err(error) => {
                    warn!(partition = %partition, %error, "Knowledge partition retrieval failed");
                    last_error = Some(error);
                }
            }
        }

        match last_error {
            Some(error) if batches.is_empty() => Err(error),
            _ => Ok(merge_snippets(batches)),
        }
    }
}

/// Merges per-partition results: one entry per snippet id (keeping its
/// highest score), ordered by descending score with ties broken by id.
pub fn merge_snippets(batches: impl IntoIterator<Item = Vec<Snippet>>) -> Vec<Snippet> {
    let mut best: HashMap<SnippetId, Snippet> = HashMap::new();
    for snippet in batches.into_iter().flatten() {
        match best.get(&snippet.id) {
            Some(existing) if existing.relevance_score >= snippet.relevance_score => {}
            _ => {
                best.insert(snippet.id.clone(), snippet);
            }
        }
    }
    let mut merged: Vec<Snippet> = best.into_values().collect();
    merged.sort_by(|a, b| {
        b.relevance_score
            .total_cmp(&a.relevance_score)
            .then_with(|| a.id.cmp(&b.id))
    });
    merged
}

/// A document appended to the knowledge base after a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnowledgeDocument {
    pub id: SnippetId,
    pub title: String,
    pub content: String,
    #[serde(default)]
    pub tags: Vec<String>,
}

/// Write side of the shared knowledge base. Append-only from the pipeline's
/// perspective.
#[async_trait]
pub trait KnowledgeWriter: Send + Sync {
    async fn append(
        &self,
        partition: &PartitionName,
        document: KnowledgeDocument,
    ) -> Result<(), KnowledgeError>;
}

/// Outcome of a knowledge refresh.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeedReport {
    pub documents_loaded: usize,
    pub partitions: Vec<PartitionName>,
}

/// Refreshes the knowledge base before planning (the `Seeding` stage).
#[async_trait]
pub trait KnowledgeSeeder: Send + Sync {
    async fn reseed(&self) -> Result<SeedReport, KnowledgeError>;
}

/// Loads the role configuration (prompt documents) at the defined reload
/// points: process start-up and the `Seeding` stage.
#[async_trait]
pub trait RoleConfigLoader: Send + Sync {
    async fn load(&self) -> Result<RoleConfig, ConfigError>;
}

// ---------------------------------------------------------------------------
// Sanitizer
// ---------------------------------------------------------------------------

/// Removes personally identifying substrings before text is persisted into
/// the knowledge base.
pub trait TextSanitizer: Send + Sync {
    fn sanitize(&self, text: &str) -> String;
}

/// A sanitizer that returns its input unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct PassthroughSanitizer;

impl TextSanitizer for PassthroughSanitizer {
    fn sanitize(&self, text: &str) -> String {
        text.to_string()
    }
}

// ---------------------------------------------------------------------------
// Verification
// ---------------------------------------------------------------------------

/// Result of one verification command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationOutcome {
    pub command: String,
    pub success: bool,
    pub output: String,
    pub exit_code: Option<i32>,
}

/// Runs an artifact's verification steps (used by the execute stage's
/// self-check only).
#[async_trait]
pub trait VerificationRunner: Send + Sync {
    async fn run(&self, command: &str) -> VerificationOutcome;
}

// ---------------------------------------------------------------------------
// Observability
// ---------------------------------------------------------------------------

/// Fire-and-forget progress sink.
pub trait ObservabilitySink: Send + Sync {
    fn emit(&self, stage: Stage, event: &str, attributes: &[(&str, String)]);
}

// ---------------------------------------------------------------------------
// Approval
// ---------------------------------------------------------------------------

/// Where in the run an approval is being requested.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "checkpoint", rename_all = "snake_case")]
pub enum ApprovalCheckpoint {
    /// Between planning and execution.
    BeforeExecution,
    /// After the trust gate refused autonomous merge.
    TrustGateFallback { reason: String },
}

impl ApprovalCheckpoint {
    pub fn stage(&self) -> Stage {
        match self {
            ApprovalCheckpoint::BeforeExecution => Stage::AwaitingApproval,
            ApprovalCheckpoint::TrustGateFallback { .. } => Stage::AwaitingApprovalFallback,
        }
    }
}

/// Why an approver declined.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApprovalRejection {
    pub reason: String,
}

impl ApprovalRejection {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

/// Human (or programmatic) approval hook.
///
/// At [`ApprovalCheckpoint::BeforeExecution`] the returned spec, possibly
/// edited, becomes the spec that is executed. It keeps the planned id and
/// must still have at least one acceptance criterion.
#[async_trait]
pub trait SpecApprover: Send + Sync {
    async fn approve(
        &self,
        spec: &TechSpec,
        checkpoint: &ApprovalCheckpoint,
    ) -> Result<TechSpec, ApprovalRejection>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snippet(id: &str, score: f64) -> Snippet {
        Snippet {
            id: SnippetId::new(id).unwrap(),
            content: format!("content of {id}"),
            relevance_score: score,
        }
    }

    #[test]
    fn merge_deduplicates_and_sorts_by_score() {
        let merged = merge_snippets(vec![
            vec![snippet("a", 0.4), snippet("b", 0.9)],
            vec![snippet("a", 0.7), snippet("c", 0.1)],
        ]);
        let order: Vec<_> = merged
            .iter()
            .map(|s| (s.id.as_str(), s.relevance_score))
            .collect();
        assert_eq!(order, vec![("b", 0.9), ("a", 0.7), ("c", 0.1)]);
    }

    #[test]
    fn merge_breaks_ties_by_id() {
        let merged = merge_snippets(vec![vec![snippet("z", 0.5)], vec![snippet("m", 0.5)]]);
        assert_eq!(merged[0].id.as_str(), "m");
    }

    struct FlakyRetriever;

    #[async_trait]
    impl KnowledgeRetriever for FlakyRetriever {
        async fn retrieve(
            &self,
            _query: &str,
            partition: &PartitionName,
            _top_k: usize,
        ) -> Result<Vec<Snippet>, RetrievalError> {
            match partition.as_str() {
                "good" => Ok(vec![snippet("doc", 0.8)]),
                other => Err(RetrievalError::UnknownPartition {
                    partition: other.to_string(),
                }),
            }
        }
    }

    fn partitions(names: &[&str]) -> Vec<PartitionName> {
        names.iter().filter_map(|n| PartitionName::new(*n)).collect()
    }

    #[tokio::test]
    async fn retrieve_multi_skips_failing_partitions() {
        let result = FlakyRetriever
            .retrieve_multi("query", &partitions(&["bad", "good"]), 3)
            .await
            .unwrap();
        assert_eq!(result.len(), 1);
    }

    #[tokio::test]
    async fn retrieve_multi_fails_when_every_partition_fails() {
        let result = FlakyRetriever
            .retrieve_multi("query", &partitions(&["bad", "worse"]), 3)
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn retrieve_multi_with_no_partitions_is_empty() {
        let result = FlakyRetriever.retrieve_multi("query", &[], 3).await.unwrap();
        assert!(result.is_empty());
    }
}
