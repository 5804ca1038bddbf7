//! Stage transforms.
//!
//! Each transform turns the current artifact (plus retrieved reference
//! material) into the next artifact via the generator, and hands the raw
//! response to the [`SchemaGuard`]. A failure the guard cannot correct is
//! returned as a hard [`FlywheelError`] naming the stage; artifacts are never
//! silently degraded.

mod audit;
mod execute;
mod plan;
mod polish;
mod review;

pub(crate) use audit::audit;
pub(crate) use execute::execute;
pub(crate) use plan::plan;
pub(crate) use polish::polish;
pub(crate) use review::review_logic;

use pipeline::{
    Contract, CorrectionContext, FlywheelConfig, FlywheelError, Generator, GuardError,
    KnowledgeDocument, KnowledgeRetriever, KnowledgeWriter, ObservabilitySink, PartitionName,
    Role, RoleConfig, SchemaGuard, Snippet, Stage, TextSanitizer, VerificationRunner,
};
use tracing::{debug, warn};

/// Collaborators and configuration shared by every stage of one run.
pub(crate) struct StageContext<'a> {
    pub generator: &'a dyn Generator,
    pub retriever: &'a dyn KnowledgeRetriever,
    pub sanitizer: &'a dyn TextSanitizer,
    pub writer: Option<&'a dyn KnowledgeWriter>,
    pub verifier: Option<&'a dyn VerificationRunner>,
    pub sink: &'a dyn ObservabilitySink,
    pub roles: &'a RoleConfig,
    pub config: &'a FlywheelConfig,
}

impl StageContext<'_> {
    /// Retrieves reference material for `role` from all of its partitions.
    ///
    /// Retrieval is supporting context only: a failure degrades to an empty
    /// list with a warning.
    pub(crate) async fn reference_material(&self, role: Role, query: &str) -> Vec<Snippet> {
        let partitions = &self.roles.get(role).partitions;
        if partitions.is_empty() {
            return Vec::new();
        }
        match self
            .retriever
            .retrieve_multi(query, partitions, self.config.top_k_each)
            .await
        {
            Ok(snippets) => {
                debug!(role = %role, count = snippets.len(), "Retrieved reference material");
                snippets
            }
            Err(error) => {
                warn!(role = %role, %error, "Reference retrieval failed; continuing without it");
                Vec::new()
            }
        }
    }

    /// Calls the generator for `task` and validates the answer against `T`,
    /// with bounded self-correction.
    pub(crate) async fn generate_validated<T: Contract>(
        &self,
        stage: Stage,
        role: Role,
        task: &str,
    ) -> Result<T, FlywheelError> {
        let system_context = self.roles.get(role).system_prompt.as_str();
        let raw = self
            .generator
            .generate(system_context, task)
            .await
            .map_err(|source| FlywheelError::GeneratorFailure { stage, source })?;

        let correction = CorrectionContext {
            system_context,
            task,
            previous_response_limit: self.config.guard.previous_response_limit,
        };
        SchemaGuard::new(self.generator)
            .validate_with_correction::<T>(raw, &correction, self.config.guard.max_retries)
            .await
            .map_err(|error| match error {
                GuardError::Generator(source) => FlywheelError::GeneratorFailure { stage, source },
                GuardError::Exhausted {
                    contract,
                    attempts,
                    diagnostic,
                } => FlywheelError::SelfCorrectionExhausted {
                    stage,
                    contract,
                    attempts,
                    diagnostic: diagnostic.to_string(),
                },
            })
    }

    /// Appends a sanitized document to the knowledge base, if a writer is
    /// configured. Best-effort: failures are logged, never propagated.
    pub(crate) async fn write_back(&self, partition: &str, mut document: KnowledgeDocument) {
        let Some(writer) = self.writer else {
            return;
        };
        let Some(partition) = PartitionName::new(partition) else {
            return;
        };
        document.title = self.sanitizer.sanitize(&document.title);
        document.content = self.sanitizer.sanitize(&document.content);
        match writer.append(&partition, document).await {
            Ok(()) => debug!(partition = %partition, "Knowledge write-back appended"),
            Err(error) => warn!(partition = %partition, %error, "Knowledge write-back failed"),
        }
    }
}
