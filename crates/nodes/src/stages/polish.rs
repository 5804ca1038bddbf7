use pipeline::{
    AuditReport, CodeArtifact, FlywheelError, KnowledgeDocument, PolishPayload, PolishedArtifact,
    Role, SnippetId, Stage, TechSpec,
};
use tracing::{info, instrument};

use super::StageContext;
use crate::prompts;

/// Polish stage: [`CodeArtifact`] + [`AuditReport`] → [`PolishedArtifact`].
///
/// Always receives the audit, passing or not, so unresolved findings can be
/// surfaced in the final summary. A golden nomination is written back to the
/// `golden` partition.
#[instrument(name = "stage.polish", skip_all, fields(artifact_id = %artifact.id))]
pub(crate) async fn polish(
    ctx: &StageContext<'_>,
    spec: &TechSpec,
    artifact: &CodeArtifact,
    audit: &AuditReport,
) -> Result<PolishedArtifact, FlywheelError> {
    let references = ctx.reference_material(Role::Polisher, &spec.title).await;
    let task = prompts::task::<PolishPayload>(
        "Produce the final version of the change below. Resolve audit findings where you can \
         and name every finding that remains unresolved in the summary. Nominate the result \
         as a golden example only if it is exemplary.",
        &[
            ("Specification", prompts::spec(spec)),
            ("Change summary", artifact.summary.clone()),
            ("Files", prompts::files(&artifact.files)),
            (
                "Audit",
                format!(
                    "Verdict: {}\n{}\n\n{}",
                    if audit.passed { "passed" } else { "failed" },
                    audit.summary,
                    prompts::findings(&audit.findings)
                ),
            ),
            ("Reference material", prompts::snippets(&references)),
        ],
    );

    let payload: PolishPayload = ctx
        .generate_validated(Stage::Polishing, Role::Polisher, &task)
        .await?;
    let polished = PolishedArtifact::from_payload(payload, spec.id);
    info!(
        artifact_id = %polished.artifact.id,
        golden = polished.is_golden(),
        "Artifact polished"
    );

    if polished.is_golden() {
        if let Some(id) = SnippetId::new(format!("golden-{}", polished.artifact.id)) {
            ctx.write_back(
                "golden",
                KnowledgeDocument {
                    id,
                    title: polished
                        .golden_title
                        .clone()
                        .unwrap_or_else(|| spec.title.clone()),
                    content: format!(
                        "{}\n\n{}",
                        polished.summary(),
                        prompts::files(&polished.artifact.files)
                    ),
                    tags: polished.golden_tags.iter().cloned().collect(),
                },
            )
            .await;
        }
    }

    Ok(polished)
}
