use pipeline::{CodeArtifact, FlywheelError, LogicReview, Role, Stage, TechSpec};
use tracing::{info, instrument};

use super::StageContext;
use crate::prompts;

/// Logic sentinel: checks the artifact against every acceptance criterion.
///
/// Only invoked when autonomous merge is requested; its verdict feeds the
/// trust gate alongside the audit.
#[instrument(name = "stage.review_logic", skip_all, fields(artifact_id = %artifact.id))]
pub(crate) async fn review_logic(
    ctx: &StageContext<'_>,
    spec: &TechSpec,
    artifact: &CodeArtifact,
) -> Result<LogicReview, FlywheelError> {
    let references = ctx.reference_material(Role::Critic, &spec.title).await;
    let task = prompts::task::<LogicReview>(
        "Decide whether the change below satisfies every acceptance criterion of the \
         specification. List each unmet criterion or logic error as a separate issue; pass \
         only when there are none.",
        &[
            ("Specification", prompts::spec(spec)),
            ("Files", prompts::files(&artifact.files)),
            ("Reference material", prompts::snippets(&references)),
        ],
    );

    let review: LogicReview = ctx
        .generate_validated(Stage::TrustGateEval, Role::Critic, &task)
        .await?;
    info!(passed = review.passed, issues = review.issues.len(), "Logic review complete");
    Ok(review)
}
