use pipeline::{FlywheelError, Role, SpecPayload, Stage, TechSpec};
use tracing::{info, instrument};

use super::StageContext;
use crate::prompts;

/// Plan stage: brief → [`TechSpec`].
#[instrument(name = "stage.plan", skip_all)]
pub(crate) async fn plan(ctx: &StageContext<'_>, brief: &str) -> Result<TechSpec, FlywheelError> {
    let references = ctx.reference_material(Role::Architect, brief).await;
    let task = prompts::task::<SpecPayload>(
        "Write a technical specification for the feature brief below. Every acceptance \
         criterion must be independently testable.",
        &[
            ("Feature brief", brief.to_string()),
            ("Reference material", prompts::snippets(&references)),
        ],
    );

    let payload: SpecPayload = ctx
        .generate_validated(Stage::Planning, Role::Architect, &task)
        .await?;
    let spec = TechSpec::from_payload(payload, brief);
    info!(
        spec_id = %spec.id,
        criteria = spec.acceptance_criteria.len(),
        "Specification planned"
    );
    Ok(spec)
}
