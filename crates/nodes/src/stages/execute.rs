use pipeline::{
    ArtifactPayload, CodeArtifact, FlywheelError, Role, Stage, TechSpec, VerificationOutcome,
};
use tracing::{info, instrument, warn};

use super::StageContext;
use crate::prompts;

/// Execute stage: approved [`TechSpec`] → [`CodeArtifact`].
///
/// When a verification runner is configured, each verification step is run
/// once as a self-check. The outcomes are reported and handed to the audit
/// stage; they never block the run and never cost an extra generator call.
#[instrument(name = "stage.execute", skip_all, fields(spec_id = %spec.id))]
pub(crate) async fn execute(
    ctx: &StageContext<'_>,
    spec: &TechSpec,
) -> Result<(CodeArtifact, Vec<VerificationOutcome>), FlywheelError> {
    let query = format!("{}\n{}", spec.title, spec.acceptance_criteria.join("\n"));
    let references = ctx.reference_material(Role::Engineer, &query).await;
    let task = prompts::task::<ArtifactPayload>(
        "Implement the specification below. Return the complete content of every file you \
         create or change, keyed by path relative to the repository root, and the shell \
         commands that verify the change.",
        &[
            ("Specification", prompts::spec(spec)),
            ("Reference material", prompts::snippets(&references)),
        ],
    );

    let payload: ArtifactPayload = ctx
        .generate_validated(Stage::Executing, Role::Engineer, &task)
        .await?;
    let artifact = CodeArtifact::from_payload(payload, spec.id);
    if artifact.files.is_empty() {
        warn!(artifact_id = %artifact.id, "Generated artifact contains no files");
    }
    info!(
        artifact_id = %artifact.id,
        files = artifact.files.len(),
        steps = artifact.verification_steps.len(),
        "Artifact generated"
    );

    let outcomes = self_check(ctx, &artifact).await;
    Ok((artifact, outcomes))
}

async fn self_check(ctx: &StageContext<'_>, artifact: &CodeArtifact) -> Vec<VerificationOutcome> {
    let Some(verifier) = ctx.verifier else {
        return Vec::new();
    };

    let mut outcomes = Vec::with_capacity(artifact.verification_steps.len());
    for command in &artifact.verification_steps {
        let outcome = verifier.run(command).await;
        if !outcome.success {
            warn!(command = %command, exit_code = ?outcome.exit_code, "Verification step failed");
        }
        ctx.sink.emit(
            Stage::Executing,
            "verification",
            &[
                ("command", command.clone()),
                ("success", outcome.success.to_string()),
                (
                    "exit_code",
                    outcome
                        .exit_code
                        .map_or_else(|| "none".to_string(), |c| c.to_string()),
                ),
            ],
        );
        outcomes.push(outcome);
    }
    outcomes
}
