use pipeline::{
    AuditPayload, AuditReport, CodeArtifact, FlywheelError, KnowledgeDocument, Role, SnippetId,
    Stage, TechSpec, VerificationOutcome,
};
use tracing::{info, instrument, warn};

use super::StageContext;
use crate::prompts;

/// Audit stage: [`CodeArtifact`] → [`AuditReport`].
///
/// The report's `passed` flag is derived from its findings here, so the
/// invariant holds for every report leaving this stage. Findings are written
/// back to the `findings` partition for future audits.
#[instrument(name = "stage.audit", skip_all, fields(artifact_id = %artifact.id))]
pub(crate) async fn audit(
    ctx: &StageContext<'_>,
    spec: &TechSpec,
    artifact: &CodeArtifact,
    verification: &[VerificationOutcome],
) -> Result<AuditReport, FlywheelError> {
    let query = format!("{}\n{}", spec.title, artifact.summary);
    let references = ctx.reference_material(Role::Auditor, &query).await;
    let task = prompts::task::<AuditPayload>(
        "Audit the change below for security vulnerabilities, correctness defects, and unsafe \
         practices. Grade every finding: critical or high findings block the change.",
        &[
            ("Specification", prompts::spec(spec)),
            ("Change summary", artifact.summary.clone()),
            ("Files", prompts::files(&artifact.files)),
            ("Verification results", prompts::verification(verification)),
            ("Reference material", prompts::snippets(&references)),
        ],
    );

    let payload: AuditPayload = ctx
        .generate_validated(Stage::Auditing, Role::Auditor, &task)
        .await?;
    if !payload.is_consistent() {
        warn!(
            claimed = payload.passed,
            "Audit verdict disagreed with its findings; using the verdict derived from findings"
        );
    }
    let report = AuditReport::from_payload(payload, artifact.id);
    info!(
        audit_id = %report.id,
        passed = report.passed,
        findings = report.findings.len(),
        blocking = report.blocking_findings().count(),
        "Audit complete"
    );

    if !report.findings.is_empty() {
        if let Some(id) = SnippetId::new(format!("audit-{}", report.id)) {
            ctx.write_back(
                "findings",
                KnowledgeDocument {
                    id,
                    title: format!("Audit of: {}", spec.title),
                    content: format!(
                        "{}\n\n{}",
                        report.summary,
                        prompts::findings(&report.findings)
                    ),
                    tags: report
                        .findings
                        .iter()
                        .map(|f| f.category.clone())
                        .collect(),
                },
            )
            .await;
        }
    }

    Ok(report)
}
