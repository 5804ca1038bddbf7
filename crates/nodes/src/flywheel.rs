//! The pipeline orchestrator.
//!
//! [`Flywheel::run`] drives one run through the state machine:
//!
//! ```text
//! START ──(reseed)──▶ SEEDING ──▶ PLANNING
//! PLANNING ──(approver ∧ ¬auto_merge)──▶ AWAITING_APPROVAL ──▶ EXECUTING | ABORTED
//! PLANNING ──(otherwise)──▶ EXECUTING ──▶ AUDITING
//! AUDITING ──(failed ∧ halt_on_audit_failure)──▶ ABORTED
//! AUDITING ──(auto_merge)──▶ TRUST_GATE_EVAL
//! AUDITING ──(otherwise)──▶ POLISHING
//! TRUST_GATE_EVAL ──(auto_merged)──▶ POLISHING
//! TRUST_GATE_EVAL ──(refused ∧ approver)──▶ AWAITING_APPROVAL_FALLBACK ──▶ POLISHING | ABORTED
//! TRUST_GATE_EVAL ──(refused ∧ no approver)──▶ ABORTED
//! POLISHING ──▶ DONE
//! ```
//!
//! Stages run strictly sequentially. Every transition is reported to the
//! observability sink; every abort returns exactly one [`FlywheelError`] and
//! no partial result.

use std::sync::Arc;
use std::time::Instant;

use pipeline::trust_gate;
use pipeline::{
    ApprovalCheckpoint, FlywheelConfig, FlywheelError, Generator, KnowledgeRetriever,
    KnowledgeSeeder, KnowledgeWriter, MergeOutcome, ObservabilitySink, PassthroughSanitizer,
    PipelineResult, RoleConfig, RoleConfigLoader, RunId, SpecApprover, Stage, TechSpec,
    TextSanitizer, Timestamp, VerificationRunner,
};
use tracing::{error, info, info_span, warn, Instrument};

use crate::observability::TracingSink;
use crate::stages::{self, StageContext};
use crate::timeout::TimeoutGenerator;

// ---------------------------------------------------------------------------
// Run options
// ---------------------------------------------------------------------------

/// Per-run switches.
#[derive(Clone, Default)]
pub struct RunOptions {
    /// Refresh external knowledge (and reload role prompts) before planning.
    pub reseed: bool,
    /// Abort when the audit fails, before any trust-gate evaluation.
    pub halt_on_audit_failure: bool,
    /// Ask the trust gate whether human review can be skipped.
    pub auto_merge: bool,
    /// Human-in-the-loop hook. Consulted after planning unless `auto_merge`
    /// is set, and as the fallback when the trust gate refuses.
    pub approver: Option<Arc<dyn SpecApprover>>,
}

impl RunOptions {
    pub fn with_approver(mut self, approver: Arc<dyn SpecApprover>) -> Self {
        self.approver = Some(approver);
        self
    }
}

impl std::fmt::Debug for RunOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunOptions")
            .field("reseed", &self.reseed)
            .field("halt_on_audit_failure", &self.halt_on_audit_failure)
            .field("auto_merge", &self.auto_merge)
            .field("approver", &self.approver.is_some())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

/// Assembles a [`Flywheel`] from its collaborators.
///
/// The generator and retriever are required; every other collaborator is
/// optional. Without a sanitizer text is persisted unchanged, and without a
/// sink progress goes to `tracing`.
pub struct FlywheelBuilder {
    generator: Arc<dyn Generator>,
    retriever: Arc<dyn KnowledgeRetriever>,
    sanitizer: Option<Arc<dyn TextSanitizer>>,
    writer: Option<Arc<dyn KnowledgeWriter>>,
    verifier: Option<Arc<dyn VerificationRunner>>,
    sink: Option<Arc<dyn ObservabilitySink>>,
    seeder: Option<Arc<dyn KnowledgeSeeder>>,
    role_loader: Option<Arc<dyn RoleConfigLoader>>,
    roles: Option<RoleConfig>,
    config: FlywheelConfig,
}

impl FlywheelBuilder {
    pub fn new(generator: Arc<dyn Generator>, retriever: Arc<dyn KnowledgeRetriever>) -> Self {
        Self {
            generator,
            retriever,
            sanitizer: None,
            writer: None,
            verifier: None,
            sink: None,
            seeder: None,
            role_loader: None,
            roles: None,
            config: FlywheelConfig::default(),
        }
    }

    pub fn sanitizer(mut self, sanitizer: Arc<dyn TextSanitizer>) -> Self {
        self.sanitizer = Some(sanitizer);
        self
    }

    pub fn writer(mut self, writer: Arc<dyn KnowledgeWriter>) -> Self {
        self.writer = Some(writer);
        self
    }

    pub fn verifier(mut self, verifier: Arc<dyn VerificationRunner>) -> Self {
        self.verifier = Some(verifier);
        self
    }

    pub fn sink(mut self, sink: Arc<dyn ObservabilitySink>) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn seeder(mut self, seeder: Arc<dyn KnowledgeSeeder>) -> Self {
        self.seeder = Some(seeder);
        self
    }

    /// Source of role prompts, consulted at the `Seeding` stage of a
    /// reseeding run. Start-up roles come from [`Self::roles`].
    pub fn role_loader(mut self, loader: Arc<dyn RoleConfigLoader>) -> Self {
        self.role_loader = Some(loader);
        self
    }

    pub fn roles(mut self, roles: RoleConfig) -> Self {
        self.roles = Some(roles);
        self
    }

    pub fn config(mut self, config: FlywheelConfig) -> Self {
        self.config = config;
        self
    }

    pub fn build(self) -> Result<Flywheel, FlywheelError> {
        self.config
            .validate()
            .map_err(|source| FlywheelError::Configuration {
                stage: Stage::Aborted,
                source,
            })?;
        let roles = self.roles.unwrap_or_else(RoleConfig::builtin);
        let generator: Arc<dyn Generator> = Arc::new(TimeoutGenerator::new(
            self.generator,
            self.config.generator_timeout(),
        ));

        Ok(Flywheel {
            generator,
            retriever: self.retriever,
            sanitizer: self
                .sanitizer
                .unwrap_or_else(|| Arc::new(PassthroughSanitizer)),
            writer: self.writer,
            verifier: self.verifier,
            sink: self.sink.unwrap_or_else(|| Arc::new(TracingSink)),
            seeder: self.seeder,
            role_loader: self.role_loader,
            roles: Arc::new(roles),
            config: self.config,
        })
    }
}

// ---------------------------------------------------------------------------
// Orchestrator
// ---------------------------------------------------------------------------

/// Sequences plan → execute → audit → (trust gate) → polish.
///
/// Holds only shared, read-mostly collaborators; each run owns its artifact
/// chain exclusively, so concurrent runs on one instance need no locking.
pub struct Flywheel {
    generator: Arc<dyn Generator>,
    retriever: Arc<dyn KnowledgeRetriever>,
    sanitizer: Arc<dyn TextSanitizer>,
    writer: Option<Arc<dyn KnowledgeWriter>>,
    verifier: Option<Arc<dyn VerificationRunner>>,
    sink: Arc<dyn ObservabilitySink>,
    seeder: Option<Arc<dyn KnowledgeSeeder>>,
    role_loader: Option<Arc<dyn RoleConfigLoader>>,
    roles: Arc<RoleConfig>,
    config: FlywheelConfig,
}

impl Flywheel {
    pub fn builder(
        generator: Arc<dyn Generator>,
        retriever: Arc<dyn KnowledgeRetriever>,
    ) -> FlywheelBuilder {
        FlywheelBuilder::new(generator, retriever)
    }

    /// Runs the pipeline for `brief` to completion or abort.
    pub async fn run(
        &self,
        brief: &str,
        options: RunOptions,
    ) -> Result<PipelineResult, FlywheelError> {
        let run_id = RunId::new_random();
        let span = info_span!("flywheel.run", run_id = %run_id);
        let started = Instant::now();

        let outcome = self
            .drive(run_id, brief, &options, started)
            .instrument(span.clone())
            .await;

        span.in_scope(|| self.report_outcome(run_id, &outcome));
        outcome
    }

    async fn drive(
        &self,
        run_id: RunId,
        brief: &str,
        options: &RunOptions,
        started: Instant,
    ) -> Result<PipelineResult, FlywheelError> {
        let brief = brief.trim();
        if brief.is_empty() {
            return Err(FlywheelError::InvalidInput {
                message: "brief must not be empty".into(),
            });
        }
        info!(?options, "Pipeline run started");

        let roles = if options.reseed {
            self.enter(run_id, Stage::Seeding);
            self.reseed().await?
        } else {
            Arc::clone(&self.roles)
        };
        let ctx = self.stage_context(&roles);

        self.enter(run_id, Stage::Planning);
        let mut spec = stages::plan(&ctx, brief).await?;

        if !options.auto_merge {
            if let Some(approver) = options.approver.as_deref() {
                self.enter(run_id, Stage::AwaitingApproval);
                let approved =
                    request_approval(approver, &spec, ApprovalCheckpoint::BeforeExecution)
                        .await?;
                spec = accept_amended_spec(&spec, approved)?;
            }
        }

        self.enter(run_id, Stage::Executing);
        let (artifact, verification) = stages::execute(&ctx, &spec).await?;

        self.enter(run_id, Stage::Auditing);
        let audit = stages::audit(&ctx, &spec, &artifact, &verification).await?;

        if !audit.is_clean() && options.halt_on_audit_failure {
            return Err(FlywheelError::AuditHalt {
                blocking: audit.blocking_findings().cloned().collect(),
                summary: audit.summary.clone(),
            });
        }

        let merge = if options.auto_merge {
            self.enter(run_id, Stage::TrustGateEval);
            let review = stages::review_logic(&ctx, &spec, &artifact).await?;
            let decision = trust_gate::evaluate(&audit, &review);
            self.sink.emit(
                Stage::TrustGateEval,
                "decision",
                &[
                    ("run_id", run_id.to_string()),
                    ("auto_merged", decision.auto_merged.to_string()),
                    ("audit_passed", audit.is_clean().to_string()),
                    ("logic_review_passed", review.is_clean().to_string()),
                ],
            );

            if !decision.auto_merged {
                let reason = decision.fallback_reason.clone().unwrap_or_default();
                warn!(%reason, "Trust gate refused autonomous merge");
                let Some(approver) = options.approver.as_deref() else {
                    return Err(FlywheelError::TrustGateFailure { reason });
                };
                self.enter(run_id, Stage::AwaitingApprovalFallback);
                request_approval(
                    approver,
                    &spec,
                    ApprovalCheckpoint::TrustGateFallback { reason },
                )
                .await?;
            }

            MergeOutcome::AutoMergeAttempted {
                auto_merged: decision.auto_merged,
                logic_review_passed: review.is_clean(),
            }
        } else {
            MergeOutcome::Standard
        };

        self.enter(run_id, Stage::Polishing);
        let polished = stages::polish(&ctx, &spec, &artifact, &audit).await?;

        Ok(PipelineResult {
            run_id,
            brief: brief.to_string(),
            spec,
            artifact,
            audit,
            polished,
            completed_at: Timestamp::now(),
            duration_ms: u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
            merge,
        })
    }

    fn report_outcome(&self, run_id: RunId, outcome: &Result<PipelineResult, FlywheelError>) {
        match outcome {
            Ok(result) => {
                self.enter(run_id, Stage::Done);
                self.sink.emit(
                    Stage::Done,
                    "completed",
                    &[
                        ("run_id", run_id.to_string()),
                        ("duration_ms", result.duration_ms.to_string()),
                    ],
                );
                info!(duration_ms = result.duration_ms, "Pipeline run completed");
            }
            Err(err) => {
                self.enter(run_id, Stage::Aborted);
                self.sink.emit(
                    Stage::Aborted,
                    "aborted",
                    &[
                        ("run_id", run_id.to_string()),
                        ("kind", err.kind().to_string()),
                        ("failed_stage", err.stage().to_string()),
                        ("detail", err.to_string()),
                    ],
                );
                error!(kind = %err.kind(), stage = %err.stage(), error = %err, "Pipeline run aborted");
            }
        }
    }

    /// The `Seeding` stage: refresh knowledge, then reload role prompts.
    async fn reseed(&self) -> Result<Arc<RoleConfig>, FlywheelError> {
        match &self.seeder {
            Some(seeder) => {
                let report = seeder
                    .reseed()
                    .await
                    .map_err(|e| FlywheelError::SeedingFailed {
                        message: e.to_string(),
                    })?;
                info!(
                    documents = report.documents_loaded,
                    partitions = report.partitions.len(),
                    "Knowledge reseeded"
                );
            }
            None => warn!("Reseed requested but no knowledge seeder is configured"),
        }

        match &self.role_loader {
            Some(loader) => {
                let roles = loader
                    .load()
                    .await
                    .map_err(|source| FlywheelError::Configuration {
                        stage: Stage::Seeding,
                        source,
                    })?;
                info!("Role prompts reloaded");
                Ok(Arc::new(roles))
            }
            None => Ok(Arc::clone(&self.roles)),
        }
    }

    fn stage_context<'a>(&'a self, roles: &'a RoleConfig) -> StageContext<'a> {
        StageContext {
            generator: self.generator.as_ref(),
            retriever: self.retriever.as_ref(),
            sanitizer: self.sanitizer.as_ref(),
            writer: self.writer.as_deref(),
            verifier: self.verifier.as_deref(),
            sink: self.sink.as_ref(),
            roles,
            config: &self.config,
        }
    }

    fn enter(&self, run_id: RunId, stage: Stage) {
        info!(stage = %stage, "Entering stage");
        self.sink.emit(
            stage,
            "entered",
            &[
                ("run_id", run_id.to_string()),
                ("timestamp", Timestamp::now().to_string()),
            ],
        );
    }
}

/// Takes the approver's version of the spec, keeping the planned identity.
/// An amendment that leaves no acceptance criteria is a rejection.
fn accept_amended_spec(
    planned: &TechSpec,
    approved: TechSpec,
) -> Result<TechSpec, FlywheelError> {
    if approved
        .acceptance_criteria
        .iter()
        .all(|criterion| criterion.trim().is_empty())
    {
        return Err(FlywheelError::ApprovalRejected {
            stage: Stage::AwaitingApproval,
            reason: "approved specification has no acceptance criteria".into(),
        });
    }
    if approved.id != planned.id {
        warn!(approved_id = %approved.id, "Approver changed the spec id; keeping the planned id");
    }
    Ok(TechSpec {
        id: planned.id,
        ..approved
    })
}

async fn request_approval(
    approver: &dyn SpecApprover,
    spec: &TechSpec,
    checkpoint: ApprovalCheckpoint,
) -> Result<TechSpec, FlywheelError> {
    let stage = checkpoint.stage();
    match approver.approve(spec, &checkpoint).await {
        Ok(approved) => {
            info!(stage = %stage, "Approval granted");
            Ok(approved)
        }
        Err(rejection) => {
            let reason = match checkpoint {
                ApprovalCheckpoint::BeforeExecution => rejection.reason,
                ApprovalCheckpoint::TrustGateFallback { reason } => {
                    format!("{} (trust gate: {reason})", rejection.reason)
                }
            };
            Err(FlywheelError::ApprovalRejected { stage, reason })
        }
    }
}
