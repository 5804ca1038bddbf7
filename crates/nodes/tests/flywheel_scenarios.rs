//! End-to-end orchestrator scenarios against in-memory collaborators.

use std::sync::Arc;

use async_trait::async_trait;
use nodes::{FnApprover, Flywheel, RunOptions};
use pipeline::fakes::{
    CountingSeeder, FixedRoleLoader, MemoryWriter, RecordingSink, ScriptedApprover,
    ScriptedGenerator, StaticRetriever,
};
use pipeline::{
    ApprovalCheckpoint, ApprovalRejection, ErrorKind, FlywheelError, Role, RoleConfig, SpecId,
    Stage, TechSpec, VerificationOutcome, VerificationRunner,
};

const SPEC: &str = r#"{"title": "Hello endpoint", "acceptanceCriteria": ["GET /hello returns 200"], "affectedPaths": ["src/main.rs"]}"#;
const ARTIFACT: &str = r#"{"files": {"src/main.rs": "fn main() {}"}, "summary": "Adds the hello route", "verificationSteps": ["cargo test"]}"#;
const AUDIT_CLEAN: &str = r#"{"passed": true, "findings": [], "summary": "No issues"}"#;
const AUDIT_MEDIUM: &str = r#"{"passed": true, "findings": [{"severity": "medium", "category": "logging", "description": "Request path is logged verbatim"}], "summary": "Minor issues"}"#;
const AUDIT_CRITICAL: &str = r#"{"passed": false, "findings": [{"severity": "critical", "category": "injection", "description": "Query built from user input", "location": "src/main.rs:3"}], "summary": "Unsafe query"}"#;
const REVIEW_PASS: &str = r#"{"passed": true, "issues": []}"#;
const REVIEW_FAIL: &str = r#"{"passed": false, "issues": ["GET /hello returns 404"]}"#;
const POLISHED: &str = r#"{"files": {"src/main.rs": "fn main() { serve(); }"}, "summary": "Hello route, final", "verificationSteps": ["cargo test"]}"#;
const POLISHED_GOLDEN: &str = r#"{"files": {"src/main.rs": "fn main() { serve(); }"}, "summary": "Hello route, final", "verificationSteps": ["cargo test"], "nominateAsGolden": true, "goldenTitle": "Minimal HTTP route", "goldenTags": ["http"]}"#;

const ENGINEER: &str = "You are the engineer.";
const CRITIC: &str = "You are the logic critic.";
const POLISHER: &str = "You are the polisher.";

struct Harness {
    generator: Arc<ScriptedGenerator>,
    sink: Arc<RecordingSink>,
    writer: Arc<MemoryWriter>,
    flywheel: Flywheel,
}

fn harness(responses: &[&str]) -> Harness {
    let generator = Arc::new(ScriptedGenerator::new(responses.iter().copied()));
    let sink = Arc::new(RecordingSink::new());
    let writer = Arc::new(MemoryWriter::new());
    let flywheel = Flywheel::builder(generator.clone(), Arc::new(StaticRetriever::new()))
        .sink(sink.clone())
        .writer(writer.clone())
        .build()
        .expect("default configuration is valid");
    Harness {
        generator,
        sink,
        writer,
        flywheel,
    }
}

struct PassingVerifier;

#[async_trait]
impl VerificationRunner for PassingVerifier {
    async fn run(&self, command: &str) -> VerificationOutcome {
        VerificationOutcome {
            command: command.to_string(),
            success: true,
            output: String::new(),
            exit_code: Some(0),
        }
    }
}

#[tokio::test]
async fn standard_run_produces_full_result() {
    let h = harness(&[SPEC, ARTIFACT, AUDIT_CLEAN, POLISHED]);

    let result = h
        .flywheel
        .run("Add a hello endpoint", RunOptions::default())
        .await
        .unwrap();

    assert_eq!(result.brief, "Add a hello endpoint");
    assert_eq!(result.spec.title, "Hello endpoint");
    assert_eq!(result.artifact.spec_id, result.spec.id);
    assert_eq!(result.audit.artifact_id, result.artifact.id);
    assert!(result.audit.passed);
    assert!(!result.polished.summary().is_empty());
    assert_eq!(result.auto_merged(), None);
    assert_eq!(result.logic_review_passed(), None);
    assert_eq!(h.generator.call_count(), 4);
    assert_eq!(h.generator.calls_matching(CRITIC), 0);
}

#[tokio::test]
async fn critical_finding_halts_before_polish() {
    let h = harness(&[SPEC, ARTIFACT, AUDIT_CRITICAL, POLISHED]);

    let err = h
        .flywheel
        .run(
            "Add a search endpoint",
            RunOptions {
                halt_on_audit_failure: true,
                ..RunOptions::default()
            },
        )
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::AuditHalt);
    assert!(err.to_string().contains("Audit failed"));
    assert!(err.to_string().contains("injection"));
    assert_eq!(h.generator.calls_matching(POLISHER), 0);
    assert_eq!(h.generator.remaining(), 1);
}

#[tokio::test]
async fn failed_audit_without_halt_still_polishes() {
    let h = harness(&[SPEC, ARTIFACT, AUDIT_CRITICAL, POLISHED]);

    let result = h
        .flywheel
        .run("Add a search endpoint", RunOptions::default())
        .await
        .unwrap();

    assert!(!result.audit.passed);
    assert_eq!(result.audit.blocking_findings().count(), 1);
    let polish_prompt = &h.generator.calls()[3].prompt;
    assert!(polish_prompt.contains("Verdict: failed"));
    assert!(polish_prompt.contains("Query built from user input"));
}

#[tokio::test]
async fn malformed_artifact_is_corrected_once() {
    let h = harness(&[
        SPEC,
        "Sure! Here is the code you asked for.",
        ARTIFACT,
        AUDIT_CLEAN,
        POLISHED,
    ]);

    let result = h
        .flywheel
        .run("Add a hello endpoint", RunOptions::default())
        .await
        .unwrap();

    assert_eq!(h.generator.calls_matching(ENGINEER), 2);
    assert_eq!(result.artifact.summary, "Adds the hello route");
    let correction = &h.generator.calls()[2].prompt;
    assert!(correction.contains("Sure! Here is the code you asked for."));
}

#[tokio::test]
async fn exhausted_correction_aborts_at_failing_stage() {
    let h = harness(&[SPEC, "not json", "still not json", ARTIFACT]);

    let err = h
        .flywheel
        .run("Add a hello endpoint", RunOptions::default())
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::SelfCorrectionExhausted);
    assert_eq!(err.stage(), Stage::Executing);
    match &err {
        FlywheelError::SelfCorrectionExhausted {
            contract, attempts, ..
        } => {
            assert_eq!(*contract, "CodeArtifact");
            assert_eq!(*attempts, 2);
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(h.generator.calls_matching(ENGINEER), 2);
    assert_eq!(h.sink.stages_entered().last(), Some(&Stage::Aborted));
}

#[tokio::test]
async fn logic_failure_falls_back_to_human_approval() {
    let h = harness(&[SPEC, ARTIFACT, AUDIT_CLEAN, REVIEW_FAIL, POLISHED]);
    let approver = Arc::new(ScriptedApprover::approving());

    let result = h
        .flywheel
        .run(
            "Add a hello endpoint",
            RunOptions {
                auto_merge: true,
                ..RunOptions::default()
            }
            .with_approver(approver.clone()),
        )
        .await
        .unwrap();

    assert_eq!(result.auto_merged(), Some(false));
    assert_eq!(result.logic_review_passed(), Some(false));
    assert_eq!(approver.call_count(), 1);
    match &approver.checkpoints()[0] {
        ApprovalCheckpoint::TrustGateFallback { reason } => {
            assert!(reason.contains("logic review failed"));
        }
        other => panic!("unexpected checkpoint: {other:?}"),
    }
    assert!(h
        .sink
        .stages_entered()
        .contains(&Stage::AwaitingApprovalFallback));
}

#[tokio::test]
async fn both_sentinels_passing_auto_merges() {
    let h = harness(&[SPEC, ARTIFACT, AUDIT_CLEAN, REVIEW_PASS, POLISHED]);
    let approver = Arc::new(ScriptedApprover::approving());

    let result = h
        .flywheel
        .run(
            "Add a hello endpoint",
            RunOptions {
                auto_merge: true,
                ..RunOptions::default()
            }
            .with_approver(approver.clone()),
        )
        .await
        .unwrap();

    assert_eq!(result.auto_merged(), Some(true));
    assert_eq!(result.logic_review_passed(), Some(true));
    assert_eq!(approver.call_count(), 0);
    let decision = h
        .sink
        .events()
        .into_iter()
        .find(|e| e.event == "decision")
        .unwrap();
    assert!(decision
        .attributes
        .contains(&("auto_merged".to_string(), "true".to_string())));
}

#[tokio::test]
async fn refused_gate_without_approver_aborts() {
    let h = harness(&[SPEC, ARTIFACT, AUDIT_CRITICAL, REVIEW_PASS, POLISHED]);

    let err = h
        .flywheel
        .run(
            "Add a search endpoint",
            RunOptions {
                auto_merge: true,
                ..RunOptions::default()
            },
        )
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::TrustGateFailure);
    assert!(err.to_string().contains("security audit failed"));
    assert_eq!(h.generator.calls_matching(POLISHER), 0);
}

#[tokio::test]
async fn halt_takes_precedence_over_trust_gate() {
    let h = harness(&[SPEC, ARTIFACT, AUDIT_CRITICAL, REVIEW_PASS, POLISHED]);

    let err = h
        .flywheel
        .run(
            "Add a search endpoint",
            RunOptions {
                auto_merge: true,
                halt_on_audit_failure: true,
                ..RunOptions::default()
            },
        )
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::AuditHalt);
    assert_eq!(h.generator.calls_matching(CRITIC), 0);
    assert!(!h.sink.stages_entered().contains(&Stage::TrustGateEval));
}

#[tokio::test]
async fn rejected_fallback_aborts_with_both_reasons() {
    let h = harness(&[SPEC, ARTIFACT, AUDIT_CLEAN, REVIEW_FAIL, POLISHED]);

    let err = h
        .flywheel
        .run(
            "Add a hello endpoint",
            RunOptions {
                auto_merge: true,
                ..RunOptions::default()
            }
            .with_approver(Arc::new(ScriptedApprover::rejecting())),
        )
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::ApprovalRejected);
    assert_eq!(err.stage(), Stage::AwaitingApprovalFallback);
    let message = err.to_string();
    assert!(message.contains("operator declined"));
    assert!(message.contains("logic review failed"));
}

#[tokio::test]
async fn rejection_before_execution_stops_the_run() {
    let h = harness(&[SPEC, ARTIFACT, AUDIT_CLEAN, POLISHED]);
    let approver = Arc::new(ScriptedApprover::rejecting());

    let err = h
        .flywheel
        .run(
            "Add a hello endpoint",
            RunOptions::default().with_approver(approver.clone()),
        )
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::ApprovalRejected);
    assert_eq!(err.stage(), Stage::AwaitingApproval);
    assert_eq!(approver.checkpoints(), vec![ApprovalCheckpoint::BeforeExecution]);
    assert_eq!(h.generator.call_count(), 1);
}

#[tokio::test]
async fn approver_can_amend_the_spec() {
    let h = harness(&[SPEC, ARTIFACT, AUDIT_CLEAN, POLISHED]);
    let approver = FnApprover::new(
        |mut spec: TechSpec, _checkpoint: ApprovalCheckpoint| async move {
            spec.acceptance_criteria
                .push("GET /hello responds within 50ms".to_string());
            Ok::<_, ApprovalRejection>(spec)
        },
    );

    let result = h
        .flywheel
        .run(
            "Add a hello endpoint",
            RunOptions::default().with_approver(Arc::new(approver)),
        )
        .await
        .unwrap();

    assert_eq!(result.spec.acceptance_criteria.len(), 2);
    let execute_prompt = &h.generator.calls()[1].prompt;
    assert!(execute_prompt.contains("GET /hello responds within 50ms"));
}

#[tokio::test]
async fn amended_spec_without_criteria_is_rejected() {
    let h = harness(&[SPEC, ARTIFACT, AUDIT_CLEAN, POLISHED]);
    let approver = FnApprover::new(
        |mut spec: TechSpec, _checkpoint: ApprovalCheckpoint| async move {
            spec.acceptance_criteria.clear();
            Ok::<_, ApprovalRejection>(spec)
        },
    );

    let err = h
        .flywheel
        .run(
            "Add a hello endpoint",
            RunOptions::default().with_approver(Arc::new(approver)),
        )
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::ApprovalRejected);
    assert_eq!(err.stage(), Stage::AwaitingApproval);
    assert!(err.to_string().contains("no acceptance criteria"));
    assert_eq!(h.generator.call_count(), 1);
}

#[tokio::test]
async fn amended_spec_keeps_the_planned_id() {
    let h = harness(&[SPEC, ARTIFACT, AUDIT_CLEAN, POLISHED]);
    let forged = SpecId::new_random();
    let approver = FnApprover::new(
        move |mut spec: TechSpec, _checkpoint: ApprovalCheckpoint| async move {
            spec.id = forged;
            spec.title = "Hello endpoint v2".to_string();
            Ok::<_, ApprovalRejection>(spec)
        },
    );

    let result = h
        .flywheel
        .run(
            "Add a hello endpoint",
            RunOptions::default().with_approver(Arc::new(approver)),
        )
        .await
        .unwrap();

    assert_eq!(result.spec.title, "Hello endpoint v2");
    assert_ne!(result.spec.id, forged);
    assert_eq!(result.artifact.spec_id, result.spec.id);
}

#[tokio::test]
async fn stages_are_reported_in_order() {
    let h = harness(&[SPEC, ARTIFACT, AUDIT_CLEAN, POLISHED]);

    h.flywheel
        .run(
            "Add a hello endpoint",
            RunOptions::default().with_approver(Arc::new(ScriptedApprover::approving())),
        )
        .await
        .unwrap();

    assert_eq!(
        h.sink.stages_entered(),
        vec![
            Stage::Planning,
            Stage::AwaitingApproval,
            Stage::Executing,
            Stage::Auditing,
            Stage::Polishing,
            Stage::Done,
        ]
    );
    assert!(h.sink.events().iter().any(|e| e.event == "completed"));
}

#[tokio::test]
async fn reseed_refreshes_knowledge_and_roles() {
    let generator = Arc::new(ScriptedGenerator::new([
        SPEC,
        ARTIFACT,
        AUDIT_CLEAN,
        POLISHED,
    ]));
    let seeder = Arc::new(CountingSeeder::new());
    let loader = Arc::new(FixedRoleLoader::new(
        RoleConfig::builtin().with_prompt(Role::Architect, "Custom architect prompt"),
    ));
    let sink = Arc::new(RecordingSink::new());
    let flywheel = Flywheel::builder(generator.clone(), Arc::new(StaticRetriever::new()))
        .seeder(seeder.clone())
        .role_loader(loader.clone())
        .sink(sink.clone())
        .build()
        .unwrap();

    flywheel
        .run(
            "Add a hello endpoint",
            RunOptions {
                reseed: true,
                ..RunOptions::default()
            },
        )
        .await
        .unwrap();

    assert_eq!(seeder.call_count(), 1);
    assert_eq!(loader.load_count(), 1);
    assert_eq!(sink.stages_entered()[0], Stage::Seeding);
    assert_eq!(generator.calls()[0].system_context, "Custom architect prompt");
}

#[tokio::test]
async fn failing_seeder_aborts_before_planning() {
    let generator = Arc::new(ScriptedGenerator::new([SPEC]));
    let flywheel = Flywheel::builder(generator.clone(), Arc::new(StaticRetriever::new()))
        .seeder(Arc::new(CountingSeeder::failing()))
        .build()
        .unwrap();

    let err = flywheel
        .run(
            "Add a hello endpoint",
            RunOptions {
                reseed: true,
                ..RunOptions::default()
            },
        )
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::SeedingFailed);
    assert_eq!(generator.call_count(), 0);
}

#[tokio::test]
async fn failing_role_reload_is_attributed_to_seeding() {
    let generator = Arc::new(ScriptedGenerator::new([SPEC]));
    let sink = Arc::new(RecordingSink::new());
    let flywheel = Flywheel::builder(generator.clone(), Arc::new(StaticRetriever::new()))
        .seeder(Arc::new(CountingSeeder::new()))
        .role_loader(Arc::new(FixedRoleLoader::failing()))
        .sink(sink.clone())
        .build()
        .unwrap();

    let err = flywheel
        .run(
            "Add a hello endpoint",
            RunOptions {
                reseed: true,
                ..RunOptions::default()
            },
        )
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Configuration);
    assert_eq!(err.stage(), Stage::Seeding);
    assert_eq!(generator.call_count(), 0);
    let failed_stage = ("failed_stage".to_string(), "seeding".to_string());
    assert!(sink
        .events()
        .iter()
        .any(|e| e.event == "aborted" && e.attributes.contains(&failed_stage)));
}

#[tokio::test]
async fn findings_and_golden_output_are_written_back() {
    let h = harness(&[SPEC, ARTIFACT, AUDIT_MEDIUM, POLISHED_GOLDEN]);

    let result = h
        .flywheel
        .run("Add a hello endpoint", RunOptions::default())
        .await
        .unwrap();

    let appended = h.writer.appended();
    assert_eq!(appended.len(), 2);
    assert_eq!(appended[0].0.as_str(), "findings");
    assert_eq!(
        appended[0].1.id.as_str(),
        format!("audit-{}", result.audit.id)
    );
    assert_eq!(appended[1].0.as_str(), "golden");
    assert_eq!(appended[1].1.title, "Minimal HTTP route");
    assert!(result.polished.is_golden());
}

#[tokio::test]
async fn verification_outcomes_reach_the_audit() {
    let generator = Arc::new(ScriptedGenerator::new([
        SPEC,
        ARTIFACT,
        AUDIT_CLEAN,
        POLISHED,
    ]));
    let sink = Arc::new(RecordingSink::new());
    let flywheel = Flywheel::builder(generator.clone(), Arc::new(StaticRetriever::new()))
        .verifier(Arc::new(PassingVerifier))
        .sink(sink.clone())
        .build()
        .unwrap();

    flywheel
        .run("Add a hello endpoint", RunOptions::default())
        .await
        .unwrap();

    assert_eq!(generator.call_count(), 4);
    assert!(generator.calls()[2]
        .prompt
        .contains("`cargo test`: passed (exit code 0)"));
    assert!(sink
        .events()
        .iter()
        .any(|e| e.stage == Stage::Executing && e.event == "verification"));
}

#[tokio::test]
async fn generator_failure_is_not_retried() {
    let generator = Arc::new(ScriptedGenerator::failing());
    let flywheel = Flywheel::builder(generator.clone(), Arc::new(StaticRetriever::new()))
        .build()
        .unwrap();

    let err = flywheel
        .run("Add a hello endpoint", RunOptions::default())
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::GeneratorFailure);
    assert_eq!(err.stage(), Stage::Planning);
    assert_eq!(generator.call_count(), 1);
}

#[tokio::test]
async fn empty_brief_is_rejected() {
    let h = harness(&[SPEC]);

    let err = h.flywheel.run("   ", RunOptions::default()).await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::InvalidInput);
    assert_eq!(h.generator.call_count(), 0);
}
