//! Flywheel CLI entry point.
//!
//! This binary is the composition root for the entire system. Responsibilities:
//!
//! 1. **Wire observability**: configure `tracing-subscriber` with an
//!    `EnvFilter`, optional JSON lines, and an OpenTelemetry OTLP exporter
//!    when `OTEL_EXPORTER_OTLP_ENDPOINT` is set. All `tracing` spans and
//!    structured events emitted by every crate in the workspace flow through
//!    this subscriber.
//! 2. **Parse configuration**: load `flywheel.toml` (or `--config`) and
//!    validate it.
//! 3. **Construct infrastructure**: create the concrete collaborators
//!    (`AnthropicGenerator`, `InMemoryKnowledgeBase`, `DirectorySeeder`,
//!    `RegexSanitizer`, `ProcessVerificationRunner`, `DirectoryRoleLoader`,
//!    `StdinApprover`) and inject them into the [`nodes::Flywheel`].
//! 4. **Run**: drive one brief through the pipeline and print the
//!    `PipelineResult` as JSON on stdout.

mod approver;
mod config;
mod telemetry;

use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use knowledge::{DirectorySeeder, InMemoryKnowledgeBase, RegexSanitizer};
use llm::AnthropicGenerator;
use nodes::{Flywheel, RunOptions, TracingSink};
use pipeline::{PartitionName, Role, RoleConfig, RoleConfigLoader, SpecApprover, TextSanitizer};
use tracing::info;
use verifier::ProcessVerificationRunner;

use crate::approver::StdinApprover;
use crate::config::{DirectoryRoleLoader, FileConfig};

/// Partitions written back to by the audit and polish stages.
const WRITE_BACK_PARTITIONS: [&str; 2] = ["findings", "golden"];

#[derive(Parser)]
#[command(name = "flywheel")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Plan, implement, audit, and polish a feature from a one-line brief")]
struct Cli {
    /// Emit JSON-formatted log lines on stderr
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the pipeline for one feature brief
    Run(RunArgs),
}

#[derive(Args)]
struct RunArgs {
    /// Feature brief, e.g. "Add a /health endpoint"
    brief: String,

    /// Configuration file (default: ./flywheel.toml if present)
    #[arg(short, long, env = "FLYWHEEL_CONFIG")]
    config: Option<PathBuf>,

    /// Reload knowledge documents and role prompts before planning
    #[arg(long)]
    reseed: bool,

    /// Abort when the audit reports critical or high findings
    #[arg(long)]
    halt_on_audit_failure: bool,

    /// Skip human review when both the security audit and the logic review pass
    #[arg(long)]
    auto_merge: bool,

    /// Never prompt for approval
    #[arg(long)]
    no_approval: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let _telemetry = telemetry::init(cli.json_logs)?;

    match cli.command {
        Commands::Run(args) => run(args).await,
    }
}

async fn run(args: RunArgs) -> Result<()> {
    let config = FileConfig::load(args.config.as_deref())?;

    let generator = Arc::new(
        AnthropicGenerator::new(config.llm.clone()).context("failed to configure generator")?,
    );
    info!(model = generator.model(), "Generator configured");

    let knowledge_base = Arc::new(InMemoryKnowledgeBase::new(known_partitions()));
    let sanitizer: Arc<dyn TextSanitizer> = Arc::new(RegexSanitizer::new());
    let mut builder = Flywheel::builder(generator, knowledge_base.clone())
        .writer(knowledge_base.clone())
        .sanitizer(sanitizer.clone())
        .verifier(Arc::new(ProcessVerificationRunner::new(
            config.verifier.clone(),
        )))
        .sink(Arc::new(TracingSink))
        .config(config.flywheel.clone());
    if let Some(dir) = &config.knowledge.dir {
        builder = builder.seeder(Arc::new(
            DirectorySeeder::new(dir.clone(), knowledge_base.clone()).with_sanitizer(sanitizer),
        ));
    }
    if let Some(dir) = &config.roles.dir {
        let loader = Arc::new(DirectoryRoleLoader::new(dir.clone()));
        let roles = loader.load().await.context("failed to load role prompts")?;
        builder = builder.roles(roles).role_loader(loader);
    }
    let flywheel = builder.build()?;

    let approver: Option<Arc<dyn SpecApprover>> = if args.no_approval {
        None
    } else {
        Some(Arc::new(StdinApprover))
    };
    let options = RunOptions {
        reseed: args.reseed,
        halt_on_audit_failure: args.halt_on_audit_failure,
        auto_merge: args.auto_merge,
        approver,
    };

    let result = flywheel.run(&args.brief, options).await?;
    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}

/// Every partition a built-in role reads, plus the write-back targets.
fn known_partitions() -> BTreeSet<PartitionName> {
    let roles = RoleConfig::builtin();
    Role::ALL
        .into_iter()
        .flat_map(|role| roles.get(role).partitions.clone())
        .chain(WRITE_BACK_PARTITIONS.into_iter().filter_map(PartitionName::new))
        .collect()
}
