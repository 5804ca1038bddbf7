//! Flywheel verification infrastructure adapter.
//!
//! Implements [`pipeline::VerificationRunner`] by running each verification
//! step of a generated artifact as a child process.
//!
//! ## Architectural Layer
//!
//! **Infrastructure.** Process spawning, output capture, and time limits live
//! here. Commands come from generator output, so they are never handed to a
//! shell: a step is split on whitespace, and its program must appear in the
//! configured allow-list.

use std::path::PathBuf;
use std::process::Stdio;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use pipeline::{VerificationOutcome, VerificationRunner};
use serde::{Deserialize, Serialize};
use tokio::process::Command;
use tracing::{debug, instrument, warn};

/// Settings for [`ProcessVerificationRunner`], read from the `[verifier]`
/// section of `flywheel.toml`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VerifierConfig {
    /// Directory the commands run in.
    pub workdir: PathBuf,
    /// Program names a verification step may invoke.
    pub allowed_programs: Vec<String>,
    /// Per-command wall-clock limit.
    pub timeout_secs: u64,
}

impl Default for VerifierConfig {
    fn default() -> Self {
        Self {
            workdir: PathBuf::from("."),
            allowed_programs: vec!["cargo".to_string()],
            timeout_secs: 600,
        }
    }
}

/// [`VerificationRunner`] that spawns allow-listed programs directly.
///
/// Every failure (disallowed program, spawn error, non-zero exit, timeout) is
/// reported as an unsuccessful [`VerificationOutcome`]; this runner never
/// errors.
#[derive(Debug, Clone)]
pub struct ProcessVerificationRunner {
    config: VerifierConfig,
}

impl ProcessVerificationRunner {
    pub fn new(config: VerifierConfig) -> Self {
        Self { config }
    }

    fn rejected(command: &str, output: String) -> VerificationOutcome {
        warn!(command, reason = %output, "Verification step not run");
        VerificationOutcome {
            command: command.to_string(),
            success: false,
            output,
            exit_code: None,
        }
    }
}

#[async_trait]
impl VerificationRunner for ProcessVerificationRunner {
    #[instrument(name = "verifier.run", skip(self))]
    async fn run(&self, command: &str) -> VerificationOutcome {
        let mut parts = command.split_whitespace();
        let Some(program) = parts.next() else {
            return Self::rejected(command, "empty command".into());
        };
        if !self.config.allowed_programs.iter().any(|p| p == program) {
            return Self::rejected(
                command,
                format!("program '{program}' is not on the verification allow-list"),
            );
        }

        let start = Instant::now();
        let child = match Command::new(program)
            .args(parts)
            .current_dir(&self.config.workdir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
        {
            Ok(child) => child,
            Err(error) => return Self::rejected(command, format!("failed to start: {error}")),
        };

        let limit = Duration::from_secs(self.config.timeout_secs);
        let output = match tokio::time::timeout(limit, child.wait_with_output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(error)) => return Self::rejected(command, format!("failed to wait: {error}")),
            Err(_) => {
                return Self::rejected(
                    command,
                    format!("timed out after {}s", self.config.timeout_secs),
                )
            }
        };

        let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
        text.push_str(&String::from_utf8_lossy(&output.stderr));
        debug!(
            exit_code = ?output.status.code(),
            duration_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX),
            "Verification step finished"
        );

        VerificationOutcome {
            command: command.to_string(),
            success: output.status.success(),
            output: text,
            exit_code: output.status.code(),
        }
    }
}
