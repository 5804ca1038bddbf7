//! Configuration value objects.
//!
//! [`FlywheelConfig`] holds numeric policy (retry bounds, timeouts, retrieval
//! fan-out width). [`RoleConfig`] holds the per-role system prompts and the
//! knowledge partitions each role reads. Both are plain data: they are loaded
//! once by the composition root and passed by reference. The only reload
//! point for roles is the `Seeding` stage of a run that requests it.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::errors::ConfigError;
use crate::PartitionName;

// ---------------------------------------------------------------------------
// Numeric policy
// ---------------------------------------------------------------------------

/// Bounds for [`crate::SchemaGuard`] self-correction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GuardConfig {
    /// Correction rounds allowed after the first attempt. Total generator
    /// calls per stage are bounded by `1 + max_retries`.
    pub max_retries: u32,
    /// Characters of the invalid response echoed back in a correction request.
    pub previous_response_limit: usize,
}

impl Default for GuardConfig {
    fn default() -> Self {
        Self {
            max_retries: 1,
            previous_response_limit: 2_000,
        }
    }
}

/// Orchestrator-wide policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FlywheelConfig {
    pub guard: GuardConfig,
    /// Upper bound on a single generator call.
    pub generator_timeout_secs: u64,
    /// Snippets requested from each knowledge partition per stage.
    pub top_k_each: usize,
}

impl Default for FlywheelConfig {
    fn default() -> Self {
        Self {
            guard: GuardConfig::default(),
            generator_timeout_secs: 120,
            top_k_each: 5,
        }
    }
}

impl FlywheelConfig {
    pub fn generator_timeout(&self) -> Duration {
        Duration::from_secs(self.generator_timeout_secs)
    }

    /// Rejects values that would make a run impossible.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.generator_timeout_secs == 0 {
            return Err(ConfigError::Invalid {
                message: "generator_timeout_secs must be greater than zero".into(),
            });
        }
        if self.guard.previous_response_limit == 0 {
            return Err(ConfigError::Invalid {
                message: "guard.previous_response_limit must be greater than zero".into(),
            });
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Roles
// ---------------------------------------------------------------------------

/// The generator persona used by each stage transform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Plan stage: brief → TechSpec.
    Architect,
    /// Execute stage: TechSpec → CodeArtifact.
    Engineer,
    /// Audit stage: CodeArtifact → AuditReport.
    Auditor,
    /// Trust gate's logic sentinel: TechSpec + CodeArtifact → LogicReview.
    Critic,
    /// Polish stage: CodeArtifact + AuditReport → PolishedArtifact.
    Polisher,
}

impl Role {
    pub const ALL: [Role; 5] = [
        Role::Architect,
        Role::Engineer,
        Role::Auditor,
        Role::Critic,
        Role::Polisher,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Role::Architect => "architect",
            Role::Engineer => "engineer",
            Role::Auditor => "auditor",
            Role::Critic => "critic",
            Role::Polisher => "polisher",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Prompt and retrieval settings for one [`Role`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleDefinition {
    pub system_prompt: String,
    #[serde(default)]
    pub partitions: Vec<PartitionName>,
}

/// Every role's definition, keyed by role.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RoleConfig {
    roles: BTreeMap<Role, RoleDefinition>,
}

impl RoleConfig {
    /// Short in-code defaults, used when no prompt documents are configured.
    pub fn builtin() -> Self {
        let partitions = |names: &[&str]| -> Vec<PartitionName> {
            names.iter().filter_map(|n| PartitionName::new(*n)).collect()
        };
        let roles = BTreeMap::from([
            (
                Role::Architect,
                RoleDefinition {
                    system_prompt: "You are the architect. Turn a feature brief into a precise \
                        technical specification with testable acceptance criteria."
                        .into(),
                    partitions: partitions(&["adr", "golden"]),
                },
            ),
            (
                Role::Engineer,
                RoleDefinition {
                    system_prompt: "You are the engineer. Implement the specification as complete \
                        file contents and list the commands that verify it."
                        .into(),
                    partitions: partitions(&["code", "golden"]),
                },
            ),
            (
                Role::Auditor,
                RoleDefinition {
                    system_prompt: "You are the security auditor. Review the change for \
                        vulnerabilities and defects and grade every finding by severity."
                        .into(),
                    partitions: partitions(&["security", "findings"]),
                },
            ),
            (
                Role::Critic,
                RoleDefinition {
                    system_prompt: "You are the logic critic. Check the implementation against \
                        every acceptance criterion and report each one that is not met."
                        .into(),
                    partitions: partitions(&["adr"]),
                },
            ),
            (
                Role::Polisher,
                RoleDefinition {
                    system_prompt: "You are the polisher. Produce the final version of the change, \
                        resolving audit findings where possible and noting any that remain."
                        .into(),
                    partitions: partitions(&["golden"]),
                },
            ),
        ]);
        Self { roles }
    }

    /// Returns the definition for `role`.
    ///
    /// Construction guarantees every role is present.
    pub fn get(&self, role: Role) -> &RoleDefinition {
        &self.roles[&role]
    }

    /// Replaces the system prompt of `role`, keeping its partitions.
    pub fn with_prompt(mut self, role: Role, system_prompt: impl Into<String>) -> Self {
        if let Some(definition) = self.roles.get_mut(&role) {
            definition.system_prompt = system_prompt.into();
        }
        self
    }
}

impl Default for RoleConfig {
    fn default() -> Self {
        Self::builtin()
    }
}
