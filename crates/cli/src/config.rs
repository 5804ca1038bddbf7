//! `flywheel.toml` loading and the directory-backed role loader.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use llm::LlmConfig;
use pipeline::{ConfigError, FlywheelConfig, Role, RoleConfig, RoleConfigLoader};
use serde::Deserialize;
use tracing::{debug, info};
use verifier::VerifierConfig;

/// File consulted when `--config` is not given.
pub const DEFAULT_CONFIG_FILE: &str = "flywheel.toml";

/// `[roles]` section.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RolesSection {
    /// Directory holding `<role>.md` system prompts.
    pub dir: Option<PathBuf>,
}

/// `[knowledge]` section.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct KnowledgeSection {
    /// Directory holding `<partition>/*.md` seed documents.
    pub dir: Option<PathBuf>,
}

/// Contents of `flywheel.toml`. Every section and field is optional.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct FileConfig {
    pub flywheel: FlywheelConfig,
    pub llm: LlmConfig,
    pub verifier: VerifierConfig,
    pub roles: RolesSection,
    pub knowledge: KnowledgeSection,
}

impl FileConfig {
    /// Loads `path`, or `flywheel.toml` in the working directory when no path
    /// is given. A missing default file yields the defaults; a missing
    /// explicit file is an error.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let (path, explicit) = match path {
            Some(path) => (path.to_path_buf(), true),
            None => (PathBuf::from(DEFAULT_CONFIG_FILE), false),
        };
        if !explicit && !path.exists() {
            debug!(path = %path.display(), "No configuration file; using defaults");
            return Ok(Self::default());
        }

        let text = std::fs::read_to_string(&path).map_err(|e| load_error(&path, e))?;
        let config = Self::parse(&text).map_err(|e| load_error(&path, e))?;
        info!(path = %path.display(), "Configuration loaded");
        Ok(config)
    }

    pub fn parse(text: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(text)
    }
}

fn load_error(path: &Path, error: impl std::fmt::Display) -> ConfigError {
    ConfigError::Load {
        path: path.display().to_string(),
        message: error.to_string(),
    }
}

/// [`RoleConfigLoader`] that overlays `<dir>/<role>.md` onto the built-in
/// role prompts. Roles without a file keep their built-in prompt; partitions
/// always come from the built-in definitions.
#[derive(Debug, Clone)]
pub struct DirectoryRoleLoader {
    dir: PathBuf,
}

impl DirectoryRoleLoader {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

#[async_trait]
impl RoleConfigLoader for DirectoryRoleLoader {
    async fn load(&self) -> Result<RoleConfig, ConfigError> {
        let is_dir = tokio::fs::metadata(&self.dir)
            .await
            .map(|meta| meta.is_dir())
            .unwrap_or(false);
        if !is_dir {
            return Err(load_error(&self.dir, "role prompt directory not found"));
        }

        let mut roles = RoleConfig::builtin();
        for role in Role::ALL {
            let path = self.dir.join(format!("{}.md", role.as_str()));
            let prompt = match tokio::fs::read_to_string(&path).await {
                Ok(prompt) => prompt,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => return Err(load_error(&path, e)),
            };
            if prompt.trim().is_empty() {
                return Err(ConfigError::EmptyPrompt {
                    role: role.to_string(),
                });
            }
            debug!(role = %role, path = %path.display(), "Role prompt loaded");
            roles = roles.with_prompt(role, prompt.trim());
        }
        Ok(roles)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_all_sections() {
        let config = FileConfig::parse(
            r#"
            [flywheel]
            top_k_each = 3

            [flywheel.guard]
            max_retries = 2

            [llm]
            model = "claude-opus-4-1"

            [verifier]
            allowed_programs = ["cargo", "npm"]

            [roles]
            dir = "prompts"

            [knowledge]
            dir = "knowledge"
            "#,
        )
        .unwrap();

        assert_eq!(config.flywheel.top_k_each, 3);
        assert_eq!(config.flywheel.guard.max_retries, 2);
        assert_eq!(config.flywheel.generator_timeout_secs, 120);
        assert_eq!(config.llm.model, "claude-opus-4-1");
        assert_eq!(config.verifier.allowed_programs, vec!["cargo", "npm"]);
        assert_eq!(config.roles.dir, Some(PathBuf::from("prompts")));
        assert_eq!(config.knowledge.dir, Some(PathBuf::from("knowledge")));
    }

    #[test]
    fn empty_file_is_all_defaults() {
        let config = FileConfig::parse("").unwrap();
        assert_eq!(config.flywheel, FlywheelConfig::default());
        assert!(config.roles.dir.is_none());
    }

    #[test]
    fn missing_explicit_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = FileConfig::load(Some(&dir.path().join("absent.toml"))).unwrap_err();
        assert!(matches!(err, ConfigError::Load { .. }));
    }

    #[test]
    fn malformed_file_names_the_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("flywheel.toml");
        std::fs::write(&path, "[flywheel\n").unwrap();
        let err = FileConfig::load(Some(&path)).unwrap_err();
        assert!(err.to_string().contains("flywheel.toml"));
    }

    #[tokio::test]
    async fn role_files_override_builtin_prompts() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("architect.md"), "You design services.\n").unwrap();

        let roles = DirectoryRoleLoader::new(dir.path()).load().await.unwrap();

        assert_eq!(roles.get(Role::Architect).system_prompt, "You design services.");
        assert_eq!(
            roles.get(Role::Engineer),
            RoleConfig::builtin().get(Role::Engineer)
        );
    }

    #[tokio::test]
    async fn blank_role_file_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("critic.md"), "  \n").unwrap();
        let err = DirectoryRoleLoader::new(dir.path()).load().await.unwrap_err();
        assert!(matches!(err, ConfigError::EmptyPrompt { role } if role == "critic"));
    }

    #[tokio::test]
    async fn missing_role_dir_is_an_error() {
        let err = DirectoryRoleLoader::new("/nonexistent/flywheel-prompts")
            .load()
            .await
            .unwrap_err();
        assert!(matches!(err, ConfigError::Load { .. }));
    }
}
