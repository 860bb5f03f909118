use brebot_core::{BrebotError, BrebotResult};
use brebot_gateway::SecurityConfig;
use brebot_orchestrator::OrchestratorConfig;
use brebot_skills::{SkillPolicy, SkillRegistry};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Contents of `brebot.toml`. Every section is optional.
#[derive(Debug, Deserialize)]
pub struct BrebotConfig {
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub security: SecurityConfig,
    #[serde(default)]
    pub orchestrator: OrchestratorConfig,
    #[serde(default)]
    pub skills: Vec<SkillOverride>,
}

#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

/// A `[[skills]]` entry.
#[derive(Debug, Deserialize)]
pub struct SkillOverride {
    pub id: String,
    pub policy: SkillPolicy,
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("./data")
}
fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    3000
}

impl Default for BrebotConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            server: ServerConfig::default(),
            security: SecurityConfig::default(),
            orchestrator: OrchestratorConfig::default(),
            skills: Vec::new(),
        }
    }
}

impl BrebotConfig {
    /// Read and validate the config file. A missing file yields the defaults.
    pub async fn load(path: &Path) -> BrebotResult<Self> {
        let text = match tokio::fs::read_to_string(path).await {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!(path = %path.display(), "Config file not found, using defaults");
                return Ok(Self::default());
            }
            Err(e) => {
                return Err(BrebotError::Config(format!(
                    "failed to read '{}': {e}",
                    path.display()
                )))
            }
        };
        Self::parse(&text)
    }

    pub fn parse(text: &str) -> BrebotResult<Self> {
        let config: Self =
            toml::from_str(text).map_err(|e| BrebotError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> BrebotResult<()> {
        if self.security.max_requests_per_second <= 0.0 {
            return Err(BrebotError::Config(
                "security.max_requests_per_second must be positive".into(),
            ));
        }
        if self.security.max_burst < 1.0 {
            return Err(BrebotError::Config(
                "security.max_burst must be at least 1".into(),
            ));
        }
        if self.orchestrator.activity_capacity == 0 {
            return Err(BrebotError::Config(
                "orchestrator.activity_capacity must be at least 1".into(),
            ));
        }
        Ok(())
    }

    /// Apply the `[[skills]]` policy overrides to a populated registry.
    pub fn apply_skill_policies(&self, registry: &SkillRegistry) -> BrebotResult<()> {
        for entry in &self.skills {
            registry.set_policy(&entry.id, entry.policy).map_err(|_| {
                BrebotError::Config(format!("[[skills]] names unknown skill '{}'", entry.id))
            })?;
        }
        if !self.skills.is_empty() {
            info!(count = self.skills.len(), "Skill policy overrides applied");
        }
        Ok(())
    }

    pub fn workspace_dir(&self) -> PathBuf {
        self.data_dir.join("workspace")
    }

    pub fn activity_dir(&self) -> PathBuf {
        self.data_dir.join("activity")
    }
}
