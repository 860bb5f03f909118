use brebot_core::BrebotResult;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Metadata describing a skill's interface and default gating.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SkillDescriptor {
    pub id: String,
    pub name: String,
    pub description: String,
    pub parameters_schema: serde_json::Value,
    /// Steps bound to this skill need approval unless a policy says otherwise.
    #[serde(default)]
    pub critical_default: bool,
    /// Words that let the catalog planner bind a goal clause to this skill.
    #[serde(default)]
    pub keywords: Vec<String>,
}

/// One invocation of a skill on behalf of a job step.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SkillCall {
    pub id: String,
    pub skill_id: String,
    pub job_id: Uuid,
    pub step_no: u32,
    pub inputs: serde_json::Value,
}

impl SkillCall {
    pub fn new(
        skill_id: impl Into<String>,
        job_id: Uuid,
        step_no: u32,
        inputs: serde_json::Value,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            skill_id: skill_id.into(),
            job_id,
            step_no,
            inputs,
        }
    }

    /// Fetch a required string input.
    pub fn str_input(&self, key: &str) -> Option<&str> {
        self.inputs.get(key).and_then(serde_json::Value::as_str)
    }
}

/// Output an invocation wants persisted as an artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArtifactDraft {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    /// Where the output lives (file path, URL, message id).
    pub url: String,
}

impl ArtifactDraft {
    pub fn new(name: impl Into<String>, kind: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: kind.into(),
            url: url.into(),
        }
    }
}

/// Everything a successful invocation produced.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SkillOutput {
    #[serde(default)]
    pub outputs: serde_json::Value,
    #[serde(default)]
    pub artifacts: Vec<ArtifactDraft>,
}

impl SkillOutput {
    pub fn new(outputs: serde_json::Value) -> Self {
        Self {
            outputs,
            artifacts: Vec::new(),
        }
    }

    pub fn with_artifact(mut self, artifact: ArtifactDraft) -> Self {
        self.artifacts.push(artifact);
        self
    }
}

/// Trait that all skills must implement.
///
/// An `Err` return is a failed step: the orchestrator records the message as
/// the step log and never lets it escape further.
#[async_trait]
pub trait Skill: Send + Sync {
    fn descriptor(&self) -> &SkillDescriptor;

    async fn execute(&self, call: SkillCall) -> BrebotResult<SkillOutput>;
}
