use brebot_core::BrebotResult;
use brebot_skills::{Skill, SkillCall, SkillDescriptor, SkillOutput};
use async_trait::async_trait;
use tracing::debug;

/// Returns its inputs unchanged as outputs.
pub struct EchoSkill {
    descriptor: SkillDescriptor,
}

impl EchoSkill {
    pub fn new() -> Self {
        Self {
            descriptor: SkillDescriptor {
                id: "echo".to_string(),
                name: "Echo".to_string(),
                description: "Return the given inputs unchanged. Useful for dry runs.".to_string(),
                parameters_schema: serde_json::json!({
                    "type": "object",
                    "additionalProperties": true
                }),
                critical_default: false,
                keywords: vec!["echo".into(), "note".into(), "log".into()],
            },
        }
    }
}

impl Default for EchoSkill {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Skill for EchoSkill {
    fn descriptor(&self) -> &SkillDescriptor {
        &self.descriptor
    }

    async fn execute(&self, call: SkillCall) -> BrebotResult<SkillOutput> {
        debug!(job_id = %call.job_id, step_no = call.step_no, "echo");
        Ok(SkillOutput::new(call.inputs))
    }
}
