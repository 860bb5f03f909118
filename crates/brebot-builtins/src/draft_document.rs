use crate::{job_dir, slugify};
use brebot_core::{BrebotError, BrebotResult};
use brebot_skills::{ArtifactDraft, Skill, SkillCall, SkillDescriptor, SkillOutput};
use async_trait::async_trait;
use std::path::PathBuf;
use tracing::info;

const MAX_DOCUMENT_SIZE: usize = 2 * 1024 * 1024; // 2MB

/// Writes a markdown document into the artifact workspace.
pub struct DraftDocumentSkill {
    descriptor: SkillDescriptor,
    root: PathBuf,
}

impl DraftDocumentSkill {
    pub fn new(root: PathBuf) -> Self {
        Self {
            descriptor: SkillDescriptor {
                id: "draft_document".to_string(),
                name: "Draft document".to_string(),
                description: "Write a markdown document (report, brief, digest) and record it \
                    as an artifact of the job."
                    .to_string(),
                parameters_schema: serde_json::json!({
                    "type": "object",
                    "properties": {
                        "title": {
                            "type": "string",
                            "description": "Document title, also used for the file name"
                        },
                        "body": {
                            "type": "string",
                            "description": "Markdown body"
                        }
                    },
                    "required": ["title"]
                }),
                critical_default: false,
                keywords: vec![
                    "draft".into(),
                    "document".into(),
                    "write".into(),
                    "report".into(),
                    "summary".into(),
                    "digest".into(),
                ],
            },
            root,
        }
    }
}

#[async_trait]
impl Skill for DraftDocumentSkill {
    fn descriptor(&self) -> &SkillDescriptor {
        &self.descriptor
    }

    async fn execute(&self, call: SkillCall) -> BrebotResult<SkillOutput> {
        // Planner-generated steps only carry the free-text instruction.
        let instruction = call.str_input("instruction").filter(|t| !t.trim().is_empty());
        let title = call
            .str_input("title")
            .filter(|t| !t.trim().is_empty())
            .or(instruction)
            .ok_or_else(|| BrebotError::Execution("draft_document requires a 'title'".into()))?;
        let body = call
            .str_input("body")
            .or(instruction.filter(|i| *i != title))
            .unwrap_or_default();

        let content = format!("# {title}\n\n{body}\n");
        if content.len() > MAX_DOCUMENT_SIZE {
            return Err(BrebotError::Execution(format!(
                "Document too large: {} bytes (max: {MAX_DOCUMENT_SIZE} bytes)",
                content.len()
            )));
        }

        let dir = job_dir(&self.root, call.job_id);
        tokio::fs::create_dir_all(&dir).await?;
        let file_name = format!("{:02}-{}.md", call.step_no, slugify(title));
        let path = dir.join(&file_name);
        tokio::fs::write(&path, &content).await?;

        let location = path.display().to_string();
        info!(job_id = %call.job_id, step_no = call.step_no, path = %location, "Document drafted");

        Ok(SkillOutput::new(serde_json::json!({
            "path": location,
            "title": title,
            "bytes": content.len(),
        }))
        .with_artifact(ArtifactDraft::new(file_name, "document", location)))
    }
}
