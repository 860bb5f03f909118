use crate::job_dir;
use brebot_core::{BrebotError, BrebotResult};
use brebot_skills::{ArtifactDraft, Skill, SkillCall, SkillDescriptor, SkillOutput};
use async_trait::async_trait;
use chrono::Utc;
use serde::Serialize;
use std::path::PathBuf;
use tokio::io::AsyncWriteExt;
use tracing::info;
use uuid::Uuid;

/// Queues an outbound email by appending it to the outbox spool.
///
/// Delivery is the job of whatever drains `outbox.jsonl`; from the operator's
/// point of view the side effect happens here, so the skill is critical by
/// default.
pub struct SendEmailSkill {
    descriptor: SkillDescriptor,
    outbox: PathBuf,
}

#[derive(Debug, Serialize)]
struct OutboxEntry<'a> {
    message_id: Uuid,
    job_id: Uuid,
    step_no: u32,
    to: Vec<&'a str>,
    subject: &'a str,
    body: &'a str,
    queued_at: chrono::DateTime<Utc>,
}

impl SendEmailSkill {
    pub fn new(outbox: PathBuf) -> Self {
        Self {
            descriptor: SkillDescriptor {
                id: "send_email".to_string(),
                name: "Send email".to_string(),
                description: "Send an email to one or more recipients.".to_string(),
                parameters_schema: serde_json::json!({
                    "type": "object",
                    "properties": {
                        "to": {
                            "description": "Recipient address or list of addresses",
                            "oneOf": [
                                {"type": "string"},
                                {"type": "array", "items": {"type": "string"}}
                            ]
                        },
                        "subject": {"type": "string"},
                        "body": {"type": "string"}
                    },
                    "required": ["to", "subject"]
                }),
                critical_default: true,
                keywords: vec!["email".into(), "mail".into(), "send".into(), "notify".into()],
            },
            outbox,
        }
    }

    fn recipients(call: &SkillCall) -> BrebotResult<Vec<&str>> {
        let to = match call.inputs.get("to") {
            Some(serde_json::Value::String(s)) => vec![s.as_str()],
            Some(serde_json::Value::Array(items)) => {
                items.iter().filter_map(serde_json::Value::as_str).collect()
            }
            _ => Vec::new(),
        };
        if to.is_empty() {
            return Err(BrebotError::Execution("send_email requires 'to'".into()));
        }
        if let Some(bad) = to.iter().find(|addr| !addr.contains('@')) {
            return Err(BrebotError::Execution(format!(
                "Invalid recipient address '{bad}'"
            )));
        }
        Ok(to)
    }
}

#[async_trait]
impl Skill for SendEmailSkill {
    fn descriptor(&self) -> &SkillDescriptor {
        &self.descriptor
    }

    async fn execute(&self, call: SkillCall) -> BrebotResult<SkillOutput> {
        let to = Self::recipients(&call)?;
        let subject = call
            .str_input("subject")
            .or_else(|| call.str_input("instruction"))
            .ok_or_else(|| BrebotError::Execution("send_email requires 'subject'".into()))?;
        let body = call.str_input("body").unwrap_or_default();

        let entry = OutboxEntry {
            message_id: Uuid::new_v4(),
            job_id: call.job_id,
            step_no: call.step_no,
            to,
            subject,
            body,
            queued_at: Utc::now(),
        };

        let dir = job_dir(&self.outbox, call.job_id);
        tokio::fs::create_dir_all(&dir).await?;
        let spool = dir.join("outbox.jsonl");
        let line = format!("{}\n", serde_json::to_string(&entry)?);
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&spool)
            .await?;
        file.write_all(line.as_bytes()).await?;

        info!(
            job_id = %call.job_id,
            step_no = call.step_no,
            message_id = %entry.message_id,
            recipients = entry.to.len(),
            "Email queued"
        );

        Ok(SkillOutput::new(serde_json::json!({
            "messageId": entry.message_id,
            "recipients": entry.to,
            "subject": subject,
        }))
        .with_artifact(ArtifactDraft::new(
            format!("email: {subject}"),
            "email",
            format!("{}#{}", spool.display(), entry.message_id),
        )))
    }
}
