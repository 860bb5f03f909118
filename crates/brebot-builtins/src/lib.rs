//! Built-in skills for the Brebot operator service.
//!
//! Provides ready-to-use skills an operator plan can bind to: echoing inputs,
//! drafting documents into the artifact workspace, queueing outbound email,
//! and calling HTTP endpoints.
//!
//! # Main entry points
//!
//! - [`register_builtins()`] — Register the standard set of built-in skills.

/// Markdown document drafting skill.
pub mod draft_document;
/// Input echo skill, useful for smoke tests and dry runs.
pub mod echo;
/// HTTP request skill.
pub mod http_request;
/// Outbound email skill (critical by default).
pub mod send_email;

pub use draft_document::DraftDocumentSkill;
pub use echo::EchoSkill;
pub use http_request::HttpRequestSkill;
pub use send_email::SendEmailSkill;

use brebot_core::BrebotResult;
use brebot_skills::SkillRegistry;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Register all built-in skills into the given registry.
///
/// File-producing skills write below `workspace_dir`.
pub fn register_builtins(
    registry: &mut SkillRegistry,
    workspace_dir: &Path,
) -> BrebotResult<()> {
    registry.register(Arc::new(EchoSkill::new()));
    registry.register(Arc::new(DraftDocumentSkill::new(workspace_dir.join("documents"))));
    registry.register(Arc::new(SendEmailSkill::new(workspace_dir.join("outbox"))));
    registry.register(Arc::new(HttpRequestSkill::new()?));
    Ok(())
}

/// Turn free text into a file-name-safe slug.
pub(crate) fn slugify(text: &str) -> String {
    let mut slug = String::with_capacity(text.len());
    let mut last_dash = true;
    for c in text.chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c.to_ascii_lowercase());
            last_dash = false;
        } else if !last_dash {
            slug.push('-');
            last_dash = true;
        }
    }
    let trimmed = slug.trim_end_matches('-');
    if trimmed.is_empty() {
        "untitled".to_string()
    } else {
        trimmed.chars().take(60).collect()
    }
}

/// Per-job subdirectory under a skill's root.
pub(crate) fn job_dir(root: &Path, job_id: uuid::Uuid) -> PathBuf {
    root.join(job_id.to_string())
}
