use brebot_core::{BrebotError, BrebotResult};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Per-skill autonomy override.
///
/// When set, the policy wins over both the skill's `critical_default` and the
/// plan step's own `critical` flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkillPolicy {
    /// No autonomous action: every invocation waits for a human.
    Assist,
    /// Always gated behind an approval.
    Approve,
    /// Never gated.
    AutoSafe,
}

impl SkillPolicy {
    pub fn parse(s: &str) -> BrebotResult<Self> {
        match s.trim().to_lowercase().as_str() {
            "assist" => Ok(SkillPolicy::Assist),
            "approve" => Ok(SkillPolicy::Approve),
            "auto_safe" | "auto-safe" | "autosafe" => Ok(SkillPolicy::AutoSafe),
            other => Err(BrebotError::Validation(format!(
                "Unknown skill policy '{other}', expected assist, approve or auto_safe"
            ))),
        }
    }

    /// Whether steps bound to a skill with this policy need an approval.
    pub fn gates(self) -> bool {
        match self {
            SkillPolicy::Assist | SkillPolicy::Approve => true,
            SkillPolicy::AutoSafe => false,
        }
    }
}

impl fmt::Display for SkillPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkillPolicy::Assist => write!(f, "assist"),
            SkillPolicy::Approve => write!(f, "approve"),
            SkillPolicy::AutoSafe => write!(f, "auto_safe"),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_policy() {
        assert_eq!(SkillPolicy::parse("auto_safe").unwrap(), SkillPolicy::AutoSafe);
        assert_eq!(SkillPolicy::parse("Approve").unwrap(), SkillPolicy::Approve);
        assert!(SkillPolicy::parse("yolo").is_err());
    }

    #[test]
    fn test_gating() {
        assert!(SkillPolicy::Assist.gates());
        assert!(SkillPolicy::Approve.gates());
        assert!(!SkillPolicy::AutoSafe.gates());
    }

    #[test]
    fn test_wire_names() {
        let json = serde_json::to_string(&SkillPolicy::AutoSafe).unwrap();
        assert_eq!(json, "\"auto_safe\"");
        assert_eq!(SkillPolicy::Assist.to_string(), "assist");
    }
}
