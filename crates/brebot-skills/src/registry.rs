use crate::policy::SkillPolicy;
use crate::skill::{Skill, SkillCall, SkillDescriptor, SkillOutput};
use brebot_core::{BrebotError, BrebotResult};
use parking_lot::RwLock;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};

/// Public view of a registered skill, as served by `GET /skills`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SkillInfo {
    pub id: String,
    pub name: String,
    pub description: String,
    /// The override, if one has been set.
    pub policy: Option<SkillPolicy>,
    pub critical_default: bool,
}

/// Central registry for all available skills.
///
/// Skills are registered once at startup; policies can change at runtime
/// (`PATCH /skills/:id`) so they sit behind their own lock.
pub struct SkillRegistry {
    skills: HashMap<String, Arc<dyn Skill>>,
    policies: RwLock<HashMap<String, SkillPolicy>>,
}

impl SkillRegistry {
    pub fn new() -> Self {
        Self {
            skills: HashMap::new(),
            policies: RwLock::new(HashMap::new()),
        }
    }

    pub fn register(&mut self, skill: Arc<dyn Skill>) {
        let id = skill.descriptor().id.clone();
        info!(skill = %id, "Registered skill");
        if self.skills.insert(id.clone(), skill).is_some() {
            warn!(skill = %id, "Replaced previously registered skill");
        }
    }

    pub fn contains(&self, id: &str) -> bool {
        self.skills.contains_key(id)
    }

    /// Descriptors sorted by id so listings are stable.
    pub fn list_descriptors(&self) -> Vec<&SkillDescriptor> {
        let mut descriptors: Vec<&SkillDescriptor> =
            self.skills.values().map(|s| s.descriptor()).collect();
        descriptors.sort_by(|a, b| a.id.cmp(&b.id));
        descriptors
    }

    pub fn list(&self) -> Vec<SkillInfo> {
        let policies = self.policies.read();
        self.list_descriptors()
            .into_iter()
            .map(|d| SkillInfo {
                id: d.id.clone(),
                name: d.name.clone(),
                description: d.description.clone(),
                policy: policies.get(&d.id).copied(),
                critical_default: d.critical_default,
            })
            .collect()
    }

    /// Set the autonomy override for a skill.
    pub fn set_policy(&self, id: &str, policy: SkillPolicy) -> BrebotResult<()> {
        if !self.skills.contains_key(id) {
            return Err(BrebotError::NotFound(format!("skill '{id}'")));
        }
        info!(skill = %id, policy = %policy, "Skill policy updated");
        self.policies.write().insert(id.to_string(), policy);
        Ok(())
    }

    pub fn policy(&self, id: &str) -> Option<SkillPolicy> {
        self.policies.read().get(id).copied()
    }

    /// Decide whether a step bound to `id` must wait for approval.
    ///
    /// A policy override takes precedence; otherwise the step is gated if the
    /// plan marked it critical or the skill is critical by default.
    pub fn requires_approval(&self, id: &str, step_critical: bool) -> bool {
        if let Some(policy) = self.policy(id) {
            return policy.gates();
        }
        let critical_default = self
            .skills
            .get(id)
            .map(|s| s.descriptor().critical_default)
            .unwrap_or(false);
        step_critical || critical_default
    }

    /// Invoke the skill named by the call.
    pub async fn execute(&self, call: SkillCall) -> BrebotResult<SkillOutput> {
        let skill = self
            .skills
            .get(&call.skill_id)
            .ok_or_else(|| BrebotError::Skill(format!("Unknown skill: {}", call.skill_id)))?;
        skill.execute(call).await
    }

    pub fn skill_count(&self) -> usize {
        self.skills.len()
    }
}

impl Default for SkillRegistry {
    fn default() -> Self {
        Self::new()
    }
}
