//! Goal → plan conversion.
//!
//! The orchestrator treats planning as an opaque function behind the
//! [`Planner`] trait. [`CatalogPlanner`] is the deterministic implementation
//! shipped with the service: it splits a goal into clauses and binds each one
//! to the registered skill it mentions.

use crate::types::{FailurePolicy, Plan, PlanStep};
use async_trait::async_trait;
use brebot_core::{BrebotError, BrebotResult};
use brebot_skills::SkillRegistry;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info};

/// Body of `POST /plan`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanRequest {
    pub prompt: String,
    #[serde(default)]
    pub constraints: PlanConstraints,
}

impl PlanRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            constraints: PlanConstraints::default(),
        }
    }
}

/// Optional limits on what the planner may produce.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanConstraints {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_steps: Option<usize>,
    /// Only these skill ids may be used.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allowed_skills: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_policy: Option<FailurePolicy>,
}

#[async_trait]
pub trait Planner: Send + Sync {
    async fn plan(&self, request: &PlanRequest) -> BrebotResult<Plan>;
}

struct SkillMatcher {
    id: String,
    description: String,
    pattern: Regex,
}

/// Keyword planner over the skill catalog.
pub struct CatalogPlanner {
    skills: Arc<SkillRegistry>,
    matchers: Vec<SkillMatcher>,
    splitter: Regex,
    email: Regex,
    url: Regex,
}

const MAX_STEP_NAME: usize = 80;

impl CatalogPlanner {
    pub fn new(skills: Arc<SkillRegistry>) -> BrebotResult<Self> {
        let compile =
            |pattern: &str| Regex::new(pattern).map_err(|e| BrebotError::Config(e.to_string()));

        let mut matchers = Vec::new();
        for descriptor in skills.list_descriptors() {
            let mut terms: Vec<String> = vec![
                regex::escape(&descriptor.id),
                regex::escape(&descriptor.id.replace('_', " ")),
            ];
            terms.extend(descriptor.keywords.iter().map(|k| regex::escape(k)));
            terms.dedup();
            let pattern = compile(&format!(r"(?i)\b(?:{})\b", terms.join("|")))?;
            matchers.push(SkillMatcher {
                id: descriptor.id.clone(),
                description: descriptor.description.clone(),
                pattern,
            });
        }

        Ok(Self {
            skills,
            matchers,
            splitter: compile(r"(?i)\s*(?:\band then\b|\bthen\b|;|,|\n)\s*")?,
            email: compile(r"[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}")?,
            url: compile(r#"https?://[^\s,;"']+"#)?,
        })
    }

    fn clauses<'a>(&self, goal: &'a str) -> Vec<&'a str> {
        self.splitter
            .split(goal)
            .map(|c| c.trim().trim_end_matches('.').trim())
            .filter(|c| !c.is_empty())
            .collect()
    }

    /// The skill mentioned earliest in the clause.
    fn best_match(&self, clause: &str, allowed: Option<&[String]>) -> Option<&SkillMatcher> {
        self.matchers
            .iter()
            .filter(|m| allowed.map_or(true, |ids| ids.iter().any(|id| id == &m.id)))
            .filter_map(|m| m.pattern.find(clause).map(|hit| (hit.start(), m)))
            .min_by_key(|(start, _)| *start)
            .map(|(_, m)| m)
    }

    fn inputs_for(&self, clause: &str) -> serde_json::Value {
        let mut inputs = serde_json::Map::new();
        inputs.insert("instruction".into(), clause.into());
        let recipients: Vec<&str> = self.email.find_iter(clause).map(|m| m.as_str()).collect();
        if !recipients.is_empty() {
            inputs.insert("to".into(), recipients.into());
        }
        if let Some(url) = self.url.find(clause) {
            inputs.insert("url".into(), url.as_str().into());
        }
        serde_json::Value::Object(inputs)
    }
}

#[async_trait]
impl Planner for CatalogPlanner {
    async fn plan(&self, request: &PlanRequest) -> BrebotResult<Plan> {
        let goal = request.prompt.trim();
        if goal.is_empty() {
            return Err(BrebotError::Validation("prompt is empty".into()));
        }
        let constraints = &request.constraints;
        if constraints.max_steps == Some(0) {
            return Err(BrebotError::Validation("maxSteps must be at least 1".into()));
        }
        let allowed = constraints.allowed_skills.as_deref();

        let mut steps = Vec::new();
        for clause in self.clauses(goal) {
            let Some(matcher) = self.best_match(clause, allowed) else {
                debug!(clause = %clause, "No skill matches clause");
                return Err(BrebotError::Validation(format!(
                    "no available skill can handle '{clause}'"
                )));
            };
            let name: String = clause.chars().take(MAX_STEP_NAME).collect();
            steps.push(
                PlanStep::new(name, matcher.id.clone())
                    .with_description(matcher.description.clone())
                    .with_inputs(self.inputs_for(clause)),
            );
        }
        if let Some(max) = constraints.max_steps {
            steps.truncate(max);
        }

        let mut plan = Plan::new(goal, steps);
        plan.failure_policy = constraints.failure_policy;
        plan.estimated_time = Some(format!("~{} min", plan.steps.len()));
        plan.requires_approval = plan
            .steps
            .iter()
            .any(|s| self.skills.requires_approval(&s.skill_id, s.critical));
        plan.validate()?;

        info!(plan_id = %plan.id, steps = plan.steps.len(), "Plan generated");
        Ok(plan)
    }
}
