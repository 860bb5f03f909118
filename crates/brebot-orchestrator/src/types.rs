use crate::bindings;
use brebot_core::{ApprovalStatus, BrebotError, BrebotResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

// --- Plans ---

/// What happens to the rest of a job after a step fails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Stop advancing; later steps stay `pending` until a retry.
    #[default]
    Halt,
    /// Move on to the next step. Execution stays strictly sequential.
    Continue,
}

/// One step of a plan, bound to a skill.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanStep {
    /// `step-{n}` unless the client supplied one.
    #[serde(default)]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub skill_id: String,
    /// JSON object; string values of the form `${steps.N.key}` are bound to
    /// the outputs of an earlier step at execution time.
    #[serde(default = "empty_object")]
    pub inputs: serde_json::Value,
    #[serde(default)]
    pub critical: bool,
}

fn empty_object() -> serde_json::Value {
    serde_json::Value::Object(serde_json::Map::new())
}

impl PlanStep {
    pub fn new(name: impl Into<String>, skill_id: impl Into<String>) -> Self {
        Self {
            id: String::new(),
            name: name.into(),
            description: String::new(),
            skill_id: skill_id.into(),
            inputs: empty_object(),
            critical: false,
        }
    }

    pub fn with_inputs(mut self, inputs: serde_json::Value) -> Self {
        self.inputs = inputs;
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn critical(mut self) -> Self {
        self.critical = true;
        self
    }

    fn same_content(&self, other: &PlanStep) -> bool {
        self.name == other.name
            && self.skill_id == other.skill_id
            && self.inputs == other.inputs
            && self.critical == other.critical
    }
}

/// An ordered, immutable sequence of steps produced for one goal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Plan {
    #[serde(default = "Uuid::new_v4")]
    pub id: Uuid,
    #[serde(default)]
    pub goal: String,
    pub steps: Vec<PlanStep>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub estimated_time: Option<String>,
    #[serde(default)]
    pub requires_approval: bool,
    /// Overrides the orchestrator's default failure policy for this plan.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_policy: Option<FailurePolicy>,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
}

impl Plan {
    pub fn new(goal: impl Into<String>, steps: Vec<PlanStep>) -> Self {
        let mut plan = Self {
            id: Uuid::new_v4(),
            goal: goal.into(),
            steps,
            estimated_time: None,
            requires_approval: false,
            failure_policy: None,
            created_at: Utc::now(),
        };
        plan.assign_step_ids();
        plan
    }

    /// Give every step without an id the id `step-{n}`.
    pub fn assign_step_ids(&mut self) {
        for (index, step) in self.steps.iter_mut().enumerate() {
            if step.id.trim().is_empty() {
                step.id = format!("step-{}", index + 1);
            }
        }
    }

    /// Same goal, failure policy and steps. Ids, timestamps and planner
    /// estimates are ignored.
    pub fn same_content(&self, other: &Plan) -> bool {
        self.goal == other.goal
            && self.failure_policy == other.failure_policy
            && self.steps.len() == other.steps.len()
            && self
                .steps
                .iter()
                .zip(&other.steps)
                .all(|(a, b)| a.same_content(b))
    }

    pub fn with_failure_policy(mut self, policy: FailurePolicy) -> Self {
        self.failure_policy = Some(policy);
        self
    }

    /// Structural checks that do not need the skill catalog.
    pub fn validate(&self) -> BrebotResult<()> {
        if self.steps.is_empty() {
            return Err(BrebotError::Validation("plan has no steps".into()));
        }
        for (index, step) in self.steps.iter().enumerate() {
            let step_no = index as u32 + 1;
            if step.name.trim().is_empty() {
                return Err(BrebotError::Validation(format!("step {step_no} has no name")));
            }
            if step.skill_id.trim().is_empty() {
                return Err(BrebotError::Validation(format!(
                    "step {step_no} is not bound to a skill"
                )));
            }
            if !(step.inputs.is_object() || step.inputs.is_null()) {
                return Err(BrebotError::Validation(format!(
                    "step {step_no} inputs must be a JSON object"
                )));
            }
            for referenced in bindings::references(&step.inputs) {
                if referenced == 0 || referenced >= step_no {
                    return Err(BrebotError::Validation(format!(
                        "step {step_no} binds to step {referenced}, which does not run before it"
                    )));
                }
            }
        }
        Ok(())
    }
}

// --- Jobs ---

/// Execution state of one job step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Pending,
    Running,
    NeedsApproval,
    Completed,
    Failed,
}

impl StepStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, StepStatus::Completed | StepStatus::Failed)
    }

    /// Whether the step state machine allows moving from `self` to `to`.
    ///
    /// `pending -> failed` and `needs_approval -> failed` cover cancellation
    /// and denial; `failed -> needs_approval` re-gates a retried critical step
    /// that was never approved.
    pub fn can_transition(self, to: StepStatus) -> bool {
        use StepStatus::*;
        matches!(
            (self, to),
            (Pending, Running)
                | (Pending, NeedsApproval)
                | (Pending, Failed)
                | (Running, NeedsApproval)
                | (Running, Completed)
                | (Running, Failed)
                | (NeedsApproval, Running)
                | (NeedsApproval, Failed)
                | (Failed, Running)
                | (Failed, NeedsApproval)
        )
    }
}

impl fmt::Display for StepStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            StepStatus::Pending => "pending",
            StepStatus::Running => "running",
            StepStatus::NeedsApproval => "needs_approval",
            StepStatus::Completed => "completed",
            StepStatus::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Overall job state, derived from its steps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn parse(s: &str) -> BrebotResult<Self> {
        match s.trim().to_lowercase().as_str() {
            "pending" => Ok(JobStatus::Pending),
            "running" => Ok(JobStatus::Running),
            "completed" => Ok(JobStatus::Completed),
            "failed" => Ok(JobStatus::Failed),
            other => Err(BrebotError::Validation(format!("unknown job status '{other}'"))),
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            JobStatus::Pending => "pending",
            JobStatus::Running => "running",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// The execution record for one plan step within a job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobStep {
    /// Id of the plan step this record mirrors.
    pub id: String,
    /// 1-based, matches plan order, never renumbered.
    pub step_no: u32,
    pub name: String,
    pub skill_id: String,
    pub status: StepStatus,
    /// Fixed at dispatch time.
    pub critical: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logs: Option<String>,
    #[serde(default)]
    pub artifacts: Vec<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outputs: Option<serde_json::Value>,
    #[serde(default)]
    pub attempts: u32,
    /// Most recent approval created for this step.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub approval_id: Option<Uuid>,
    /// Set once an approval for this step resolved as `approve`.
    #[serde(default)]
    pub approved: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
}

impl JobStep {
    /// Move to `to`, enforcing the step state machine.
    pub fn transition(&mut self, to: StepStatus) -> BrebotResult<()> {
        if !self.status.can_transition(to) {
            return Err(BrebotError::InvalidState(format!(
                "step {} cannot move from {} to {}",
                self.step_no, self.status, to
            )));
        }
        let now = Utc::now();
        match to {
            StepStatus::Running => {
                self.attempts += 1;
                self.started_at = Some(now);
                self.finished_at = None;
            }
            StepStatus::Completed | StepStatus::Failed => self.finished_at = Some(now),
            StepStatus::Pending | StepStatus::NeedsApproval => {}
        }
        self.status = to;
        Ok(())
    }

    /// Whether the approval gate still blocks this step.
    pub fn gated(&self) -> bool {
        self.critical && !self.approved
    }
}

/// One dispatched, stateful execution of a plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    pub id: Uuid,
    pub plan_id: Uuid,
    /// Recomputed from `steps` after every transition.
    pub status: JobStatus,
    pub steps: Vec<JobStep>,
    pub failure_policy: FailurePolicy,
    #[serde(default)]
    pub cancelled: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Job {
    /// Build a job with every step `pending`. `critical` decides, once and
    /// for all, which steps are gated.
    pub fn from_plan(
        plan: &Plan,
        failure_policy: FailurePolicy,
        mut critical: impl FnMut(&PlanStep) -> bool,
    ) -> Self {
        let now = Utc::now();
        let steps = plan
            .steps
            .iter()
            .enumerate()
            .map(|(index, step)| JobStep {
                id: step.id.clone(),
                step_no: index as u32 + 1,
                name: step.name.clone(),
                skill_id: step.skill_id.clone(),
                status: StepStatus::Pending,
                critical: critical(step),
                logs: None,
                artifacts: Vec::new(),
                outputs: None,
                attempts: 0,
                approval_id: None,
                approved: false,
                started_at: None,
                finished_at: None,
            })
            .collect();

        let mut job = Self {
            id: Uuid::new_v4(),
            plan_id: plan.id,
            status: JobStatus::Pending,
            steps,
            failure_policy,
            cancelled: false,
            created_at: now,
            updated_at: now,
        };
        job.status = job.derive_status();
        job
    }

    pub fn step(&self, step_no: u32) -> Option<&JobStep> {
        step_no
            .checked_sub(1)
            .and_then(|index| self.steps.get(index as usize))
    }

    pub fn step_mut(&mut self, step_no: u32) -> Option<&mut JobStep> {
        step_no
            .checked_sub(1)
            .and_then(|index| self.steps.get_mut(index as usize))
    }

    /// Derive the overall status from the steps.
    ///
    /// All completed → `completed`; anything running or awaiting approval →
    /// `running`; otherwise any failure → `failed`; some progress → `running`;
    /// nothing started → `pending`.
    pub fn derive_status(&self) -> JobStatus {
        if self.steps.iter().all(|s| s.status == StepStatus::Completed) {
            return JobStatus::Completed;
        }
        if self
            .steps
            .iter()
            .any(|s| matches!(s.status, StepStatus::Running | StepStatus::NeedsApproval))
        {
            return JobStatus::Running;
        }
        if self.steps.iter().any(|s| s.status == StepStatus::Failed) {
            return JobStatus::Failed;
        }
        if self.steps.iter().any(|s| s.status == StepStatus::Completed) {
            return JobStatus::Running;
        }
        JobStatus::Pending
    }

    /// Record that something changed.
    pub fn touch(&mut self) {
        self.status = self.derive_status();
        self.updated_at = Utc::now();
    }

    pub fn first_failed(&self) -> Option<u32> {
        self.steps
            .iter()
            .find(|s| s.status == StepStatus::Failed)
            .map(|s| s.step_no)
    }

    /// Step currently running or waiting on a human, if any.
    pub fn active_step(&self) -> Option<u32> {
        self.steps
            .iter()
            .find(|s| matches!(s.status, StepStatus::Running | StepStatus::NeedsApproval))
            .map(|s| s.step_no)
    }
}

// --- Approvals & artifacts ---

/// A human decision gate on exactly one critical job step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Approval {
    pub id: Uuid,
    pub job_id: Uuid,
    pub step_no: u32,
    pub step_name: String,
    pub skill_id: String,
    pub status: ApprovalStatus,
    /// Inputs the step will run with, for the reviewer.
    pub inputs: serde_json::Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub decided_by: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub decided_at: Option<DateTime<Utc>>,
}

impl Approval {
    pub fn new(job_id: Uuid, step: &JobStep, inputs: serde_json::Value) -> Self {
        Self {
            id: Uuid::new_v4(),
            job_id,
            step_no: step.step_no,
            step_name: step.name.clone(),
            skill_id: step.skill_id.clone(),
            status: ApprovalStatus::Pending,
            inputs,
            reason: None,
            decided_by: None,
            created_at: Utc::now(),
            decided_at: None,
        }
    }

    pub fn is_open(&self) -> bool {
        self.status.is_open()
    }

    pub fn resolve(&mut self, status: ApprovalStatus, reason: Option<String>, by: Option<String>) {
        self.status = status;
        self.reason = reason;
        self.decided_by = by;
        self.decided_at = Some(Utc::now());
    }
}

/// Immutable reference to output produced by a completed step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Artifact {
    pub id: Uuid,
    pub job_id: Uuid,
    pub step_no: u32,
    pub step_id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub url: String,
    pub created_at: DateTime<Utc>,
}
