use crate::activity::{ActivityEntry, ActivityLog, ActivityOutcome};
use crate::bindings;
use crate::config::OrchestratorConfig;
use crate::planner::{CatalogPlanner, PlanRequest, Planner};
use crate::status::StatusSummary;
use crate::types::{
    Approval, Artifact, FailurePolicy, Job, JobStatus, JobStep, Plan, StepStatus,
};
use brebot_core::{ApprovalStatus, BrebotError, BrebotResult, Decision};
use brebot_skills::{SkillCall, SkillOutput, SkillPolicy, SkillRegistry};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, RwLock};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};
use uuid::Uuid;

/// Mutable state of one job. Only ever locked briefly, never across `.await`.
struct JobState {
    job: Job,
    approvals: Vec<Approval>,
    artifacts: Vec<Artifact>,
}

struct JobSlot {
    plan: Arc<Plan>,
    state: parking_lot::Mutex<JobState>,
    /// Held by whichever driver task is advancing the job, so at most one
    /// skill invocation per job is in flight.
    driver: tokio::sync::Mutex<()>,
    /// Drivers spawned and not yet finished.
    drivers: AtomicUsize,
    revision: watch::Sender<u64>,
}

impl JobSlot {
    fn snapshot(&self) -> Job {
        self.state.lock().job.clone()
    }

    fn bump(&self) {
        self.revision.send_modify(|rev| *rev += 1);
    }
}

/// A step the driver should run now.
struct Execution {
    step_no: u32,
    attempt: u32,
    call: SkillCall,
}

struct Shared {
    skills: Arc<SkillRegistry>,
    planner: Arc<dyn Planner>,
    config: OrchestratorConfig,
    plans: RwLock<HashMap<Uuid, Arc<Plan>>>,
    jobs: RwLock<HashMap<Uuid, Arc<JobSlot>>>,
    /// approval id → job id. Lock order: job state first, then this index.
    approval_index: parking_lot::RwLock<HashMap<Uuid, Uuid>>,
    activity: Arc<ActivityLog>,
}

/// The job orchestrator.
///
/// Owns plans, jobs, approvals and artifacts, and drives each job's steps
/// strictly in order: a step runs only once every earlier step has completed
/// (or failed, under the `continue` failure policy). Critical steps stop at
/// `needs_approval` until a human resolves their approval.
///
/// Commands return right after the state transition; skills are invoked on a
/// background driver task per job.
#[derive(Clone)]
pub struct Orchestrator {
    inner: Arc<Shared>,
}

impl Orchestrator {
    pub fn new(
        skills: Arc<SkillRegistry>,
        planner: Arc<dyn Planner>,
        config: OrchestratorConfig,
        activity: Arc<ActivityLog>,
    ) -> Self {
        Self {
            inner: Arc::new(Shared {
                skills,
                planner,
                config,
                plans: RwLock::new(HashMap::new()),
                jobs: RwLock::new(HashMap::new()),
                approval_index: parking_lot::RwLock::new(HashMap::new()),
                activity,
            }),
        }
    }

    /// Orchestrator using the [`CatalogPlanner`] and an in-memory activity log.
    pub fn with_catalog_planner(
        skills: Arc<SkillRegistry>,
        config: OrchestratorConfig,
    ) -> BrebotResult<Self> {
        let planner = Arc::new(CatalogPlanner::new(skills.clone())?);
        let activity = Arc::new(ActivityLog::in_memory(config.activity_capacity));
        Ok(Self::new(skills, planner, config, activity))
    }

    pub fn skills(&self) -> &Arc<SkillRegistry> {
        &self.inner.skills
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.inner.config
    }

    // --- Plans ---

    /// Ask the planner for a plan and store it for later dispatch.
    pub async fn generate_plan(&self, request: &PlanRequest) -> BrebotResult<Plan> {
        let plan = self.inner.planner.plan(request).await?;
        self.check_skills(&plan)?;
        self.inner
            .plans
            .write()
            .await
            .insert(plan.id, Arc::new(plan.clone()));
        Ok(plan)
    }

    pub async fn get_plan(&self, plan_id: Uuid) -> BrebotResult<Plan> {
        self.inner
            .plans
            .read()
            .await
            .get(&plan_id)
            .map(|p| p.as_ref().clone())
            .ok_or_else(|| BrebotError::NotFound(format!("plan {plan_id}")))
    }

    fn check_skills(&self, plan: &Plan) -> BrebotResult<()> {
        for (index, step) in plan.steps.iter().enumerate() {
            if !self.inner.skills.contains(&step.skill_id) {
                return Err(BrebotError::Validation(format!(
                    "step {} uses unknown skill '{}'",
                    index + 1,
                    step.skill_id
                )));
            }
        }
        Ok(())
    }

    // --- Dispatch ---

    /// Validate `plan`, store it, and start a job for it.
    ///
    /// Returns the job as created, every step `pending`. A plan whose id is
    /// already stored must have the same goal, steps and failure policy; the
    /// job then runs the stored copy.
    pub async fn dispatch(&self, mut plan: Plan) -> BrebotResult<Job> {
        plan.assign_step_ids();
        plan.validate()?;
        self.check_skills(&plan)?;

        let plan = {
            let mut plans = self.inner.plans.write().await;
            match plans.get(&plan.id) {
                Some(stored) if !stored.same_content(&plan) => {
                    return Err(BrebotError::Conflict(format!(
                        "plan {} already exists with different content",
                        plan.id
                    )));
                }
                Some(stored) => stored.clone(),
                None => {
                    let plan = Arc::new(plan);
                    plans.insert(plan.id, plan.clone());
                    plan
                }
            }
        };
        self.start_job(plan).await
    }

    /// Start a job for a previously stored plan.
    pub async fn dispatch_plan_id(&self, plan_id: Uuid) -> BrebotResult<Job> {
        let plan = self
            .inner
            .plans
            .read()
            .await
            .get(&plan_id)
            .cloned()
            .ok_or_else(|| BrebotError::NotFound(format!("plan {plan_id}")))?;
        self.start_job(plan).await
    }

    async fn start_job(&self, plan: Arc<Plan>) -> BrebotResult<Job> {
        let policy = plan.failure_policy.unwrap_or(self.inner.config.failure_policy);
        let skills = &self.inner.skills;
        let job = Job::from_plan(&plan, policy, |step| {
            skills.requires_approval(&step.skill_id, step.critical)
        });
        let snapshot = job.clone();

        let (revision, _) = watch::channel(0);
        let slot = Arc::new(JobSlot {
            plan: plan.clone(),
            state: parking_lot::Mutex::new(JobState {
                job,
                approvals: Vec::new(),
                artifacts: Vec::new(),
            }),
            driver: tokio::sync::Mutex::new(()),
            drivers: AtomicUsize::new(0),
            revision,
        });
        self.inner.jobs.write().await.insert(snapshot.id, slot.clone());

        info!(job_id = %snapshot.id, plan_id = %plan.id, steps = snapshot.steps.len(), "Job dispatched");
        self.inner.activity.record(
            Some(snapshot.id),
            None,
            "job_dispatched",
            serde_json::json!({
                "planId": plan.id,
                "goal": plan.goal,
                "steps": snapshot.steps.len(),
                "failurePolicy": policy,
            }),
            ActivityOutcome::Success,
        );

        self.spawn_driver(slot);
        Ok(snapshot)
    }

    // --- Driver ---

    fn spawn_driver(&self, slot: Arc<JobSlot>) {
        slot.drivers.fetch_add(1, Ordering::SeqCst);
        let this = self.clone();
        tokio::spawn(async move {
            {
                let _running = slot.driver.lock().await;
                while let Some(execution) = this.next_action(&slot) {
                    let step_no = execution.step_no;
                    let attempt = execution.attempt;
                    let result = this.invoke(execution.call).await;
                    this.record_result(&slot, step_no, attempt, result);
                }
            }
            slot.drivers.fetch_sub(1, Ordering::SeqCst);
            slot.bump();
        });
    }

    /// Run the skill on its own task so a panic fails the step instead of
    /// the driver.
    async fn invoke(&self, call: SkillCall) -> BrebotResult<SkillOutput> {
        let skills = self.inner.skills.clone();
        match tokio::spawn(async move { skills.execute(call).await }).await {
            Ok(result) => result,
            Err(e) => Err(BrebotError::Execution(format!("skill task aborted: {e}"))),
        }
    }

    /// Advance the job as far as possible without invoking a skill and
    /// return the step to execute next, if any.
    fn next_action(&self, slot: &JobSlot) -> Option<Execution> {
        let mut guard = slot.state.lock();
        let state = &mut *guard;
        if state.job.cancelled {
            return None;
        }
        let halt = state.job.failure_policy == FailurePolicy::Halt;

        for index in 0..state.job.steps.len() {
            let status = state.job.steps[index].status;
            let step_no = state.job.steps[index].step_no;
            match status {
                StepStatus::Completed => continue,
                StepStatus::Failed if halt => return None,
                StepStatus::Failed => continue,
                StepStatus::NeedsApproval => return None,
                StepStatus::Pending if state.job.steps[index].gated() => {
                    let inputs = approval_inputs(&slot.plan, &state.job, step_no);
                    if let Err(e) = self.request_approval(state, step_no, inputs) {
                        error!(job_id = %state.job.id, step_no, error = %e, "Cannot gate step");
                    }
                    drop(guard);
                    slot.bump();
                    return None;
                }
                StepStatus::Pending | StepStatus::Running => {}
            }

            let job_id = state.job.id;
            let step = &mut state.job.steps[index];
            if step.status == StepStatus::Pending {
                if let Err(e) = step.transition(StepStatus::Running) {
                    error!(job_id = %job_id, step_no, error = %e, "Cannot start step");
                    return None;
                }
            }

            match resolve_inputs(&slot.plan, &state.job, step_no) {
                Ok(inputs) => {
                    let step = &state.job.steps[index];
                    let execution = Execution {
                        step_no,
                        attempt: step.attempts,
                        call: SkillCall::new(step.skill_id.clone(), job_id, step_no, inputs),
                    };
                    info!(job_id = %job_id, step_no, skill = %step.skill_id, attempt = step.attempts, "Step started");
                    self.inner.activity.record(
                        Some(job_id),
                        Some(step_no),
                        "step_started",
                        serde_json::json!({"skill": step.skill_id, "attempt": step.attempts}),
                        ActivityOutcome::Success,
                    );
                    state.job.touch();
                    drop(guard);
                    slot.bump();
                    return Some(execution);
                }
                Err(e) => {
                    let step = &mut state.job.steps[index];
                    fail_step(step, e.to_string());
                    error!(job_id = %job_id, step_no, error = %e, "Step inputs could not be resolved");
                    self.inner.activity.record(
                        Some(job_id),
                        Some(step_no),
                        "step_failed",
                        serde_json::json!({"skill": step.skill_id, "error": e.to_string()}),
                        ActivityOutcome::Error,
                    );
                    state.job.touch();
                    if halt {
                        drop(guard);
                        slot.bump();
                        return None;
                    }
                }
            }
        }
        drop(guard);
        slot.bump();
        None
    }

    /// Open an approval for `step_no` and park the step on it.
    fn request_approval(
        &self,
        state: &mut JobState,
        step_no: u32,
        inputs: serde_json::Value,
    ) -> BrebotResult<Uuid> {
        let job_id = state.job.id;
        let step = state
            .job
            .step_mut(step_no)
            .ok_or_else(|| BrebotError::NotFound(format!("step {step_no} of job {job_id}")))?;
        step.transition(StepStatus::NeedsApproval)?;
        let approval = Approval::new(job_id, step, inputs);
        let approval_id = approval.id;
        step.approval_id = Some(approval_id);

        info!(job_id = %job_id, step_no, approval_id = %approval_id, skill = %step.skill_id, "Approval requested");
        self.inner.activity.record(
            Some(job_id),
            Some(step_no),
            "approval_requested",
            serde_json::json!({"approvalId": approval_id, "skill": step.skill_id}),
            ActivityOutcome::Success,
        );

        state.approvals.push(approval);
        state.job.touch();
        self.inner.approval_index.write().insert(approval_id, job_id);
        Ok(approval_id)
    }

    fn record_result(
        &self,
        slot: &JobSlot,
        step_no: u32,
        attempt: u32,
        result: BrebotResult<SkillOutput>,
    ) {
        let mut guard = slot.state.lock();
        let state = &mut *guard;
        let job_id = state.job.id;
        let Some(step) = state.job.step_mut(step_no) else {
            return;
        };
        if step.status != StepStatus::Running || step.attempts != attempt {
            warn!(job_id = %job_id, step_no, status = %step.status, "Discarding late skill result");
            return;
        }

        match result {
            Ok(output) => {
                for draft in output.artifacts {
                    let artifact = Artifact {
                        id: Uuid::new_v4(),
                        job_id,
                        step_no,
                        step_id: step.id.clone(),
                        name: draft.name,
                        kind: draft.kind,
                        url: draft.url,
                        created_at: Utc::now(),
                    };
                    step.artifacts.push(artifact.id);
                    state.artifacts.push(artifact);
                }
                step.outputs = Some(output.outputs);
                step.logs = None;
                if let Err(e) = step.transition(StepStatus::Completed) {
                    error!(job_id = %job_id, step_no, error = %e, "Cannot complete step");
                    return;
                }
                info!(job_id = %job_id, step_no, skill = %step.skill_id, artifacts = step.artifacts.len(), "Step completed");
                self.inner.activity.record(
                    Some(job_id),
                    Some(step_no),
                    "step_completed",
                    serde_json::json!({"skill": step.skill_id, "artifacts": step.artifacts.len()}),
                    ActivityOutcome::Success,
                );
            }
            Err(e) => {
                fail_step(step, e.to_string());
                error!(job_id = %job_id, step_no, skill = %step.skill_id, error = %e, "Step failed");
                self.inner.activity.record(
                    Some(job_id),
                    Some(step_no),
                    "step_failed",
                    serde_json::json!({"skill": step.skill_id, "error": e.to_string()}),
                    ActivityOutcome::Error,
                );
            }
        }
        state.job.touch();
        drop(guard);
        slot.bump();
    }

    // --- Commands ---

    /// Resolve a pending approval.
    ///
    /// `approve` lets the step run; `deny` fails it without invoking the
    /// skill. Resolving an approval twice is a conflict.
    pub async fn resolve_approval(
        &self,
        approval_id: Uuid,
        decision: Decision,
        reason: Option<String>,
        decided_by: Option<String>,
    ) -> BrebotResult<Approval> {
        let job_id = self
            .inner
            .approval_index
            .read()
            .get(&approval_id)
            .copied()
            .ok_or_else(|| BrebotError::NotFound(format!("approval {approval_id}")))?;
        let slot = self.slot(job_id).await?;

        let resolved = {
            let mut guard = slot.state.lock();
            let state = &mut *guard;
            let approval = state
                .approvals
                .iter_mut()
                .find(|a| a.id == approval_id)
                .ok_or_else(|| BrebotError::NotFound(format!("approval {approval_id}")))?;
            if !approval.is_open() {
                return Err(BrebotError::Conflict(format!(
                    "approval {approval_id} is already {}",
                    approval.status
                )));
            }
            let step_no = approval.step_no;
            let step = state.job.step_mut(step_no).ok_or_else(|| {
                BrebotError::NotFound(format!("step {step_no} of job {job_id}"))
            })?;
            if step.status != StepStatus::NeedsApproval || step.approval_id != Some(approval_id) {
                return Err(BrebotError::InvalidState(format!(
                    "step {step_no} is {} and not waiting on approval {approval_id}",
                    step.status
                )));
            }

            match decision {
                Decision::Approve => {
                    step.transition(StepStatus::Running)?;
                    step.approved = true;
                    step.logs = None;
                }
                Decision::Deny => {
                    step.transition(StepStatus::Failed)?;
                    step.logs = Some(match &reason {
                        Some(reason) => format!("denied by approval: {reason}"),
                        None => "denied by approval".to_string(),
                    });
                }
            }
            approval.resolve(decision.resolved_status(), reason, decided_by);
            let resolved = approval.clone();
            state.job.touch();

            match decision {
                Decision::Approve => {
                    info!(job_id = %job_id, step_no, approval_id = %approval_id, "Approval granted")
                }
                Decision::Deny => {
                    warn!(job_id = %job_id, step_no, approval_id = %approval_id, "Approval denied")
                }
            }
            self.inner.activity.record(
                Some(job_id),
                Some(step_no),
                "approval_resolved",
                serde_json::json!({
                    "approvalId": approval_id,
                    "decision": decision,
                    "reason": resolved.reason,
                    "decidedBy": resolved.decided_by,
                }),
                match decision {
                    Decision::Approve => ActivityOutcome::Success,
                    Decision::Deny => ActivityOutcome::Denied,
                },
            );
            resolved
        };

        slot.bump();
        self.spawn_driver(slot);
        Ok(resolved)
    }

    /// Re-run a failed step. With no step number, the first failed step.
    ///
    /// A critical step that was never approved goes back to `needs_approval`
    /// with a fresh approval instead of running.
    pub async fn retry_step(&self, job_id: Uuid, step_no: Option<u32>) -> BrebotResult<Job> {
        let slot = self.slot(job_id).await?;
        let (snapshot, gated) = {
            let mut guard = slot.state.lock();
            let state = &mut *guard;
            if state.job.cancelled {
                return Err(BrebotError::InvalidState(format!("job {job_id} was cancelled")));
            }
            let step_no = match step_no {
                Some(n) => n,
                None => state.job.first_failed().ok_or_else(|| {
                    BrebotError::InvalidState(format!("job {job_id} has no failed step"))
                })?,
            };
            let step = state.job.step(step_no).ok_or_else(|| {
                BrebotError::NotFound(format!("step {step_no} of job {job_id}"))
            })?;
            if step.status != StepStatus::Failed {
                return Err(BrebotError::InvalidState(format!(
                    "step {step_no} is {}, only failed steps can be retried",
                    step.status
                )));
            }
            if let Some(active) = state.job.active_step() {
                return Err(BrebotError::Conflict(format!(
                    "step {active} of job {job_id} is still in progress"
                )));
            }

            let gated = step.gated();
            if gated {
                let inputs = approval_inputs(&slot.plan, &state.job, step_no);
                self.request_approval(state, step_no, inputs)?;
            } else if let Some(step) = state.job.step_mut(step_no) {
                step.outputs = None;
                step.transition(StepStatus::Running)?;
            }
            if let Some(step) = state.job.step_mut(step_no) {
                step.logs = None;
            }
            state.job.touch();

            info!(job_id = %job_id, step_no, gated, "Step retried");
            self.inner.activity.record(
                Some(job_id),
                Some(step_no),
                "step_retried",
                serde_json::json!({"gated": gated}),
                ActivityOutcome::Success,
            );
            (state.job.clone(), gated)
        };

        slot.bump();
        if !gated {
            self.spawn_driver(slot);
        }
        Ok(snapshot)
    }

    /// Stop a job. Unfinished steps fail with `cancelled`, open approvals are
    /// denied, and results still in flight are discarded when they arrive.
    /// Cancelling twice is a no-op.
    pub async fn cancel_job(&self, job_id: Uuid) -> BrebotResult<Job> {
        let slot = self.slot(job_id).await?;
        let snapshot = {
            let mut guard = slot.state.lock();
            let state = &mut *guard;
            if state.job.cancelled {
                return Ok(state.job.clone());
            }
            if state.job.status == JobStatus::Completed {
                return Err(BrebotError::InvalidState(format!("job {job_id} already completed")));
            }
            state.job.cancelled = true;
            for step in state.job.steps.iter_mut() {
                if !step.status.is_terminal() {
                    fail_step(step, "cancelled".to_string());
                }
            }
            for approval in state.approvals.iter_mut().filter(|a| a.is_open()) {
                approval.resolve(
                    ApprovalStatus::Denied,
                    Some("cancelled".to_string()),
                    Some("system".to_string()),
                );
            }
            state.job.touch();

            warn!(job_id = %job_id, "Job cancelled");
            self.inner.activity.record(
                Some(job_id),
                None,
                "job_cancelled",
                serde_json::json!({}),
                ActivityOutcome::Denied,
            );
            state.job.clone()
        };
        slot.bump();
        Ok(snapshot)
    }

    /// Deny every open approval older than the configured TTL. Returns how
    /// many were expired.
    pub async fn expire_approvals(&self, now: DateTime<Utc>) -> usize {
        let Some(ttl) = self.inner.config.approval_ttl() else {
            return 0;
        };
        let slots: Vec<Arc<JobSlot>> = self.inner.jobs.read().await.values().cloned().collect();

        let mut expired = 0;
        for slot in slots {
            let touched = {
                let mut guard = slot.state.lock();
                let state = &mut *guard;
                let job_id = state.job.id;
                let mut touched = false;
                for approval in state.approvals.iter_mut() {
                    let stale = approval.is_open()
                        && (now - approval.created_at)
                            .to_std()
                            .map(|age| age >= ttl)
                            .unwrap_or(false);
                    if !stale {
                        continue;
                    }
                    approval.resolve(
                        ApprovalStatus::Denied,
                        Some("expired".to_string()),
                        Some("system".to_string()),
                    );
                    if let Some(step) = state.job.step_mut(approval.step_no) {
                        if step.status == StepStatus::NeedsApproval {
                            fail_step(step, "approval expired".to_string());
                        }
                    }
                    warn!(job_id = %job_id, step_no = approval.step_no, approval_id = %approval.id, "Approval expired");
                    self.inner.activity.record(
                        Some(job_id),
                        Some(approval.step_no),
                        "approval_expired",
                        serde_json::json!({"approvalId": approval.id}),
                        ActivityOutcome::Denied,
                    );
                    expired += 1;
                    touched = true;
                }
                if touched {
                    state.job.touch();
                }
                touched
            };
            if touched {
                slot.bump();
                self.spawn_driver(slot);
            }
        }
        expired
    }

    /// Periodically expire stale approvals. `None` when no TTL is configured.
    pub fn spawn_approval_sweeper(&self, every: Duration) -> Option<JoinHandle<()>> {
        self.inner.config.approval_ttl()?;
        let this = self.clone();
        Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            loop {
                ticker.tick().await;
                this.expire_approvals(Utc::now()).await;
            }
        }))
    }

    pub fn set_skill_policy(&self, skill_id: &str, policy: SkillPolicy) -> BrebotResult<()> {
        self.inner.skills.set_policy(skill_id, policy)?;
        self.inner.activity.record(
            None,
            None,
            "skill_policy_updated",
            serde_json::json!({"skill": skill_id, "policy": policy}),
            ActivityOutcome::Success,
        );
        Ok(())
    }

    // --- Queries ---

    async fn slot(&self, job_id: Uuid) -> BrebotResult<Arc<JobSlot>> {
        self.inner
            .jobs
            .read()
            .await
            .get(&job_id)
            .cloned()
            .ok_or_else(|| BrebotError::NotFound(format!("job {job_id}")))
    }

    /// Current snapshot of a job. Never changes state.
    pub async fn get_job(&self, job_id: Uuid) -> BrebotResult<Job> {
        Ok(self.slot(job_id).await?.snapshot())
    }

    /// Jobs, most recently updated first.
    pub async fn list_jobs(&self, status: Option<JobStatus>, limit: Option<usize>) -> Vec<Job> {
        let mut jobs: Vec<Job> = self
            .inner
            .jobs
            .read()
            .await
            .values()
            .map(|slot| slot.snapshot())
            .filter(|job| status.map_or(true, |wanted| wanted == job.status))
            .collect();
        jobs.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        if let Some(limit) = limit {
            jobs.truncate(limit);
        }
        jobs
    }

    /// Approvals across all jobs, newest first.
    pub async fn list_approvals(&self, status: Option<ApprovalStatus>) -> Vec<Approval> {
        let slots: Vec<Arc<JobSlot>> = self.inner.jobs.read().await.values().cloned().collect();
        let mut approvals: Vec<Approval> = slots
            .iter()
            .flat_map(|slot| {
                slot.state
                    .lock()
                    .approvals
                    .iter()
                    .filter(|a| status.map_or(true, |wanted| wanted == a.status))
                    .cloned()
                    .collect::<Vec<_>>()
            })
            .collect();
        approvals.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        approvals
    }

    pub async fn get_approval(&self, approval_id: Uuid) -> BrebotResult<Approval> {
        let not_found = || BrebotError::NotFound(format!("approval {approval_id}"));
        let job_id = self
            .inner
            .approval_index
            .read()
            .get(&approval_id)
            .copied()
            .ok_or_else(not_found)?;
        let slot = self.slot(job_id).await?;
        let found = slot
            .state
            .lock()
            .approvals
            .iter()
            .find(|a| a.id == approval_id)
            .cloned();
        found.ok_or_else(not_found)
    }

    /// Artifacts of one job, or of every job.
    pub async fn list_artifacts(&self, job_id: Option<Uuid>) -> BrebotResult<Vec<Artifact>> {
        let slots = match job_id {
            Some(id) => vec![self.slot(id).await?],
            None => self.inner.jobs.read().await.values().cloned().collect(),
        };
        let mut artifacts: Vec<Artifact> = slots
            .iter()
            .flat_map(|slot| slot.state.lock().artifacts.clone())
            .collect();
        artifacts.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(artifacts)
    }

    pub async fn status_summary(&self) -> StatusSummary {
        let mut summary = StatusSummary {
            skills: self.inner.skills.skill_count(),
            ..StatusSummary::default()
        };
        for slot in self.inner.jobs.read().await.values() {
            let state = slot.state.lock();
            summary.add_job(&state.job);
            summary.pending_approvals += state.approvals.iter().filter(|a| a.is_open()).count();
        }
        summary
    }

    pub fn activity(&self, job_id: Option<Uuid>, limit: usize) -> Vec<ActivityEntry> {
        self.inner.activity.recent(job_id, limit)
    }

    /// Wait until no driver is advancing the job, then return its snapshot.
    pub async fn wait_idle(&self, job_id: Uuid) -> BrebotResult<Job> {
        let slot = self.slot(job_id).await?;
        let mut revision = slot.revision.subscribe();
        loop {
            if slot.drivers.load(Ordering::SeqCst) == 0 {
                return Ok(slot.snapshot());
            }
            if revision.changed().await.is_err() {
                return Ok(slot.snapshot());
            }
        }
    }
}

/// Inputs of `step_no` with bindings to earlier step outputs substituted.
fn resolve_inputs(plan: &Plan, job: &Job, step_no: u32) -> BrebotResult<serde_json::Value> {
    let plan_step = plan
        .steps
        .get(step_no.saturating_sub(1) as usize)
        .ok_or_else(|| BrebotError::NotFound(format!("plan step {step_no}")))?;
    if plan_step.inputs.is_null() {
        return Ok(serde_json::Value::Object(serde_json::Map::new()));
    }
    bindings::resolve(&plan_step.inputs, |n| {
        job.step(n)
            .filter(|s| s.status == StepStatus::Completed)
            .and_then(|s| s.outputs.as_ref())
    })
}

/// What the reviewer sees: resolved inputs when possible, the raw ones
/// otherwise.
fn approval_inputs(plan: &Plan, job: &Job, step_no: u32) -> serde_json::Value {
    resolve_inputs(plan, job, step_no).unwrap_or_else(|_| {
        plan.steps
            .get(step_no.saturating_sub(1) as usize)
            .map(|s| s.inputs.clone())
            .unwrap_or_default()
    })
}

fn fail_step(step: &mut JobStep, log: String) {
    if step.status.can_transition(StepStatus::Failed) {
        let _ = step.transition(StepStatus::Failed);
    }
    step.logs = Some(log);
}
