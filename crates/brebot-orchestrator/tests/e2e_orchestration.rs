#![allow(clippy::unwrap_used, clippy::expect_used)]
//! End-to-end orchestration tests.
//!
//! Drives dispatch → execution → approval → retry → cancellation through the
//! public `Orchestrator` API with mock skills that record invocation order,
//! fail on demand, or block until released.

use async_trait::async_trait;
use brebot_core::{ApprovalStatus, BrebotError, BrebotResult, Decision};
use brebot_orchestrator::*;
use brebot_skills::{
    ArtifactDraft, Skill, SkillCall, SkillDescriptor, SkillOutput, SkillPolicy, SkillRegistry,
};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;

// ---------------------------------------------------------------------------
// Mock skills
// ---------------------------------------------------------------------------

type CallLog = Arc<Mutex<Vec<(u32, String)>>>;

struct Recorder {
    descriptor: SkillDescriptor,
    log: CallLog,
    failures_left: AtomicUsize,
    release: Option<Arc<Notify>>,
}

impl Recorder {
    fn new(id: &str, log: &CallLog) -> Self {
        Self {
            descriptor: SkillDescriptor {
                id: id.to_string(),
                name: id.to_string(),
                description: format!("{id} mock"),
                parameters_schema: serde_json::json!({"type": "object"}),
                critical_default: false,
                keywords: vec![],
            },
            log: log.clone(),
            failures_left: AtomicUsize::new(0),
            release: None,
        }
    }

    fn critical(mut self) -> Self {
        self.descriptor.critical_default = true;
        self
    }

    fn failing(self, times: usize) -> Self {
        self.failures_left.store(times, Ordering::SeqCst);
        self
    }

    fn blocking(mut self, release: Arc<Notify>) -> Self {
        self.release = Some(release);
        self
    }
}

#[async_trait]
impl Skill for Recorder {
    fn descriptor(&self) -> &SkillDescriptor {
        &self.descriptor
    }

    async fn execute(&self, call: SkillCall) -> BrebotResult<SkillOutput> {
        self.log.lock().push((call.step_no, call.skill_id.clone()));
        if let Some(release) = &self.release {
            release.notified().await;
        }
        let failing = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(BrebotError::Skill(format!("{} exploded", call.skill_id)));
        }
        Ok(SkillOutput::new(serde_json::json!({"step": call.step_no, "inputs": call.inputs}))
            .with_artifact(ArtifactDraft::new(
                format!("{}-{}", call.skill_id, call.step_no),
                "text",
                format!("mem://{}/{}", call.job_id, call.step_no),
            )))
    }
}

struct Harness {
    orch: Orchestrator,
    log: CallLog,
}

impl Harness {
    fn build(config: OrchestratorConfig, extra: impl FnOnce(&CallLog) -> Vec<Recorder>) -> Self {
        let log: CallLog = Arc::new(Mutex::new(Vec::new()));
        let mut registry = SkillRegistry::new();
        registry.register(Arc::new(Recorder::new("research", &log)));
        registry.register(Arc::new(Recorder::new("draft", &log)));
        registry.register(Arc::new(Recorder::new("publish", &log)));
        registry.register(Arc::new(Recorder::new("send_email", &log).critical()));
        for skill in extra(&log) {
            registry.register(Arc::new(skill));
        }
        let orch = Orchestrator::with_catalog_planner(Arc::new(registry), config).unwrap();
        Self { orch, log }
    }

    fn new() -> Self {
        Self::build(OrchestratorConfig::default(), |_| vec![])
    }

    fn calls(&self) -> Vec<u32> {
        self.log.lock().iter().map(|(step, _)| *step).collect()
    }

    fn calls_to(&self, skill: &str) -> usize {
        self.log.lock().iter().filter(|(_, s)| s == skill).count()
    }
}

fn plan(skills: &[&str]) -> Plan {
    Plan::new(
        "launch the campaign",
        skills
            .iter()
            .enumerate()
            .map(|(i, skill)| PlanStep::new(format!("step {}", i + 1), *skill))
            .collect(),
    )
}

fn statuses(job: &Job) -> Vec<StepStatus> {
    job.steps.iter().map(|s| s.status).collect()
}

async fn wait_for_step(orch: &Orchestrator, job_id: uuid::Uuid, step_no: u32, status: StepStatus) {
    for _ in 0..200 {
        let job = orch.get_job(job_id).await.unwrap();
        if job.step(step_no).unwrap().status == status {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("step {step_no} never reached {status}");
}

// ---------------------------------------------------------------------------
// Sequential execution
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_e2e_three_steps_run_in_order_and_complete() {
    let h = Harness::new();
    let job = h.orch.dispatch(plan(&["research", "draft", "publish"])).await.unwrap();
    assert_eq!(job.status, JobStatus::Pending);
    assert!(job.steps.iter().all(|s| s.status == StepStatus::Pending));

    let job = h.orch.wait_idle(job.id).await.unwrap();
    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(h.calls(), vec![1, 2, 3]);
    assert!(job.steps.iter().all(|s| s.attempts == 1));

    let artifacts = h.orch.list_artifacts(Some(job.id)).await.unwrap();
    assert_eq!(artifacts.len(), 3);
    assert_eq!(job.steps[1].artifacts, vec![artifacts[1].id]);
    assert_eq!(artifacts[2].step_no, 3);
}

#[tokio::test]
async fn test_e2e_get_job_does_not_change_state() {
    let h = Harness::new();
    let job = h.orch.dispatch(plan(&["research", "draft"])).await.unwrap();
    h.orch.wait_idle(job.id).await.unwrap();

    let first = h.orch.get_job(job.id).await.unwrap();
    let second = h.orch.get_job(job.id).await.unwrap();
    assert_eq!(first, second);
    assert_eq!(h.calls(), vec![1, 2]);
}

#[tokio::test]
async fn test_e2e_empty_plan_is_rejected_without_creating_a_job() {
    let h = Harness::new();
    let err = h.orch.dispatch(plan(&[])).await.unwrap_err();
    assert!(matches!(err, BrebotError::Validation(_)));
    assert!(h.orch.list_jobs(None, None).await.is_empty());
    assert!(h.calls().is_empty());
}

#[tokio::test]
async fn test_e2e_unknown_job_and_approval_are_not_found() {
    let h = Harness::new();
    let missing = uuid::Uuid::new_v4();
    assert!(matches!(h.orch.get_job(missing).await, Err(BrebotError::NotFound(_))));
    assert!(matches!(
        h.orch.retry_step(missing, None).await,
        Err(BrebotError::NotFound(_))
    ));
    assert!(matches!(
        h.orch.resolve_approval(missing, Decision::Approve, None, None).await,
        Err(BrebotError::NotFound(_))
    ));
}

#[tokio::test]
async fn test_e2e_same_inline_plan_dispatched_twice_runs_twice() {
    let h = Harness::new();
    let body = serde_json::json!({
        "id": "7d0c6f2e-1b1e-4c3b-9b7a-2f8e5a1d0c11",
        "goal": "ping",
        "steps": [{"name": "Ping", "description": "", "skillId": "research"}],
        "estimatedTime": "~1 min"
    });

    let first: Plan = serde_json::from_value(body.clone()).unwrap();
    let first = h.orch.dispatch(first).await.unwrap();
    let second: Plan = serde_json::from_value(body.clone()).unwrap();
    let second = h.orch.dispatch(second).await.unwrap();

    assert_ne!(first.id, second.id);
    assert_eq!(first.plan_id, second.plan_id);
    assert_eq!(first.steps[0].id, "step-1");
    assert_eq!(h.orch.wait_idle(first.id).await.unwrap().status, JobStatus::Completed);
    assert_eq!(h.orch.wait_idle(second.id).await.unwrap().status, JobStatus::Completed);
    assert_eq!(h.calls_to("research"), 2);

    let mut changed: Plan = serde_json::from_value(body).unwrap();
    changed.steps[0].skill_id = "draft".into();
    let err = h.orch.dispatch(changed).await.unwrap_err();
    assert!(matches!(err, BrebotError::Conflict(_)));
}

// ---------------------------------------------------------------------------
// Approval gate
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_e2e_critical_step_waits_for_approval_then_continues() {
    let h = Harness::new();
    let mut p = plan(&["research", "draft", "publish"]);
    p.steps[1].critical = true;
    let job = h.orch.dispatch(p).await.unwrap();

    let job = h.orch.wait_idle(job.id).await.unwrap();
    assert_eq!(
        statuses(&job),
        vec![StepStatus::Completed, StepStatus::NeedsApproval, StepStatus::Pending]
    );
    assert_eq!(job.status, JobStatus::Running);
    assert_eq!(h.calls(), vec![1]);

    let pending = h.orch.list_approvals(Some(ApprovalStatus::Pending)).await;
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].step_no, 2);
    assert_eq!(job.steps[1].approval_id, Some(pending[0].id));

    let approval = h
        .orch
        .resolve_approval(pending[0].id, Decision::Approve, None, Some("ops".into()))
        .await
        .unwrap();
    assert_eq!(approval.status, ApprovalStatus::Approved);
    assert_eq!(approval.decided_by.as_deref(), Some("ops"));

    let job = h.orch.wait_idle(job.id).await.unwrap();
    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(h.calls(), vec![1, 2, 3]);
    assert_eq!(h.orch.status_summary().await.pending_approvals, 0);
}

#[tokio::test]
async fn test_e2e_critical_skill_is_gated_by_default() {
    let h = Harness::new();
    let job = h.orch.dispatch(plan(&["draft", "send_email"])).await.unwrap();
    assert!(job.steps[1].critical);
    let job = h.orch.wait_idle(job.id).await.unwrap();
    assert_eq!(job.steps[1].status, StepStatus::NeedsApproval);
    assert_eq!(h.calls_to("send_email"), 0);
}

#[tokio::test]
async fn test_e2e_denied_step_never_invokes_the_skill() {
    let h = Harness::new();
    let job = h.orch.dispatch(plan(&["send_email", "publish"])).await.unwrap();
    h.orch.wait_idle(job.id).await.unwrap();

    let approval = h.orch.list_approvals(None).await.remove(0);
    h.orch
        .resolve_approval(approval.id, Decision::Deny, Some("wrong list".into()), None)
        .await
        .unwrap();

    let job = h.orch.wait_idle(job.id).await.unwrap();
    assert_eq!(h.calls_to("send_email"), 0);
    assert_eq!(h.calls_to("publish"), 0);
    assert_eq!(job.steps[0].status, StepStatus::Failed);
    assert!(job.steps[0].logs.as_deref().unwrap().contains("denied by approval"));
    assert_eq!(job.steps[1].status, StepStatus::Pending);
    assert_eq!(job.status, JobStatus::Failed);

    // Retrying a denied critical step asks again instead of running it.
    let job = h.orch.retry_step(job.id, Some(1)).await.unwrap();
    assert_eq!(job.steps[0].status, StepStatus::NeedsApproval);
    assert_ne!(job.steps[0].approval_id, Some(approval.id));
    assert_eq!(h.calls_to("send_email"), 0);
}

#[tokio::test]
async fn test_e2e_resolving_twice_is_a_conflict() {
    let h = Harness::new();
    let job = h.orch.dispatch(plan(&["send_email"])).await.unwrap();
    h.orch.wait_idle(job.id).await.unwrap();
    let approval = h.orch.list_approvals(None).await.remove(0);

    h.orch
        .resolve_approval(approval.id, Decision::Approve, None, None)
        .await
        .unwrap();
    let job = h.orch.wait_idle(job.id).await.unwrap();

    let err = h
        .orch
        .resolve_approval(approval.id, Decision::Deny, None, None)
        .await
        .unwrap_err();
    assert!(matches!(err, BrebotError::Conflict(_)));
    assert_eq!(h.orch.get_job(job.id).await.unwrap(), job);
    assert_eq!(
        h.orch.get_approval(approval.id).await.unwrap().status,
        ApprovalStatus::Approved
    );
    assert_eq!(h.calls_to("send_email"), 1);
}

#[tokio::test]
async fn test_e2e_skill_policy_overrides_criticality() {
    let h = Harness::new();
    h.orch.set_skill_policy("send_email", SkillPolicy::AutoSafe).unwrap();
    h.orch.set_skill_policy("draft", SkillPolicy::Approve).unwrap();

    let job = h.orch.dispatch(plan(&["send_email", "draft"])).await.unwrap();
    let job = h.orch.wait_idle(job.id).await.unwrap();
    assert_eq!(job.steps[0].status, StepStatus::Completed);
    assert_eq!(job.steps[1].status, StepStatus::NeedsApproval);

    let err = h.orch.set_skill_policy("nope", SkillPolicy::Assist).unwrap_err();
    assert!(matches!(err, BrebotError::NotFound(_)));
}

// ---------------------------------------------------------------------------
// Failure and retry
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_e2e_failed_step_halts_then_retry_completes() {
    let h = Harness::build(OrchestratorConfig::default(), |log| {
        vec![Recorder::new("flaky", log).failing(1)]
    });
    let job = h.orch.dispatch(plan(&["research", "flaky", "publish"])).await.unwrap();
    let job = h.orch.wait_idle(job.id).await.unwrap();

    assert_eq!(
        statuses(&job),
        vec![StepStatus::Completed, StepStatus::Failed, StepStatus::Pending]
    );
    assert_eq!(job.status, JobStatus::Failed);
    assert!(job.steps[1].logs.as_deref().unwrap().contains("flaky exploded"));
    assert_eq!(h.calls(), vec![1, 2]);

    let retried = h.orch.retry_step(job.id, Some(2)).await.unwrap();
    assert_eq!(retried.steps[1].status, StepStatus::Running);
    assert!(retried.steps[1].logs.is_none());

    let job = h.orch.wait_idle(job.id).await.unwrap();
    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(job.steps[1].attempts, 2);
    assert_eq!(h.calls(), vec![1, 2, 2, 3]);
}

#[tokio::test]
async fn test_e2e_retry_without_step_number_picks_first_failure() {
    let h = Harness::build(OrchestratorConfig::default(), |log| {
        vec![Recorder::new("flaky", log).failing(1)]
    });
    let job = h.orch.dispatch(plan(&["flaky", "publish"])).await.unwrap();
    h.orch.wait_idle(job.id).await.unwrap();

    h.orch.retry_step(job.id, None).await.unwrap();
    let job = h.orch.wait_idle(job.id).await.unwrap();
    assert_eq!(job.status, JobStatus::Completed);
}

#[tokio::test]
async fn test_e2e_retrying_a_step_that_did_not_fail_is_rejected() {
    let h = Harness::new();
    let job = h.orch.dispatch(plan(&["research", "draft"])).await.unwrap();
    let before = h.orch.wait_idle(job.id).await.unwrap();

    let err = h.orch.retry_step(job.id, Some(1)).await.unwrap_err();
    assert!(matches!(err, BrebotError::InvalidState(_)));
    let err = h.orch.retry_step(job.id, None).await.unwrap_err();
    assert!(matches!(err, BrebotError::InvalidState(_)));
    let err = h.orch.retry_step(job.id, Some(9)).await.unwrap_err();
    assert!(matches!(err, BrebotError::NotFound(_)));

    assert_eq!(h.orch.get_job(job.id).await.unwrap(), before);
    assert_eq!(h.calls(), vec![1, 2]);
}

#[tokio::test]
async fn test_e2e_continue_policy_moves_past_failures() {
    let h = Harness::build(OrchestratorConfig::default(), |log| {
        vec![Recorder::new("flaky", log).failing(5)]
    });
    let p = plan(&["flaky", "draft", "publish"]).with_failure_policy(FailurePolicy::Continue);
    let job = h.orch.dispatch(p).await.unwrap();
    assert_eq!(job.failure_policy, FailurePolicy::Continue);

    let job = h.orch.wait_idle(job.id).await.unwrap();
    assert_eq!(
        statuses(&job),
        vec![StepStatus::Failed, StepStatus::Completed, StepStatus::Completed]
    );
    assert_eq!(job.status, JobStatus::Failed);
    assert_eq!(h.calls(), vec![1, 2, 3]);
}

#[tokio::test]
async fn test_e2e_retry_while_another_step_awaits_approval_conflicts() {
    let h = Harness::build(OrchestratorConfig::default(), |log| {
        vec![Recorder::new("flaky", log).failing(1)]
    });
    let p = plan(&["flaky", "send_email"]).with_failure_policy(FailurePolicy::Continue);
    let job = h.orch.dispatch(p).await.unwrap();
    let job = h.orch.wait_idle(job.id).await.unwrap();
    assert_eq!(statuses(&job), vec![StepStatus::Failed, StepStatus::NeedsApproval]);

    let err = h.orch.retry_step(job.id, Some(1)).await.unwrap_err();
    assert!(matches!(err, BrebotError::Conflict(_)));
}

#[tokio::test]
async fn test_e2e_approved_step_that_failed_reruns_without_new_approval() {
    let h = Harness::build(OrchestratorConfig::default(), |log| {
        vec![Recorder::new("wire", log).critical().failing(1)]
    });
    let job = h.orch.dispatch(plan(&["wire"])).await.unwrap();
    h.orch.wait_idle(job.id).await.unwrap();
    let approval = h.orch.list_approvals(None).await.remove(0);
    h.orch
        .resolve_approval(approval.id, Decision::Approve, None, None)
        .await
        .unwrap();

    let job = h.orch.wait_idle(job.id).await.unwrap();
    assert_eq!(job.steps[0].status, StepStatus::Failed);
    assert_eq!(h.calls_to("wire"), 1);

    let retried = h.orch.retry_step(job.id, Some(1)).await.unwrap();
    assert_eq!(retried.steps[0].status, StepStatus::Running);
    assert_eq!(retried.steps[0].approval_id, Some(approval.id));

    let job = h.orch.wait_idle(job.id).await.unwrap();
    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(h.calls_to("wire"), 2);
    assert_eq!(h.orch.list_approvals(None).await.len(), 1);
}

// ---------------------------------------------------------------------------
// Bindings
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_e2e_outputs_of_earlier_steps_are_bound_into_inputs() {
    let h = Harness::new();
    let mut p = plan(&["research", "draft"]);
    p.steps[0].inputs = serde_json::json!({"topic": "pricing"});
    p.steps[1].inputs = serde_json::json!({"about": "${steps.1.inputs.topic}"});
    let job = h.orch.dispatch(p).await.unwrap();

    let job = h.orch.wait_idle(job.id).await.unwrap();
    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(job.steps[1].outputs.as_ref().unwrap()["inputs"]["about"], "pricing");
}

#[tokio::test]
async fn test_e2e_missing_binding_fails_the_step() {
    let h = Harness::new();
    let mut p = plan(&["research", "draft"]);
    p.steps[1].inputs = serde_json::json!({"about": "${steps.1.nothing}"});
    let job = h.orch.dispatch(p).await.unwrap();

    let job = h.orch.wait_idle(job.id).await.unwrap();
    assert_eq!(job.steps[1].status, StepStatus::Failed);
    assert!(job.steps[1].logs.as_deref().unwrap().contains("not found"));
    assert_eq!(h.calls(), vec![1]);
}

// ---------------------------------------------------------------------------
// Cancellation and expiry
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_e2e_cancel_closes_open_approvals_and_blocks_retry() {
    let h = Harness::new();
    let job = h.orch.dispatch(plan(&["research", "send_email", "publish"])).await.unwrap();
    h.orch.wait_idle(job.id).await.unwrap();

    let job = h.orch.cancel_job(job.id).await.unwrap();
    assert!(job.cancelled);
    assert_eq!(
        statuses(&job),
        vec![StepStatus::Completed, StepStatus::Failed, StepStatus::Failed]
    );
    assert_eq!(job.status, JobStatus::Failed);

    let approval = h.orch.list_approvals(None).await.remove(0);
    assert_eq!(approval.status, ApprovalStatus::Denied);
    assert_eq!(approval.reason.as_deref(), Some("cancelled"));

    let err = h.orch.retry_step(job.id, Some(2)).await.unwrap_err();
    assert!(matches!(err, BrebotError::InvalidState(_)));
    let err = h
        .orch
        .resolve_approval(approval.id, Decision::Approve, None, None)
        .await
        .unwrap_err();
    assert!(matches!(err, BrebotError::Conflict(_)));

    // Idempotent.
    let again = h.orch.cancel_job(job.id).await.unwrap();
    assert_eq!(again, job);
}

#[tokio::test]
async fn test_e2e_cancel_discards_result_of_in_flight_call() {
    let release = Arc::new(Notify::new());
    let gate = release.clone();
    let h = Harness::build(OrchestratorConfig::default(), move |log| {
        vec![Recorder::new("slow", log).blocking(gate)]
    });
    let job = h.orch.dispatch(plan(&["slow", "publish"])).await.unwrap();
    wait_for_step(&h.orch, job.id, 1, StepStatus::Running).await;

    h.orch.cancel_job(job.id).await.unwrap();
    release.notify_one();

    let job = h.orch.wait_idle(job.id).await.unwrap();
    assert_eq!(job.steps[0].status, StepStatus::Failed);
    assert_eq!(job.steps[0].logs.as_deref(), Some("cancelled"));
    assert!(job.steps[0].outputs.is_none());
    assert!(h.orch.list_artifacts(Some(job.id)).await.unwrap().is_empty());
    assert_eq!(h.calls_to("publish"), 0);
}

#[tokio::test]
async fn test_e2e_completed_job_cannot_be_cancelled() {
    let h = Harness::new();
    let job = h.orch.dispatch(plan(&["research"])).await.unwrap();
    h.orch.wait_idle(job.id).await.unwrap();
    let err = h.orch.cancel_job(job.id).await.unwrap_err();
    assert!(matches!(err, BrebotError::InvalidState(_)));
}

#[tokio::test]
async fn test_e2e_stale_approvals_expire_like_a_denial() {
    let config = OrchestratorConfig {
        approval_ttl_secs: 60,
        ..OrchestratorConfig::default()
    };
    let h = Harness::build(config, |_| vec![]);
    let job = h.orch.dispatch(plan(&["send_email", "publish"])).await.unwrap();
    h.orch.wait_idle(job.id).await.unwrap();

    assert_eq!(h.orch.expire_approvals(chrono::Utc::now()).await, 0);
    let later = chrono::Utc::now() + chrono::Duration::seconds(120);
    assert_eq!(h.orch.expire_approvals(later).await, 1);

    let job = h.orch.wait_idle(job.id).await.unwrap();
    assert_eq!(job.steps[0].status, StepStatus::Failed);
    assert_eq!(job.steps[0].logs.as_deref(), Some("approval expired"));
    let approval = h.orch.list_approvals(None).await.remove(0);
    assert_eq!(approval.reason.as_deref(), Some("expired"));
    assert_eq!(h.calls_to("send_email"), 0);
}

#[tokio::test]
async fn test_e2e_expiry_is_off_without_ttl() {
    let h = Harness::new();
    assert!(h.orch.spawn_approval_sweeper(Duration::from_secs(1)).is_none());
    let job = h.orch.dispatch(plan(&["send_email"])).await.unwrap();
    h.orch.wait_idle(job.id).await.unwrap();
    let later = chrono::Utc::now() + chrono::Duration::days(30);
    assert_eq!(h.orch.expire_approvals(later).await, 0);
}

// ---------------------------------------------------------------------------
// Concurrency
// ---------------------------------------------------------------------------

fn rejected(result: &BrebotResult<impl Sized>) -> bool {
    matches!(
        result,
        Err(BrebotError::Conflict(_)) | Err(BrebotError::InvalidState(_))
    )
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_e2e_racing_commands_invoke_the_skill_once() {
    for _ in 0..25 {
        let h = Harness::build(OrchestratorConfig::default(), |log| {
            vec![Recorder::new("flaky", log).failing(1)]
        });

        // Two approvals of the same gate.
        let job = h.orch.dispatch(plan(&["send_email"])).await.unwrap();
        h.orch.wait_idle(job.id).await.unwrap();
        let approval_id = h.orch.list_approvals(None).await[0].id;
        let (a, b) = (h.orch.clone(), h.orch.clone());
        let first = tokio::spawn(async move {
            a.resolve_approval(approval_id, Decision::Approve, None, None).await
        });
        let second = tokio::spawn(async move {
            b.resolve_approval(approval_id, Decision::Approve, None, None).await
        });
        let results = [first.await.unwrap(), second.await.unwrap()];
        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
        assert_eq!(results.iter().filter(|&r| rejected(r)).count(), 1);
        let job = h.orch.wait_idle(job.id).await.unwrap();
        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(h.calls_to("send_email"), 1);

        // Two retries of the same failed step.
        let job = h.orch.dispatch(plan(&["flaky"])).await.unwrap();
        h.orch.wait_idle(job.id).await.unwrap();
        assert_eq!(h.calls_to("flaky"), 1);
        let (a, b) = (h.orch.clone(), h.orch.clone());
        let job_id = job.id;
        let first = tokio::spawn(async move { a.retry_step(job_id, Some(1)).await });
        let second = tokio::spawn(async move { b.retry_step(job_id, Some(1)).await });
        let results = [first.await.unwrap(), second.await.unwrap()];
        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
        assert_eq!(results.iter().filter(|&r| rejected(r)).count(), 1);
        let job = h.orch.wait_idle(job_id).await.unwrap();
        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(job.steps[0].attempts, 2);
        assert_eq!(h.calls_to("flaky"), 2);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_e2e_blocked_job_does_not_stall_other_jobs() {
    let release = Arc::new(Notify::new());
    let gate = release.clone();
    let h = Harness::build(OrchestratorConfig::default(), move |log| {
        vec![Recorder::new("slow", log).blocking(gate)]
    });

    let stuck = h.orch.dispatch(plan(&["slow", "publish"])).await.unwrap();
    wait_for_step(&h.orch, stuck.id, 1, StepStatus::Running).await;

    let other = h.orch.dispatch(plan(&["research", "draft"])).await.unwrap();
    let other = tokio::time::timeout(Duration::from_secs(5), h.orch.wait_idle(other.id))
        .await
        .expect("independent job finished while the other was blocked")
        .unwrap();
    assert_eq!(other.status, JobStatus::Completed);
    assert_eq!(
        h.orch.get_job(stuck.id).await.unwrap().steps[0].status,
        StepStatus::Running
    );

    release.notify_one();
    let stuck = h.orch.wait_idle(stuck.id).await.unwrap();
    assert_eq!(stuck.status, JobStatus::Completed);
    assert_eq!(h.calls_to("slow"), 1);
}

// ---------------------------------------------------------------------------
// Queries and activity
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_e2e_list_jobs_filters_by_status() {
    let h = Harness::new();
    let done = h.orch.dispatch(plan(&["research"])).await.unwrap();
    let gated = h.orch.dispatch(plan(&["send_email"])).await.unwrap();
    h.orch.wait_idle(done.id).await.unwrap();
    h.orch.wait_idle(gated.id).await.unwrap();

    let completed = h.orch.list_jobs(Some(JobStatus::Completed), None).await;
    assert_eq!(completed.len(), 1);
    assert_eq!(completed[0].id, done.id);
    assert_eq!(h.orch.list_jobs(None, Some(1)).await.len(), 1);
    assert_eq!(h.orch.list_jobs(None, None).await.len(), 2);
}

#[tokio::test]
async fn test_e2e_activity_log_traces_the_job() {
    let h = Harness::new();
    let job = h.orch.dispatch(plan(&["research", "send_email"])).await.unwrap();
    h.orch.wait_idle(job.id).await.unwrap();

    let actions: Vec<String> = h
        .orch
        .activity(Some(job.id), 50)
        .into_iter()
        .rev()
        .map(|e| e.action)
        .collect();
    assert_eq!(
        actions,
        vec!["job_dispatched", "step_started", "step_completed", "approval_requested"]
    );
}
