use crate::error::{ApiError, ApiResult};
use crate::server::AppState;
use axum::body::Bytes;
use axum::extract::rejection::{JsonRejection, PathRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::Json;
use brebot_core::{ApprovalStatus, BrebotError, Decision};
use brebot_orchestrator::{
    ActivityEntry, Approval, Artifact, Job, JobStatus, Plan, PlanRequest, StatusSummary,
};
use brebot_skills::{SkillInfo, SkillPolicy};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

type AppStateRef = State<Arc<AppState>>;

const DEFAULT_ACTIVITY_LIMIT: usize = 100;

// --- Plans & dispatch ---

pub async fn generate_plan(
    State(state): AppStateRef,
    payload: Result<Json<PlanRequest>, JsonRejection>,
) -> ApiResult<Json<Plan>> {
    let Json(request) = payload?;
    let plan = state.orchestrator.generate_plan(&request).await?;
    Ok(Json(plan))
}

/// `{ planId }`, `{ plan }`, or a bare inline plan.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum DispatchRequest {
    Stored {
        #[serde(rename = "planId")]
        plan_id: Uuid,
    },
    Wrapped {
        plan: Plan,
    },
    Inline(Plan),
}

pub async fn dispatch(
    State(state): AppStateRef,
    payload: Result<Json<DispatchRequest>, JsonRejection>,
) -> ApiResult<Json<Value>> {
    let Json(request) = payload?;
    let job = match request {
        DispatchRequest::Stored { plan_id } => {
            state.orchestrator.dispatch_plan_id(plan_id).await?
        }
        DispatchRequest::Wrapped { plan } | DispatchRequest::Inline(plan) => {
            state.orchestrator.dispatch(plan).await?
        }
    };
    Ok(Json(json!({ "jobId": job.id })))
}

// --- Jobs ---

#[derive(Debug, Deserialize, Default)]
pub struct JobsQuery {
    pub status: Option<String>,
    pub limit: Option<usize>,
}

pub async fn list_jobs(
    State(state): AppStateRef,
    query: Result<Query<JobsQuery>, QueryRejection>,
) -> ApiResult<Json<Vec<Job>>> {
    let Query(query) = query?;
    let status = query.status.as_deref().map(JobStatus::parse).transpose()?;
    Ok(Json(state.orchestrator.list_jobs(status, query.limit).await))
}

pub async fn get_job(
    State(state): AppStateRef,
    id: Result<Path<Uuid>, PathRejection>,
) -> ApiResult<Json<Job>> {
    let Path(job_id) = id?;
    Ok(Json(state.orchestrator.get_job(job_id).await?))
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct RetryRequest {
    pub step_no: Option<u32>,
}

pub async fn retry_step(
    State(state): AppStateRef,
    id: Result<Path<Uuid>, PathRejection>,
    body: Bytes,
) -> ApiResult<Json<Value>> {
    let Path(job_id) = id?;
    // The body is optional; an empty one retries the first failed step.
    let request: RetryRequest = if body.iter().all(u8::is_ascii_whitespace) {
        RetryRequest::default()
    } else {
        serde_json::from_slice(&body).map_err(|e| ApiError::BadRequest(e.to_string()))?
    };
    let step_no = request.step_no;
    state.orchestrator.retry_step(job_id, step_no).await?;
    Ok(Json(json!({})))
}

pub async fn cancel_job(
    State(state): AppStateRef,
    id: Result<Path<Uuid>, PathRejection>,
) -> ApiResult<Json<Job>> {
    let Path(job_id) = id?;
    Ok(Json(state.orchestrator.cancel_job(job_id).await?))
}

// --- Artifacts ---

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ArtifactsQuery {
    pub job_id: Option<Uuid>,
}

pub async fn list_artifacts(
    State(state): AppStateRef,
    query: Result<Query<ArtifactsQuery>, QueryRejection>,
) -> ApiResult<Json<Vec<Artifact>>> {
    let Query(query) = query?;
    Ok(Json(state.orchestrator.list_artifacts(query.job_id).await?))
}

// --- Skills ---

pub async fn list_skills(State(state): AppStateRef) -> Json<Vec<SkillInfo>> {
    Json(state.orchestrator.skills().list())
}

#[derive(Debug, Deserialize)]
pub struct PolicyRequest {
    pub policy: String,
}

pub async fn update_skill_policy(
    State(state): AppStateRef,
    id: Result<Path<String>, PathRejection>,
    payload: Result<Json<PolicyRequest>, JsonRejection>,
) -> ApiResult<Json<Value>> {
    let Path(skill_id) = id?;
    let Json(body) = payload?;
    let policy = SkillPolicy::parse(&body.policy)?;
    state.orchestrator.set_skill_policy(&skill_id, policy)?;
    Ok(Json(json!({})))
}

// --- Approvals ---

#[derive(Debug, Deserialize, Default)]
pub struct ApprovalsQuery {
    pub status: Option<String>,
}

fn parse_approval_status(s: &str) -> Result<ApprovalStatus, BrebotError> {
    match s.trim().to_lowercase().as_str() {
        "pending" => Ok(ApprovalStatus::Pending),
        "approved" => Ok(ApprovalStatus::Approved),
        "denied" => Ok(ApprovalStatus::Denied),
        other => Err(BrebotError::Validation(format!(
            "unknown approval status '{other}'"
        ))),
    }
}

pub async fn list_approvals(
    State(state): AppStateRef,
    query: Result<Query<ApprovalsQuery>, QueryRejection>,
) -> ApiResult<Json<Vec<Approval>>> {
    let Query(query) = query?;
    let status = query.status.as_deref().map(parse_approval_status).transpose()?;
    Ok(Json(state.orchestrator.list_approvals(status).await))
}

pub async fn get_approval(
    State(state): AppStateRef,
    id: Result<Path<Uuid>, PathRejection>,
) -> ApiResult<Json<Approval>> {
    let Path(approval_id) = id?;
    Ok(Json(state.orchestrator.get_approval(approval_id).await?))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolveRequest {
    pub approval_id: Option<Uuid>,
    pub decision: String,
    pub reason: Option<String>,
    pub decided_by: Option<String>,
}

async fn resolve(state: &AppState, approval_id: Uuid, body: ResolveRequest) -> ApiResult<Approval> {
    let decision = Decision::parse(&body.decision)?;
    let approval = state
        .orchestrator
        .resolve_approval(approval_id, decision, body.reason, body.decided_by)
        .await?;
    info!(approval_id = %approval_id, decision = ?decision, "Approval resolved via API");
    Ok(approval)
}

/// `POST /approvals` with the approval id in the body.
pub async fn resolve_approval(
    State(state): AppStateRef,
    payload: Result<Json<ResolveRequest>, JsonRejection>,
) -> ApiResult<Json<Approval>> {
    let Json(body) = payload?;
    let approval_id = body
        .approval_id
        .ok_or_else(|| ApiError::BadRequest("approvalId is required".into()))?;
    Ok(Json(resolve(&state, approval_id, body).await?))
}

/// `POST /approvals/{id}`.
pub async fn resolve_approval_by_id(
    State(state): AppStateRef,
    id: Result<Path<Uuid>, PathRejection>,
    payload: Result<Json<ResolveRequest>, JsonRejection>,
) -> ApiResult<Json<Approval>> {
    let Path(approval_id) = id?;
    let Json(body) = payload?;
    if body.approval_id.is_some_and(|body_id| body_id != approval_id) {
        return Err(ApiError::BadRequest(
            "approvalId in body does not match the path".into(),
        ));
    }
    Ok(Json(resolve(&state, approval_id, body).await?))
}

// --- Status & activity ---

pub async fn status(State(state): AppStateRef) -> Json<StatusSummary> {
    Json(state.orchestrator.status_summary().await)
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ActivityQuery {
    pub job_id: Option<Uuid>,
    pub limit: Option<usize>,
}

pub async fn activity(
    State(state): AppStateRef,
    query: Result<Query<ActivityQuery>, QueryRejection>,
) -> ApiResult<Json<Vec<ActivityEntry>>> {
    let Query(query) = query?;
    let limit = query.limit.unwrap_or(DEFAULT_ACTIVITY_LIMIT);
    Ok(Json(state.orchestrator.activity(query.job_id, limit)))
}

pub async fn health() -> Json<Value> {
    Json(json!({"status": "ok", "service": "brebot"}))
}
