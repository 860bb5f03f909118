//! Plan → Job → Step → Approval orchestration for the Brebot operator service.
//!
//! A plan is dispatched into a job whose steps run strictly in order through
//! the skill registry. Steps bound to critical skills stop at an approval gate
//! until a human approves or denies them; failed steps can be retried.
//!
//! # Main types
//!
//! - [`Orchestrator`] — Owns plans, jobs, approvals and artifacts and drives execution.
//! - [`Planner`] / [`CatalogPlanner`] — Turn a free-text goal into a [`Plan`].
//! - [`Job`], [`JobStep`], [`Approval`], [`Artifact`] — The execution records.
//! - [`ActivityLog`] — Append-only record of everything the orchestrator did.

/// Append-only activity log.
pub mod activity;
/// `${steps.N.key}` input bindings.
pub mod bindings;
/// Orchestrator settings.
pub mod config;
/// The orchestrator state machine and driver.
pub mod engine;
/// Planner trait and the catalog planner.
pub mod planner;
/// Aggregate counters for `GET /status`.
pub mod status;
/// Plans, jobs, steps, approvals and artifacts.
pub mod types;

pub use activity::{ActivityEntry, ActivityLog, ActivityOutcome};
pub use config::OrchestratorConfig;
pub use engine::Orchestrator;
pub use planner::{CatalogPlanner, PlanConstraints, PlanRequest, Planner};
pub use status::{JobCounts, StatusSummary, StepCounts};
pub use types::{
    Approval, Artifact, FailurePolicy, Job, JobStatus, JobStep, Plan, PlanStep, StepStatus,
};
