use crate::types::{Job, JobStatus, StepStatus};
use serde::Serialize;

/// Counters served by `GET /status`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusSummary {
    pub jobs: JobCounts,
    pub steps: StepCounts,
    pub pending_approvals: usize,
    pub skills: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct JobCounts {
    pub total: usize,
    pub pending: usize,
    pub running: usize,
    pub completed: usize,
    pub failed: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StepCounts {
    pub pending: usize,
    pub running: usize,
    pub needs_approval: usize,
    pub completed: usize,
    pub failed: usize,
}

impl StatusSummary {
    pub fn add_job(&mut self, job: &Job) {
        self.jobs.total += 1;
        match job.status {
            JobStatus::Pending => self.jobs.pending += 1,
            JobStatus::Running => self.jobs.running += 1,
            JobStatus::Completed => self.jobs.completed += 1,
            JobStatus::Failed => self.jobs.failed += 1,
        }
        for step in &job.steps {
            match step.status {
                StepStatus::Pending => self.steps.pending += 1,
                StepStatus::Running => self.steps.running += 1,
                StepStatus::NeedsApproval => self.steps.needs_approval += 1,
                StepStatus::Completed => self.steps.completed += 1,
                StepStatus::Failed => self.steps.failed += 1,
            }
        }
    }
}
