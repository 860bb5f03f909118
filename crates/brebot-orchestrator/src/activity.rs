use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;
use tracing::{info, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityEntry {
    pub seq: u64,
    pub timestamp: DateTime<Utc>,
    pub job_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub step_no: Option<u32>,
    pub action: String,
    pub details: serde_json::Value,
    pub outcome: ActivityOutcome,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ActivityOutcome {
    Success,
    Denied,
    Error,
}

/// Append-only record of orchestrator actions.
///
/// The most recent entries are kept in memory for `GET /activity`; when a
/// directory is given, every entry is also appended to `activity.jsonl` by a
/// background writer.
pub struct ActivityLog {
    recent: Mutex<VecDeque<ActivityEntry>>,
    capacity: usize,
    seq: AtomicU64,
    tx: Option<mpsc::UnboundedSender<ActivityEntry>>,
}

impl ActivityLog {
    pub fn in_memory(capacity: usize) -> Self {
        Self {
            recent: Mutex::new(VecDeque::with_capacity(capacity.min(1024))),
            capacity: capacity.max(1),
            seq: AtomicU64::new(0),
            tx: None,
        }
    }

    /// Create a log that also persists to `<log_dir>/activity.jsonl`.
    /// Must be called from within a tokio runtime.
    pub fn persistent(capacity: usize, log_dir: PathBuf) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<ActivityEntry>();

        tokio::spawn(async move {
            if let Err(e) = tokio::fs::create_dir_all(&log_dir).await {
                warn!(error = %e, dir = %log_dir.display(), "Cannot create activity log dir");
                return;
            }
            let log_file = log_dir.join("activity.jsonl");
            let mut file = match tokio::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(&log_file)
                .await
            {
                Ok(file) => file,
                Err(e) => {
                    warn!(error = %e, file = %log_file.display(), "Cannot open activity log");
                    return;
                }
            };

            while let Some(entry) = rx.recv().await {
                if let Ok(line) = serde_json::to_string(&entry) {
                    let line = format!("{line}\n");
                    if let Err(e) = file.write_all(line.as_bytes()).await {
                        warn!(error = %e, "Failed to append activity entry");
                    }
                }
            }
            let _ = file.flush().await;
        });

        Self {
            tx: Some(tx),
            ..Self::in_memory(capacity)
        }
    }

    pub fn record(
        &self,
        job_id: Option<Uuid>,
        step_no: Option<u32>,
        action: &str,
        details: serde_json::Value,
        outcome: ActivityOutcome,
    ) {
        let entry = ActivityEntry {
            seq: self.seq.fetch_add(1, Ordering::Relaxed) + 1,
            timestamp: Utc::now(),
            job_id,
            step_no,
            action: action.to_string(),
            details,
            outcome,
        };
        info!(
            job_id = ?entry.job_id,
            step_no = ?entry.step_no,
            action = %entry.action,
            outcome = ?entry.outcome,
            "activity"
        );

        if let Some(tx) = &self.tx {
            let _ = tx.send(entry.clone());
        }
        let mut recent = self.recent.lock();
        if recent.len() == self.capacity {
            recent.pop_front();
        }
        recent.push_back(entry);
    }

    /// Newest first, optionally restricted to one job.
    pub fn recent(&self, job_id: Option<Uuid>, limit: usize) -> Vec<ActivityEntry> {
        self.recent
            .lock()
            .iter()
            .rev()
            .filter(|e| job_id.is_none() || e.job_id == job_id)
            .take(limit)
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.recent.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
