//! Approval types for human-in-the-loop (HITL) gating.
//!
//! These live in `brebot-core` so that both `brebot-orchestrator` (which owns
//! the approval records) and `brebot-gateway` (which accepts decisions over
//! HTTP) can share them without circular deps.

use crate::{BrebotError, BrebotResult};
use serde::{Deserialize, Serialize};
use std::fmt;

/// The verdict a reviewer submits for a pending approval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Decision {
    Approve,
    Deny,
}

impl Decision {
    /// Parse a decision from free text. Unlike risk levels there is no safe
    /// default here, so unknown input is rejected.
    pub fn parse(s: &str) -> BrebotResult<Self> {
        match s.trim().to_lowercase().as_str() {
            "approve" | "approved" => Ok(Decision::Approve),
            "deny" | "denied" | "reject" => Ok(Decision::Deny),
            other => Err(BrebotError::Validation(format!(
                "Unknown decision '{other}', expected 'approve' or 'deny'"
            ))),
        }
    }

    /// The approval status this decision resolves to.
    pub fn resolved_status(self) -> ApprovalStatus {
        match self {
            Decision::Approve => ApprovalStatus::Approved,
            Decision::Deny => ApprovalStatus::Denied,
        }
    }
}

/// Lifecycle of an approval gate. Only `Pending` counts as open.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApprovalStatus {
    Pending,
    Approved,
    Denied,
}

impl ApprovalStatus {
    pub fn is_open(self) -> bool {
        self == ApprovalStatus::Pending
    }
}

impl fmt::Display for ApprovalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApprovalStatus::Pending => write!(f, "pending"),
            ApprovalStatus::Approved => write!(f, "approved"),
            ApprovalStatus::Denied => write!(f, "denied"),
        }
    }
}
