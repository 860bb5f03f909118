//! Core types and error definitions for the Brebot operator service.
//!
//! This crate provides the foundational types shared across all Brebot crates:
//! the unified error taxonomy and the approval decision vocabulary used by the
//! orchestrator and the gateway.
//!
//! # Main types
//!
//! - [`BrebotError`] — Unified error enum for all Brebot subsystems.
//! - [`BrebotResult`] — Convenience alias for `Result<T, BrebotError>`.
//! - [`Decision`] — A reviewer's verdict on a pending approval.
//! - [`ApprovalStatus`] — Lifecycle state of an approval gate.

/// Approval vocabulary for human-in-the-loop gating.
pub mod approval;

pub use approval::{ApprovalStatus, Decision};

// --- Error types ---

/// Top-level error type for the Brebot service.
///
/// The first five variants are the caller-facing taxonomy surfaced by the
/// orchestrator; the rest wrap failures from the surrounding plumbing.
#[derive(Debug, thiserror::Error)]
pub enum BrebotError {
    /// Malformed or empty plan, missing required fields.
    #[error("Validation error: {0}")]
    Validation(String),

    /// Unknown job, approval, plan, skill, or step.
    #[error("Not found: {0}")]
    NotFound(String),

    /// The request collides with the current state (e.g. an approval that
    /// was already resolved).
    #[error("Conflict: {0}")]
    Conflict(String),

    /// A skill invocation failed. Wraps the underlying cause.
    #[error("Execution error: {0}")]
    Execution(String),

    /// The targeted step is not in the state the operation requires.
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// An error raised by a skill implementation or the registry.
    #[error("Skill error: {0}")]
    Skill(String),

    /// An error in configuration parsing or validation.
    #[error("Config error: {0}")]
    Config(String),

    /// An error from the HTTP gateway layer.
    #[error("Gateway error: {0}")]
    Gateway(String),

    /// A JSON serialization or deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A standard I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl BrebotError {
    /// Short machine-readable code used in API error bodies.
    pub fn code(&self) -> &'static str {
        match self {
            BrebotError::Validation(_) => "validation_error",
            BrebotError::NotFound(_) => "not_found",
            BrebotError::Conflict(_) => "conflict",
            BrebotError::Execution(_) => "execution_error",
            BrebotError::InvalidState(_) => "invalid_state",
            BrebotError::Skill(_) => "skill_error",
            BrebotError::Config(_) => "config_error",
            BrebotError::Gateway(_) => "gateway_error",
            BrebotError::Json(_) => "json_error",
            BrebotError::Io(_) => "io_error",
        }
    }
}

/// A convenience `Result` alias using [`BrebotError`].
pub type BrebotResult<T> = Result<T, BrebotError>;
