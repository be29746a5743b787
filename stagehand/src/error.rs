//! Typed failures surfaced by phase entry points.

use thiserror::Error;

use crate::core::limits::LimitExceeded;
use crate::core::quality::bullets;
use crate::core::workflow::TransitionError;
use crate::phase::Phase;

/// Version-control and pull-request host failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GitError {
    #[error("branch {branch}: {message}")]
    Branch { branch: String, message: String },

    #[error("push of {branch} to {remote} failed: {message}")]
    Push {
        branch: String,
        remote: String,
        message: String,
    },

    #[error("merge request for {branch} failed: {message}")]
    MergeRequest { branch: String, message: String },

    #[error("merge conflict merging {branch} into {base}; merge aborted")]
    MergeConflict { branch: String, base: String },

    #[error("remote {remote} points at {actual}, expected a url containing '{expected}'")]
    RemoteMismatch {
        remote: String,
        expected: String,
        actual: String,
    },

    #[error("preflight failed: {0}")]
    Preflight(String),

    #[error("git {command} failed: {message}")]
    Command { command: String, message: String },
}

/// Why a phase call did not advance its item.
///
/// Every variant leaves the persisted item in its last valid state.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PhaseError {
    #[error("cannot run {phase} phase: {reason}")]
    PhaseValidation { phase: Phase, reason: String },

    #[error("artifact not created: {phase} phase finished without writing {path}")]
    ArtifactNotCreated { phase: Phase, path: String },

    #[error("invalid artifact {path}: {reason}")]
    InvalidArtifact { path: String, reason: String },

    #[error("research quality check failed:\n{}", bullets(.errors))]
    ResearchQuality { errors: Vec<String> },

    #[error("plan quality check failed:\n{}", bullets(.errors))]
    PlanQuality { errors: Vec<String> },

    #[error("story quality check failed:\n{}", bullets(.errors))]
    StoryQuality { errors: Vec<String> },

    #[error("{message}")]
    Containment {
        phase: Phase,
        paths: Vec<String>,
        message: String,
    },

    #[error(transparent)]
    LimitExceeded(#[from] LimitExceeded),

    #[error("agent failed: {0}")]
    Agent(String),

    #[error("agent timed out after {secs}s")]
    AgentTimeout { secs: u64 },

    #[error("agent needs input: {0}")]
    NeedsInput(String),

    #[error("agent is blocked: {0}")]
    Blocked(String),

    #[error(transparent)]
    Git(#[from] GitError),

    #[error(
        "merge_mode = \"direct\" bypasses review and requires allow_unsafe_direct_merge = true (explicit opt-in)"
    )]
    DirectMergeNotAllowed,

    #[error("not all stories done (pending: {})", .pending.join(", "))]
    NotAllStoriesDone { pending: Vec<String> },

    #[error("pull request for {branch} is not merged; item stays in_pr")]
    NotMerged { branch: String },

    #[error(transparent)]
    Transition(#[from] TransitionError),

    #[error("storage: {0}")]
    Storage(String),
}

impl PhaseError {
    /// Fold an infrastructure error into the executor boundary.
    pub fn storage(err: &anyhow::Error) -> Self {
        PhaseError::Storage(format!("{err:#}"))
    }
}
