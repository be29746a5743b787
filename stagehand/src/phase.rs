//! Shared phase-executor plumbing.
//!
//! Every phase entry point takes an item id and an [`ExecutionContext`] and returns a
//! [`PhaseResult`]: the advanced item on success, or the unchanged item plus a
//! [`PhaseError`]. Only a failure to load the item escapes as `Err`.
//!
//! Phases that snapshot the working tree (research, plan, implement) assume exclusive
//! use of the repository. Callers running several items against one working tree must
//! serialize those calls themselves.

use std::fmt;
use std::path::{Path, PathBuf};

use anyhow::Result;
use tracing::{debug, info, warn};

use crate::core::containment::{GitFileChange, format_violations};
use crate::core::workflow::apply_state_transition;
use crate::error::PhaseError;
use crate::io::backend::{ComputeBackend, IterationOutput, IterationRequest};
use crate::io::config::Config;
use crate::io::containment::ContainmentChecker;
use crate::io::context::build_validation_context;
use crate::io::git::Vcs;
use crate::io::host::ReviewHost;
use crate::io::paths::{ItemPaths, StagehandPaths};
use crate::io::prompt::{PromptEngine, PromptInputs};
use crate::io::store::{load_item, save_item};
use crate::item::{Item, WorkflowState};

/// Tools granted to the agent while it researches or plans.
pub const DOCUMENT_TOOLS: &[&str] = &["Read", "Glob", "Grep", "Write", "Edit"];
/// Tools granted to the agent while it implements.
pub const IMPLEMENT_TOOLS: &[&str] = &["Read", "Glob", "Grep", "Write", "Edit", "Bash"];

/// The agent's own status file; every phase may write it.
pub const AGENT_STATE_FILE: &str = "agent_state.json";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    Research,
    Plan,
    Implement,
    Pr,
    Complete,
}

impl Phase {
    pub fn as_str(self) -> &'static str {
        match self {
            Phase::Research => "research",
            Phase::Plan => "plan",
            Phase::Implement => "implement",
            Phase::Pr => "pr",
            Phase::Complete => "complete",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Uniform outcome of a phase call.
#[derive(Debug, Clone, PartialEq)]
pub struct PhaseResult {
    /// Advanced item on success; the item as loaded on failure.
    pub item: Item,
    pub error: Option<PhaseError>,
}

impl PhaseResult {
    pub fn ok(item: Item) -> Self {
        Self { item, error: None }
    }

    pub fn failed(item: Item, error: PhaseError) -> Self {
        Self {
            item,
            error: Some(error),
        }
    }

    pub fn success(&self) -> bool {
        self.error.is_none()
    }
}

/// Everything a phase needs, passed explicitly to every call.
pub struct ExecutionContext<'a> {
    pub paths: StagehandPaths,
    pub config: Config,
    pub backend: &'a dyn ComputeBackend,
    pub vcs: &'a dyn Vcs,
    pub host: &'a dyn ReviewHost,
    pub prompts: PromptEngine,
    /// Check preconditions only; never invoke the agent or mutate anything.
    pub dry_run: bool,
    /// The agent is a stub: skip containment and all limits but the iteration ceiling.
    pub mock_agent: bool,
}

impl<'a> ExecutionContext<'a> {
    pub fn new(
        root: impl Into<PathBuf>,
        config: Config,
        backend: &'a dyn ComputeBackend,
        vcs: &'a dyn Vcs,
        host: &'a dyn ReviewHost,
    ) -> Result<Self> {
        Ok(Self {
            paths: StagehandPaths::new(root),
            config,
            backend,
            vcs,
            host,
            prompts: PromptEngine::new()?,
            dry_run: false,
            mock_agent: false,
        })
    }

    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn with_mock_agent(mut self, mock_agent: bool) -> Self {
        self.mock_agent = mock_agent;
        self
    }

    pub fn root(&self) -> &Path {
        &self.paths.root
    }

    pub fn load_item(&self, id: &str) -> Result<Item> {
        load_item(&self.paths, id)
    }

    pub fn item_paths(&self, item: &Item) -> ItemPaths {
        self.paths.item(&item.id)
    }

    /// Item branch: the recorded one, else `<branch_prefix><id>`.
    pub fn branch_for(&self, item: &Item) -> String {
        item.branch
            .clone()
            .unwrap_or_else(|| self.config.branch_for(&item.id))
    }

    pub(crate) fn containment_enabled(&self) -> bool {
        !self.dry_run && !self.mock_agent
    }

    pub(crate) fn prompt_inputs<'b>(
        &'b self,
        item: &'b Item,
        paths: &'b ItemPaths,
        branch: &'b str,
        response: Option<&'b str>,
    ) -> PromptInputs<'b> {
        PromptInputs {
            item,
            paths,
            branch,
            quality: &self.config.quality,
            completion_signal: &self.config.agent.completion_signal,
            response,
        }
    }

    /// Contents of `response.md`, if a human left one.
    pub(crate) fn read_response(&self, paths: &ItemPaths) -> Option<String> {
        std::fs::read_to_string(&paths.response_path).ok()
    }

    /// Snapshot the working tree, or `None` when containment is disabled.
    pub(crate) fn containment_baseline(
        &self,
    ) -> Result<Option<Vec<GitFileChange>>, PhaseError> {
        if !self.containment_enabled() {
            debug!("containment disabled");
            return Ok(None);
        }
        Ok(Some(ContainmentChecker::new(self.vcs).snapshot()?))
    }

    /// Fail with a containment violation if anything outside `allowed` changed since `baseline`.
    pub(crate) fn enforce_containment(
        &self,
        phase: Phase,
        baseline: Option<&[GitFileChange]>,
        allowed: &[String],
    ) -> Result<(), PhaseError> {
        let Some(before) = baseline else {
            return Ok(());
        };
        let result = ContainmentChecker::new(self.vcs).compare(before, allowed)?;
        if result.valid {
            return Ok(());
        }
        let paths: Vec<String> = result
            .violation_paths()
            .into_iter()
            .map(str::to_string)
            .collect();
        let message = format!(
            "unauthorized changes during {phase} phase: {}\n\n{}",
            paths.join(", "),
            format_violations(&result)
        );
        Err(PhaseError::Containment {
            phase,
            paths,
            message,
        })
    }

    /// Run one agent iteration, mapping agent failure and timeout to phase errors.
    pub(crate) fn run_agent(
        &self,
        item: &Item,
        prompt: &str,
        tools: &[&str],
        log_path: Option<&Path>,
    ) -> Result<IterationOutput, PhaseError> {
        let allowed: Vec<String> = tools.iter().map(|tool| tool.to_string()).collect();
        let output = self
            .backend
            .run_iteration(
                &item.id,
                &IterationRequest {
                    cwd: self.root(),
                    prompt,
                    allowed_tools: Some(&allowed),
                    log_path,
                },
            )
            .map_err(|err| PhaseError::Agent(format!("{err:#}")))?;
        if output.result.timed_out {
            return Err(PhaseError::AgentTimeout {
                secs: self.config.agent.timeout_secs,
            });
        }
        if !output.result.success {
            let detail = output.result.stderr.trim();
            return Err(PhaseError::Agent(match output.result.exit_code {
                Some(code) if detail.is_empty() => format!("exited with status {code}"),
                Some(code) => format!("exited with status {code}: {detail}"),
                None => "terminated by signal".to_string(),
            }));
        }
        Ok(output)
    }

    /// Rebuild the validation context, apply the next transition, and persist.
    pub(crate) fn advance(&self, item: &Item) -> Result<Item, PhaseError> {
        let ctx = build_validation_context(&self.paths, item, self.host);
        let mut next = apply_state_transition(item, &ctx)?;
        next.last_error = None;
        self.save(&next)?;
        info!(item = %next.id, from = %item.state, to = %next.state, "item advanced");
        Ok(next)
    }

    pub(crate) fn save(&self, item: &Item) -> Result<(), PhaseError> {
        save_item(&self.paths, item).map_err(|err| PhaseError::storage(&err))
    }
}

/// Fail unless `item` is in one of `allowed`.
pub(crate) fn require_state(
    item: &Item,
    phase: Phase,
    allowed: &[WorkflowState],
) -> Result<(), PhaseError> {
    if allowed.contains(&item.state) {
        return Ok(());
    }
    let expected: Vec<&str> = allowed.iter().map(|state| state.as_str()).collect();
    Err(PhaseError::PhaseValidation {
        phase,
        reason: format!(
            "item {} is {}, expected {}",
            item.id,
            item.state,
            expected.join(" or ")
        ),
    })
}

/// Log and wrap a failure; the returned item is the one loaded at phase start.
pub(crate) fn fail(item: Item, error: PhaseError) -> PhaseResult {
    warn!(item = %item.id, state = %item.state, err = %error, "phase failed");
    PhaseResult::failed(item, error)
}

/// Record a failed result's error on the persisted item.
pub fn persist_outcome(ctx: &ExecutionContext<'_>, result: &PhaseResult) -> Result<()> {
    let Some(error) = &result.error else {
        return Ok(());
    };
    if ctx.dry_run {
        return Ok(());
    }
    // Reload: the phase may have persisted intermediate progress.
    let mut item = ctx.load_item(&result.item.id)?;
    item.last_error = Some(error.to_string());
    save_item(&ctx.paths, &item)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn require_state_lists_expected_states() {
        let item = crate::test_support::item_in("001", WorkflowState::Idea);
        let err = require_state(
            &item,
            Phase::Implement,
            &[WorkflowState::Planned, WorkflowState::Implementing],
        )
        .expect_err("wrong state");
        assert_eq!(
            err.to_string(),
            "cannot run implement phase: item 001 is idea, expected planned or implementing"
        );
    }

    #[test]
    fn result_success_tracks_error() {
        let item = crate::test_support::item_in("001", WorkflowState::Idea);
        assert!(PhaseResult::ok(item.clone()).success());
        assert!(!PhaseResult::failed(item, PhaseError::Agent("x".to_string())).success());
    }
}
