//! Compute backend: where agent iterations run and how their state is read back.
//!
//! Phases depend only on [`ComputeBackend`]. [`LocalBackend`] runs the agent in the
//! repository working tree, so syncing is a no-op.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use super::agent::{AgentRequest, AgentResult, AgentRunner};
use super::config::AgentConfig;
use super::paths::StagehandPaths;
use super::write_atomic;

/// One agent iteration.
#[derive(Debug, Clone, Copy)]
pub struct IterationRequest<'a> {
    pub cwd: &'a Path,
    pub prompt: &'a str,
    pub allowed_tools: Option<&'a [String]>,
    /// Stream agent stdout here while it runs.
    pub log_path: Option<&'a Path>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogEvent {
    Output(String),
    Error(String),
}

/// Everything an iteration produced.
#[derive(Debug, Clone, PartialEq)]
pub struct IterationOutput {
    pub events: Vec<LogEvent>,
    pub result: AgentResult,
}

impl IterationOutput {
    /// Progress steps counted against `limits.max_progress_steps`.
    pub fn progress_steps(&self) -> u64 {
        self.events
            .iter()
            .filter(|event| matches!(event, LogEvent::Output(_)))
            .count() as u64
    }
}

/// Agent-reported status, read from `agent_state.json` after an iteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AgentStatus {
    #[default]
    Continue,
    NeedsInput,
    Blocked,
    Done,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AgentState {
    pub status: AgentStatus,
    /// Question, blocker description, or summary accompanying `status`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncDirection {
    Upload,
    Download,
}

pub trait ComputeBackend {
    fn run_iteration(&self, item_id: &str, request: &IterationRequest<'_>)
    -> Result<IterationOutput>;

    /// Status the agent left behind for `item_id`. Missing state means `continue`.
    fn read_state(&self, item_id: &str) -> Result<AgentState>;

    /// Hand a human response to the agent for its next iteration.
    fn write_response(&self, item_id: &str, text: &str) -> Result<()>;

    fn sync(&self, direction: SyncDirection, paths: &[PathBuf]) -> Result<()>;

    fn cleanup(&self) -> Result<()>;
}

/// Runs iterations in the local working tree through an [`AgentRunner`].
#[derive(Debug, Clone)]
pub struct LocalBackend<R> {
    paths: StagehandPaths,
    agent: AgentConfig,
    runner: R,
}

impl<R: AgentRunner> LocalBackend<R> {
    pub fn new(root: impl Into<PathBuf>, agent: AgentConfig, runner: R) -> Self {
        Self {
            paths: StagehandPaths::new(root),
            agent,
            runner,
        }
    }
}

impl<R: AgentRunner> ComputeBackend for LocalBackend<R> {
    #[instrument(skip_all, fields(item = item_id))]
    fn run_iteration(
        &self,
        item_id: &str,
        request: &IterationRequest<'_>,
    ) -> Result<IterationOutput> {
        // Stale state from a previous iteration must not be mistaken for this one's.
        let state_path = self.paths.item(item_id).agent_state_path;
        if state_path.exists() {
            fs::remove_file(&state_path)
                .with_context(|| format!("remove stale {}", state_path.display()))?;
        }

        let result = self.runner.run(
            &self.agent,
            &AgentRequest {
                cwd: request.cwd,
                prompt: request.prompt,
                allowed_tools: request.allowed_tools,
                timeout: None,
                log_path: request.log_path,
            },
        )?;

        let events = result
            .output
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(|line| LogEvent::Output(line.to_string()))
            .chain(
                result
                    .stderr
                    .lines()
                    .filter(|line| !line.trim().is_empty())
                    .map(|line| LogEvent::Error(line.to_string())),
            )
            .collect::<Vec<_>>();
        debug!(events = events.len(), success = result.success, "iteration finished");
        Ok(IterationOutput { events, result })
    }

    fn read_state(&self, item_id: &str) -> Result<AgentState> {
        let path = self.paths.item(item_id).agent_state_path;
        if !path.exists() {
            return Ok(AgentState::default());
        }
        let contents =
            fs::read_to_string(&path).with_context(|| format!("read {}", path.display()))?;
        serde_json::from_str(&contents).with_context(|| format!("parse {}", path.display()))
    }

    fn write_response(&self, item_id: &str, text: &str) -> Result<()> {
        let path = self.paths.item(item_id).response_path;
        debug!(path = %path.display(), "writing agent response");
        write_atomic(&path, text)
    }

    fn sync(&self, direction: SyncDirection, paths: &[PathBuf]) -> Result<()> {
        debug!(?direction, count = paths.len(), "local backend: nothing to sync");
        Ok(())
    }

    fn cleanup(&self) -> Result<()> {
        Ok(())
    }
}
