//! Per-iteration logs under `.stagehand/items/<id>/iterations/<n>/`.
//!
//! Agent stdout is streamed to `agent.log` while the agent runs; `meta.json` and
//! `stderr.log` are written once the iteration ends.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;

use super::backend::AgentStatus;
use super::paths::ItemPaths;

#[derive(Debug, Clone, Serialize)]
pub struct IterationMeta {
    pub item_id: String,
    pub iteration: u32,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    pub duration_ms: u64,
    pub success: bool,
    pub exit_code: Option<i32>,
    pub timed_out: bool,
    pub completion_detected: bool,
    pub agent_status: AgentStatus,
    pub progress_steps: u64,
    /// Stories that flipped to done during this iteration.
    pub stories_completed: Vec<String>,
    /// Paths changed during this iteration, as git reports them.
    pub changed_paths: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct IterationPaths {
    pub dir: PathBuf,
    pub meta_path: PathBuf,
    pub agent_log_path: PathBuf,
    pub stderr_log_path: PathBuf,
}

impl IterationPaths {
    pub fn new(item: &ItemPaths, iteration: u32) -> Self {
        let dir = item.iterations_dir.join(iteration.to_string());
        Self {
            dir: dir.clone(),
            meta_path: dir.join("meta.json"),
            agent_log_path: dir.join("agent.log"),
            stderr_log_path: dir.join("stderr.log"),
        }
    }
}

pub fn write_iteration(
    paths: &IterationPaths,
    meta: &IterationMeta,
    stderr: &str,
) -> Result<()> {
    fs::create_dir_all(&paths.dir)
        .with_context(|| format!("create iteration dir {}", paths.dir.display()))?;
    let mut buf = serde_json::to_string_pretty(meta)?;
    buf.push('\n');
    write_text(&paths.meta_path, &buf)?;
    if !stderr.trim().is_empty() {
        write_text(&paths.stderr_log_path, stderr)?;
    }
    Ok(())
}

fn write_text(path: &Path, contents: &str) -> Result<()> {
    fs::write(path, contents).with_context(|| format!("write {}", path.display()))
}
