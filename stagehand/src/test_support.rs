//! Test-only helpers: scratch repositories, scripted agents, a fake PR host, and builders.

use std::cell::{Cell, RefCell};
use std::collections::{HashMap, VecDeque};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use anyhow::{Context, Result, anyhow, bail};
use chrono::{DateTime, TimeZone, Utc};
use tempfile::TempDir;

use crate::error::GitError;
use crate::init::{InitOptions, init_repo};
use crate::io::agent::{AgentRequest, AgentResult, AgentRunner};
use crate::io::config::AgentConfig;
use crate::io::host::{PullRequest, PullRequestSpec, PullRequestState, ReviewHost};
use crate::io::paths::StagehandPaths;
use crate::io::store::{save_item, save_prd};
use crate::item::{Item, WorkflowState};
use crate::prd::{Prd, Story, StoryStatus};

/// Fixed timestamp so builders are deterministic.
pub fn fixed_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0)
        .single()
        .unwrap_or_default()
}

/// Item with deterministic fields in the given state.
pub fn item_in(id: &str, state: WorkflowState) -> Item {
    let mut item = Item::new(
        id,
        format!("Item {id}"),
        format!("Overview for {id}."),
        fixed_time(),
    );
    item.state = state;
    item
}

/// Story that passes the default story gate.
pub fn story(id: &str, done: bool) -> Story {
    Story {
        id: id.to_string(),
        title: format!("Story {id}"),
        acceptance_criteria: vec![
            format!("{id} works end to end"),
            format!("{id} has tests"),
        ],
        priority: 1,
        status: if done {
            StoryStatus::Done
        } else {
            StoryStatus::Pending
        },
        notes: String::new(),
    }
}

pub fn prd_with(stories: Vec<Story>) -> Prd {
    Prd {
        id: "001-demo".to_string(),
        branch_name: "stagehand/001-demo".to_string(),
        user_stories: stories,
    }
}

/// `n` pending stories `US-001..`.
pub fn pending_stories(n: usize) -> Vec<Story> {
    (1..=n).map(|i| story(&format!("US-{i:03}"), false)).collect()
}

/// Research document with every default section and exactly `citations` citations.
pub fn research_doc(citations: usize) -> String {
    let mut doc = String::from("# Research\n\n## Summary\n\n");
    doc.push_str(&"The feature touches the request pipeline and its configuration. ".repeat(3));
    doc.push_str("\n\n## Current State Analysis\n\n");
    doc.push_str(
        &"Requests flow through the router into handlers which call the store layer. ".repeat(3),
    );
    doc.push_str("\n\n## Key Files\n\n");
    for i in 1..=citations {
        doc.push_str(&format!("- src/module_{i}.rs:{}\n", i * 10));
    }
    doc.push_str("\n## Technical Considerations\n\nKeep the public API stable.\n");
    doc.push_str("\n## Risks and Mitigations\n\nRegressions; covered by tests.\n");
    doc.push_str("\n## Recommended Approach\n\nExtend the existing handler.\n");
    doc
}

/// Plan document with every default section and `phases` `###` phases.
pub fn plan_doc(phases: usize) -> String {
    let mut doc = String::from("# Plan\n\n## Overview\n\nAdd the feature.\n");
    doc.push_str("\n## Current State\n\nNot supported.\n");
    doc.push_str("\n## Desired End State\n\nSupported and tested.\n");
    doc.push_str("\n## What We're NOT Doing\n\nNo UI changes.\n");
    doc.push_str("\n## Implementation Approach\n\nSmall steps.\n");
    doc.push_str("\n## Phases\n\n");
    for i in 1..=phases {
        doc.push_str(&format!("### Phase {i}\n\nDo step {i}.\n\n"));
    }
    doc.push_str("## Testing Strategy\n\nUnit and integration tests.\n");
    doc
}

/// Scratch git repository on `main` with an initialised `.stagehand/` and a bare `origin`.
pub struct TestRepo {
    dir: TempDir,
    remote: TempDir,
}

impl TestRepo {
    pub fn new() -> Result<Self> {
        let dir = tempfile::tempdir().context("create repo tempdir")?;
        let remote = tempfile::tempdir().context("create remote tempdir")?;
        git_in(remote.path(), &["init", "--bare", "-q"])?;

        let root = dir.path();
        git_in(root, &["init", "-q"])?;
        git_in(root, &["symbolic-ref", "HEAD", "refs/heads/main"])?;
        git_in(root, &["config", "user.name", "Stagehand Test"])?;
        git_in(root, &["config", "user.email", "test@stagehand.invalid"])?;
        git_in(root, &["config", "commit.gpgsign", "false"])?;
        fs::write(root.join("README.md"), "# test repo\n").context("write README")?;
        init_repo(root, &InitOptions { force: false })?;
        git_in(root, &["add", "-A"])?;
        git_in(root, &["commit", "-q", "-m", "initial commit"])?;
        let remote_path = remote
            .path()
            .to_str()
            .ok_or_else(|| anyhow!("remote path is not utf-8"))?
            .to_string();
        git_in(root, &["remote", "add", "origin", &remote_path])?;
        git_in(root, &["push", "-q", "origin", "main"])?;

        Ok(Self { dir, remote })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Alias of [`path`](Self::path).
    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    pub fn remote_path(&self) -> &Path {
        self.remote.path()
    }

    pub fn paths(&self) -> StagehandPaths {
        StagehandPaths::new(self.path())
    }

    /// Run git in the repository and return trimmed stdout.
    pub fn git(&self, args: &[&str]) -> Result<String> {
        git_in(self.path(), args)
    }

    /// Commit hash of `reference` in the bare remote.
    pub fn remote_rev(&self, reference: &str) -> Result<String> {
        git_in(self.remote_path(), &["rev-parse", reference])
    }

    pub fn write(&self, rel: &str, contents: &str) -> Result<PathBuf> {
        write_file(self.path(), rel, contents)
    }

    pub fn read(&self, rel: &str) -> Result<String> {
        let path = self.path().join(rel);
        fs::read_to_string(&path).with_context(|| format!("read {}", path.display()))
    }

    pub fn save_item(&self, item: &Item) -> Result<()> {
        save_item(&self.paths(), item)
    }

    pub fn save_prd(&self, item_id: &str, prd: &Prd) -> Result<()> {
        save_prd(&self.paths().item(item_id).prd_path, prd)
    }

    /// Stage and commit everything.
    pub fn commit_all(&self, message: &str) -> Result<()> {
        self.git(&["add", "-A"])?;
        self.git(&["commit", "-q", "-m", message])?;
        Ok(())
    }
}

fn write_file(root: &Path, rel: &str, contents: &str) -> Result<PathBuf> {
    let path = root.join(rel);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).with_context(|| format!("create {}", parent.display()))?;
    }
    fs::write(&path, contents).with_context(|| format!("write {}", path.display()))?;
    Ok(path)
}

fn git_in(dir: &Path, args: &[&str]) -> Result<String> {
    let output = Command::new("git")
        .args(args)
        .current_dir(dir)
        .output()
        .with_context(|| format!("spawn git {}", args.join(" ")))?;
    if !output.status.success() {
        bail!(
            "git {} failed: {}",
            args.join(" "),
            String::from_utf8_lossy(&output.stderr).trim()
        );
    }
    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
}

type Action = Box<dyn Fn(&Path) -> Result<()>>;

/// One scripted agent invocation: a side effect in the working directory plus a result.
pub struct ScriptedStep {
    action: Action,
    result: AgentResult,
}

impl ScriptedStep {
    /// Successful invocation that runs `action` in the agent's working directory.
    pub fn acting(action: impl Fn(&Path) -> Result<()> + 'static) -> Self {
        Self {
            action: Box::new(action),
            result: agent_result(true),
        }
    }

    /// Successful invocation that writes `files` (repo-relative) in the working directory.
    pub fn writes(files: &[(&str, &str)]) -> Self {
        let files: Vec<(String, String)> = files
            .iter()
            .map(|(rel, contents)| (rel.to_string(), contents.to_string()))
            .collect();
        Self::acting(move |cwd| {
            for (rel, contents) in &files {
                write_file(cwd, rel, contents)?;
            }
            Ok(())
        })
    }

    /// Successful invocation that changes nothing.
    pub fn noop() -> Self {
        Self::acting(|_| Ok(()))
    }

    pub fn failing(exit_code: i32) -> Self {
        let mut step = Self::noop();
        step.result.success = false;
        step.result.exit_code = Some(exit_code);
        step
    }

    pub fn timing_out() -> Self {
        let mut step = Self::noop();
        step.result.success = false;
        step.result.timed_out = true;
        step.result.exit_code = None;
        step
    }

    pub fn with_output(mut self, output: &str) -> Self {
        self.result.output = output.to_string();
        self
    }

    pub fn with_cost(mut self, cost_usd: f64) -> Self {
        self.result.cost_usd = Some(cost_usd);
        self
    }
}

fn agent_result(success: bool) -> AgentResult {
    AgentResult {
        success,
        output: "working\n".to_string(),
        stderr: String::new(),
        exit_code: Some(0),
        timed_out: false,
        completion_detected: false,
        cost_usd: None,
    }
}

/// Agent runner that replays scripted steps and records every prompt.
///
/// Once the queue is empty, the `repeat` step (if any) is used for every further call.
pub struct ScriptedAgent {
    steps: RefCell<VecDeque<ScriptedStep>>,
    repeat: Option<ScriptedStep>,
    prompts: RefCell<Vec<String>>,
    calls: Cell<usize>,
}

impl ScriptedAgent {
    pub fn new(steps: Vec<ScriptedStep>) -> Self {
        Self {
            steps: RefCell::new(steps.into()),
            repeat: None,
            prompts: RefCell::new(Vec::new()),
            calls: Cell::new(0),
        }
    }

    /// Agent that performs `step` on every call.
    pub fn repeating(step: ScriptedStep) -> Self {
        Self {
            repeat: Some(step),
            ..Self::new(Vec::new())
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.get()
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.borrow().clone()
    }

    pub fn assert_drained(&self) -> Result<()> {
        let remaining = self.steps.borrow().len();
        if remaining > 0 {
            bail!("scripted agent has {remaining} unused steps");
        }
        Ok(())
    }
}

impl AgentRunner for ScriptedAgent {
    fn run(&self, _config: &AgentConfig, request: &AgentRequest<'_>) -> Result<AgentResult> {
        self.calls.set(self.calls.get() + 1);
        self.prompts.borrow_mut().push(request.prompt.to_string());
        let next = self.steps.borrow_mut().pop_front();
        let step = match (&next, &self.repeat) {
            (Some(step), _) | (None, Some(step)) => step,
            (None, None) => bail!("scripted agent exhausted after {} calls", self.calls.get() - 1),
        };
        (step.action)(request.cwd)?;
        Ok(step.result.clone())
    }
}

/// In-memory pull-request host.
#[derive(Debug, Default)]
pub struct FakeHost {
    requests: RefCell<HashMap<String, PullRequest>>,
    created: RefCell<Vec<PullRequestSpec>>,
    lookup_error: RefCell<Option<String>>,
    next_number: Cell<u64>,
}

impl FakeHost {
    pub fn set_request(&self, branch: &str, pr: PullRequest) {
        self.requests.borrow_mut().insert(branch.to_string(), pr);
    }

    /// Mark the request for `branch` as merged.
    pub fn merge(&self, branch: &str) {
        if let Some(pr) = self.requests.borrow_mut().get_mut(branch) {
            pr.state = PullRequestState::Merged;
        }
    }

    pub fn fail_lookups(&self, message: &str) {
        *self.lookup_error.borrow_mut() = Some(message.to_string());
    }

    /// Every create/update call, in order.
    pub fn created(&self) -> Vec<PullRequestSpec> {
        self.created.borrow().clone()
    }
}

impl ReviewHost for FakeHost {
    fn find_request(&self, branch: &str) -> Result<Option<PullRequest>, GitError> {
        if let Some(message) = self.lookup_error.borrow().as_ref() {
            return Err(GitError::MergeRequest {
                branch: branch.to_string(),
                message: message.clone(),
            });
        }
        Ok(self.requests.borrow().get(branch).cloned())
    }

    fn create_or_update(&self, spec: &PullRequestSpec) -> Result<PullRequest, GitError> {
        self.created.borrow_mut().push(spec.clone());
        if let Some(existing) = self.requests.borrow().get(&spec.branch)
            && existing.state == PullRequestState::Open
        {
            return Ok(existing.clone());
        }
        let number = self.next_number.get() + 1;
        self.next_number.set(number);
        let pr = PullRequest {
            number,
            url: format!("https://example.test/pull/{number}"),
            state: PullRequestState::Open,
        };
        self.set_request(&spec.branch, pr.clone());
        Ok(pr)
    }
}
