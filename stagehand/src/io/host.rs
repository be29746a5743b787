//! Pull-request host adapter.
//!
//! [`GhHost`] drives the GitHub CLI; tests substitute a recording fake.

use std::path::PathBuf;
use std::process::{Command, Output};

use serde::Deserialize;
use tracing::{debug, info, instrument};

use crate::error::GitError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PullRequestState {
    Open,
    Merged,
    Closed,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PullRequest {
    pub number: u64,
    pub url: String,
    pub state: PullRequestState,
}

/// What to open (or refresh) for an item branch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PullRequestSpec {
    pub branch: String,
    pub base: String,
    pub title: String,
    pub body: String,
}

pub trait ReviewHost {
    /// Most recent pull request whose head is `branch`, in any state.
    fn find_request(&self, branch: &str) -> Result<Option<PullRequest>, GitError>;

    /// Open a pull request for `spec.branch`, or update the open one's title and body.
    fn create_or_update(&self, spec: &PullRequestSpec) -> Result<PullRequest, GitError>;
}

/// `gh` CLI backed host, run from the repository root.
#[derive(Debug, Clone)]
pub struct GhHost {
    workdir: PathBuf,
}

impl GhHost {
    pub fn new(workdir: impl Into<PathBuf>) -> Self {
        Self {
            workdir: workdir.into(),
        }
    }

    fn gh(&self, branch: &str, args: &[&str]) -> Result<Output, GitError> {
        let output = Command::new("gh")
            .args(args)
            .current_dir(&self.workdir)
            .output()
            .map_err(|err| GitError::MergeRequest {
                branch: branch.to_string(),
                message: format!("spawn gh: {err}"),
            })?;
        if !output.status.success() {
            return Err(GitError::MergeRequest {
                branch: branch.to_string(),
                message: format!(
                    "gh {} failed: {}",
                    args.first().copied().unwrap_or_default(),
                    String::from_utf8_lossy(&output.stderr).trim()
                ),
            });
        }
        Ok(output)
    }
}

impl ReviewHost for GhHost {
    #[instrument(skip_all, fields(branch))]
    fn find_request(&self, branch: &str) -> Result<Option<PullRequest>, GitError> {
        let output = self.gh(
            branch,
            &[
                "pr",
                "list",
                "--head",
                branch,
                "--state",
                "all",
                "--json",
                "number,url,state",
            ],
        )?;
        let found = parse_pr_list(&String::from_utf8_lossy(&output.stdout)).map_err(|message| {
            GitError::MergeRequest {
                branch: branch.to_string(),
                message,
            }
        })?;
        debug!(found = found.is_some(), "pull request lookup");
        Ok(found)
    }

    #[instrument(skip_all, fields(branch = %spec.branch))]
    fn create_or_update(&self, spec: &PullRequestSpec) -> Result<PullRequest, GitError> {
        let branch = spec.branch.as_str();
        match self.find_request(branch)? {
            Some(existing) if existing.state == PullRequestState::Open => {
                info!(number = existing.number, "updating pull request");
                let number = existing.number.to_string();
                self.gh(
                    branch,
                    &[
                        "pr", "edit", &number, "--title", &spec.title, "--body", &spec.body,
                    ],
                )?;
                Ok(existing)
            }
            _ => {
                info!(base = %spec.base, "creating pull request");
                self.gh(
                    branch,
                    &[
                        "pr", "create", "--head", branch, "--base", &spec.base, "--title",
                        &spec.title, "--body", &spec.body,
                    ],
                )?;
                self.find_request(branch)?
                    .ok_or_else(|| GitError::MergeRequest {
                        branch: branch.to_string(),
                        message: "pull request not found after creation".to_string(),
                    })
            }
        }
    }
}

/// Parse `gh pr list --json number,url,state`; the first entry is the newest.
fn parse_pr_list(raw: &str) -> Result<Option<PullRequest>, String> {
    if raw.trim().is_empty() {
        return Ok(None);
    }
    let list: Vec<PullRequest> =
        serde_json::from_str(raw).map_err(|err| format!("parse gh output: {err}"))?;
    Ok(list.into_iter().next())
}
