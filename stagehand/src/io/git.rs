//! Git adapter.
//!
//! Phases enforce containment and merge safety through git, so we keep a small,
//! explicit wrapper around `git` subprocess calls behind the [`Vcs`] trait.

use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use tracing::{debug, info, instrument, warn};

use crate::error::GitError;

/// Version-control primitives used by the phase executor.
pub trait Vcs {
    /// Current branch name (errors on detached HEAD).
    fn current_branch(&self) -> Result<String, GitError>;

    fn branch_exists(&self, branch: &str) -> Result<bool, GitError>;

    /// Check out `branch`, creating it from `base` when it does not exist.
    fn ensure_branch(&self, branch: &str, base: &str) -> Result<(), GitError>;

    fn checkout(&self, branch: &str) -> Result<(), GitError>;

    /// `git status --porcelain=v1 -uall` output limited to the working directory,
    /// with paths relative to it.
    fn status_short(&self) -> Result<String, GitError>;

    fn has_uncommitted_changes(&self) -> Result<bool, GitError> {
        Ok(!self.status_short()?.trim().is_empty())
    }

    /// Stage everything and commit. Returns `false` when there was nothing to commit.
    fn commit_all(&self, message: &str) -> Result<bool, GitError>;

    fn push(&self, remote: &str, branch: &str) -> Result<(), GitError>;

    /// Resolve a ref to its full commit hash.
    fn rev_parse(&self, reference: &str) -> Result<String, GitError>;

    /// Merge `branch` into `base` with a merge commit, leaving `base` checked out.
    ///
    /// A conflicting merge is aborted and reported as [`GitError::MergeConflict`].
    fn merge_into(&self, base: &str, branch: &str) -> Result<(), GitError>;

    /// Merge readiness: remote exists (and matches the expected url), `branch` is
    /// checked out, and the working tree is clean.
    fn preflight(
        &self,
        remote: &str,
        remote_url_contains: Option<&str>,
        branch: &str,
    ) -> Result<(), GitError>;
}

/// Wrapper for executing git commands in a working directory.
#[derive(Debug, Clone)]
pub struct Git {
    workdir: PathBuf,
}

impl Git {
    pub fn new(workdir: impl Into<PathBuf>) -> Self {
        Self {
            workdir: workdir.into(),
        }
    }

    pub fn workdir(&self) -> &Path {
        &self.workdir
    }

    fn remote_url(&self, remote: &str) -> Result<String, GitError> {
        let out = self.run(&["remote", "get-url", remote])?;
        if !out.status.success() {
            return Err(GitError::Preflight(format!("remote {remote} does not exist")));
        }
        Ok(String::from_utf8_lossy(&out.stdout).trim().to_string())
    }

    fn run_capture(&self, args: &[&str]) -> Result<String, GitError> {
        let output = self.run_checked(args)?;
        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }

    fn run_checked(&self, args: &[&str]) -> Result<Output, GitError> {
        let output = self.run(args)?;
        if !output.status.success() {
            return Err(GitError::Command {
                command: args.join(" "),
                message: stderr_of(&output),
            });
        }
        Ok(output)
    }

    fn run(&self, args: &[&str]) -> Result<Output, GitError> {
        Command::new("git")
            .args(args)
            .current_dir(&self.workdir)
            .output()
            .map_err(|err| GitError::Command {
                command: args.join(" "),
                message: format!("spawn git: {err}"),
            })
    }
}

impl Vcs for Git {
    #[instrument(skip_all)]
    fn current_branch(&self) -> Result<String, GitError> {
        let out = self.run_capture(&["rev-parse", "--abbrev-ref", "HEAD"])?;
        let name = out.trim().to_string();
        if name == "HEAD" {
            warn!("detached HEAD detected");
            return Err(GitError::Branch {
                branch: name,
                message: "detached HEAD (refuse to run)".to_string(),
            });
        }
        debug!(branch = %name, "current branch");
        Ok(name)
    }

    fn branch_exists(&self, branch: &str) -> Result<bool, GitError> {
        let status = self
            .run(&[
                "show-ref",
                "--verify",
                "--quiet",
                &format!("refs/heads/{branch}"),
            ])?
            .status;
        Ok(status.success())
    }

    #[instrument(skip_all, fields(branch, base))]
    fn ensure_branch(&self, branch: &str, base: &str) -> Result<(), GitError> {
        if self.current_branch().ok().as_deref() == Some(branch) {
            debug!(branch, "already on branch");
            return Ok(());
        }
        let result = if self.branch_exists(branch)? {
            debug!(branch, "checking out existing branch");
            self.run_checked(&["checkout", branch])
        } else {
            info!(branch, base, "creating branch");
            self.run_checked(&["checkout", "-b", branch, base])
        };
        result.map(|_| ()).map_err(|err| GitError::Branch {
            branch: branch.to_string(),
            message: err.to_string(),
        })
    }

    #[instrument(skip_all, fields(branch))]
    fn checkout(&self, branch: &str) -> Result<(), GitError> {
        debug!(branch, "checking out branch");
        self.run_checked(&["checkout", branch])
            .map(|_| ())
            .map_err(|err| GitError::Branch {
                branch: branch.to_string(),
                message: err.to_string(),
            })
    }

    fn status_short(&self) -> Result<String, GitError> {
        let raw = self.run_capture(&["status", "--porcelain=v1", "-uall", "--", "."])?;
        let prefix = self.run_capture(&["rev-parse", "--show-prefix"])?;
        Ok(relative_to_prefix(&raw, prefix.trim()))
    }

    #[instrument(skip_all)]
    fn commit_all(&self, message: &str) -> Result<bool, GitError> {
        self.run_checked(&["add", "-A", "--", "."])?;
        let staged = self.run(&["diff", "--cached", "--name-only", "--", "."])?;
        if String::from_utf8_lossy(&staged.stdout).trim().is_empty() {
            debug!("no staged changes, skipping commit");
            return Ok(false);
        }
        debug!("committing staged changes");
        self.run_checked(&["commit", "-m", message])?;
        Ok(true)
    }

    #[instrument(skip_all, fields(remote, branch))]
    fn push(&self, remote: &str, branch: &str) -> Result<(), GitError> {
        info!(remote, branch, "pushing");
        let out = self.run(&["push", "-u", remote, branch])?;
        if !out.status.success() {
            return Err(GitError::Push {
                branch: branch.to_string(),
                remote: remote.to_string(),
                message: stderr_of(&out),
            });
        }
        Ok(())
    }

    fn rev_parse(&self, reference: &str) -> Result<String, GitError> {
        let out = self.run_capture(&["rev-parse", "--verify", reference])?;
        Ok(out.trim().to_string())
    }

    #[instrument(skip_all, fields(base, branch))]
    fn merge_into(&self, base: &str, branch: &str) -> Result<(), GitError> {
        self.checkout(base)?;
        let message = format!("Merge branch '{branch}' into {base}");
        let out = self.run(&["merge", "--no-ff", "-m", &message, branch])?;
        if out.status.success() {
            info!(base, branch, "merged");
            return Ok(());
        }
        warn!(base, branch, stderr = %stderr_of(&out), "merge failed, aborting");
        if let Err(err) = self.run_checked(&["merge", "--abort"]) {
            warn!(err = %err, "merge --abort failed");
        }
        if let Err(err) = self.checkout(branch) {
            warn!(err = %err, "could not return to item branch");
        }
        Err(GitError::MergeConflict {
            branch: branch.to_string(),
            base: base.to_string(),
        })
    }

    #[instrument(skip_all, fields(remote, branch))]
    fn preflight(
        &self,
        remote: &str,
        remote_url_contains: Option<&str>,
        branch: &str,
    ) -> Result<(), GitError> {
        let url = self.remote_url(remote)?;
        if let Some(expected) = remote_url_contains
            && !url.contains(expected)
        {
            return Err(GitError::RemoteMismatch {
                remote: remote.to_string(),
                expected: expected.to_string(),
                actual: url,
            });
        }
        let current = self.current_branch()?;
        if current != branch {
            return Err(GitError::Preflight(format!(
                "expected branch {branch} to be checked out, found {current}"
            )));
        }
        let status = self.status_short()?;
        if !status.trim().is_empty() {
            let mut msg = String::from("working tree not clean:\n");
            msg.push_str(status.trim_end());
            return Err(GitError::Preflight(msg));
        }
        debug!("preflight passed");
        Ok(())
    }
}

/// Porcelain paths are relative to the repository top-level; rebase them onto the
/// subdirectory `prefix` (as printed by `rev-parse --show-prefix`).
fn relative_to_prefix(status: &str, prefix: &str) -> String {
    if prefix.is_empty() {
        return status.to_string();
    }
    let strip = |path: &str| -> String {
        match path.strip_prefix('"') {
            Some(quoted) => format!("\"{}", quoted.strip_prefix(prefix).unwrap_or(quoted)),
            None => path.strip_prefix(prefix).unwrap_or(path).to_string(),
        }
    };
    let mut out = String::with_capacity(status.len());
    for line in status.lines() {
        match (line.get(..3), line.get(3..)) {
            (Some(code), Some(rest)) => {
                out.push_str(code);
                match rest.split_once(" -> ") {
                    Some((from, to)) => {
                        out.push_str(&strip(from));
                        out.push_str(" -> ");
                        out.push_str(&strip(to));
                    }
                    None => out.push_str(&strip(rest)),
                }
            }
            _ => out.push_str(line),
        }
        out.push('\n');
    }
    out
}

fn stderr_of(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).trim().to_string()
}
