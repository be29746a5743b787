//! PR phase: `implementing` -> `in_pr`, or straight to `done` for a direct merge.

use anyhow::Result;
use tracing::{info, info_span, warn};

use crate::core::workflow::{ValidationContext, apply_state_transition};
use crate::error::PhaseError;
use crate::io::config::MergeMode;
use crate::io::context::build_validation_context;
use crate::io::host::PullRequestSpec;
use crate::io::paths::PRD_FILE;
use crate::io::prompt::pr_title;
use crate::io::store::load_prd;
use crate::item::{Item, WorkflowState};
use crate::phase::{ExecutionContext, Phase, PhaseResult, fail, require_state};
use crate::prd::Prd;

pub fn run_pr(ctx: &ExecutionContext<'_>, item_id: &str) -> Result<PhaseResult> {
    let mut item = ctx.load_item(item_id)?;
    let _span = info_span!("phase", phase = %Phase::Pr, item = %item.id).entered();
    Ok(match pr(ctx, &mut item) {
        Ok(()) => PhaseResult::ok(item),
        Err(err) => fail(item, err),
    })
}

fn pr(ctx: &ExecutionContext<'_>, item: &mut Item) -> Result<(), PhaseError> {
    require_state(item, Phase::Pr, &[WorkflowState::Implementing])?;

    let paths = ctx.item_paths(item);
    let prd = load_prd(&paths.prd_path).map_err(|err| PhaseError::InvalidArtifact {
        path: paths.rel(PRD_FILE),
        reason: format!("{err:#}"),
    })?;
    if !prd.all_done() {
        return Err(PhaseError::NotAllStoriesDone {
            pending: prd.pending().map(|story| story.id.clone()).collect(),
        });
    }
    if ctx.config.merge_mode == MergeMode::Direct && !ctx.config.allow_unsafe_direct_merge {
        return Err(PhaseError::DirectMergeNotAllowed);
    }
    if ctx.dry_run {
        info!(mode = ?ctx.config.merge_mode, "dry run: skipping push and merge");
        return Ok(());
    }

    let branch = ctx.branch_for(item);
    ctx.vcs.ensure_branch(&branch, &ctx.config.base_branch)?;
    if item.branch.as_deref() != Some(branch.as_str()) {
        item.branch = Some(branch.clone());
        ctx.save(item)?;
    }

    // Commit before preflight: the agent's own edits must not fail the clean-tree check.
    if ctx.vcs.has_uncommitted_changes()?
        && ctx
            .vcs
            .commit_all(&format!("{}: commit pending changes", item.id))?
    {
        info!(branch = %branch, "committed pending changes");
    }
    ctx.vcs.preflight(
        &ctx.config.remote,
        ctx.config.remote_url_contains.as_deref(),
        &branch,
    )?;

    match ctx.config.merge_mode {
        MergeMode::Pr => open_request(ctx, item, &branch, &prd),
        MergeMode::Direct => merge_directly(ctx, item, &branch),
    }
}

fn open_request(
    ctx: &ExecutionContext<'_>,
    item: &mut Item,
    branch: &str,
    prd: &Prd,
) -> Result<(), PhaseError> {
    ctx.vcs.push(&ctx.config.remote, branch)?;

    let paths = ctx.item_paths(item);
    let body = ctx
        .prompts
        .pr_body(item, &paths, prd)
        .map_err(|err| PhaseError::storage(&err))?;
    let request = ctx.host.create_or_update(&PullRequestSpec {
        branch: branch.to_string(),
        base: ctx.config.base_branch.clone(),
        title: pr_title(item),
        body,
    })?;
    info!(number = request.number, url = %request.url, "pull request ready");

    let mut next = item.clone();
    next.pr_url = Some(request.url);
    next.pr_number = Some(request.number);
    *item = ctx.advance(&next)?;
    commit_delivered_state(ctx, &format!("{}: open pull request", item.id), branch)
}

/// Commit the saved item.json and push it. The delivery already happened, so a
/// failed push only leaves the bookkeeping commit local.
fn commit_delivered_state(
    ctx: &ExecutionContext<'_>,
    message: &str,
    branch: &str,
) -> Result<(), PhaseError> {
    ctx.vcs.commit_all(message)?;
    if let Err(err) = ctx.vcs.push(&ctx.config.remote, branch) {
        warn!(branch, err = %err, "state commit not pushed");
    }
    Ok(())
}

/// Merge into the base branch without review, recording a rollback anchor first.
///
/// A failure after the anchor is saved leaves it on the item for manual recovery.
fn merge_directly(
    ctx: &ExecutionContext<'_>,
    item: &mut Item,
    branch: &str,
) -> Result<(), PhaseError> {
    let base = &ctx.config.base_branch;
    warn!(
        branch,
        base = %base,
        "DIRECT MERGE: merging into {base} without review (allow_unsafe_direct_merge = true)"
    );

    let anchor = ctx.vcs.rev_parse(base)?;
    let mut anchored = item.clone();
    anchored.rollback_sha = Some(anchor.clone());
    ctx.save(&anchored)?;
    *item = anchored;
    warn!(rollback_sha = %anchor, "rollback anchor recorded");

    // The anchor save dirties item.json, which would block checking out the base branch.
    ctx.vcs
        .commit_all(&format!("{}: record rollback anchor", item.id))?;
    ctx.vcs.merge_into(base, branch)?;
    ctx.vcs.push(&ctx.config.remote, base)?;

    // A direct merge stands in for an opened and merged request.
    let merged = ValidationContext {
        has_pr: true,
        pr_merged: true,
        ..build_validation_context(&ctx.paths, item, ctx.host)
    };
    let in_pr = apply_state_transition(item, &merged)?;
    let mut done = apply_state_transition(&in_pr, &merged)?;
    done.last_error = None;
    ctx.save(&done)?;
    info!(rollback_sha = %anchor, "item merged directly and marked done");
    *item = done;
    commit_delivered_state(ctx, &format!("{}: mark done", item.id), base)
}
