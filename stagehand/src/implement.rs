//! Implement phase: `planned` -> `implementing`, then iterate until every story is done.
//!
//! The phase is re-entrant. Story progress written by the agent is committed after
//! every iteration and is never rolled back, so a retry continues where the last call
//! stopped. Reaching "all stories done" does not transition the item; entering
//! `in_pr` belongs to the PR phase.

use std::fs;
use std::time::Instant;

use anyhow::Result;
use chrono::Utc;
use tracing::{debug, info, info_span, warn};

use crate::core::containment::{evaluate_containment, is_within};
use crate::core::limits::LimitsTracker;
use crate::core::workflow::can_enter_implementing;
use crate::error::PhaseError;
use crate::io::backend::AgentStatus;
use crate::io::containment::ContainmentChecker;
use crate::io::context::build_validation_context;
use crate::io::iteration_log::{IterationMeta, IterationPaths, write_iteration};
use crate::io::paths::{ItemPaths, PRD_FILE, STATE_DIR};
use crate::io::store::load_prd;
use crate::item::{Item, WorkflowState};
use crate::phase::{ExecutionContext, IMPLEMENT_TOOLS, Phase, PhaseResult, fail, require_state};
use crate::prd::Prd;

pub fn run_implement(ctx: &ExecutionContext<'_>, item_id: &str) -> Result<PhaseResult> {
    let mut item = ctx.load_item(item_id)?;
    let _span = info_span!("phase", phase = %Phase::Implement, item = %item.id).entered();
    Ok(match implement(ctx, &mut item) {
        Ok(()) => PhaseResult::ok(item),
        Err(err) => fail(item, err),
    })
}

/// `item` always mirrors the last persisted value, including on error.
fn implement(ctx: &ExecutionContext<'_>, item: &mut Item) -> Result<(), PhaseError> {
    require_state(
        item,
        Phase::Implement,
        &[WorkflowState::Planned, WorkflowState::Implementing],
    )?;

    let validation = build_validation_context(&ctx.paths, item, ctx.host);
    let already_done = validation.prd.as_ref().is_some_and(Prd::all_done);
    if item.state == WorkflowState::Implementing && already_done {
        info!("all stories already done");
        return Ok(());
    }
    can_enter_implementing(&validation).map_err(|reason| PhaseError::PhaseValidation {
        phase: Phase::Implement,
        reason,
    })?;
    if ctx.dry_run {
        info!("dry run: skipping implement loop");
        return Ok(());
    }

    let branch = ctx.branch_for(item);
    ctx.vcs.ensure_branch(&branch, &ctx.config.base_branch)?;
    if item.branch.as_deref() != Some(branch.as_str()) {
        item.branch = Some(branch.clone());
        ctx.save(item)?;
    }
    if item.state == WorkflowState::Planned {
        *item = ctx.advance(item)?;
    }

    iterate(ctx, item, &branch)
}

fn iterate(ctx: &ExecutionContext<'_>, item: &Item, branch: &str) -> Result<(), PhaseError> {
    let paths = ctx.item_paths(item);
    let checker = ContainmentChecker::new(ctx.vcs);
    let mut tracker = LimitsTracker::new(ctx.config.limits.clone());
    let mut iteration = next_iteration_number(&paths);

    loop {
        let before_prd = read_prd(&paths)?;
        if before_prd.all_done() {
            info!(iterations = tracker.context().iterations, "all stories done");
            return Ok(());
        }

        let iter_paths = IterationPaths::new(&paths, iteration);
        let baseline = checker.snapshot()?;
        let response = ctx.read_response(&paths);
        let prompt = ctx
            .prompts
            .implement(
                &ctx.prompt_inputs(item, &paths, branch, response.as_deref()),
                &before_prd,
            )
            .map_err(|err| PhaseError::storage(&err))?;

        info!(
            iteration,
            pending = before_prd.pending().count(),
            "starting iteration"
        );
        let started_at = Utc::now();
        let started = Instant::now();
        let output = ctx.run_agent(
            item,
            &prompt,
            IMPLEMENT_TOOLS,
            Some(&iter_paths.agent_log_path),
        )?;
        let duration_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

        let state = ctx
            .backend
            .read_state(&item.id)
            .map_err(|err| PhaseError::storage(&err))?;
        let after_prd = read_prd(&paths)?;
        let stories_completed = after_prd.newly_done_since(&before_prd);
        let changed_paths: Vec<String> = evaluate_containment(&baseline, &checker.snapshot()?, &[])
            .all_changes
            .into_iter()
            .map(|change| change.path)
            .collect();
        warn_on_foreign_state_changes(&paths, &changed_paths);

        let meta = IterationMeta {
            item_id: item.id.clone(),
            iteration,
            started_at,
            ended_at: Utc::now(),
            duration_ms,
            success: output.result.success,
            exit_code: output.result.exit_code,
            timed_out: output.result.timed_out,
            completion_detected: output.result.completion_detected,
            agent_status: state.status,
            progress_steps: output.progress_steps(),
            stories_completed: stories_completed.clone(),
            changed_paths,
        };
        write_iteration(&iter_paths, &meta, &output.result.stderr)
            .map_err(|err| PhaseError::storage(&err))?;

        if ctx
            .vcs
            .commit_all(&format!("{}: implement iteration {iteration}", item.id))?
        {
            debug!(iteration, "committed iteration changes");
        }
        tracker.record_iteration(meta.progress_steps, output.result.cost_usd);
        info!(
            iteration,
            completed = ?stories_completed,
            remaining = after_prd.pending().count(),
            "iteration finished"
        );

        let payload = state.payload.unwrap_or_default();
        match state.status {
            AgentStatus::NeedsInput => return Err(PhaseError::NeedsInput(payload)),
            AgentStatus::Blocked => return Err(PhaseError::Blocked(payload)),
            AgentStatus::Done if after_prd.has_pending() => {
                warn!(iteration, "agent reported done with stories still pending");
            }
            AgentStatus::Done | AgentStatus::Continue => {}
        }

        if after_prd.all_done() {
            info!(iterations = tracker.context().iterations, "all stories done");
            return Ok(());
        }
        if ctx.mock_agent {
            tracker.check_iterations_only()?;
        } else {
            tracker.check()?;
        }
        iteration += 1;
    }
}

fn read_prd(paths: &ItemPaths) -> Result<Prd, PhaseError> {
    load_prd(&paths.prd_path).map_err(|err| PhaseError::InvalidArtifact {
        path: paths.rel(PRD_FILE),
        reason: format!("{err:#}"),
    })
}

/// Iteration numbers keep counting across phase calls so logs are never overwritten.
fn next_iteration_number(paths: &ItemPaths) -> u32 {
    let Ok(entries) = fs::read_dir(&paths.iterations_dir) else {
        return 1;
    };
    entries
        .filter_map(|entry| entry.ok())
        .filter_map(|entry| entry.file_name().to_str()?.parse::<u32>().ok())
        .max()
        .map_or(1, |last| last + 1)
}

/// Changed paths under `.stagehand/` outside this item's directory.
fn foreign_state_paths<'a>(paths: &ItemPaths, changed: &'a [String]) -> Vec<&'a str> {
    let own_dir = paths.rel_dir();
    changed
        .iter()
        .map(String::as_str)
        .filter(|path| is_within(path, STATE_DIR) && !is_within(path, &own_dir))
        .collect()
}

/// Implementation work may touch the wider repository, but not other stagehand state.
fn warn_on_foreign_state_changes(paths: &ItemPaths, changed: &[String]) {
    let foreign = foreign_state_paths(paths, changed);
    if !foreign.is_empty() {
        warn!(
            item = %paths.id,
            paths = ?foreign,
            "implement iteration modified stagehand state outside the item directory"
        );
    }
}
