//! Workflow state machine.
//!
//! Items move through `idea -> researched -> planned -> implementing -> in_pr -> done`
//! one edge at a time. Each edge has a guard that consults a [`ValidationContext`]
//! of read-only facts gathered from the filesystem and the pull-request host.
//! Everything here is pure: callers gather the facts, this module decides.

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::item::{Item, WorkflowState};
use crate::prd::Prd;

/// Facts consulted by transition guards. Rebuilt before every transition attempt.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationContext {
    pub has_research: bool,
    pub has_plan: bool,
    pub prd: Option<Prd>,
    /// An open (or already merged) pull request exists for the item branch.
    pub has_pr: bool,
    pub pr_merged: bool,
}

/// Rejected transition, with the guard's reason verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("cannot transition from {from} to {to}: {reason}")]
pub struct TransitionError {
    pub from: WorkflowState,
    pub to: WorkflowState,
    pub reason: String,
}

/// Return the single successor of `state`, or `None` for `done`.
pub fn next_state(state: WorkflowState) -> Option<WorkflowState> {
    WorkflowState::ALL.get(state.index() + 1).copied()
}

/// Validate `from -> to` against the transition table and the edge guard.
pub fn validate_transition(
    from: WorkflowState,
    to: WorkflowState,
    ctx: &ValidationContext,
) -> Result<(), TransitionError> {
    let reject = |reason: String| TransitionError { from, to, reason };

    match next_state(from) {
        None => {
            return Err(reject(format!("{from} is terminal")));
        }
        Some(expected) if expected != to => {
            return Err(reject(format!("only {from} -> {expected} is allowed")));
        }
        Some(_) => {}
    }

    let guard = match to {
        WorkflowState::Researched => can_enter_researched(ctx),
        WorkflowState::Planned => can_enter_planned(ctx),
        WorkflowState::Implementing => can_enter_implementing(ctx),
        WorkflowState::InPr => can_enter_in_pr(ctx),
        WorkflowState::Done => can_enter_done(ctx),
        WorkflowState::Idea => Err("idea has no predecessor".to_string()),
    };
    guard.map_err(reject)
}

pub fn can_enter_researched(ctx: &ValidationContext) -> Result<(), String> {
    if !ctx.has_research {
        return Err("research.md does not exist".to_string());
    }
    Ok(())
}

pub fn can_enter_planned(ctx: &ValidationContext) -> Result<(), String> {
    if !ctx.has_plan {
        return Err("plan.md does not exist".to_string());
    }
    if ctx.prd.is_none() {
        return Err("prd.json does not exist or is invalid".to_string());
    }
    Ok(())
}

/// Entry into `implementing`, also used for re-entry while the implement loop runs.
pub fn can_enter_implementing(ctx: &ValidationContext) -> Result<(), String> {
    let Some(prd) = &ctx.prd else {
        return Err("prd.json does not exist or is invalid".to_string());
    };
    if !prd.has_pending() {
        return Err("prd.json has no pending stories".to_string());
    }
    Ok(())
}

pub fn can_enter_in_pr(ctx: &ValidationContext) -> Result<(), String> {
    let Some(prd) = &ctx.prd else {
        return Err("prd.json does not exist or is invalid".to_string());
    };
    if !prd.all_done() {
        let pending: Vec<&str> = prd.pending().map(|story| story.id.as_str()).collect();
        return Err(format!("not all stories done (pending: {})", pending.join(", ")));
    }
    if !ctx.has_pr {
        return Err("no open pull request".to_string());
    }
    Ok(())
}

pub fn can_enter_done(ctx: &ValidationContext) -> Result<(), String> {
    if !ctx.pr_merged {
        return Err("pull request is not merged".to_string());
    }
    Ok(())
}

/// Compute the advanced item without touching `item`.
pub fn apply_state_transition(
    item: &Item,
    ctx: &ValidationContext,
) -> Result<Item, TransitionError> {
    apply_state_transition_at(item, ctx, Utc::now())
}

/// [`apply_state_transition`] with an explicit clock.
pub fn apply_state_transition_at(
    item: &Item,
    ctx: &ValidationContext,
    now: DateTime<Utc>,
) -> Result<Item, TransitionError> {
    let Some(to) = next_state(item.state) else {
        return Err(TransitionError {
            from: item.state,
            to: item.state,
            reason: format!("{} is terminal", item.state),
        });
    };
    validate_transition(item.state, to, ctx)?;

    let mut next = item.clone();
    next.state = to;
    next.updated_at = now;
    Ok(next)
}
