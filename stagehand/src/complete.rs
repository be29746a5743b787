//! Complete phase: `in_pr` -> `done` once the pull request is merged.

use anyhow::Result;
use tracing::{info, info_span};

use crate::error::PhaseError;
use crate::io::host::PullRequestState;
use crate::item::{Item, WorkflowState};
use crate::phase::{ExecutionContext, Phase, PhaseResult, fail, require_state};

pub fn run_complete(ctx: &ExecutionContext<'_>, item_id: &str) -> Result<PhaseResult> {
    let item = ctx.load_item(item_id)?;
    let _span = info_span!("phase", phase = %Phase::Complete, item = %item.id).entered();
    Ok(match complete(ctx, &item) {
        Ok(next) => PhaseResult::ok(next),
        Err(err) => fail(item, err),
    })
}

fn complete(ctx: &ExecutionContext<'_>, item: &Item) -> Result<Item, PhaseError> {
    require_state(item, Phase::Complete, &[WorkflowState::InPr])?;

    let branch = ctx.branch_for(item);
    let merged = ctx
        .host
        .find_request(&branch)?
        .is_some_and(|request| request.state == PullRequestState::Merged);
    if !merged {
        return Err(PhaseError::NotMerged { branch });
    }
    if ctx.dry_run {
        info!("dry run: request merged, not marking done");
        return Ok(item.clone());
    }
    ctx.advance(item)
}
