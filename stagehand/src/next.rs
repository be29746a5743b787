//! Run whichever phase the item's current state calls for.

use anyhow::Result;
use tracing::info;

use crate::complete::run_complete;
use crate::implement::run_implement;
use crate::item::WorkflowState;
use crate::phase::{ExecutionContext, PhaseResult};
use crate::plan::run_plan;
use crate::pr::run_pr;
use crate::research::run_research;

/// Advance `item_id` by one phase.
///
/// `planned` and `implementing` items run the implement loop and, once every story is
/// done, the PR phase in the same call. `done` items are returned unchanged.
pub fn run_next(ctx: &ExecutionContext<'_>, item_id: &str) -> Result<PhaseResult> {
    let item = ctx.load_item(item_id)?;
    match item.state {
        WorkflowState::Idea => run_research(ctx, item_id),
        WorkflowState::Researched => run_plan(ctx, item_id),
        WorkflowState::Planned | WorkflowState::Implementing => {
            let implemented = run_implement(ctx, item_id)?;
            if !implemented.success() || ctx.dry_run {
                return Ok(implemented);
            }
            run_pr(ctx, item_id)
        }
        WorkflowState::InPr => run_complete(ctx, item_id),
        WorkflowState::Done => {
            info!(item = %item.id, "item already done");
            Ok(PhaseResult::ok(item))
        }
    }
}
