//! Plan phase: `researched` -> `planned`.
//!
//! The agent must produce both `plan.md` and a schema-valid `prd.json`, and may not
//! write anywhere else.

use std::fs;

use anyhow::Result;
use tracing::{info, info_span};

use crate::core::quality::plan::validate_plan_quality;
use crate::core::quality::story::validate_story_quality;
use crate::error::PhaseError;
use crate::io::paths::{ItemPaths, PLAN_FILE, PRD_FILE};
use crate::io::store::load_prd;
use crate::item::{Item, WorkflowState};
use crate::phase::{
    AGENT_STATE_FILE, DOCUMENT_TOOLS, ExecutionContext, Phase, PhaseResult, fail, require_state,
};

pub fn run_plan(ctx: &ExecutionContext<'_>, item_id: &str) -> Result<PhaseResult> {
    let item = ctx.load_item(item_id)?;
    let _span = info_span!("phase", phase = %Phase::Plan, item = %item.id).entered();
    Ok(match plan(ctx, &item) {
        Ok(next) => PhaseResult::ok(next),
        Err(err) => fail(item, err),
    })
}

fn plan(ctx: &ExecutionContext<'_>, item: &Item) -> Result<Item, PhaseError> {
    require_state(item, Phase::Plan, &[WorkflowState::Researched])?;
    if ctx.dry_run {
        info!("dry run: skipping plan agent");
        return Ok(item.clone());
    }

    let paths = ctx.item_paths(item);
    let baseline = ctx.containment_baseline()?;
    let branch = ctx.branch_for(item);
    let response = ctx.read_response(&paths);
    let prompt = ctx
        .prompts
        .plan(&ctx.prompt_inputs(item, &paths, &branch, response.as_deref()))
        .map_err(|err| PhaseError::storage(&err))?;

    ctx.run_agent(item, &prompt, DOCUMENT_TOOLS, None)?;

    check_artifacts(ctx, &paths)?;

    ctx.enforce_containment(
        Phase::Plan,
        baseline.as_deref(),
        &[
            paths.rel(PLAN_FILE),
            paths.rel(PRD_FILE),
            paths.rel(AGENT_STATE_FILE),
        ],
    )?;

    ctx.advance(item)
}

/// Both artifacts exist and pass their quality gates.
fn check_artifacts(ctx: &ExecutionContext<'_>, paths: &ItemPaths) -> Result<(), PhaseError> {
    for (path, file) in [(&paths.plan_path, PLAN_FILE), (&paths.prd_path, PRD_FILE)] {
        if !path.is_file() {
            return Err(PhaseError::ArtifactNotCreated {
                phase: Phase::Plan,
                path: paths.rel(file),
            });
        }
    }

    let content = fs::read_to_string(&paths.plan_path).map_err(|err| {
        PhaseError::InvalidArtifact {
            path: paths.rel(PLAN_FILE),
            reason: err.to_string(),
        }
    })?;
    let plan = validate_plan_quality(&content, &ctx.config.quality.plan);
    if !plan.valid {
        return Err(PhaseError::PlanQuality {
            errors: plan.errors,
        });
    }

    let prd = load_prd(&paths.prd_path).map_err(|err| PhaseError::InvalidArtifact {
        path: paths.rel(PRD_FILE),
        reason: format!("{err:#}"),
    })?;
    let stories = validate_story_quality(&prd, &ctx.config.quality.stories);
    if !stories.valid {
        return Err(PhaseError::StoryQuality {
            errors: stories.errors,
        });
    }

    info!(
        phases = plan.phases,
        stories = stories.story_count,
        "plan accepted"
    );
    Ok(())
}
