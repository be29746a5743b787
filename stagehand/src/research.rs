//! Research phase: `idea` -> `researched`.

use std::fs;

use anyhow::Result;
use tracing::{info, info_span};

use crate::core::quality::research::validate_research_quality;
use crate::error::PhaseError;
use crate::io::paths::RESEARCH_FILE;
use crate::item::{Item, WorkflowState};
use crate::phase::{
    AGENT_STATE_FILE, DOCUMENT_TOOLS, ExecutionContext, Phase, PhaseResult, fail, require_state,
};

/// Run the research agent once and accept its document if it passes the quality gate.
pub fn run_research(ctx: &ExecutionContext<'_>, item_id: &str) -> Result<PhaseResult> {
    let item = ctx.load_item(item_id)?;
    let _span = info_span!("phase", phase = %Phase::Research, item = %item.id).entered();
    Ok(match research(ctx, &item) {
        Ok(next) => PhaseResult::ok(next),
        Err(err) => fail(item, err),
    })
}

fn research(ctx: &ExecutionContext<'_>, item: &Item) -> Result<Item, PhaseError> {
    require_state(item, Phase::Research, &[WorkflowState::Idea])?;
    if ctx.dry_run {
        info!("dry run: skipping research agent");
        return Ok(item.clone());
    }

    let paths = ctx.item_paths(item);
    let baseline = ctx.containment_baseline()?;
    let branch = ctx.branch_for(item);
    let response = ctx.read_response(&paths);
    let prompt = ctx
        .prompts
        .research(&ctx.prompt_inputs(item, &paths, &branch, response.as_deref()))
        .map_err(|err| PhaseError::storage(&err))?;

    ctx.run_agent(item, &prompt, DOCUMENT_TOOLS, None)?;

    if !paths.research_path.is_file() {
        return Err(PhaseError::ArtifactNotCreated {
            phase: Phase::Research,
            path: paths.rel(RESEARCH_FILE),
        });
    }
    let content = fs::read_to_string(&paths.research_path).map_err(|err| {
        PhaseError::InvalidArtifact {
            path: paths.rel(RESEARCH_FILE),
            reason: err.to_string(),
        }
    })?;
    let quality = validate_research_quality(&content, &ctx.config.quality.research);
    if !quality.valid {
        return Err(PhaseError::ResearchQuality {
            errors: quality.errors,
        });
    }
    info!(
        citations = quality.citations,
        summary_length = quality.summary_length,
        "research accepted"
    );

    ctx.enforce_containment(
        Phase::Research,
        baseline.as_deref(),
        &[paths.rel(RESEARCH_FILE), paths.rel(AGENT_STATE_FILE)],
    )?;

    ctx.advance(item)
}
