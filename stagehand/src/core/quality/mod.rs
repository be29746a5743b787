//! Quality gates for agent-produced artifacts and submitted payloads.
//!
//! Every validator is a pure function of `(content, options) -> result`. Failure is
//! reported through the result's `valid`/`errors` fields, never by panicking.

pub mod markdown;
pub mod payload;
pub mod plan;
pub mod research;
pub mod story;

use serde::{Deserialize, Serialize};

pub use payload::{
    IdeaPayload, PayloadLimits, PayloadValidationError, PayloadValidationResult,
    assert_payload_limits, validate_payload_limits,
};
pub use plan::{PlanQualityOptions, PlanQualityResult, validate_plan_quality};
pub use research::{ResearchQualityOptions, ResearchQualityResult, validate_research_quality};
pub use story::{StoryErrors, StoryQualityOptions, StoryQualityResult, validate_story_quality};

/// All gate thresholds (`[quality.*]` in config.toml).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QualityConfig {
    pub research: ResearchQualityOptions,
    pub plan: PlanQualityOptions,
    pub stories: StoryQualityOptions,
    pub payload: PayloadLimits,
}

/// Render gate errors as a `- ` bulleted list, one per line.
pub(crate) fn bullets(errors: &[String]) -> String {
    errors
        .iter()
        .map(|error| format!("- {error}"))
        .collect::<Vec<_>>()
        .join("\n")
}
