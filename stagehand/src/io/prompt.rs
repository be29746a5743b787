//! Phase prompts and PR descriptions rendered from embedded templates.

use anyhow::{Context, Result};
use minijinja::{Environment, context};

use crate::core::quality::QualityConfig;
use crate::io::paths::{ItemPaths, PLAN_FILE, PRD_FILE, RESEARCH_FILE};
use crate::item::Item;
use crate::prd::{Prd, Story};

const RESEARCH_TEMPLATE: &str = include_str!("prompts/research.md");
const PLAN_TEMPLATE: &str = include_str!("prompts/plan.md");
const IMPLEMENT_TEMPLATE: &str = include_str!("prompts/implement.md");
const PR_BODY_TEMPLATE: &str = include_str!("prompts/pr_body.md");

/// Inputs shared by every phase prompt.
#[derive(Debug, Clone, Copy)]
pub struct PromptInputs<'a> {
    pub item: &'a Item,
    pub paths: &'a ItemPaths,
    pub branch: &'a str,
    pub quality: &'a QualityConfig,
    pub completion_signal: &'a str,
    /// Contents of `response.md`, when a human answered the agent.
    pub response: Option<&'a str>,
}

/// Template engine wrapper around minijinja.
pub struct PromptEngine {
    env: Environment<'static>,
}

impl PromptEngine {
    pub fn new() -> Result<Self> {
        let mut env = Environment::new();
        for (name, source) in [
            ("research", RESEARCH_TEMPLATE),
            ("plan", PLAN_TEMPLATE),
            ("implement", IMPLEMENT_TEMPLATE),
            ("pr_body", PR_BODY_TEMPLATE),
        ] {
            env.add_template(name, source)
                .with_context(|| format!("load {name} template"))?;
        }
        Ok(Self { env })
    }

    pub fn research(&self, input: &PromptInputs<'_>) -> Result<String> {
        let research = &input.quality.research;
        self.render(
            "research",
            context! {
                item => input.item,
                research_path => input.paths.rel(RESEARCH_FILE),
                required_sections => &research.required_sections,
                min_citations => research.min_citations,
                completion_signal => input.completion_signal,
                response => trimmed(input.response),
            },
        )
    }

    pub fn plan(&self, input: &PromptInputs<'_>) -> Result<String> {
        let stories = &input.quality.stories;
        self.render(
            "plan",
            context! {
                item => input.item,
                branch => input.branch,
                research_path => input.paths.rel(RESEARCH_FILE),
                plan_path => input.paths.rel(PLAN_FILE),
                prd_path => input.paths.rel(PRD_FILE),
                required_sections => &input.quality.plan.required_sections,
                priority_min => stories.priority_min,
                priority_max => stories.priority_max,
                min_acceptance_criteria => stories.min_acceptance_criteria,
                completion_signal => input.completion_signal,
                response => trimmed(input.response),
            },
        )
    }

    /// Implement prompt listing pending stories by priority.
    pub fn implement(&self, input: &PromptInputs<'_>, prd: &Prd) -> Result<String> {
        let mut stories: Vec<&Story> = prd.pending().collect();
        stories.sort_by_key(|story| story.priority);
        self.render(
            "implement",
            context! {
                item => input.item,
                branch => input.branch,
                plan_path => input.paths.rel(PLAN_FILE),
                prd_path => input.paths.rel(PRD_FILE),
                agent_state_path => input.paths.rel("agent_state.json"),
                stories => stories,
                completion_signal => input.completion_signal,
                response => trimmed(input.response),
            },
        )
    }

    pub fn pr_body(&self, item: &Item, paths: &ItemPaths, prd: &Prd) -> Result<String> {
        self.render(
            "pr_body",
            context! {
                item => item,
                stories => &prd.user_stories,
                plan_path => paths.rel(PLAN_FILE),
            },
        )
    }

    fn render(&self, name: &str, ctx: minijinja::Value) -> Result<String> {
        let template = self.env.get_template(name)?;
        template
            .render(ctx)
            .with_context(|| format!("render {name} template"))
    }
}

/// PR title for an item.
pub fn pr_title(item: &Item) -> String {
    format!("{}: {}", item.id, item.title)
}

fn trimmed(text: Option<&str>) -> Option<&str> {
    text.map(str::trim).filter(|s| !s.is_empty())
}
