//! Story (requirements document) quality gate.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::prd::{Prd, Story};

static STORY_ID_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^US-\d{3}$").expect("story id regex should compile"));

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoryQualityOptions {
    pub min_stories: usize,
    pub max_stories: usize,
    pub min_acceptance_criteria: usize,
    pub priority_min: i64,
    pub priority_max: i64,
    pub require_story_id_format: bool,
}

impl Default for StoryQualityOptions {
    fn default() -> Self {
        Self {
            min_stories: 1,
            max_stories: 15,
            min_acceptance_criteria: 2,
            priority_min: 1,
            priority_max: 4,
            require_story_id_format: true,
        }
    }
}

/// Errors for a single failing story.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoryErrors {
    pub story_id: String,
    pub title: String,
    pub errors: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoryQualityResult {
    pub valid: bool,
    pub story_count: usize,
    /// Flat list; per-story entries are prefixed with the story id and title.
    pub errors: Vec<String>,
    pub story_errors: Vec<StoryErrors>,
}

pub fn validate_story_quality(prd: &Prd, options: &StoryQualityOptions) -> StoryQualityResult {
    let story_count = prd.user_stories.len();
    let mut errors = Vec::new();

    if story_count < options.min_stories {
        errors.push(format!(
            "found {story_count} stories, need at least {}",
            options.min_stories
        ));
    }
    if story_count > options.max_stories {
        errors.push(format!(
            "found {story_count} stories, at most {} allowed",
            options.max_stories
        ));
    }

    let mut story_errors = Vec::new();
    for story in &prd.user_stories {
        let problems = check_story(story, options);
        if problems.is_empty() {
            continue;
        }
        for problem in &problems {
            errors.push(format!("Story {} ({}): {problem}", story.id, story.title));
        }
        story_errors.push(StoryErrors {
            story_id: story.id.clone(),
            title: story.title.clone(),
            errors: problems,
        });
    }

    StoryQualityResult {
        valid: errors.is_empty(),
        story_count,
        errors,
        story_errors,
    }
}

fn check_story(story: &Story, options: &StoryQualityOptions) -> Vec<String> {
    let mut problems = Vec::new();

    if options.require_story_id_format && !STORY_ID_RE.is_match(&story.id) {
        problems.push(format!("id '{}' does not match US-###", story.id));
    }
    if story.title.trim().is_empty() {
        problems.push("title is empty".to_string());
    }
    if story.priority < options.priority_min || story.priority > options.priority_max {
        problems.push(format!(
            "priority {} is outside {}..={}",
            story.priority, options.priority_min, options.priority_max
        ));
    }
    if story.acceptance_criteria.len() < options.min_acceptance_criteria {
        problems.push(format!(
            "has {} acceptance criteria, need at least {}",
            story.acceptance_criteria.len(),
            options.min_acceptance_criteria
        ));
    }
    let blank = story
        .acceptance_criteria
        .iter()
        .filter(|criterion| criterion.trim().is_empty())
        .count();
    if blank > 0 {
        problems.push(format!("has {blank} blank acceptance criteria"));
    }

    problems
}
