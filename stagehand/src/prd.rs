//! Requirements document (`prd.json`) produced by planning.

use serde::{Deserialize, Serialize};

/// Completion status of a story. Flipped by the agent during implementation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoryStatus {
    #[default]
    Pending,
    Done,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Story {
    /// `US-###`.
    pub id: String,
    pub title: String,
    pub acceptance_criteria: Vec<String>,
    pub priority: i64,
    #[serde(default)]
    pub status: StoryStatus,
    #[serde(default)]
    pub notes: String,
}

impl Story {
    pub fn is_done(&self) -> bool {
        self.status == StoryStatus::Done
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Prd {
    /// Owning item id.
    pub id: String,
    pub branch_name: String,
    pub user_stories: Vec<Story>,
}

impl Prd {
    pub fn pending(&self) -> impl Iterator<Item = &Story> {
        self.user_stories.iter().filter(|story| !story.is_done())
    }

    pub fn has_pending(&self) -> bool {
        self.pending().next().is_some()
    }

    /// True when every story is done. An empty list counts as done.
    pub fn all_done(&self) -> bool {
        !self.has_pending()
    }

    /// Ids of stories that are done in `self` but were pending in `before`.
    ///
    /// Result follows the story order of `self`.
    pub fn newly_done_since(&self, before: &Prd) -> Vec<String> {
        self.user_stories
            .iter()
            .filter(|story| story.is_done())
            .filter(|story| {
                before
                    .user_stories
                    .iter()
                    .find(|prev| prev.id == story.id)
                    .is_none_or(|prev| !prev.is_done())
            })
            .map(|story| story.id.clone())
            .collect()
    }
}
