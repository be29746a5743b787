//! The unit of work driven through the workflow.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Workflow states in their fixed order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowState {
    Idea,
    Researched,
    Planned,
    Implementing,
    InPr,
    Done,
}

impl WorkflowState {
    /// Every state, in workflow order.
    pub const ALL: [WorkflowState; 6] = [
        WorkflowState::Idea,
        WorkflowState::Researched,
        WorkflowState::Planned,
        WorkflowState::Implementing,
        WorkflowState::InPr,
        WorkflowState::Done,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            WorkflowState::Idea => "idea",
            WorkflowState::Researched => "researched",
            WorkflowState::Planned => "planned",
            WorkflowState::Implementing => "implementing",
            WorkflowState::InPr => "in_pr",
            WorkflowState::Done => "done",
        }
    }

    /// Position in the fixed sequence (0-based).
    pub fn index(self) -> usize {
        self as usize
    }

    pub fn is_terminal(self) -> bool {
        self == WorkflowState::Done
    }
}

impl fmt::Display for WorkflowState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Persisted record for one feature/bug/idea (`.stagehand/items/<id>/item.json`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item {
    pub id: String,
    pub title: String,
    pub state: WorkflowState,
    #[serde(default)]
    pub overview: String,
    #[serde(default)]
    pub branch: Option<String>,
    #[serde(default)]
    pub pr_url: Option<String>,
    #[serde(default)]
    pub pr_number: Option<u64>,
    #[serde(default)]
    pub last_error: Option<String>,
    /// Mainline tip captured right before a direct merge.
    #[serde(default)]
    pub rollback_sha: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub depends_on: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub campaign: Option<String>,
}

impl Item {
    /// Create a fresh item in the `idea` state.
    pub fn new(
        id: impl Into<String>,
        title: impl Into<String>,
        overview: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            state: WorkflowState::Idea,
            overview: overview.into(),
            branch: None,
            pr_url: None,
            pr_number: None,
            last_error: None,
            rollback_sha: None,
            created_at: now,
            updated_at: now,
            depends_on: Vec::new(),
            campaign: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn states_serialize_snake_case() {
        let raw = serde_json::to_string(&WorkflowState::InPr).expect("serialize");
        assert_eq!(raw, "\"in_pr\"");
        let parsed: WorkflowState = serde_json::from_str("\"implementing\"").expect("parse");
        assert_eq!(parsed, WorkflowState::Implementing);
    }

    #[test]
    fn state_order_matches_index() {
        for (idx, state) in WorkflowState::ALL.iter().enumerate() {
            assert_eq!(state.index(), idx);
        }
        assert!(WorkflowState::Done.is_terminal());
        assert!(!WorkflowState::InPr.is_terminal());
    }

    #[test]
    fn optional_metadata_is_omitted_when_empty() {
        let item = Item::new("001-demo", "Demo", "", Utc::now());
        let raw = serde_json::to_string(&item).expect("serialize");
        assert!(!raw.contains("depends_on"));
        assert!(!raw.contains("campaign"));
        assert!(raw.contains("\"state\":\"idea\""));
    }
}
