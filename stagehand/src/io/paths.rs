//! Canonical locations under `.stagehand/`.

use std::path::PathBuf;

pub const STATE_DIR: &str = ".stagehand";
pub const RESEARCH_FILE: &str = "research.md";
pub const PLAN_FILE: &str = "plan.md";
pub const PRD_FILE: &str = "prd.json";

/// Paths shared by every item.
#[derive(Debug, Clone)]
pub struct StagehandPaths {
    pub root: PathBuf,
    pub state_dir: PathBuf,
    pub config_path: PathBuf,
    pub gitignore_path: PathBuf,
    pub items_dir: PathBuf,
}

impl StagehandPaths {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let state_dir = root.join(STATE_DIR);
        Self {
            root: root.clone(),
            state_dir: state_dir.clone(),
            config_path: state_dir.join("config.toml"),
            gitignore_path: state_dir.join(".gitignore"),
            items_dir: state_dir.join("items"),
        }
    }

    pub fn item(&self, id: &str) -> ItemPaths {
        ItemPaths::new(&self.items_dir, id)
    }
}

/// Files belonging to a single item.
#[derive(Debug, Clone)]
pub struct ItemPaths {
    pub id: String,
    pub dir: PathBuf,
    pub item_path: PathBuf,
    pub research_path: PathBuf,
    pub plan_path: PathBuf,
    pub prd_path: PathBuf,
    pub agent_state_path: PathBuf,
    pub response_path: PathBuf,
    pub iterations_dir: PathBuf,
}

impl ItemPaths {
    fn new(items_dir: &std::path::Path, id: &str) -> Self {
        let dir = items_dir.join(id);
        Self {
            id: id.to_string(),
            dir: dir.clone(),
            item_path: dir.join("item.json"),
            research_path: dir.join(RESEARCH_FILE),
            plan_path: dir.join(PLAN_FILE),
            prd_path: dir.join(PRD_FILE),
            agent_state_path: dir.join("agent_state.json"),
            response_path: dir.join("response.md"),
            iterations_dir: dir.join("iterations"),
        }
    }

    /// Repository-relative, `/`-separated path of the item directory.
    pub fn rel_dir(&self) -> String {
        format!("{STATE_DIR}/items/{}", self.id)
    }

    /// Repository-relative path of a file inside the item directory, as git reports it.
    pub fn rel(&self, file: &str) -> String {
        format!("{}/{file}", self.rel_dir())
    }
}
