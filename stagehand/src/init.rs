//! `.stagehand/` scaffolding.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result, anyhow};
use tracing::info;

use crate::io::config::{Config, write_config};
use crate::io::paths::StagehandPaths;

/// Iteration logs are product output, not source.
const STAGEHAND_GITIGNORE: &str = "items/*/iterations/\n";

/// Options for [`init_repo`].
#[derive(Debug, Clone)]
pub struct InitOptions {
    /// If true, overwrite existing stagehand-owned files.
    pub force: bool,
}

/// Create `.stagehand/` in `root`.
///
/// Fails if `.stagehand/config.toml` already exists unless `options.force` is set.
/// Items are never touched, even with `force`.
pub fn init_repo(root: &Path, options: &InitOptions) -> Result<StagehandPaths> {
    let paths = StagehandPaths::new(root);
    if paths.state_dir.exists() && !paths.state_dir.is_dir() {
        return Err(anyhow!(
            "stagehand init: .stagehand exists but is not a directory"
        ));
    }
    if paths.config_path.exists() && !options.force {
        return Err(anyhow!(
            "stagehand init: .stagehand/config.toml already exists (use --force to overwrite)"
        ));
    }

    fs::create_dir_all(&paths.items_dir)
        .with_context(|| format!("create directory {}", paths.items_dir.display()))?;
    write_config(&paths.config_path, &Config::default())?;
    fs::write(&paths.gitignore_path, STAGEHAND_GITIGNORE)
        .with_context(|| format!("write file {}", paths.gitignore_path.display()))?;

    info!(root = %root.display(), "initialised .stagehand");
    Ok(paths)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::config::load_config;

    #[test]
    fn init_creates_expected_layout() {
        let temp = tempfile::tempdir().expect("tempdir");

        let paths = init_repo(temp.path(), &InitOptions { force: false }).expect("init");

        assert!(paths.items_dir.is_dir());
        assert_eq!(
            fs::read_to_string(&paths.gitignore_path).expect("read"),
            STAGEHAND_GITIGNORE
        );
        assert_eq!(load_config(&paths.config_path).expect("load"), Config::default());
    }

    #[test]
    fn init_refuses_to_overwrite_without_force() {
        let temp = tempfile::tempdir().expect("tempdir");
        let paths = init_repo(temp.path(), &InitOptions { force: false }).expect("init");
        fs::write(&paths.config_path, "base_branch = \"trunk\"\n").expect("edit");

        let err = init_repo(temp.path(), &InitOptions { force: false }).expect_err("exists");
        assert!(err.to_string().contains("--force"));

        init_repo(temp.path(), &InitOptions { force: true }).expect("force");
        assert_eq!(load_config(&paths.config_path).expect("load").base_branch, "main");
    }
}
