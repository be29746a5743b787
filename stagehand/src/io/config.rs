//! Stagehand configuration stored under `.stagehand/config.toml`.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

use crate::core::limits::Limits;
use crate::core::quality::QualityConfig;

/// How the PR phase lands an item's branch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MergeMode {
    /// Push the branch and open/update a pull request.
    #[default]
    Pr,
    /// Merge straight into the base branch. Requires `allow_unsafe_direct_merge`.
    Direct,
}

/// Stagehand configuration (TOML).
///
/// Intended to be edited by humans. Missing fields fall back to defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub base_branch: String,
    /// Item branches are `<branch_prefix><item id>`.
    pub branch_prefix: String,
    pub remote: String,
    /// When set, preflight rejects remotes whose URL does not contain this string.
    pub remote_url_contains: Option<String>,
    pub merge_mode: MergeMode,
    /// Explicit opt-in for `merge_mode = "direct"`, which bypasses review.
    pub allow_unsafe_direct_merge: bool,
    pub agent: AgentConfig,
    pub limits: Limits,
    pub quality: QualityConfig,
}

/// What the agent command prints on stdout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentOutputFormat {
    /// Free text; spend is unknown.
    #[default]
    Text,
    /// JSON result object(s) carrying `total_cost_usd` (e.g. `claude --output-format json`).
    Json,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Agent argv; the prompt is written to stdin.
    pub command: Vec<String>,
    /// Flag used to pass a phase's tool allow-list (comma separated).
    pub allowed_tools_flag: Option<String>,
    /// Wall-clock timeout for a single agent invocation.
    pub timeout_secs: u64,
    /// Marker the agent prints when it believes the phase is complete.
    pub completion_signal: String,
    /// Truncate captured agent stdout/stderr beyond this many bytes.
    pub output_limit_bytes: usize,
    /// Must match the flags in `command`; `json` lets the runner read spend.
    pub output_format: AgentOutputFormat,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            command: vec!["claude".to_string(), "--print".to_string()],
            allowed_tools_flag: Some("--allowedTools".to_string()),
            timeout_secs: 60 * 60,
            completion_signal: "<promise>COMPLETE</promise>".to_string(),
            output_limit_bytes: 1_000_000,
            output_format: AgentOutputFormat::Text,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            base_branch: "main".to_string(),
            branch_prefix: "stagehand/".to_string(),
            remote: "origin".to_string(),
            remote_url_contains: None,
            merge_mode: MergeMode::Pr,
            allow_unsafe_direct_merge: false,
            agent: AgentConfig::default(),
            limits: Limits::default(),
            quality: QualityConfig::default(),
        }
    }
}

impl Config {
    pub fn validate(&self) -> Result<()> {
        if self.base_branch.trim().is_empty() {
            return Err(anyhow!("base_branch must not be empty"));
        }
        if self.branch_prefix.trim().is_empty() {
            return Err(anyhow!("branch_prefix must not be empty"));
        }
        if self.remote.trim().is_empty() {
            return Err(anyhow!("remote must not be empty"));
        }
        if self.agent.command.is_empty() || self.agent.command[0].trim().is_empty() {
            return Err(anyhow!("agent.command must be a non-empty array"));
        }
        if self.agent.timeout_secs == 0 {
            return Err(anyhow!("agent.timeout_secs must be > 0"));
        }
        if self.agent.output_limit_bytes == 0 {
            return Err(anyhow!("agent.output_limit_bytes must be > 0"));
        }
        if self.limits.max_iterations == 0 {
            return Err(anyhow!("limits.max_iterations must be > 0"));
        }
        if self.limits.max_duration_secs == 0 {
            return Err(anyhow!("limits.max_duration_secs must be > 0"));
        }
        if self.limits.max_progress_steps == 0 {
            return Err(anyhow!("limits.max_progress_steps must be > 0"));
        }
        if let Some(budget) = self.limits.max_budget_usd {
            if budget <= 0.0 {
                return Err(anyhow!("limits.max_budget_usd must be > 0 when set"));
            }
            if self.agent.output_format != AgentOutputFormat::Json {
                return Err(anyhow!(
                    "limits.max_budget_usd requires agent.output_format = \"json\"; text output does not report spend"
                ));
            }
        }
        let stories = &self.quality.stories;
        if stories.min_stories > stories.max_stories {
            return Err(anyhow!(
                "quality.stories.min_stories ({}) exceeds max_stories ({})",
                stories.min_stories,
                stories.max_stories
            ));
        }
        if stories.priority_min > stories.priority_max {
            return Err(anyhow!(
                "quality.stories.priority_min ({}) exceeds priority_max ({})",
                stories.priority_min,
                stories.priority_max
            ));
        }
        Ok(())
    }

    /// Branch name for an item.
    pub fn branch_for(&self, item_id: &str) -> String {
        format!("{}{item_id}", self.branch_prefix)
    }
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `Config::default()`.
pub fn load_config(path: &Path) -> Result<Config> {
    if !path.exists() {
        let cfg = Config::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: Config =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()
        .with_context(|| format!("validate {}", path.display()))?;
    Ok(cfg)
}

/// Atomically write config to disk (temp file + rename).
pub fn write_config(path: &Path, cfg: &Config) -> Result<()> {
    cfg.validate()?;
    let mut buf = toml::to_string_pretty(cfg).context("serialize config toml")?;
    buf.push('\n');
    super::write_atomic(path, &buf)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_missing_returns_default() {
        let temp = tempfile::tempdir().expect("tempdir");
        let cfg = load_config(&temp.path().join("missing.toml")).expect("load");
        assert_eq!(cfg, Config::default());
    }

    #[test]
    fn write_then_load_round_trips() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("config.toml");
        let cfg = Config {
            merge_mode: MergeMode::Direct,
            allow_unsafe_direct_merge: true,
            agent: AgentConfig {
                output_format: AgentOutputFormat::Json,
                ..AgentConfig::default()
            },
            limits: Limits {
                max_budget_usd: Some(5.0),
                ..Limits::default()
            },
            ..Config::default()
        };
        write_config(&path, &cfg).expect("write");
        let loaded = load_config(&path).expect("load");
        assert_eq!(loaded, cfg);
    }

    #[test]
    fn budget_ceiling_requires_json_agent_output() {
        let mut cfg = Config {
            limits: Limits {
                max_budget_usd: Some(2.0),
                ..Limits::default()
            },
            ..Config::default()
        };
        let err = cfg.validate().expect_err("text output cannot report spend");
        assert!(err.to_string().contains("agent.output_format"), "{err}");

        cfg.agent.output_format = AgentOutputFormat::Json;
        cfg.validate().expect("json output reports spend");
    }

    #[test]
    fn partial_file_fills_defaults() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("config.toml");
        fs::write(
            &path,
            "merge_mode = \"direct\"\n[limits]\nmax_iterations = 3\n[quality.research]\nmin_citations = 1\n",
        )
        .expect("write");

        let cfg = load_config(&path).expect("load");

        assert_eq!(cfg.merge_mode, MergeMode::Direct);
        assert!(!cfg.allow_unsafe_direct_merge);
        assert_eq!(cfg.limits.max_iterations, 3);
        assert_eq!(cfg.limits.max_duration_secs, Limits::default().max_duration_secs);
        assert_eq!(cfg.quality.research.min_citations, 1);
        assert_eq!(cfg.quality.research.min_summary_length, 100);
    }

    #[test]
    fn rejects_invalid_values() {
        let cfg = Config {
            limits: Limits {
                max_iterations: 0,
                ..Limits::default()
            },
            ..Config::default()
        };
        assert!(cfg.validate().is_err());

        let mut cfg = Config::default();
        cfg.quality.stories.priority_min = 5;
        let err = cfg.validate().expect_err("inverted range");
        assert!(err.to_string().contains("priority_min"));
    }

    #[test]
    fn branch_uses_prefix() {
        assert_eq!(Config::default().branch_for("001-demo"), "stagehand/001-demo");
    }
}
