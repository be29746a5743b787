//! Agent runner abstraction.
//!
//! The [`AgentRunner`] trait decouples phase orchestration from how the agent is
//! actually invoked. [`ProcessAgentRunner`] spawns the configured command with the
//! prompt on stdin; [`StubAgentRunner`] does nothing and reports success.

use std::path::Path;
use std::process::Command;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use tracing::{debug, info, instrument, warn};

use super::config::{AgentConfig, AgentOutputFormat};
use super::process::run_command;

/// Parameters for a single agent invocation.
#[derive(Debug, Clone, Copy)]
pub struct AgentRequest<'a> {
    pub cwd: &'a Path,
    pub prompt: &'a str,
    /// Tools the agent may use for this phase; `None` leaves the agent's defaults.
    pub allowed_tools: Option<&'a [String]>,
    /// Overrides `AgentConfig::timeout_secs`.
    pub timeout: Option<Duration>,
    /// Stream agent stdout here while it runs.
    pub log_path: Option<&'a Path>,
}

/// Outcome of one agent invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct AgentResult {
    pub success: bool,
    /// Captured stdout (bounded by `output_limit_bytes`).
    pub output: String,
    pub stderr: String,
    pub exit_code: Option<i32>,
    pub timed_out: bool,
    /// The agent printed the configured completion signal.
    pub completion_detected: bool,
    /// Spend reported by the runner, when it knows it.
    pub cost_usd: Option<f64>,
}

pub trait AgentRunner {
    fn run(&self, config: &AgentConfig, request: &AgentRequest<'_>) -> Result<AgentResult>;
}

impl<T: AgentRunner + ?Sized> AgentRunner for &T {
    fn run(&self, config: &AgentConfig, request: &AgentRequest<'_>) -> Result<AgentResult> {
        (**self).run(config, request)
    }
}

/// Spawns `config.command` in `request.cwd`.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessAgentRunner;

impl AgentRunner for ProcessAgentRunner {
    #[instrument(skip_all, fields(cwd = %request.cwd.display()))]
    fn run(&self, config: &AgentConfig, request: &AgentRequest<'_>) -> Result<AgentResult> {
        let (program, args) = config
            .command
            .split_first()
            .ok_or_else(|| anyhow!("agent.command is empty"))?;
        let mut cmd = Command::new(program);
        cmd.args(args).current_dir(request.cwd);
        if let (Some(flag), Some(tools)) = (&config.allowed_tools_flag, request.allowed_tools) {
            cmd.arg(flag).arg(tools.join(","));
        }

        let timeout = request
            .timeout
            .unwrap_or(Duration::from_secs(config.timeout_secs));
        info!(program = %program, timeout_secs = timeout.as_secs(), "starting agent");
        let output = run_command(
            cmd,
            Some(request.prompt.as_bytes()),
            timeout,
            config.output_limit_bytes,
            request.log_path,
        )
        .with_context(|| format!("run agent {program}"))?;

        let stdout = output.stdout_lossy();
        let completion_detected = stdout.contains(&config.completion_signal);
        let success = output.status.success() && !output.timed_out;
        if output.timed_out {
            warn!(timeout_secs = timeout.as_secs(), "agent timed out");
        } else if !success {
            warn!(exit_code = ?output.status.code(), "agent exited unsuccessfully");
        }
        let cost_usd = match config.output_format {
            AgentOutputFormat::Json => reported_cost(&stdout),
            AgentOutputFormat::Text => None,
        };
        if config.output_format == AgentOutputFormat::Json && cost_usd.is_none() {
            warn!("json agent output carried no total_cost_usd");
        }
        debug!(completion_detected, ?cost_usd, "agent finished");

        Ok(AgentResult {
            success,
            output: stdout,
            stderr: output.stderr_lossy(),
            exit_code: output.status.code(),
            timed_out: output.timed_out,
            completion_detected,
            cost_usd,
        })
    }
}

/// Spend from the last JSON object on stdout carrying `total_cost_usd`.
///
/// Handles a single pretty-printed object as well as line-delimited streams.
fn reported_cost(stdout: &str) -> Option<f64> {
    let cost_of = |text: &str| {
        serde_json::from_str::<serde_json::Value>(text)
            .ok()?
            .get("total_cost_usd")?
            .as_f64()
    };
    cost_of(stdout.trim()).or_else(|| stdout.lines().rev().find_map(|line| cost_of(line.trim())))
}

/// Runner that performs no work. Used with `--mock-agent`.
#[derive(Debug, Clone, Copy, Default)]
pub struct StubAgentRunner;

impl AgentRunner for StubAgentRunner {
    fn run(&self, _config: &AgentConfig, request: &AgentRequest<'_>) -> Result<AgentResult> {
        info!(cwd = %request.cwd.display(), "stub agent: skipping invocation");
        Ok(AgentResult {
            success: true,
            output: "stub agent: no changes made\n".to_string(),
            stderr: String::new(),
            exit_code: Some(0),
            timed_out: false,
            completion_detected: true,
            cost_usd: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn shell_agent(script: &str) -> AgentConfig {
        AgentConfig {
            command: vec!["sh".to_string(), "-c".to_string(), script.to_string()],
            allowed_tools_flag: None,
            timeout_secs: 10,
            ..AgentConfig::default()
        }
    }

    fn request<'a>(cwd: &'a Path, prompt: &'a str) -> AgentRequest<'a> {
        AgentRequest {
            cwd,
            prompt,
            allowed_tools: None,
            timeout: None,
            log_path: None,
        }
    }

    #[test]
    fn process_runner_feeds_prompt_and_detects_completion() {
        let temp = tempfile::tempdir().expect("tempdir");
        let config = shell_agent("cat > prompt.txt; echo '<promise>COMPLETE</promise>'");

        let result = ProcessAgentRunner
            .run(&config, &request(temp.path(), "do the thing"))
            .expect("run");

        assert!(result.success);
        assert!(result.completion_detected);
        assert_eq!(result.exit_code, Some(0));
        let prompt = std::fs::read_to_string(temp.path().join("prompt.txt")).expect("read");
        assert_eq!(prompt, "do the thing");
    }

    #[test]
    fn process_runner_reports_failure_and_timeout() {
        let temp = tempfile::tempdir().expect("tempdir");

        let failed = ProcessAgentRunner
            .run(&shell_agent("exit 7"), &request(temp.path(), ""))
            .expect("run");
        assert!(!failed.success);
        assert_eq!(failed.exit_code, Some(7));
        assert!(!failed.completion_detected);

        let mut req = request(temp.path(), "");
        req.timeout = Some(Duration::from_millis(200));
        let slow = ProcessAgentRunner
            .run(&shell_agent("sleep 5"), &req)
            .expect("run");
        assert!(slow.timed_out);
        assert!(!slow.success);
    }

    #[test]
    fn json_output_reports_spend() {
        let temp = tempfile::tempdir().expect("tempdir");
        let script = r#"echo '{"type":"system"}'; echo '{"type":"result","result":"ok","total_cost_usd":0.42}'"#;
        let mut config = shell_agent(script);

        let text = ProcessAgentRunner
            .run(&config, &request(temp.path(), ""))
            .expect("run");
        assert_eq!(text.cost_usd, None);

        config.output_format = AgentOutputFormat::Json;
        let json = ProcessAgentRunner
            .run(&config, &request(temp.path(), ""))
            .expect("run");
        assert_eq!(json.cost_usd, Some(0.42));
    }

    #[test]
    fn reported_cost_reads_single_object_or_last_streamed_line() {
        assert_eq!(
            reported_cost("{\n  \"result\": \"done\",\n  \"total_cost_usd\": 1.5\n}\n"),
            Some(1.5)
        );
        assert_eq!(
            reported_cost("{\"total_cost_usd\":0.1}\nnoise\n{\"total_cost_usd\":0.3}\n"),
            Some(0.3)
        );
        assert_eq!(reported_cost("plain text\n"), None);
    }

    #[test]
    fn allowed_tools_are_passed_as_one_flag() {
        let temp = tempfile::tempdir().expect("tempdir");
        let config = AgentConfig {
            command: vec![
                "sh".to_string(),
                "-c".to_string(),
                "echo \"$@\" > args.txt".to_string(),
                "agent".to_string(),
            ],
            allowed_tools_flag: Some("--allowedTools".to_string()),
            timeout_secs: 10,
            ..AgentConfig::default()
        };
        let tools = vec!["Read".to_string(), "Write".to_string()];
        let mut req = request(temp.path(), "");
        req.allowed_tools = Some(&tools);

        ProcessAgentRunner.run(&config, &req).expect("run");

        let args = std::fs::read_to_string(temp.path().join("args.txt")).expect("read");
        assert_eq!(args.trim(), "--allowedTools Read,Write");
    }

    #[test]
    fn stub_runner_succeeds_without_side_effects() {
        let temp = tempfile::tempdir().expect("tempdir");
        let result = StubAgentRunner
            .run(&AgentConfig::default(), &request(temp.path(), "prompt"))
            .expect("run");
        assert!(result.success);
        assert_eq!(std::fs::read_dir(temp.path()).expect("ls").count(), 0);
    }
}
