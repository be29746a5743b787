//! Stagehand CLI.
//!
//! Every phase command loads `.stagehand/items/<id>/item.json`, runs one phase, and
//! records any failure as the item's `last_error`.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};

use stagehand::complete::run_complete;
use stagehand::exit_codes;
use stagehand::implement::run_implement;
use stagehand::ingest::{ingest_ideas, read_ideas};
use stagehand::init::{InitOptions, init_repo};
use stagehand::io::agent::{ProcessAgentRunner, StubAgentRunner};
use stagehand::io::backend::{ComputeBackend, LocalBackend};
use stagehand::io::config::{Config, load_config};
use stagehand::io::git::Git;
use stagehand::io::host::GhHost;
use stagehand::io::paths::StagehandPaths;
use stagehand::io::store::{list_items, load_item};
use stagehand::logging;
use stagehand::next::run_next;
use stagehand::phase::{ExecutionContext, PhaseResult, persist_outcome};
use stagehand::plan::run_plan;
use stagehand::pr::run_pr;
use stagehand::research::run_research;

#[derive(Parser)]
#[command(
    name = "stagehand",
    version,
    about = "Drive work items through research, plan, implement, and review with an agent"
)]
struct Cli {
    /// Repository root.
    #[arg(short = 'C', long, global = true, default_value = ".")]
    root: PathBuf,
    /// Check preconditions only; never invoke the agent or touch git.
    #[arg(long, global = true)]
    dry_run: bool,
    /// Use a stub agent that changes nothing.
    #[arg(long, global = true)]
    mock_agent: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create `.stagehand/` with a default config.
    Init {
        /// Overwrite existing config.
        #[arg(short, long)]
        force: bool,
    },
    /// Create `idea` items from a JSON array of idea payloads.
    Ingest { file: PathBuf },
    /// List items with their state and last error.
    Status,
    /// idea -> researched
    Research { id: String },
    /// researched -> planned
    Plan { id: String },
    /// planned -> implementing, then iterate until every story is done.
    Implement { id: String },
    /// implementing -> in_pr (or done for a direct merge).
    Pr { id: String },
    /// in_pr -> done once the pull request is merged.
    Complete { id: String },
    /// Run whichever phase the item's state calls for.
    Next { id: String },
    /// Answer an agent that asked for input; read on its next run.
    Respond { id: String, text: String },
}

#[derive(Clone, Copy)]
enum PhaseCommand {
    Research,
    Plan,
    Implement,
    Pr,
    Complete,
    Next,
}

fn main() {
    logging::init();
    match run() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("{err:#}");
            std::process::exit(exit_codes::INVALID);
        }
    }
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    let root = cli.root.as_path();
    let phase = match cli.command {
        Command::Init { force } => return cmd_init(root, force),
        Command::Ingest { file } => return cmd_ingest(root, &file),
        Command::Status => return cmd_status(root),
        Command::Respond { id, text } => return cmd_respond(root, &id, &text),
        Command::Research { id } => (PhaseCommand::Research, id),
        Command::Plan { id } => (PhaseCommand::Plan, id),
        Command::Implement { id } => (PhaseCommand::Implement, id),
        Command::Pr { id } => (PhaseCommand::Pr, id),
        Command::Complete { id } => (PhaseCommand::Complete, id),
        Command::Next { id } => (PhaseCommand::Next, id),
    };
    cmd_phase(root, phase, cli.dry_run, cli.mock_agent)
}

fn cmd_init(root: &Path, force: bool) -> Result<i32> {
    let paths = init_repo(root, &InitOptions { force })?;
    println!("initialised {}", paths.state_dir.display());
    Ok(exit_codes::OK)
}

fn cmd_ingest(root: &Path, file: &Path) -> Result<i32> {
    let config = load_repo_config(root)?;
    let ideas = read_ideas(file)?;
    let items = ingest_ideas(
        &StagehandPaths::new(root),
        &config.quality.payload,
        &ideas,
        Utc::now(),
    )?;
    for item in &items {
        println!("{}", item.id);
    }
    Ok(exit_codes::OK)
}

fn cmd_status(root: &Path) -> Result<i32> {
    for item in list_items(&StagehandPaths::new(root))? {
        match &item.last_error {
            Some(err) => println!(
                "{}\t{}\t{}",
                item.id,
                item.state,
                err.lines().next().unwrap_or_default()
            ),
            None => println!("{}\t{}", item.id, item.state),
        }
    }
    Ok(exit_codes::OK)
}

fn cmd_respond(root: &Path, id: &str, text: &str) -> Result<i32> {
    let config = load_repo_config(root)?;
    let paths = StagehandPaths::new(root);
    // Fail early on unknown ids.
    load_item(&paths, id)?;
    LocalBackend::new(root, config.agent, StubAgentRunner).write_response(id, text)?;
    Ok(exit_codes::OK)
}

fn cmd_phase(
    root: &Path,
    (command, id): (PhaseCommand, String),
    dry_run: bool,
    mock_agent: bool,
) -> Result<i32> {
    let config = load_repo_config(root)?;
    let backend: Box<dyn ComputeBackend> = if mock_agent {
        Box::new(LocalBackend::new(root, config.agent.clone(), StubAgentRunner))
    } else {
        Box::new(LocalBackend::new(
            root,
            config.agent.clone(),
            ProcessAgentRunner,
        ))
    };
    let git = Git::new(root);
    let host = GhHost::new(root);
    let ctx = ExecutionContext::new(root, config, backend.as_ref(), &git, &host)?
        .with_dry_run(dry_run)
        .with_mock_agent(mock_agent);

    let result = match command {
        PhaseCommand::Research => run_research(&ctx, &id),
        PhaseCommand::Plan => run_plan(&ctx, &id),
        PhaseCommand::Implement => run_implement(&ctx, &id),
        PhaseCommand::Pr => run_pr(&ctx, &id),
        PhaseCommand::Complete => run_complete(&ctx, &id),
        PhaseCommand::Next => run_next(&ctx, &id),
    }?;
    persist_outcome(&ctx, &result)?;
    backend.cleanup()?;
    Ok(report(&result))
}

fn report(result: &PhaseResult) -> i32 {
    match &result.error {
        None => {
            println!("{}\t{}", result.item.id, result.item.state);
            exit_codes::OK
        }
        Some(err) => {
            eprintln!("{} ({}): {err}", result.item.id, result.item.state);
            exit_codes::PHASE_FAILED
        }
    }
}

fn load_repo_config(root: &Path) -> Result<Config> {
    let paths = StagehandPaths::new(root);
    let config = load_config(&paths.config_path)?;
    config
        .validate()
        .with_context(|| format!("invalid config {}", paths.config_path.display()))?;
    Ok(config)
}
