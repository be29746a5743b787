//! Implement loop: iteration ceilings, story progress, agent status handling.

use std::path::Path;

use stagehand::core::limits::Limits;
use stagehand::error::PhaseError;
use stagehand::implement::run_implement;
use stagehand::io::agent::StubAgentRunner;
use stagehand::io::backend::LocalBackend;
use stagehand::core::limits::LimitExceeded;
use stagehand::io::config::{AgentOutputFormat, Config};
use stagehand::io::git::{Git, Vcs};
use stagehand::io::store::{load_item, load_prd, save_prd};
use stagehand::item::WorkflowState;
use stagehand::phase::ExecutionContext;
use stagehand::prd::StoryStatus;
use stagehand::test_support::{
    FakeHost, ScriptedAgent, ScriptedStep, TestRepo, item_in, pending_stories, plan_doc, prd_with,
    research_doc,
};

const ID: &str = "001-demo";
const PRD: &str = ".stagehand/items/001-demo/prd.json";
const AGENT_STATE: &str = ".stagehand/items/001-demo/agent_state.json";

fn planned_repo(stories: usize) -> TestRepo {
    let repo = TestRepo::new().expect("repo");
    repo.save_item(&item_in(ID, WorkflowState::Planned))
        .expect("item");
    repo.write(".stagehand/items/001-demo/research.md", &research_doc(5))
        .expect("research");
    repo.write(".stagehand/items/001-demo/plan.md", &plan_doc(1))
        .expect("plan");
    repo.save_prd(ID, &prd_with(pending_stories(stories)))
        .expect("prd");
    repo.commit_all("plan item").expect("commit");
    repo
}

fn config_with_iterations(max_iterations: u32) -> Config {
    Config {
        limits: Limits {
            max_iterations,
            ..Limits::default()
        },
        ..Config::default()
    }
}

/// Marks the first pending story done and touches a source file.
fn complete_one_story() -> ScriptedStep {
    ScriptedStep::acting(|cwd: &Path| {
        let prd_path = cwd.join(PRD);
        let mut prd = load_prd(&prd_path)?;
        let n = prd.user_stories.iter().filter(|s| s.is_done()).count() + 1;
        if let Some(story) = prd.user_stories.iter_mut().find(|s| !s.is_done()) {
            story.status = StoryStatus::Done;
        }
        save_prd(&prd_path, &prd)?;
        std::fs::create_dir_all(cwd.join("src"))?;
        std::fs::write(cwd.join(format!("src/story_{n}.rs")), "pub fn f() {}\n")?;
        Ok(())
    })
}

#[test]
fn stops_after_max_iterations_without_progress() {
    let repo = planned_repo(20);
    let agent = ScriptedAgent::repeating(ScriptedStep::noop());
    let config = config_with_iterations(3);
    let backend = LocalBackend::new(repo.path(), config.agent.clone(), &agent);
    let git = Git::new(repo.path());
    let host = FakeHost::default();
    let ctx = ExecutionContext::new(repo.path(), config, &backend, &git, &host).expect("ctx");

    let result = run_implement(&ctx, ID).expect("run");

    assert_eq!(agent.calls(), 3);
    let err = result.error.expect("error");
    assert!(matches!(err, PhaseError::LimitExceeded(_)), "{err:?}");
    assert!(err.to_string().contains("max iterations"), "{err}");
    assert_eq!(result.item.state, WorkflowState::Implementing);
    assert_eq!(result.item.branch.as_deref(), Some("stagehand/001-demo"));
    assert_eq!(
        git.current_branch().expect("branch"),
        "stagehand/001-demo"
    );
}

#[test]
fn reported_spend_trips_the_budget_ceiling() {
    let repo = planned_repo(5);
    let agent = ScriptedAgent::repeating(ScriptedStep::noop().with_cost(0.6));
    let mut config = Config::default();
    config.agent.output_format = AgentOutputFormat::Json;
    config.limits.max_budget_usd = Some(1.0);
    config.validate().expect("valid config");
    let backend = LocalBackend::new(repo.path(), config.agent.clone(), &agent);
    let git = Git::new(repo.path());
    let host = FakeHost::default();
    let ctx = ExecutionContext::new(repo.path(), config, &backend, &git, &host).expect("ctx");

    let result = run_implement(&ctx, ID).expect("run");

    assert_eq!(agent.calls(), 2);
    match result.error.expect("error") {
        PhaseError::LimitExceeded(LimitExceeded::Budget { used, max }) => {
            assert!((used - 1.2).abs() < 1e-9, "{used}");
            assert!((max - 1.0).abs() < 1e-9, "{max}");
        }
        other => panic!("expected budget limit, got {other:?}"),
    }
    assert_eq!(
        load_item(&repo.paths(), ID).expect("load").state,
        WorkflowState::Implementing
    );
}

#[test]
fn agent_output_lines_count_toward_progress_steps() {
    let repo = planned_repo(5);
    let agent =
        ScriptedAgent::repeating(ScriptedStep::noop().with_output("read\nedit\ntest\n"));
    let mut config = Config::default();
    config.limits.max_progress_steps = 5;
    let backend = LocalBackend::new(repo.path(), config.agent.clone(), &agent);
    let git = Git::new(repo.path());
    let host = FakeHost::default();
    let ctx = ExecutionContext::new(repo.path(), config, &backend, &git, &host).expect("ctx");

    let result = run_implement(&ctx, ID).expect("run");

    assert_eq!(agent.calls(), 2);
    assert_eq!(
        result.error,
        Some(PhaseError::LimitExceeded(LimitExceeded::ProgressSteps {
            used: 6,
            max: 5
        }))
    );
}

#[test]
fn loops_until_every_story_is_done() {
    let repo = planned_repo(2);
    let agent = ScriptedAgent::new(vec![complete_one_story(), complete_one_story()]);
    let config = Config::default();
    let backend = LocalBackend::new(repo.path(), config.agent.clone(), &agent);
    let git = Git::new(repo.path());
    let host = FakeHost::default();
    let ctx = ExecutionContext::new(repo.path(), config, &backend, &git, &host).expect("ctx");

    let result = run_implement(&ctx, ID).expect("run");

    assert!(result.success(), "{:?}", result.error);
    agent.assert_drained().expect("drained");
    // All stories done does not enter in_pr; that is the PR phase's job.
    assert_eq!(result.item.state, WorkflowState::Implementing);
    assert!(load_prd(&repo.paths().item(ID).prd_path).expect("prd").all_done());

    let log = repo.git(&["log", "--format=%s"]).expect("log");
    assert!(log.contains("001-demo: implement iteration 1"), "{log}");
    assert!(log.contains("001-demo: implement iteration 2"), "{log}");
    assert!(!git.has_uncommitted_changes().expect("status"));

    let meta = repo
        .read(".stagehand/items/001-demo/iterations/1/meta.json")
        .expect("meta");
    assert!(meta.contains("US-001"), "{meta}");
    assert!(meta.contains("src/story_1.rs"), "{meta}");
}

#[test]
fn progress_survives_limit_exhaustion_and_reentry_continues() {
    let repo = planned_repo(3);
    let config = config_with_iterations(1);
    let git = Git::new(repo.path());
    let host = FakeHost::default();

    let first = ScriptedAgent::new(vec![complete_one_story()]);
    let backend = LocalBackend::new(repo.path(), config.agent.clone(), &first);
    let ctx =
        ExecutionContext::new(repo.path(), config.clone(), &backend, &git, &host).expect("ctx");
    let result = run_implement(&ctx, ID).expect("run");
    assert!(!result.success());
    let prd = load_prd(&repo.paths().item(ID).prd_path).expect("prd");
    assert_eq!(prd.pending().count(), 2);

    let second = ScriptedAgent::new(vec![complete_one_story()]);
    let backend = LocalBackend::new(repo.path(), config.agent.clone(), &second);
    let ctx = ExecutionContext::new(repo.path(), config, &backend, &git, &host).expect("ctx");
    let result = run_implement(&ctx, ID).expect("run");
    assert!(!result.success());
    let prd = load_prd(&repo.paths().item(ID).prd_path).expect("prd");
    assert_eq!(prd.pending().count(), 1);
    assert!(
        repo.paths()
            .item(ID)
            .iterations_dir
            .join("2")
            .join("meta.json")
            .is_file()
    );
}

#[test]
fn needs_input_ends_the_phase_with_the_question() {
    let repo = planned_repo(2);
    let agent = ScriptedAgent::new(vec![ScriptedStep::writes(&[(
        AGENT_STATE,
        r#"{"status": "needs-input", "payload": "Which database should sessions use?"}"#,
    )])]);
    let config = Config::default();
    let backend = LocalBackend::new(repo.path(), config.agent.clone(), &agent);
    let git = Git::new(repo.path());
    let host = FakeHost::default();
    let ctx = ExecutionContext::new(repo.path(), config, &backend, &git, &host).expect("ctx");

    let result = run_implement(&ctx, ID).expect("run");

    assert_eq!(
        result.error,
        Some(PhaseError::NeedsInput(
            "Which database should sessions use?".to_string()
        ))
    );
    assert_eq!(agent.calls(), 1);
}

#[test]
fn agent_failure_and_timeout_end_the_phase() {
    let repo = planned_repo(2);
    let config = Config::default();
    let git = Git::new(repo.path());
    let host = FakeHost::default();

    let failing = ScriptedAgent::new(vec![ScriptedStep::failing(3)]);
    let backend = LocalBackend::new(repo.path(), config.agent.clone(), &failing);
    let ctx =
        ExecutionContext::new(repo.path(), config.clone(), &backend, &git, &host).expect("ctx");
    let err = run_implement(&ctx, ID).expect("run").error.expect("error");
    assert!(err.to_string().contains("exited with status 3"), "{err}");

    let slow = ScriptedAgent::new(vec![ScriptedStep::timing_out()]);
    let backend = LocalBackend::new(repo.path(), config.agent.clone(), &slow);
    let ctx = ExecutionContext::new(repo.path(), config, &backend, &git, &host).expect("ctx");
    let err = run_implement(&ctx, ID).expect("run").error.expect("error");
    assert!(matches!(err, PhaseError::AgentTimeout { .. }), "{err:?}");
}

#[test]
fn implementing_item_with_all_stories_done_returns_immediately() {
    let repo = planned_repo(1);
    let mut item = item_in(ID, WorkflowState::Implementing);
    item.branch = Some("stagehand/001-demo".to_string());
    repo.save_item(&item).expect("item");
    let mut prd = prd_with(pending_stories(1));
    prd.user_stories[0].status = StoryStatus::Done;
    repo.save_prd(ID, &prd).expect("prd");

    let agent = ScriptedAgent::new(Vec::new());
    let config = Config::default();
    let backend = LocalBackend::new(repo.path(), config.agent.clone(), &agent);
    let git = Git::new(repo.path());
    let host = FakeHost::default();
    let ctx = ExecutionContext::new(repo.path(), config, &backend, &git, &host).expect("ctx");

    let result = run_implement(&ctx, ID).expect("run");

    assert!(result.success());
    assert_eq!(agent.calls(), 0);
}

#[test]
fn mock_agent_only_enforces_the_iteration_ceiling() {
    let repo = planned_repo(2);
    let mut config = config_with_iterations(2);
    config.limits.max_progress_steps = 1;
    let backend = LocalBackend::new(repo.path(), config.agent.clone(), StubAgentRunner);
    let git = Git::new(repo.path());
    let host = FakeHost::default();
    let ctx = ExecutionContext::new(repo.path(), config, &backend, &git, &host)
        .expect("ctx")
        .with_mock_agent(true);

    let result = run_implement(&ctx, ID).expect("run");

    let err = result.error.expect("error").to_string();
    assert!(err.contains("max iterations reached (2 of 2)"), "{err}");
    assert_eq!(
        load_item(&repo.paths(), ID).expect("load").state,
        WorkflowState::Implementing
    );
}
