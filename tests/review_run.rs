use async_trait::async_trait;
use maxreview::agents::{AgentExecutor, AgentOutcome, ExecutorConfig, ResolvedSelection};
use maxreview::artifacts::{load_agent_review, ExistingRunAction, RunArtifactSet};
use maxreview::coordinator::{CoordinatorConfig, RunCoordinator, RunOptions, RunPrompter};
use maxreview::error::SandboxError;
use maxreview::git::Checkout;
use maxreview::github::ReviewHost;
use maxreview::sandbox::{SandboxOutcome, SandboxRequest, SandboxRuntime};
use maxreview::types::{
    AgentName, AgentReview, IssueFinding, PrSummary, Priority, PullRequestCandidate,
    PullRequestInfo,
};
use maxreview::{MaxReviewError, Result};
use std::path::Path;
use std::sync::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

struct FakeHost {
    candidates: Vec<PullRequestCandidate>,
    posted: Mutex<Vec<(String, u32)>>,
    reject_line: Option<u32>,
}

impl FakeHost {
    fn new() -> Self {
        Self {
            candidates: Vec::new(),
            posted: Mutex::new(Vec::new()),
            reject_line: None,
        }
    }
}

#[async_trait]
impl ReviewHost for FakeHost {
    fn repo(&self) -> String {
        "acme/widgets".to_string()
    }

    async fn current_user(&self) -> Result<String> {
        Ok("me".to_string())
    }

    async fn list_open_prs_with_reviewers(&self) -> Result<Vec<PullRequestCandidate>> {
        Ok(self.candidates.clone())
    }

    async fn get_pr(&self, number: u64) -> Result<PullRequestInfo> {
        Ok(PullRequestInfo {
            number,
            title: "Add retries".to_string(),
            head_ref_name: "feat/retries".to_string(),
            head_ref_oid: "deadbeef".to_string(),
        })
    }

    async fn post_review_comment(
        &self,
        _pr_number: u64,
        commit_sha: &str,
        issue: &IssueFinding,
    ) -> Result<()> {
        assert_eq!(commit_sha, "deadbeef");
        if self.reject_line == Some(issue.line) {
            return Err(MaxReviewError::HostApi("line is outside the diff".to_string()));
        }
        self.posted
            .lock()
            .unwrap()
            .push((issue.agent.clone(), issue.line));
        Ok(())
    }
}

struct Prompter {
    choice: Option<usize>,
    action: ExistingRunAction,
}

impl RunPrompter for Prompter {
    fn select_pr(&self, _: &[PullRequestCandidate]) -> Result<Option<usize>> {
        Ok(self.choice)
    }

    fn existing_run_action(&self, _: &Path) -> Result<ExistingRunAction> {
        Ok(self.action)
    }
}

struct DirCheckout;

#[async_trait]
impl Checkout for DirCheckout {
    async fn prepare(&self, _pr_number: u64, _head_sha: &str, dest: &Path) -> Result<()> {
        std::fs::create_dir_all(dest)?;
        Ok(())
    }
}

/// Claude and codex report overlapping findings; gemini crashes.
struct ScriptedRuntime;

fn finding(agent: &str, priority: Priority, line: u32, category: &str) -> IssueFinding {
    IssueFinding {
        agent: agent.to_string(),
        priority,
        file: "src/retry.rs".to_string(),
        line,
        commit_id: "deadbeef".to_string(),
        category: category.to_string(),
        description: format!("{} finding at {}", agent, line),
        proposed_fix: String::new(),
    }
}

#[async_trait]
impl SandboxRuntime for ScriptedRuntime {
    fn name(&self) -> &'static str {
        "scripted"
    }

    async fn is_available(&self) -> bool {
        true
    }

    async fn ensure_image(&self) -> std::result::Result<(), SandboxError> {
        Ok(())
    }

    async fn execute(
        &self,
        request: SandboxRequest,
    ) -> std::result::Result<SandboxOutcome, SandboxError> {
        let agent = request.command[0].clone();
        let runner = request
            .mounts
            .iter()
            .find(|m| m.container == "/runner")
            .map(|m| m.host.clone())
            .ok_or_else(|| SandboxError::LaunchFailed("runner mount missing".to_string()))?;

        let issues = match agent.as_str() {
            "claude" => vec![
                finding("claude", Priority::P2, 40, "style"),
                finding("claude", Priority::P0, 12, "bug"),
            ],
            "codex" => vec![
                finding("codex", Priority::P0, 12, "bug"),
                finding("codex", Priority::P1, 25, "performance"),
            ],
            _ => {
                return Ok(SandboxOutcome {
                    exit_code: 137,
                    stdout: String::new(),
                    stderr: "killed".to_string(),
                    elapsed: Duration::from_millis(5),
                })
            }
        };

        let review = AgentReview {
            pr_summary: PrSummary {
                number: 31,
                title: "Add retries".to_string(),
                description: format!("{} says: adds retry loop", agent),
            },
            issues,
        };
        std::fs::write(
            runner.join(format!("{}-review.json", agent)),
            serde_json::to_vec(&review).unwrap(),
        )?;

        Ok(SandboxOutcome {
            exit_code: 0,
            stdout: "done".to_string(),
            stderr: String::new(),
            elapsed: Duration::from_millis(5),
        })
    }
}

fn config(root: &Path) -> CoordinatorConfig {
    CoordinatorConfig {
        runs_root: root.to_path_buf(),
        ..Default::default()
    }
}

#[tokio::test]
async fn fresh_run_merges_publishes_and_isolates_failures() {
    let temp_dir = TempDir::new().unwrap();
    let host = FakeHost {
        reject_line: Some(25),
        ..FakeHost::new()
    };
    let prompter = Prompter {
        choice: None,
        action: ExistingRunAction::Clear,
    };
    let executor = AgentExecutor::new(Arc::new(ScriptedRuntime), ExecutorConfig::default());

    let mut coordinator = RunCoordinator::new(&host, &prompter, config(temp_dir.path()))
        .with_executor(&executor, &DirCheckout, Default::default());
    let summary = coordinator
        .run(&RunOptions {
            pr: Some(31),
            selection: ResolvedSelection::all(),
            resume: false,
            post_comments: true,
        })
        .await
        .unwrap()
        .unwrap();

    assert_eq!(
        summary.artifacts.dir(),
        temp_dir.path().join("pr-31-feat-retries")
    );
    assert!(matches!(
        summary.agent_reports[2].outcome,
        AgentOutcome::Failed { .. }
    ));

    let review = &summary.review;
    assert_eq!(review.pr_summary.title, "Add retries");
    let lines: Vec<(String, u32)> = review
        .issues
        .iter()
        .map(|i| (i.agent.clone(), i.line))
        .collect();
    assert_eq!(
        lines,
        vec![
            ("claude".to_string(), 12),
            ("codex".to_string(), 25),
            ("claude".to_string(), 40),
        ]
    );
    let counts = review.priority_counts();
    assert_eq!(counts.total(), review.issues.len());

    let gemini = load_agent_review(&summary.artifacts.agent_review_path(AgentName::Gemini))
        .into_review();
    assert!(gemini.is_placeholder());
    assert!(summary
        .artifacts
        .agent_log_path(AgentName::Gemini)
        .exists());

    let publish = summary.publish.unwrap();
    assert_eq!(publish.posted, 2);
    assert_eq!(publish.failed.len(), 1);
    assert_eq!(
        *host.posted.lock().unwrap(),
        vec![("claude".to_string(), 12), ("claude".to_string(), 40)]
    );

    let on_disk: serde_json::Value = serde_json::from_slice(
        &std::fs::read(summary.artifacts.merged_review_path()).unwrap(),
    )
    .unwrap();
    assert_eq!(on_disk["issues"].as_array().unwrap().len(), 3);
}

#[tokio::test]
async fn resume_reuses_artifacts_without_running_agents() {
    let temp_dir = TempDir::new().unwrap();
    let artifacts = RunArtifactSet::locate(temp_dir.path(), 31, "feat/retries");
    artifacts.prepare_fresh(ExistingRunAction::Clear).unwrap();
    std::fs::write(
        artifacts.agent_review_path(AgentName::Gemini),
        serde_json::to_vec(&AgentReview {
            pr_summary: PrSummary {
                number: 31,
                title: "Add retries".to_string(),
                description: "gemini summary".to_string(),
            },
            issues: vec![finding("gemini", Priority::P2, 3, "docs")],
        })
        .unwrap(),
    )
    .unwrap();

    let host = FakeHost::new();
    let prompter = Prompter {
        choice: None,
        action: ExistingRunAction::Reuse,
    };
    let mut coordinator = RunCoordinator::new(&host, &prompter, config(temp_dir.path()));

    let summary = coordinator
        .run(&RunOptions {
            pr: Some(31),
            selection: ResolvedSelection::all(),
            resume: true,
            post_comments: false,
        })
        .await
        .unwrap()
        .unwrap();

    assert!(summary.agent_reports.is_empty());
    assert_eq!(
        summary.resumed_placeholders,
        vec![AgentName::Claude, AgentName::Codex]
    );
    assert_eq!(summary.review.issues.len(), 1);
    assert!(summary.publish.is_none());
    assert!(host.posted.lock().unwrap().is_empty());

    let claude = load_agent_review(&artifacts.agent_review_path(AgentName::Claude)).into_review();
    assert_eq!(
        claude.pr_summary.description,
        "claude review not found in resume mode"
    );
}

#[tokio::test]
async fn resume_without_prior_run_fails_validation() {
    let temp_dir = TempDir::new().unwrap();
    let host = FakeHost::new();
    let prompter = Prompter {
        choice: None,
        action: ExistingRunAction::Reuse,
    };
    let mut coordinator = RunCoordinator::new(&host, &prompter, config(temp_dir.path()));

    let result = coordinator
        .run(&RunOptions {
            pr: Some(31),
            selection: ResolvedSelection::all(),
            resume: true,
            post_comments: false,
        })
        .await;

    assert!(matches!(result, Err(MaxReviewError::Validation(_))));
    assert!(!temp_dir.path().join("pr-31-feat-retries").exists());
}

#[tokio::test]
async fn interactive_selection_picks_filtered_candidate() {
    let temp_dir = TempDir::new().unwrap();
    let candidate = |number: u64, author: &str| PullRequestCandidate {
        number,
        title: format!("PR {}", number),
        author: author.to_string(),
        head_ref_name: "feat/retries".to_string(),
        requested_reviewers: vec!["bob".to_string()],
        review_authors: vec![],
        additions: 10,
        deletions: 2,
    };
    let host = FakeHost {
        candidates: vec![candidate(30, "me"), candidate(31, "alice")],
        ..FakeHost::new()
    };
    let artifacts = RunArtifactSet::locate(temp_dir.path(), 31, "feat/retries");
    artifacts.prepare_fresh(ExistingRunAction::Clear).unwrap();

    // Index 0 of the filtered list is PR 31, since PR 30 is authored by "me".
    let prompter = Prompter {
        choice: Some(0),
        action: ExistingRunAction::Reuse,
    };
    let mut coordinator = RunCoordinator::new(&host, &prompter, config(temp_dir.path()));

    let summary = coordinator
        .run(&RunOptions {
            pr: None,
            selection: ResolvedSelection::all(),
            resume: true,
            post_comments: true,
        })
        .await
        .unwrap()
        .unwrap();

    assert_eq!(summary.pr.number, 31);
    assert!(!summary.review.has_issues());
    assert_eq!(summary.review.pr_summary.title, "Not run");
}
