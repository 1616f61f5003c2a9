use crate::agents::executor::{AgentExecutor, AgentRunReport, ExecutionContext};
use crate::agents::prompt::ReviewPrompt;
use crate::agents::spec::ResolvedSelection;
use crate::artifacts::{ExistingRunAction, RunArtifactSet};
use crate::error::{MaxReviewError, Result};
use crate::git::Checkout;
use crate::github::host::{filter_prs_for_user, ReviewHost};
use crate::github::publisher::{PublishResult, ReviewPublisher};
use crate::reports::merger::{MergeOptions, ReviewMerger};
use crate::types::{AgentName, MergedReview, PullRequestCandidate, PullRequestInfo};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::{info, instrument, warn};

/// Interactive decisions the run needs from the user
pub trait RunPrompter: Send + Sync {
    /// Index into `candidates`, or `None` when the user backs out.
    fn select_pr(&self, candidates: &[PullRequestCandidate]) -> Result<Option<usize>>;

    /// Called only when a fresh run finds a directory from an earlier run.
    fn existing_run_action(&self, dir: &Path) -> Result<ExistingRunAction>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    SelectingPr,
    PreparingArtifacts,
    ExecutingAgents,
    Merging,
    Publishing,
    Done,
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RunState::SelectingPr => "selecting PR",
            RunState::PreparingArtifacts => "preparing artifacts",
            RunState::ExecutingAgents => "executing agents",
            RunState::Merging => "merging",
            RunState::Publishing => "publishing",
            RunState::Done => "done",
        };
        f.write_str(name)
    }
}

/// What the caller asked for
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Skip interactive selection
    pub pr: Option<u64>,
    pub selection: ResolvedSelection,
    pub resume: bool,
    pub post_comments: bool,
}

#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    pub runs_root: PathBuf,
    pub workspace_dir: String,
    pub runner_dir: String,
    pub merge: MergeOptions,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            runs_root: PathBuf::from("runs"),
            workspace_dir: "/workspace".to_string(),
            runner_dir: "/runner".to_string(),
            merge: MergeOptions::default(),
        }
    }
}

/// Everything a finished run produced
#[derive(Debug)]
pub struct RunSummary {
    pub pr: PullRequestInfo,
    pub artifacts: RunArtifactSet,
    pub review: MergedReview,
    /// Empty in resume mode
    pub agent_reports: Vec<AgentRunReport>,
    /// Agents that got a placeholder because resume found no file
    pub resumed_placeholders: Vec<AgentName>,
    /// `None` when posting was disabled or there was nothing to post
    pub publish: Option<PublishResult>,
}

/// Drives one review run from PR selection to publishing.
///
/// Only the executor runs work concurrently; every other step runs in order
/// on the caller's task. Dropping the future returned by [`RunCoordinator::run`]
/// cancels in-flight agents and leaves existing artifact files in place.
pub struct RunCoordinator<'a> {
    host: &'a dyn ReviewHost,
    prompter: &'a dyn RunPrompter,
    executor: Option<&'a AgentExecutor>,
    checkout: Option<&'a dyn Checkout>,
    credentials: BTreeMap<String, String>,
    config: CoordinatorConfig,
    state: RunState,
}

impl<'a> RunCoordinator<'a> {
    pub fn new(
        host: &'a dyn ReviewHost,
        prompter: &'a dyn RunPrompter,
        config: CoordinatorConfig,
    ) -> Self {
        Self {
            host,
            prompter,
            executor: None,
            checkout: None,
            credentials: BTreeMap::new(),
            config,
            state: RunState::SelectingPr,
        }
    }

    /// Required for fresh runs; resume runs never execute agents.
    pub fn with_executor(
        mut self,
        executor: &'a AgentExecutor,
        checkout: &'a dyn Checkout,
        credentials: BTreeMap<String, String>,
    ) -> Self {
        self.executor = Some(executor);
        self.checkout = Some(checkout);
        self.credentials = credentials;
        self
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    fn enter(&mut self, state: RunState) {
        info!("Run state: {} -> {}", self.state, state);
        self.state = state;
    }

    /// Execute the run. Returns `Ok(None)` when there is no PR to review.
    #[instrument(skip_all, fields(resume = options.resume, pr = ?options.pr))]
    pub async fn run(&mut self, options: &RunOptions) -> Result<Option<RunSummary>> {
        self.state = RunState::SelectingPr;
        let pr_number = match options.pr {
            Some(number) => {
                info!("Using PR #{} from command line", number);
                number
            }
            None => match self.select_pr().await? {
                Some(number) => number,
                None => return Ok(None),
            },
        };

        let pr = self.host.get_pr(pr_number).await?;
        info!("Found PR #{} with branch: {}", pr.number, pr.head_ref_name);
        if pr.head_ref_oid.is_empty() {
            warn!("Unable to determine the PR head commit SHA");
        }

        self.enter(RunState::PreparingArtifacts);
        let artifacts =
            RunArtifactSet::locate(&self.config.runs_root, pr.number, &pr.head_ref_name);

        let mut agent_reports = Vec::new();
        let mut resumed_placeholders = Vec::new();

        if options.resume {
            artifacts.open_existing()?;
            resumed_placeholders = artifacts.fill_missing_placeholders(pr.number)?;
        } else {
            let (executor, checkout) = match (self.executor, self.checkout) {
                (Some(executor), Some(checkout)) => (executor, checkout),
                _ => {
                    return Err(MaxReviewError::Validation(
                        "A fresh run needs a sandbox executor".to_string(),
                    ))
                }
            };

            let action = if artifacts.exists() {
                self.prompter.existing_run_action(artifacts.dir())?
            } else {
                ExistingRunAction::Clear
            };
            artifacts.prepare_fresh(action)?;
            checkout
                .prepare(pr.number, &pr.head_ref_oid, &artifacts.checkout_dir())
                .await?;

            self.enter(RunState::ExecutingAgents);
            let ctx = ExecutionContext {
                pr_number: pr.number,
                prompt: ReviewPrompt {
                    repo: self.host.repo(),
                    pr_number: pr.number,
                    commit_sha: pr.head_ref_oid.clone(),
                    workspace_dir: self.config.workspace_dir.clone(),
                    runner_dir: self.config.runner_dir.clone(),
                },
                checkout_dir: artifacts.checkout_dir(),
                credentials: self.credentials.clone(),
            };
            agent_reports = executor.run_all(&options.selection, &artifacts, &ctx).await;
        }

        self.enter(RunState::Merging);
        let paths: Vec<PathBuf> = artifacts
            .review_paths()
            .into_iter()
            .map(|(_, path)| path)
            .collect();
        let review = ReviewMerger::new(self.config.merge)
            .merge_to_file(&paths, &artifacts.merged_review_path())?;

        self.enter(RunState::Publishing);
        let publish = if options.post_comments && review.has_issues() {
            let result = ReviewPublisher::new(self.host)
                .publish(&review, pr.number, &pr.head_ref_oid)
                .await;
            if !result.is_complete() {
                warn!(
                    "{} of {} comment(s) could not be posted",
                    result.failed.len(),
                    result.failed.len() + result.posted
                );
            }
            Some(result)
        } else {
            None
        };

        self.enter(RunState::Done);
        Ok(Some(RunSummary {
            pr,
            artifacts,
            review,
            agent_reports,
            resumed_placeholders,
            publish,
        }))
    }

    async fn select_pr(&self) -> Result<Option<u64>> {
        let user = self.host.current_user().await?;
        info!("Current user: {}", user);

        let prs = self.host.list_open_prs_with_reviewers().await?;
        let candidates = filter_prs_for_user(prs, &user);
        if candidates.is_empty() {
            warn!(
                "No open PRs with reviewers found in {} (excluding PRs where you are the author or reviewer)",
                self.host.repo()
            );
            return Ok(None);
        }
        info!("Found {} PR(s) with reviewers", candidates.len());

        Ok(self
            .prompter
            .select_pr(&candidates)?
            .and_then(|index| candidates.get(index))
            .map(|pr| pr.number))
    }
}
