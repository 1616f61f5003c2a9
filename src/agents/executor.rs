use crate::agents::prompt::ReviewPrompt;
use crate::agents::spec::ResolvedSelection;
use crate::artifacts::store::{load_agent_review, ArtifactLoad};
use crate::artifacts::RunArtifactSet;
use crate::error::SandboxError;
use crate::sandbox::{Mount, SandboxRequest, SandboxRuntime};
use crate::types::AgentName;
use futures::future::join_all;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, instrument, warn};

/// Settings shared by every agent task in a run
#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    pub agent_timeout: Duration,
    /// Mount point of the PR checkout inside the sandbox
    pub workspace_dir: String,
    /// Mount point of the run directory inside the sandbox
    pub runner_dir: String,
    /// Home directory of the sandbox user, for agent config dirs
    pub container_home: String,
    /// Host directory holding `.claude`, `.codex`, `.gemini`
    pub host_home: Option<PathBuf>,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            agent_timeout: Duration::from_secs(1800),
            workspace_dir: "/workspace".to_string(),
            runner_dir: "/runner".to_string(),
            container_home: "/root".to_string(),
            host_home: None,
        }
    }
}

/// Per-run inputs for the executor
#[derive(Debug, Clone)]
pub struct ExecutionContext {
    pub pr_number: u64,
    pub prompt: ReviewPrompt,
    pub checkout_dir: PathBuf,
    pub credentials: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AgentOutcome {
    Succeeded { issues: usize },
    Failed { reason: String },
    TimedOut { after_secs: u64 },
    NotSelected,
}

/// Terminal state of one agent task
#[derive(Debug, Clone)]
pub struct AgentRunReport {
    pub agent: AgentName,
    pub outcome: AgentOutcome,
    pub elapsed: Duration,
}

impl AgentRunReport {
    pub fn succeeded(&self) -> bool {
        matches!(self.outcome, AgentOutcome::Succeeded { .. })
    }
}

/// Runs review agents concurrently, one sandbox each.
///
/// Failures are contained per agent: a failed, crashed or timed-out agent
/// gets a placeholder review file and never affects its siblings.
pub struct AgentExecutor {
    runtime: Arc<dyn SandboxRuntime>,
    config: ExecutorConfig,
}

impl AgentExecutor {
    pub fn new(runtime: Arc<dyn SandboxRuntime>, config: ExecutorConfig) -> Self {
        Self { runtime, config }
    }

    /// Run every selected agent and wait until all of them reach a terminal state.
    ///
    /// Afterwards the artifact set holds exactly one review file per supported
    /// agent. Reports are returned in canonical agent order.
    #[instrument(skip_all, fields(pr_number = ctx.pr_number))]
    pub async fn run_all(
        &self,
        selection: &ResolvedSelection,
        artifacts: &RunArtifactSet,
        ctx: &ExecutionContext,
    ) -> Vec<AgentRunReport> {
        let mut reports = Vec::new();

        for agent in AgentName::ALL {
            if selection.contains(agent) {
                continue;
            }
            let reason = format!("{} was not selected", agent);
            if let Err(e) = artifacts.write_placeholder(agent, ctx.pr_number, &reason) {
                error!("Failed to write placeholder for {}: {}", agent, e);
            }
            reports.push(AgentRunReport {
                agent,
                outcome: AgentOutcome::NotSelected,
                elapsed: Duration::ZERO,
            });
        }

        info!(
            "Launching {} agent(s) in parallel: {}",
            selection.agents.len(),
            selection
                .agents
                .iter()
                .map(|a| a.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        );

        let tasks = selection
            .agents
            .iter()
            .map(|agent| self.run_agent(*agent, selection.model_for(*agent), artifacts, ctx));
        reports.extend(join_all(tasks).await);

        reports.sort_by_key(|report| report.agent);
        reports
    }

    #[instrument(skip_all, fields(agent = %agent))]
    async fn run_agent(
        &self,
        agent: AgentName,
        model: Option<&str>,
        artifacts: &RunArtifactSet,
        ctx: &ExecutionContext,
    ) -> AgentRunReport {
        let started = Instant::now();
        let review_path = artifacts.agent_review_path(agent);

        // A file left by an earlier run must not pass for this run's output.
        match tokio::fs::remove_file(&review_path).await {
            Ok(()) => debug!("Removed stale review {:?}", review_path),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!("Could not remove stale review {:?}: {}", review_path, e),
        }

        let request = self.build_request(agent, model, artifacts, ctx);
        let result = self.runtime.execute(request).await;

        let outcome = match result {
            Ok(output) => {
                let log_path = artifacts.agent_log_path(agent);
                if let Err(e) = tokio::fs::write(&log_path, output.transcript()).await {
                    warn!("Failed to save {} output log: {}", agent, e);
                }

                if output.success() {
                    match load_agent_review(&review_path) {
                        ArtifactLoad::Parsed(review) => AgentOutcome::Succeeded {
                            issues: review.issues.len(),
                        },
                        other => AgentOutcome::Failed {
                            reason: format!(
                                "{} exited successfully but produced no valid review ({})",
                                agent,
                                other.problem().unwrap_or("unknown problem")
                            ),
                        },
                    }
                } else {
                    AgentOutcome::Failed {
                        reason: format!("{} failed with exit code {}", agent, output.exit_code),
                    }
                }
            }
            Err(SandboxError::Timeout(secs)) => AgentOutcome::TimedOut { after_secs: secs },
            Err(e) => AgentOutcome::Failed {
                reason: format!("{} could not be run: {}", agent, e),
            },
        };

        let placeholder_reason = match &outcome {
            AgentOutcome::Succeeded { issues } => {
                info!("{} review completed with {} issue(s)", agent, issues);
                None
            }
            AgentOutcome::Failed { reason } => Some(reason.clone()),
            AgentOutcome::TimedOut { after_secs } => {
                Some(format!("{} timed out after {}s", agent, after_secs))
            }
            AgentOutcome::NotSelected => None,
        };

        if let Some(reason) = placeholder_reason {
            warn!("{}", reason);
            if let Err(e) = artifacts.write_placeholder(agent, ctx.pr_number, &reason) {
                error!("Failed to write placeholder for {}: {}", agent, e);
            }
        }

        AgentRunReport {
            agent,
            outcome,
            elapsed: started.elapsed(),
        }
    }

    fn build_request(
        &self,
        agent: AgentName,
        model: Option<&str>,
        artifacts: &RunArtifactSet,
        ctx: &ExecutionContext,
    ) -> SandboxRequest {
        let mut mounts = vec![
            Mount::read_write(ctx.checkout_dir.clone(), self.config.workspace_dir.clone()),
            Mount::read_write(artifacts.dir().to_path_buf(), self.config.runner_dir.clone()),
        ];

        if let Some(home) = &self.config.host_home {
            let config_dir = home.join(agent.config_dir());
            if config_dir.is_dir() {
                mounts.push(Mount::read_write(
                    config_dir,
                    format!(
                        "{}/{}",
                        self.config.container_home.trim_end_matches('/'),
                        agent.config_dir()
                    ),
                ));
            }
        }

        SandboxRequest {
            label: format!("pr{}-{}", ctx.pr_number, agent),
            command: agent.command(model),
            stdin: Some(ctx.prompt.render(agent)),
            mounts,
            env: ctx.credentials.clone(),
            workdir: Some(self.config.workspace_dir.clone()),
            timeout: self.config.agent_timeout,
        }
    }
}
