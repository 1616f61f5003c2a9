use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use dialoguer::{Confirm, Select};
use maxreview::{
    agents::{resolve, AgentExecutor, AgentOutcome, AgentRunReport, ResolvedSelection},
    artifacts::ExistingRunAction,
    config::{default_env_file, Config, Credentials, DEFAULT_CONFIG_TEMPLATE},
    coordinator::{RunCoordinator, RunOptions, RunPrompter, RunSummary},
    git::{detect_repo, GitCloneCheckout},
    github::GitHubClient,
    reports::render_text,
    sandbox::{DockerRuntime, SandboxRuntime},
    types::{AgentName, PullRequestCandidate},
    error::SandboxError,
    MaxReviewError,
};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "maxreview")]
#[command(about = "Multi-model AI code review for GitHub pull requests")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Pull request number (skips interactive selection)
    #[arg(long)]
    pr: Option<u64>,

    /// Agents to run, e.g. "claude:opus,codex" (ignored with --resume)
    #[arg(long)]
    agent: Option<String>,

    /// Reuse agent results from a previous run instead of running agents
    #[arg(long)]
    resume: bool,

    /// Configuration file path
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Credentials file (defaults to ~/.maxreview)
    #[arg(long)]
    env_file: Option<PathBuf>,

    /// Log level
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Do not post review comments to the PR
    #[arg(long)]
    no_post: bool,

    /// Clear an existing run directory without asking
    #[arg(short, long)]
    yes: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a commented default configuration file
    InitConfig {
        #[arg(short, long, default_value = "maxreview.yml")]
        path: PathBuf,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if let Err(e) = init_tracing(&cli.log_level) {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }

    let result = match &cli.command {
        Some(Commands::InitConfig { path }) => init_config(path).await,
        None => {
            tokio::select! {
                result = review(&cli) => result,
                _ = signal::ctrl_c() => Err(MaxReviewError::Interrupted.into()),
            }
        }
    };

    if let Err(e) = result {
        let code = e
            .downcast_ref::<MaxReviewError>()
            .map(MaxReviewError::exit_code)
            .unwrap_or(1);
        if code == 130 {
            eprintln!("Operation cancelled by user");
        } else {
            eprintln!("Error: {:#}", e);
        }
        std::process::exit(code);
    }
}

/// Initialize tracing with the specified log level
fn init_tracing(log_level: &str) -> Result<()> {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new(log_level))
        .context("Failed to create env filter")?;

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_thread_ids(true)
                .with_level(true),
        )
        .with(env_filter)
        .init();

    Ok(())
}

fn check_dependencies(resume: bool) -> Result<(), MaxReviewError> {
    let mut required = vec!["git"];
    if !resume {
        required.push("docker");
    }

    let missing: Vec<String> = required
        .into_iter()
        .filter(|tool| which::which(tool).is_err())
        .map(String::from)
        .collect();

    if missing.is_empty() {
        Ok(())
    } else {
        Err(MaxReviewError::Dependency(missing))
    }
}

fn agent_selection(cli: &Cli, config: &Config) -> Result<ResolvedSelection> {
    if cli.resume {
        if cli.agent.is_some() {
            warn!("--agent option is ignored when --resume is used");
        }
        return Ok(ResolvedSelection::all());
    }

    let spec = cli
        .agent
        .clone()
        .unwrap_or_else(|| config.default_agent_spec());
    Ok(resolve(&spec)?)
}

/// Run a full review: select the PR, run or reuse agents, merge, publish
async fn review(cli: &Cli) -> Result<()> {
    let config = Config::load(cli.config.as_deref()).context("Failed to load configuration")?;
    let selection = agent_selection(cli, &config)?;
    check_dependencies(cli.resume)?;

    let env_file = cli.env_file.clone().or_else(default_env_file);
    let credentials =
        Credentials::load(env_file.as_deref()).context("Failed to load credentials")?;

    let repo = match credentials
        .repo_override()
        .map(String::from)
        .or_else(|| config.github.repo.clone())
    {
        Some(repo) => repo,
        None => detect_repo().await?,
    };
    info!("Repository: {}", repo);

    let token = credentials.github_token().map(String::from);
    if token.is_none() {
        warn!("GITHUB_TOKEN environment variable is not set");
        warn!("The AI agents may not be able to access GitHub API inside the container");
    }

    let host = GitHubClient::new(&repo, token)?;
    let prompter = TerminalPrompter { assume_yes: cli.yes };
    let options = RunOptions {
        pr: cli.pr,
        selection,
        resume: cli.resume,
        post_comments: config.github.post_comments && !cli.no_post,
    };

    let summary = if cli.resume {
        info!("Resume mode: reusing previous agent results");
        let mut coordinator = RunCoordinator::new(&host, &prompter, config.coordinator_config());
        coordinator.run(&options).await?
    } else {
        let runtime = Arc::new(DockerRuntime::new(
            config.sandbox.image.clone(),
            config.sandbox.dockerfile_dir.clone(),
        ));
        if !runtime.is_available().await {
            let reason = format!("{} daemon is not running", runtime.name());
            return Err(MaxReviewError::from(SandboxError::NotAvailable(reason)).into());
        }
        runtime
            .ensure_image()
            .await
            .map_err(MaxReviewError::from)
            .context("Failed to prepare the sandbox image")?;

        let host_home = directories::BaseDirs::new().map(|dirs| dirs.home_dir().to_path_buf());
        let executor = AgentExecutor::new(runtime, config.executor_config(host_home));
        let checkout = GitCloneCheckout;

        let mut coordinator = RunCoordinator::new(&host, &prompter, config.coordinator_config())
            .with_executor(&executor, &checkout, credentials.sandbox_env());
        coordinator.run(&options).await?
    };

    match summary {
        Some(summary) => display_summary(&summary),
        None => println!("No pull request selected; nothing to review."),
    }
    Ok(())
}

fn display_summary(summary: &RunSummary) {
    if !summary.agent_reports.is_empty() {
        println!("Agent results:");
        for report in &summary.agent_reports {
            println!("  {}", describe_report(report));
        }
        println!();
    }

    print!("{}", render_text(&summary.review));

    println!("\nIndividual reviews saved:");
    for (_, path) in summary.artifacts.review_paths() {
        println!("  {}", path.display());
    }
    println!(
        "Merged review saved to: {}",
        summary.artifacts.merged_review_path().display()
    );

    if let Some(publish) = &summary.publish {
        println!(
            "\nPosted {} comment(s) to PR #{}",
            publish.posted, summary.pr.number
        );
        for failure in &publish.failed {
            println!("  failed: {}", failure);
        }
    }

    println!("\nReview artifacts directory:\n  {}", summary.artifacts.dir().display());
    println!("Need a local checkout? Run:\n  gh pr checkout {}", summary.pr.number);
}

fn describe_report(report: &AgentRunReport) -> String {
    let status = match &report.outcome {
        AgentOutcome::Succeeded { issues } => format!("✅ {} issue(s)", issues),
        AgentOutcome::Failed { reason } => format!("❌ {}", reason),
        AgentOutcome::TimedOut { after_secs } => format!("⏱ timed out after {}s", after_secs),
        AgentOutcome::NotSelected => "skipped".to_string(),
    };
    format!(
        "{:<7} {} ({:.0}s)",
        report.agent.as_str(),
        status,
        report.elapsed.as_secs_f64()
    )
}

/// Terminal prompts backed by dialoguer
struct TerminalPrompter {
    assume_yes: bool,
}

impl RunPrompter for TerminalPrompter {
    fn select_pr(
        &self,
        candidates: &[PullRequestCandidate],
    ) -> maxreview::Result<Option<usize>> {
        let items: Vec<String> = candidates
            .iter()
            .map(|pr| {
                let reviewers = pr.all_reviewers();
                format!(
                    "#{} {} | {} | {} | reviewers: {} | +{}/-{}",
                    pr.number,
                    pr.title,
                    pr.author,
                    pr.head_ref_name,
                    if reviewers.is_empty() {
                        "None".to_string()
                    } else {
                        reviewers.join(", ")
                    },
                    pr.additions,
                    pr.deletions
                )
            })
            .collect();

        Select::new()
            .with_prompt("Select a PR to review")
            .items(&items)
            .default(0)
            .interact_opt()
            .map_err(|e| prompt_error(e, "PR selection"))
    }

    fn existing_run_action(&self, dir: &Path) -> maxreview::Result<ExistingRunAction> {
        if self.assume_yes {
            return Ok(ExistingRunAction::Clear);
        }

        warn!("Run directory already exists: {:?}", dir);
        let clear = Confirm::new()
            .with_prompt("Delete existing artifacts and start fresh?")
            .default(false)
            .interact()
            .map_err(|e| prompt_error(e, "Confirmation"))?;

        Ok(if clear {
            ExistingRunAction::Clear
        } else {
            ExistingRunAction::Reuse
        })
    }
}

/// Map a dialoguer failure to the run error taxonomy; ctrl-c at a prompt is a cancellation
fn prompt_error(e: dialoguer::Error, what: &str) -> MaxReviewError {
    match e {
        dialoguer::Error::IO(err) if err.kind() == io::ErrorKind::Interrupted => {
            MaxReviewError::Interrupted
        }
        other => MaxReviewError::Validation(format!("{} failed: {}", what, other)),
    }
}

/// Initialize configuration file
async fn init_config(path: &Path) -> Result<()> {
    info!("Initializing configuration file: {:?}", path);

    if path.exists() {
        warn!("Configuration file already exists: {:?}", path);
        let overwrite = Confirm::new()
            .with_prompt("Overwrite existing file?")
            .default(false)
            .interact()
            .map_err(|e| prompt_error(e, "Confirmation"))?;
        if !overwrite {
            info!("Configuration initialization cancelled");
            return Ok(());
        }
    }

    tokio::fs::write(path, DEFAULT_CONFIG_TEMPLATE)
        .await
        .with_context(|| format!("Failed to write configuration file: {:?}", path))?;

    println!("Configuration file created: {:?}", path);
    println!(
        "Edit this file to customize the review run. Supported agents: {}",
        AgentName::supported_list()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interrupted_prompt_is_cancellation() {
        let err = dialoguer::Error::IO(io::Error::new(io::ErrorKind::Interrupted, "ctrl-c"));
        let mapped = prompt_error(err, "PR selection");
        assert!(matches!(mapped, MaxReviewError::Interrupted));
        assert_eq!(mapped.exit_code(), 130);

        // Still recognised after passing through anyhow in `main`.
        let wrapped: anyhow::Error = mapped.into();
        let code = wrapped
            .downcast_ref::<MaxReviewError>()
            .map(MaxReviewError::exit_code);
        assert_eq!(code, Some(130));
    }

    #[test]
    fn test_other_prompt_failures_are_validation_errors() {
        let err = dialoguer::Error::IO(io::Error::new(io::ErrorKind::BrokenPipe, "no tty"));
        let mapped = prompt_error(err, "Confirmation");
        assert!(matches!(
            mapped,
            MaxReviewError::Validation(ref m) if m.starts_with("Confirmation")
        ));
        assert_eq!(mapped.exit_code(), 1);
    }
}
