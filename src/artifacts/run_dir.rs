use crate::artifacts::store::write_json_atomic;
use crate::error::{MaxReviewError, Result};
use crate::types::{AgentName, AgentReview, MERGED_REVIEW_FILE};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// What to do with a run directory left over from an earlier run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExistingRunAction {
    Clear,
    Reuse,
}

/// The directory holding one review file per agent plus the merged review
/// for a single PR + branch.
///
/// Each agent task writes only its own file; the merged file has a single
/// writer. Nothing here deletes the directory unless the caller chose
/// [`ExistingRunAction::Clear`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunArtifactSet {
    dir: PathBuf,
}

impl RunArtifactSet {
    pub fn dir_name(pr_number: u64, branch: &str) -> String {
        format!("pr-{}-{}", pr_number, branch.replace('/', "-"))
    }

    /// Location of the run directory; does not touch the filesystem.
    pub fn locate(runs_root: &Path, pr_number: u64, branch: &str) -> Self {
        Self {
            dir: runs_root.join(Self::dir_name(pr_number, branch)),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn exists(&self) -> bool {
        self.dir.is_dir()
    }

    pub fn agent_review_path(&self, agent: AgentName) -> PathBuf {
        self.dir.join(agent.artifact_file_name())
    }

    pub fn agent_log_path(&self, agent: AgentName) -> PathBuf {
        self.dir.join(agent.log_file_name())
    }

    pub fn merged_review_path(&self) -> PathBuf {
        self.dir.join(MERGED_REVIEW_FILE)
    }

    /// Where the PR head is checked out for the sandboxes.
    pub fn checkout_dir(&self) -> PathBuf {
        self.dir.join("checkout")
    }

    /// Review file paths for every supported agent, in canonical order.
    pub fn review_paths(&self) -> Vec<(AgentName, PathBuf)> {
        AgentName::ALL
            .iter()
            .map(|agent| (*agent, self.agent_review_path(*agent)))
            .collect()
    }

    /// Create the directory for a fresh run, applying `action` if it already exists.
    pub fn prepare_fresh(&self, action: ExistingRunAction) -> Result<()> {
        if self.exists() {
            match action {
                ExistingRunAction::Clear => {
                    fs::remove_dir_all(&self.dir)?;
                    info!("Removed existing run directory {:?}", self.dir);
                }
                ExistingRunAction::Reuse => {
                    info!("Reusing existing run directory {:?}", self.dir);
                }
            }
        }

        fs::create_dir_all(&self.dir)?;
        info!("Run artifacts directory: {:?}", self.dir);
        Ok(())
    }

    /// Check that a previous run left a directory to resume from.
    pub fn open_existing(&self) -> Result<()> {
        if !self.exists() {
            return Err(MaxReviewError::Validation(format!(
                "Resume mode requested but no artifacts found at {:?}\nRun the agents at least once before using --resume.",
                self.dir
            )));
        }
        info!("Using existing run artifacts directory: {:?}", self.dir);
        Ok(())
    }

    pub fn write_placeholder(&self, agent: AgentName, pr_number: u64, reason: &str) -> Result<()> {
        let review = AgentReview::placeholder(pr_number, reason);
        write_json_atomic(&self.agent_review_path(agent), &review)
    }

    /// Synthesize placeholders for agents whose review file is absent.
    ///
    /// Returns the agents that received one. Existing files are left untouched.
    pub fn fill_missing_placeholders(&self, pr_number: u64) -> Result<Vec<AgentName>> {
        let mut filled = Vec::new();
        for (agent, path) in self.review_paths() {
            if path.exists() {
                info!("Found {} review: {:?}", agent, path);
                continue;
            }
            warn!("No {} review found at {:?}, creating placeholder", agent, path);
            self.write_placeholder(
                agent,
                pr_number,
                &format!("{} review not found in resume mode", agent),
            )?;
            filled.push(agent);
        }
        Ok(filled)
    }
}
