use crate::error::MaxReviewError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// Core types for the multi-model review pipeline

/// Title written by agents (or the executor) when a review did not run.
pub const PLACEHOLDER_TITLE: &str = "Not run";

/// File name of the consolidated review inside a run directory.
pub const MERGED_REVIEW_FILE: &str = "merged-review.json";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentName {
    Claude,
    Codex,
    Gemini,
}

impl AgentName {
    /// Every supported agent, in the canonical processing order.
    pub const ALL: [AgentName; 3] = [AgentName::Claude, AgentName::Codex, AgentName::Gemini];

    pub fn as_str(&self) -> &'static str {
        match self {
            AgentName::Claude => "claude",
            AgentName::Codex => "codex",
            AgentName::Gemini => "gemini",
        }
    }

    /// Fixed invocation for the agent's CLI inside the sandbox.
    pub fn command_template(&self) -> &'static [&'static str] {
        match self {
            AgentName::Claude => &[
                "claude",
                "--print",
                "--output-format",
                "stream-json",
                "--verbose",
                "--dangerously-skip-permissions",
            ],
            AgentName::Codex => &["codex", "exec", "--yolo"],
            AgentName::Gemini => &["gemini", "--output-format", "text", "--yolo"],
        }
    }

    /// Build the argv for this agent, appending the model override when present.
    pub fn command(&self, model: Option<&str>) -> Vec<String> {
        let mut argv: Vec<String> = self
            .command_template()
            .iter()
            .map(|part| part.to_string())
            .collect();
        if let Some(model) = model {
            argv.push("--model".to_string());
            argv.push(model.to_string());
        }
        argv
    }

    /// Per-agent configuration directory under the user's home.
    pub fn config_dir(&self) -> &'static str {
        match self {
            AgentName::Claude => ".claude",
            AgentName::Codex => ".codex",
            AgentName::Gemini => ".gemini",
        }
    }

    pub fn artifact_file_name(&self) -> String {
        format!("{}-review.json", self.as_str())
    }

    pub fn log_file_name(&self) -> String {
        format!("{}-output.log", self.as_str())
    }

    pub fn supported_list() -> String {
        AgentName::ALL
            .iter()
            .map(|a| a.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

impl fmt::Display for AgentName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AgentName {
    type Err = MaxReviewError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "claude" => Ok(AgentName::Claude),
            "codex" => Ok(AgentName::Codex),
            "gemini" => Ok(AgentName::Gemini),
            other => Err(MaxReviewError::Validation(format!(
                "Invalid agent '{}'. Valid agents are: {}",
                other,
                AgentName::supported_list()
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Priority {
    P0,
    P1,
    P2,
}

impl Priority {
    pub const ALL: [Priority; 3] = [Priority::P0, Priority::P1, Priority::P2];

    pub fn rank(&self) -> u8 {
        match self {
            Priority::P0 => 0,
            Priority::P1 => 1,
            Priority::P2 => 2,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Priority::P0 => "P0 - Critical",
            Priority::P1 => "P1 - Important",
            Priority::P2 => "P2 - Suggestion",
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Priority::P0 => "P0",
            Priority::P1 => "P1",
            Priority::P2 => "P2",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssueFinding {
    pub agent: String,
    pub priority: Priority,
    pub file: String,
    pub line: u32,
    #[serde(default)]
    pub commit_id: String,
    pub category: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub proposed_fix: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrSummary {
    pub number: u64,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentReview {
    pub pr_summary: PrSummary,
    #[serde(default)]
    pub issues: Vec<IssueFinding>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergedReview {
    pub pr_summary: PrSummary,
    pub descriptions: Vec<String>,
    pub issues: Vec<IssueFinding>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriorityCounts {
    pub p0: usize,
    pub p1: usize,
    pub p2: usize,
}

/// Metadata for a pull request as returned by the host
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PullRequestInfo {
    pub number: u64,
    pub title: String,
    pub head_ref_name: String,
    pub head_ref_oid: String,
}

/// An open pull request together with its reviewer set
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PullRequestCandidate {
    pub number: u64,
    pub title: String,
    pub author: String,
    pub head_ref_name: String,
    pub requested_reviewers: Vec<String>,
    pub review_authors: Vec<String>,
    pub additions: u64,
    pub deletions: u64,
}

impl AgentReview {
    /// Stand-in report for an agent that did not produce one.
    pub fn placeholder(pr_number: u64, reason: impl Into<String>) -> Self {
        Self {
            pr_summary: PrSummary {
                number: pr_number,
                title: PLACEHOLDER_TITLE.to_string(),
                description: reason.into(),
            },
            issues: Vec::new(),
        }
    }

    pub fn is_placeholder(&self) -> bool {
        self.pr_summary.title == PLACEHOLDER_TITLE
    }
}

impl MergedReview {
    pub fn priority_counts(&self) -> PriorityCounts {
        let mut counts = PriorityCounts::default();
        for issue in &self.issues {
            match issue.priority {
                Priority::P0 => counts.p0 += 1,
                Priority::P1 => counts.p1 += 1,
                Priority::P2 => counts.p2 += 1,
            }
        }
        counts
    }

    pub fn issues_with_priority(&self, priority: Priority) -> impl Iterator<Item = &IssueFinding> {
        self.issues.iter().filter(move |issue| issue.priority == priority)
    }

    pub fn has_issues(&self) -> bool {
        !self.issues.is_empty()
    }
}

impl PriorityCounts {
    pub fn total(&self) -> usize {
        self.p0 + self.p1 + self.p2
    }

    pub fn get(&self, priority: Priority) -> usize {
        match priority {
            Priority::P0 => self.p0,
            Priority::P1 => self.p1,
            Priority::P2 => self.p2,
        }
    }
}

impl PullRequestCandidate {
    /// Union of requested reviewers and users who already reviewed, first-seen order.
    pub fn all_reviewers(&self) -> Vec<String> {
        let mut reviewers: Vec<String> = Vec::new();
        for login in self.requested_reviewers.iter().chain(self.review_authors.iter()) {
            if !reviewers.contains(login) {
                reviewers.push(login.clone());
            }
        }
        reviewers
    }

    pub fn has_reviewers(&self) -> bool {
        !self.requested_reviewers.is_empty() || !self.review_authors.is_empty()
    }

    pub fn involves(&self, login: &str) -> bool {
        self.author == login || self.all_reviewers().iter().any(|r| r == login)
    }
}
