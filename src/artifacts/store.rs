use crate::error::{MaxReviewError, Result};
use crate::types::{AgentReview, PrSummary, PLACEHOLDER_TITLE};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::Path;
use tempfile::NamedTempFile;
use tracing::debug;

/// Result of reading one per-agent artifact file
#[derive(Debug, Clone)]
pub enum ArtifactLoad {
    /// File parsed as a complete review
    Parsed(AgentReview),
    /// File existed but was not a valid review; only the summary could be recovered
    Salvaged { review: AgentReview, reason: String },
    /// File could not be read at all
    Missing { review: AgentReview, reason: String },
}

impl ArtifactLoad {
    pub fn into_review(self) -> AgentReview {
        match self {
            ArtifactLoad::Parsed(review) => review,
            ArtifactLoad::Salvaged { review, .. } => review,
            ArtifactLoad::Missing { review, .. } => review,
        }
    }

    pub fn is_usable(&self) -> bool {
        matches!(self, ArtifactLoad::Parsed(_))
    }

    pub fn problem(&self) -> Option<&str> {
        match self {
            ArtifactLoad::Parsed(_) => None,
            ArtifactLoad::Salvaged { reason, .. } | ArtifactLoad::Missing { reason, .. } => {
                Some(reason)
            }
        }
    }
}

/// Loose view of an artifact used to recover the summary from a malformed file
#[derive(Debug, Deserialize)]
struct SummaryOnly {
    pr_summary: Option<LoosePrSummary>,
}

#[derive(Debug, Deserialize)]
struct LoosePrSummary {
    number: Option<u64>,
    title: Option<String>,
    description: Option<String>,
}

fn empty_review() -> AgentReview {
    AgentReview::placeholder(0, String::new())
}

/// Read an agent's review. Never fails: problems are described in the result.
pub fn load_agent_review(path: &Path) -> ArtifactLoad {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) => {
            return ArtifactLoad::Missing {
                review: empty_review(),
                reason: format!("failed to read {:?}: {}", path, e),
            }
        }
    };

    match serde_json::from_str::<AgentReview>(&content) {
        Ok(review) => {
            debug!("Loaded {} issue(s) from {:?}", review.issues.len(), path);
            ArtifactLoad::Parsed(review)
        }
        Err(parse_error) => {
            let summary = serde_json::from_str::<SummaryOnly>(&content)
                .ok()
                .and_then(|s| s.pr_summary);
            let review = match summary {
                Some(summary) => AgentReview {
                    pr_summary: PrSummary {
                        number: summary.number.unwrap_or(0),
                        title: summary.title.unwrap_or_else(|| PLACEHOLDER_TITLE.to_string()),
                        description: summary.description.unwrap_or_default(),
                    },
                    issues: Vec::new(),
                },
                None => empty_review(),
            };
            ArtifactLoad::Salvaged {
                review,
                reason: format!("failed to parse {:?}: {}", path, parse_error),
            }
        }
    }
}

/// Serialize `value` as pretty JSON and atomically replace `path`.
///
/// The data is written to a temporary file in the same directory and renamed
/// over the target, so readers see either the old file or the complete new one.
pub fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));

    let content = serde_json::to_string_pretty(value)?;
    let mut tmp = NamedTempFile::new_in(dir).map_err(|e| {
        MaxReviewError::Review(format!("failed to create temporary file in {:?}: {}", dir, e))
    })?;
    tmp.write_all(content.as_bytes())?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| {
        MaxReviewError::Review(format!("failed to replace {:?}: {}", path, e.error))
    })?;

    debug!("Wrote {:?}", path);
    Ok(())
}
