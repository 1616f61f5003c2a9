use crate::artifacts::store::{load_agent_review, write_json_atomic};
use crate::error::{MaxReviewError, Result};
use crate::types::{AgentReview, IssueFinding, MergedReview, PrSummary, PLACEHOLDER_TITLE};
use indexmap::IndexSet;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, instrument, warn};

/// Knobs for duplicate detection
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeOptions {
    /// Findings with the same file and category whose lines differ by at most
    /// this much are duplicates. `0` means the line must match exactly.
    #[serde(default)]
    pub line_tolerance: u32,
}

/// Combines per-agent reviews into one deduplicated, priority-ordered review
#[derive(Debug, Clone, Default)]
pub struct ReviewMerger {
    options: MergeOptions,
}

impl ReviewMerger {
    pub fn new(options: MergeOptions) -> Self {
        Self { options }
    }

    /// Load and merge the given review files, in the order given.
    ///
    /// A missing or corrupt file contributes no issues and is logged; the
    /// merge fails only when no file could be parsed.
    #[instrument(skip_all, fields(files = paths.len()))]
    pub fn merge(&self, paths: &[PathBuf]) -> Result<MergedReview> {
        let mut reviews = Vec::with_capacity(paths.len());
        let mut usable = 0;

        for path in paths {
            let loaded = load_agent_review(path);
            if let Some(problem) = loaded.problem() {
                warn!("Treating review as empty: {}", problem);
            } else {
                usable += 1;
            }
            reviews.push(loaded.into_review());
        }

        if usable == 0 {
            return Err(MaxReviewError::Review(format!(
                "none of the {} review file(s) could be read",
                paths.len()
            )));
        }

        Ok(self.merge_reviews(reviews))
    }

    /// Merge, then atomically persist the result to `output`.
    pub fn merge_to_file(&self, paths: &[PathBuf], output: &Path) -> Result<MergedReview> {
        let merged = self.merge(paths)?;
        write_json_atomic(output, &merged)?;
        info!(
            "Merged review with {} issue(s) saved to {:?}",
            merged.issues.len(),
            output
        );
        Ok(merged)
    }

    /// Pure merge of already-loaded reviews, processed in the given order.
    pub fn merge_reviews(&self, reviews: Vec<AgentReview>) -> MergedReview {
        let headline = reviews
            .iter()
            .find(|r| !r.pr_summary.title.is_empty() && r.pr_summary.title != PLACEHOLDER_TITLE);

        let number = reviews
            .iter()
            .map(|r| r.pr_summary.number)
            .find(|n| *n != 0)
            .unwrap_or(0);

        let pr_summary = PrSummary {
            number,
            title: headline
                .map(|r| r.pr_summary.title.clone())
                .unwrap_or_else(|| PLACEHOLDER_TITLE.to_string()),
            description: headline
                .map(|r| r.pr_summary.description.clone())
                .unwrap_or_default(),
        };

        let descriptions = reviews
            .iter()
            .map(|r| r.pr_summary.description.clone())
            .filter(|d| !d.is_empty())
            .collect();

        let all_issues: Vec<IssueFinding> = reviews.into_iter().flat_map(|r| r.issues).collect();
        let total = all_issues.len();

        let mut issues = deduplicate(all_issues, self.options.line_tolerance);
        sort_by_priority(&mut issues);

        if issues.len() < total {
            info!("Collapsed {} duplicate finding(s)", total - issues.len());
        }

        MergedReview {
            pr_summary,
            descriptions,
            issues,
        }
    }
}

/// Drop findings that repeat an earlier one, keeping the first occurrence.
///
/// With `line_tolerance == 0` the key is `(file, line, category)`, tracked in
/// an insertion-ordered set.
pub fn deduplicate(issues: Vec<IssueFinding>, line_tolerance: u32) -> Vec<IssueFinding> {
    if line_tolerance == 0 {
        let mut seen: IndexSet<(String, u32, String)> = IndexSet::new();
        return issues
            .into_iter()
            .filter(|issue| seen.insert((issue.file.clone(), issue.line, issue.category.clone())))
            .collect();
    }

    let mut kept: Vec<IssueFinding> = Vec::new();
    for issue in issues {
        let duplicate = kept.iter().any(|k| {
            k.file == issue.file
                && k.category == issue.category
                && k.line.abs_diff(issue.line) <= line_tolerance
        });
        if !duplicate {
            kept.push(issue);
        }
    }
    kept
}

/// Stable sort by priority rank: P0 first, ties keep their order.
pub fn sort_by_priority(issues: &mut [IssueFinding]) {
    issues.sort_by_key(|issue| issue.priority.rank());
}
