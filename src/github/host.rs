use crate::error::Result;
use crate::types::{IssueFinding, PullRequestCandidate, PullRequestInfo};
use async_trait::async_trait;

/// Source-control host operations the review run depends on
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ReviewHost: Send + Sync {
    /// `owner/name` of the repository under review
    fn repo(&self) -> String;

    async fn current_user(&self) -> Result<String>;

    async fn list_open_prs_with_reviewers(&self) -> Result<Vec<PullRequestCandidate>>;

    async fn get_pr(&self, number: u64) -> Result<PullRequestInfo>;

    async fn post_review_comment(
        &self,
        pr_number: u64,
        commit_sha: &str,
        issue: &IssueFinding,
    ) -> Result<()>;
}

/// PRs worth offering for review: they have reviewers and `user` is neither
/// the author nor one of the reviewers.
pub fn filter_prs_for_user(
    prs: Vec<PullRequestCandidate>,
    user: &str,
) -> Vec<PullRequestCandidate> {
    prs.into_iter()
        .filter(|pr| pr.has_reviewers() && !pr.involves(user))
        .collect()
}
