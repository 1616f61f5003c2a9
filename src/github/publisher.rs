use crate::error::MaxReviewError;
use crate::github::host::ReviewHost;
use crate::types::{MergedReview, Priority};
use tracing::{info, instrument, warn};

/// Outcome of posting a merged review
#[derive(Debug, Default)]
pub struct PublishResult {
    pub posted: usize,
    pub failed: Vec<MaxReviewError>,
}

impl PublishResult {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Posts merged findings back to the host, one comment per finding
pub struct ReviewPublisher<'a, H: ReviewHost + ?Sized> {
    host: &'a H,
}

impl<'a, H: ReviewHost + ?Sized> ReviewPublisher<'a, H> {
    pub fn new(host: &'a H) -> Self {
        Self { host }
    }

    /// Post every issue, P0 tier first, in review order within a tier.
    ///
    /// A failed post is recorded and the pass continues; nothing here aborts
    /// the run.
    #[instrument(skip(self, review), fields(issues = review.issues.len()))]
    pub async fn publish(
        &self,
        review: &MergedReview,
        pr_number: u64,
        commit_sha: &str,
    ) -> PublishResult {
        let mut result = PublishResult::default();
        if review.issues.is_empty() {
            return result;
        }

        info!("Posting {} review comment(s) to PR #{}", review.issues.len(), pr_number);

        for priority in Priority::ALL {
            for issue in review.issues_with_priority(priority) {
                match self.host.post_review_comment(pr_number, commit_sha, issue).await {
                    Ok(()) => result.posted += 1,
                    Err(e) => {
                        warn!(
                            "Failed to post {} comment on {}:{}: {}",
                            issue.priority, issue.file, issue.line, e
                        );
                        result.failed.push(e);
                    }
                }
            }
        }

        info!(
            "Posted {} comment(s), {} failed",
            result.posted,
            result.failed.len()
        );
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::github::host::MockReviewHost;
    use crate::types::{IssueFinding, PrSummary};
    use std::sync::{Arc, Mutex};

    fn issue(priority: Priority, line: u32) -> IssueFinding {
        IssueFinding {
            agent: "claude".to_string(),
            priority,
            file: "src/lib.rs".to_string(),
            line,
            commit_id: String::new(),
            category: "bug".to_string(),
            description: "d".to_string(),
            proposed_fix: "f".to_string(),
        }
    }

    fn review(issues: Vec<IssueFinding>) -> MergedReview {
        MergedReview {
            pr_summary: PrSummary {
                number: 5,
                title: "t".to_string(),
                description: String::new(),
            },
            descriptions: vec![],
            issues,
        }
    }

    #[tokio::test]
    async fn test_empty_review_is_noop() {
        let mut host = MockReviewHost::new();
        host.expect_post_review_comment().never();

        let result = ReviewPublisher::new(&host).publish(&review(vec![]), 5, "sha").await;
        assert_eq!(result.posted, 0);
        assert!(result.is_complete());
    }

    #[tokio::test]
    async fn test_posts_by_tier_and_continues_past_failures() {
        let posted_lines = Arc::new(Mutex::new(Vec::new()));
        let recorder = posted_lines.clone();

        let mut host = MockReviewHost::new();
        host.expect_post_review_comment()
            .times(4)
            .returning(move |pr, sha, issue| {
                assert_eq!(pr, 5);
                assert_eq!(sha, "sha");
                recorder.lock().unwrap().push(issue.line);
                if issue.line == 2 {
                    Err(MaxReviewError::HostApi("line not in diff".to_string()))
                } else {
                    Ok(())
                }
            });

        // Not sorted on purpose: tiers decide posting order.
        let merged = review(vec![
            issue(Priority::P2, 1),
            issue(Priority::P0, 2),
            issue(Priority::P1, 3),
            issue(Priority::P0, 4),
        ]);

        let result = ReviewPublisher::new(&host).publish(&merged, 5, "sha").await;

        assert_eq!(*posted_lines.lock().unwrap(), vec![2, 4, 3, 1]);
        assert_eq!(result.posted, 3);
        assert_eq!(result.failed.len(), 1);
        assert!(!result.is_complete());
    }
}
