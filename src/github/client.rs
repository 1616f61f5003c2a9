use crate::error::{MaxReviewError, Result};
use crate::github::host::ReviewHost;
use crate::reports::formatters::comment_body;
use crate::types::{IssueFinding, PullRequestCandidate, PullRequestInfo};
use async_trait::async_trait;
use futures::future::try_join_all;
use octocrab::{Octocrab, Page};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

#[derive(Debug, Deserialize)]
struct RawUser {
    login: String,
}

#[derive(Debug, Deserialize)]
struct RawHead {
    #[serde(rename = "ref")]
    ref_name: String,
    sha: String,
}

#[derive(Debug, Deserialize)]
struct RawPull {
    number: u64,
    title: Option<String>,
    user: Option<RawUser>,
    head: RawHead,
    #[serde(default)]
    requested_reviewers: Option<Vec<RawUser>>,
    #[serde(default)]
    additions: Option<u64>,
    #[serde(default)]
    deletions: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct RawReview {
    user: Option<RawUser>,
}

#[derive(Debug, Serialize)]
struct ListParams {
    state: &'static str,
    per_page: u8,
}

#[derive(Debug, Serialize)]
struct ReviewCommentBody<'a> {
    body: String,
    commit_id: &'a str,
    path: &'a str,
    line: u32,
    side: &'static str,
}

/// GitHub API client for PR review runs
pub struct GitHubClient {
    client: Octocrab,
    owner: String,
    repo_name: String,
}

impl GitHubClient {
    /// Create a client for `repo` (`owner/name`), authenticated when a token is given
    pub fn new(repo: &str, token: Option<String>) -> Result<Self> {
        let (owner, repo_name) = parse_repo(repo)?;

        let mut builder = Octocrab::builder();
        if let Some(token) = token {
            builder = builder.personal_token(token);
        }
        let client = builder.build().map_err(|e| {
            MaxReviewError::HostApi(format!("Failed to create GitHub client: {}", e))
        })?;

        Ok(Self {
            client,
            owner,
            repo_name,
        })
    }

    fn route(&self, suffix: &str) -> String {
        format!("/repos/{}/{}/{}", self.owner, self.repo_name, suffix)
    }

    async fn review_authors(&self, number: u64) -> Result<Vec<String>> {
        let reviews: Vec<RawReview> = self
            .client
            .get(self.route(&format!("pulls/{}/reviews", number)), None::<&()>)
            .await
            .map_err(|e| {
                MaxReviewError::HostApi(format!(
                    "Failed to fetch reviews for PR #{}: {}",
                    number, e
                ))
            })?;

        let mut authors = Vec::new();
        for login in reviews.into_iter().filter_map(|r| r.user.map(|u| u.login)) {
            if !authors.contains(&login) {
                authors.push(login);
            }
        }
        Ok(authors)
    }

    async fn fetch_pull(&self, number: u64) -> Result<RawPull> {
        self.client
            .get(self.route(&format!("pulls/{}", number)), None::<&()>)
            .await
            .map_err(|e| MaxReviewError::HostApi(format!("Failed to fetch PR #{}: {}", number, e)))
    }

    /// The list endpoint omits diff stats, so each candidate also needs its detail payload
    async fn candidate(&self, listed: RawPull) -> Result<PullRequestCandidate> {
        let (detail, review_authors) =
            tokio::try_join!(self.fetch_pull(listed.number), self.review_authors(listed.number))?;
        Ok(candidate_from(listed, &detail, review_authors))
    }
}

fn candidate_from(
    listed: RawPull,
    detail: &RawPull,
    review_authors: Vec<String>,
) -> PullRequestCandidate {
    PullRequestCandidate {
        number: listed.number,
        title: listed.title.unwrap_or_default(),
        author: listed
            .user
            .map(|u| u.login)
            .unwrap_or_else(|| "unknown".to_string()),
        head_ref_name: listed.head.ref_name,
        requested_reviewers: listed
            .requested_reviewers
            .unwrap_or_default()
            .into_iter()
            .map(|u| u.login)
            .collect(),
        review_authors,
        additions: detail.additions.or(listed.additions).unwrap_or(0),
        deletions: detail.deletions.or(listed.deletions).unwrap_or(0),
    }
}

#[async_trait]
impl ReviewHost for GitHubClient {
    fn repo(&self) -> String {
        format!("{}/{}", self.owner, self.repo_name)
    }

    async fn current_user(&self) -> Result<String> {
        let user: RawUser = self
            .client
            .get("/user", None::<&()>)
            .await
            .map_err(|e| {
                MaxReviewError::HostApi(format!("Failed to authenticate with GitHub: {}", e))
            })?;
        Ok(user.login)
    }

    async fn list_open_prs_with_reviewers(&self) -> Result<Vec<PullRequestCandidate>> {
        info!("Fetching open PRs for {}", self.repo());

        let params = ListParams {
            state: "open",
            per_page: 100,
        };
        let first: Page<RawPull> = self
            .client
            .get(self.route("pulls"), Some(&params))
            .await
            .map_err(|e| MaxReviewError::HostApi(format!("Failed to list PRs: {}", e)))?;
        let pulls = self
            .client
            .all_pages(first)
            .await
            .map_err(|e| MaxReviewError::HostApi(format!("Failed to list PRs: {}", e)))?;

        let candidates = try_join_all(pulls.into_iter().map(|pr| self.candidate(pr))).await?;

        debug!("Found {} open PR(s)", candidates.len());
        Ok(candidates)
    }

    async fn get_pr(&self, number: u64) -> Result<PullRequestInfo> {
        let pr = self.fetch_pull(number).await?;

        Ok(PullRequestInfo {
            number: pr.number,
            title: pr.title.unwrap_or_default(),
            head_ref_name: pr.head.ref_name,
            head_ref_oid: pr.head.sha,
        })
    }

    async fn post_review_comment(
        &self,
        pr_number: u64,
        commit_sha: &str,
        issue: &IssueFinding,
    ) -> Result<()> {
        let commit_id = if issue.commit_id.is_empty() {
            commit_sha
        } else {
            issue.commit_id.as_str()
        };
        let body = ReviewCommentBody {
            body: comment_body(issue),
            commit_id,
            path: &issue.file,
            line: issue.line,
            side: "RIGHT",
        };

        let _: serde_json::Value = self
            .client
            .post(self.route(&format!("pulls/{}/comments", pr_number)), Some(&body))
            .await
            .map_err(|e| {
                MaxReviewError::HostApi(format!(
                    "Failed to post comment on {}:{}: {}",
                    issue.file, issue.line, e
                ))
            })?;

        debug!("Posted comment on PR #{} at {}:{}", pr_number, issue.file, issue.line);
        Ok(())
    }
}

/// Parse repository string into owner and name
pub fn parse_repo(repo: &str) -> Result<(String, String)> {
    let parts: Vec<&str> = repo.trim().split('/').collect();
    if parts.len() != 2 || parts.iter().any(|p| p.is_empty()) {
        return Err(MaxReviewError::Validation(format!(
            "Invalid repository format. Expected 'owner/repo', got '{}'",
            repo
        )));
    }
    Ok((parts[0].to_string(), parts[1].to_string()))
}
