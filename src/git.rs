use crate::error::{MaxReviewError, Result};
use async_trait::async_trait;
use regex::Regex;
use std::path::{Path, PathBuf};
use tokio::process::Command;
use tracing::{debug, info, instrument, warn};

/// Puts the PR head on disk where the sandboxes can mount it
#[async_trait]
pub trait Checkout: Send + Sync {
    async fn prepare(&self, pr_number: u64, head_sha: &str, dest: &Path) -> Result<()>;
}

/// Checks out PR heads as standalone clones of the current repository.
///
/// The clone carries its own `.git` directory, so it stays a working
/// repository when mounted alone into a sandbox.
#[derive(Debug, Clone, Default)]
pub struct GitCloneCheckout;

#[async_trait]
impl Checkout for GitCloneCheckout {
    #[instrument(skip(self, dest), fields(dest = ?dest))]
    async fn prepare(&self, pr_number: u64, head_sha: &str, dest: &Path) -> Result<()> {
        let repo_root = PathBuf::from(git(None, &["rev-parse", "--show-toplevel"]).await?);
        let pr_ref = format!("refs/maxreview/pr-{}", pr_number);
        git(
            Some(&repo_root),
            &["fetch", "origin", &format!("+pull/{}/head:{}", pr_number, pr_ref)],
        )
        .await?;

        let target = if head_sha.is_empty() {
            warn!("PR head commit unknown, checking out the fetched PR head");
            pr_ref.as_str()
        } else {
            head_sha
        };
        clone_detached(&repo_root, &pr_ref, target, dest).await?;

        // Point the clone at the real remote so agents can fetch base branches.
        if let Ok(url) = git(Some(&repo_root), &["remote", "get-url", "origin"]).await {
            git(Some(dest), &["remote", "set-url", "origin", &url]).await?;
        }

        info!("Checked out PR #{} at {:?}", pr_number, dest);
        Ok(())
    }
}

/// Clone `repo_root` into `dest`, bring over `source_ref` and detach at `target`.
///
/// A local clone hardlinks objects instead of borrowing them through
/// alternates, so nothing in `dest` points back into `repo_root/.git`.
pub async fn clone_detached(
    repo_root: &Path,
    source_ref: &str,
    target: &str,
    dest: &Path,
) -> Result<()> {
    if dest.exists() {
        debug!("Removing previous checkout {:?}", dest);
        tokio::fs::remove_dir_all(dest).await?;
    }

    git(
        None,
        &[
            "clone",
            "--quiet",
            "--no-checkout",
            &repo_root.to_string_lossy(),
            &dest.to_string_lossy(),
        ],
    )
    .await?;
    git(
        Some(dest),
        &["fetch", "--quiet", "origin", &format!("+{}:{}", source_ref, source_ref)],
    )
    .await?;
    git(Some(dest), &["checkout", "--quiet", "--detach", target]).await?;
    Ok(())
}

async fn git(dir: Option<&Path>, args: &[&str]) -> Result<String> {
    debug!("git {}", args.join(" "));
    let mut command = Command::new("git");
    if let Some(dir) = dir {
        command.arg("-C").arg(dir);
    }
    let output = command.args(args).output().await?;
    if !output.status.success() {
        return Err(MaxReviewError::Validation(format!(
            "git {} failed: {}",
            args.join(" "),
            String::from_utf8_lossy(&output.stderr).trim()
        )));
    }
    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
}

/// Determine `owner/name` from the `origin` remote of the current repository
pub async fn detect_repo() -> Result<String> {
    let url = git(None, &["remote", "get-url", "origin"]).await.map_err(|_| {
        MaxReviewError::Validation(
            "Could not detect the GitHub repository from the git remote. \
             Set MAXREVIEW_REPO=owner/repo."
                .to_string(),
        )
    })?;
    parse_remote_url(&url).ok_or_else(|| {
        MaxReviewError::Validation(format!(
            "Remote URL '{}' is not a GitHub repository. Set MAXREVIEW_REPO=owner/repo.",
            url
        ))
    })
}

/// Extract `owner/name` from an https or ssh GitHub remote URL
pub fn parse_remote_url(url: &str) -> Option<String> {
    let pattern =
        Regex::new(r"github\.com[:/]([^/\s]+)/([^/\s]+?)(?:\.git)?/?$").ok()?;
    let caps = pattern.captures(url.trim())?;
    Some(format!("{}/{}", &caps[1], &caps[2]))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_remote_url_forms() {
        assert_eq!(
            parse_remote_url("https://github.com/owner/repo.git").as_deref(),
            Some("owner/repo")
        );
        assert_eq!(
            parse_remote_url("https://github.com/owner/repo").as_deref(),
            Some("owner/repo")
        );
        assert_eq!(
            parse_remote_url("git@github.com:owner/my.repo.git\n").as_deref(),
            Some("owner/my.repo")
        );
        assert_eq!(
            parse_remote_url("ssh://git@github.com/owner/repo.git").as_deref(),
            Some("owner/repo")
        );
    }

    #[test]
    fn test_parse_remote_url_rejects_other_hosts() {
        assert_eq!(parse_remote_url("https://gitlab.com/owner/repo.git"), None);
        assert_eq!(parse_remote_url("not a url"), None);
    }

    async fn run(dir: &Path, args: &[&str]) -> String {
        git(Some(dir), args).await.unwrap()
    }

    #[tokio::test]
    async fn test_clone_checkout_is_self_contained() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let repo = temp_dir.path().join("repo");
        std::fs::create_dir_all(&repo).unwrap();
        run(&repo, &["init", "--quiet"]).await;
        std::fs::write(repo.join("lib.rs"), "fn main() {}\n").unwrap();
        run(&repo, &["add", "lib.rs"]).await;
        run(
            &repo,
            &[
                "-c",
                "user.name=t",
                "-c",
                "user.email=t@example.com",
                "commit",
                "--quiet",
                "-m",
                "init",
            ],
        )
        .await;
        let head = run(&repo, &["rev-parse", "HEAD"]).await;
        run(&repo, &["update-ref", "refs/maxreview/pr-7", &head]).await;

        let dest = temp_dir.path().join("runs").join("pr-7-main").join("checkout");
        std::fs::create_dir_all(&dest).unwrap();
        std::fs::write(dest.join("stale.txt"), "old").unwrap();

        clone_detached(&repo, "refs/maxreview/pr-7", &head, &dest)
            .await
            .unwrap();

        assert!(dest.join(".git").is_dir());
        assert!(!dest.join("stale.txt").exists());
        assert!(dest.join("lib.rs").exists());
        assert!(!dest.join(".git/objects/info/alternates").exists());

        // The checkout must survive without the source repository.
        let moved = temp_dir.path().join("sandbox-workspace");
        std::fs::rename(&dest, &moved).unwrap();
        std::fs::remove_dir_all(&repo).unwrap();
        assert_eq!(run(&moved, &["rev-parse", "HEAD"]).await, head);
    }
}
