use crate::types::AgentName;

/// Inputs for rendering one agent's review instructions
#[derive(Debug, Clone)]
pub struct ReviewPrompt {
    pub repo: String,
    pub pr_number: u64,
    pub commit_sha: String,
    pub workspace_dir: String,
    pub runner_dir: String,
}

const REVIEW_TEMPLATE: &str = r#"You are {agent_name}, an expert code reviewer. Review GitHub pull request #{pr_number} in {repo}.

The pull request is checked out at {workspace_dir} (head commit {commit_sha}).
Use `git diff` against the base branch and the `gh` CLI to inspect the changes,
and read the surrounding code before reporting anything.

Report only real problems: bugs, security issues, data loss, incorrect logic,
missing error handling, and significant maintainability risks. Do not report
style nits.

Priorities:
- P0: must fix before merge (crashes, security holes, data corruption)
- P1: should fix before merge (incorrect behavior in edge cases, missing checks)
- P2: suggestion (clarity, robustness, minor improvements)

When you are done, write exactly one JSON document to {output_path} with this shape
and nothing else in the file:

```json
{
  "pr_summary": {
    "number": {pr_number},
    "title": "<PR title>",
    "description": "<two or three sentence summary of what the PR does>"
  },
  "issues": [
    {
      "agent": "{agent_name}",
      "priority": "P0 | P1 | P2",
      "file": "<path relative to the repository root>",
      "line": <line number in the new version of the file>,
      "commit_id": "{commit_sha}",
      "category": "<bug | security | performance | error-handling | maintainability | testing>",
      "description": "<what is wrong and why it matters>",
      "proposed_fix": "<concrete change that fixes it>"
    }
  ]
}
```

If you find no issues, write the document with an empty "issues" array.
"#;

impl ReviewPrompt {
    /// Path inside the sandbox where `agent` must write its report.
    pub fn output_path(&self, agent: AgentName) -> String {
        format!(
            "{}/{}",
            self.runner_dir.trim_end_matches('/'),
            agent.artifact_file_name()
        )
    }

    pub fn render(&self, agent: AgentName) -> String {
        REVIEW_TEMPLATE
            .replace("{agent_name}", agent.as_str())
            .replace("{pr_number}", &self.pr_number.to_string())
            .replace("{repo}", &self.repo)
            .replace("{workspace_dir}", &self.workspace_dir)
            .replace("{commit_sha}", &self.commit_sha)
            .replace("{output_path}", &self.output_path(agent))
    }
}
