/// Configuration management for maxreview
use crate::agents::executor::ExecutorConfig;
use crate::coordinator::CoordinatorConfig;
use crate::error::{MaxReviewError, Result};
use crate::reports::merger::MergeOptions;
use crate::types::AgentName;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, warn};

/// Environment variables forwarded to agents and used for host access
pub const CREDENTIAL_KEYS: &[&str] = &[
    "GITHUB_TOKEN",
    "OPENAI_API_KEY",
    "ANTHROPIC_API_KEY",
    "GEMINI_API_KEY",
    "MAXREVIEW_REPO",
];

/// Prefix for environment overrides of `Config` fields (`MAXREVIEW_AGENT__TIMEOUT_SECONDS`)
pub const ENV_PREFIX: &str = "MAXREVIEW";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub agent: AgentSettings,
    pub sandbox: SandboxSettings,
    pub merge: MergeOptions,
    pub github: GitHubSettings,
    pub runs_dir: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentSettings {
    pub timeout_seconds: u64,
    /// Agents to run when `--agent` is not given
    pub default_agents: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SandboxSettings {
    pub image: String,
    /// Build context used when the image is missing
    pub dockerfile_dir: Option<PathBuf>,
    pub runner_dir: String,
    pub workspace_dir: String,
    pub container_home: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GitHubSettings {
    /// `owner/name`; detected from the git remote when unset
    pub repo: Option<String>,
    pub post_comments: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            agent: AgentSettings::default(),
            sandbox: SandboxSettings::default(),
            merge: MergeOptions::default(),
            github: GitHubSettings::default(),
            runs_dir: PathBuf::from("runs"),
        }
    }
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            timeout_seconds: 1800,
            default_agents: AgentName::ALL.iter().map(|a| a.to_string()).collect(),
        }
    }
}

impl Default for SandboxSettings {
    fn default() -> Self {
        Self {
            image: "maxreview:latest".to_string(),
            dockerfile_dir: None,
            runner_dir: "/runner".to_string(),
            workspace_dir: "/workspace".to_string(),
            container_home: "/root".to_string(),
        }
    }
}

impl Default for GitHubSettings {
    fn default() -> Self {
        Self {
            repo: None,
            post_comments: true,
        }
    }
}

impl Config {
    /// Load configuration: defaults, then the optional YAML file, then
    /// `MAXREVIEW_*` environment variables.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            if path.exists() {
                debug!("Loading configuration from: {:?}", path);
            } else {
                warn!("Configuration file not found: {:?}. Using defaults.", path);
            }
            builder = builder.add_source(
                config::File::from(path)
                    .format(config::FileFormat::Yaml)
                    .required(false),
            );
        }
        builder = builder.add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let config: Config = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.agent.timeout_seconds == 0 {
            return Err(MaxReviewError::Config(
                "Agent timeout must be greater than 0".to_string(),
            ));
        }

        for name in &self.agent.default_agents {
            name.parse::<AgentName>()?;
        }

        if self.agent.default_agents.is_empty() {
            return Err(MaxReviewError::Config(
                "At least one default agent is required".to_string(),
            ));
        }

        if self.sandbox.image.is_empty() {
            return Err(MaxReviewError::Config("Sandbox image must be set".to_string()));
        }

        Ok(())
    }

    /// Default agent selection as a spec string for the resolver
    pub fn default_agent_spec(&self) -> String {
        self.agent.default_agents.join(",")
    }

    pub fn executor_config(&self, host_home: Option<PathBuf>) -> ExecutorConfig {
        ExecutorConfig {
            agent_timeout: Duration::from_secs(self.agent.timeout_seconds),
            workspace_dir: self.sandbox.workspace_dir.clone(),
            runner_dir: self.sandbox.runner_dir.clone(),
            container_home: self.sandbox.container_home.clone(),
            host_home,
        }
    }

    pub fn coordinator_config(&self) -> CoordinatorConfig {
        CoordinatorConfig {
            runs_root: self.runs_dir.clone(),
            workspace_dir: self.sandbox.workspace_dir.clone(),
            runner_dir: self.sandbox.runner_dir.clone(),
            merge: self.merge,
        }
    }
}

/// Credential values with explicit precedence: process environment first,
/// then the dotenv-style file. The process environment is never modified.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    values: BTreeMap<String, String>,
}

impl Credentials {
    /// Resolve credentials from the real environment and an optional file.
    pub fn load(env_file: Option<&Path>) -> Result<Self> {
        let file_values = match env_file {
            Some(path) if path.exists() => read_env_file(path)?,
            Some(path) => {
                debug!("No credentials file at {:?}", path);
                BTreeMap::new()
            }
            None => BTreeMap::new(),
        };
        Ok(Self::resolve(|key| std::env::var(key).ok(), &file_values))
    }

    /// Combine an environment lookup with file values; non-empty environment values win.
    pub fn resolve<F>(env: F, file_values: &BTreeMap<String, String>) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut values = BTreeMap::new();
        for key in CREDENTIAL_KEYS {
            let value = env(key)
                .filter(|v| !v.is_empty())
                .or_else(|| file_values.get(*key).cloned().filter(|v| !v.is_empty()));
            if let Some(value) = value {
                values.insert(key.to_string(), value);
            }
        }
        Self { values }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    pub fn github_token(&self) -> Option<&str> {
        self.get("GITHUB_TOKEN")
    }

    pub fn repo_override(&self) -> Option<&str> {
        self.get("MAXREVIEW_REPO")
    }

    /// Values forwarded into agent sandboxes
    pub fn sandbox_env(&self) -> BTreeMap<String, String> {
        self.values
            .iter()
            .filter(|(key, _)| key.as_str() != "MAXREVIEW_REPO")
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }
}

/// Read `KEY=VALUE` lines from a dotenv-style file without touching the environment
pub fn read_env_file(path: &Path) -> Result<BTreeMap<String, String>> {
    let iter = dotenv::from_path_iter(path)
        .map_err(|e| MaxReviewError::Config(format!("Failed to read {:?}: {}", path, e)))?;

    let mut values = BTreeMap::new();
    for item in iter {
        let (key, value) =
            item.map_err(|e| MaxReviewError::Config(format!("Invalid line in {:?}: {}", path, e)))?;
        values.insert(key, value);
    }
    Ok(values)
}

/// `~/.maxreview`, when a home directory can be determined
pub fn default_env_file() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|dirs| dirs.home_dir().join(".maxreview"))
}

/// Commented starter configuration written by `init-config`
pub const DEFAULT_CONFIG_TEMPLATE: &str = r#"# maxreview configuration
# Every value can also be set through the environment, e.g.
# MAXREVIEW_AGENT__TIMEOUT_SECONDS=600

agent:
  # Per-agent wall clock limit
  timeout_seconds: 1800
  # Used when --agent is not given
  default_agents: [claude, codex, gemini]

sandbox:
  image: "maxreview:latest"
  # Directory with a Dockerfile, used to build the image when it is missing
  # dockerfile_dir: ./docker
  runner_dir: /runner
  workspace_dir: /workspace
  container_home: /root

merge:
  # Findings in the same file and category within this many lines are
  # treated as duplicates. 0 requires an exact line match.
  line_tolerance: 0

github:
  # repo: owner/name
  post_comments: true

runs_dir: runs
"#;

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_default_template_parses_to_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("maxreview.yml");
        fs::write(&path, DEFAULT_CONFIG_TEMPLATE).unwrap();

        let loaded = Config::load(Some(path.as_path())).unwrap();
        assert_eq!(loaded, Config::default());
    }

    #[test]
    fn test_layered_load_from_yaml() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("maxreview.yml");
        fs::write(
            &path,
            "agent:\n  timeout_seconds: 60\n  default_agents: [codex]\nmerge:\n  line_tolerance: 2\n",
        )
        .unwrap();

        let config = Config::load(Some(path.as_path())).unwrap();
        assert_eq!(config.agent.timeout_seconds, 60);
        assert_eq!(config.default_agent_spec(), "codex");
        assert_eq!(config.merge.line_tolerance, 2);
        assert_eq!(config.sandbox.image, "maxreview:latest");
    }

    #[test]
    fn test_config_validation() {
        let mut config = Config::default();
        assert!(config.validate().is_ok());

        config.agent.timeout_seconds = 0;
        assert!(config.validate().is_err());

        config = Config::default();
        config.agent.default_agents = vec!["copilot".to_string()];
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_derived_run_settings() {
        let mut config = Config::default();
        config.agent.timeout_seconds = 90;
        config.runs_dir = PathBuf::from("/tmp/runs");

        let executor = config.executor_config(Some(PathBuf::from("/home/dev")));
        assert_eq!(executor.agent_timeout, Duration::from_secs(90));
        assert_eq!(executor.runner_dir, "/runner");
        assert_eq!(executor.host_home, Some(PathBuf::from("/home/dev")));

        let coordinator = config.coordinator_config();
        assert_eq!(coordinator.runs_root, PathBuf::from("/tmp/runs"));
        assert_eq!(coordinator.merge.line_tolerance, 0);
    }

    #[test]
    fn test_env_file_populates_missing_values() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join(".maxreview");
        fs::write(
            &path,
            "MAXREVIEW_REPO=owner/repo\nGITHUB_TOKEN=abc123\nOPENAI_API_KEY=\"open-key\"\n",
        )
        .unwrap();

        let file_values = read_env_file(&path).unwrap();
        let creds = Credentials::resolve(|_| None, &file_values);

        assert_eq!(creds.repo_override(), Some("owner/repo"));
        assert_eq!(creds.github_token(), Some("abc123"));
        assert_eq!(creds.get("OPENAI_API_KEY"), Some("open-key"));
    }

    #[test]
    fn test_environment_wins_over_file() {
        let file_values =
            BTreeMap::from([("GITHUB_TOKEN".to_string(), "from-file".to_string())]);
        let creds = Credentials::resolve(
            |key| (key == "GITHUB_TOKEN").then(|| "from-env".to_string()),
            &file_values,
        );
        assert_eq!(creds.github_token(), Some("from-env"));
    }

    #[test]
    fn test_sandbox_env_excludes_repo_override() {
        let file_values = BTreeMap::from([
            ("GITHUB_TOKEN".to_string(), "t".to_string()),
            ("MAXREVIEW_REPO".to_string(), "o/r".to_string()),
        ]);
        let creds = Credentials::resolve(|_| None, &file_values);
        let env = creds.sandbox_env();
        assert!(env.contains_key("GITHUB_TOKEN"));
        assert!(!env.contains_key("MAXREVIEW_REPO"));
    }
}
