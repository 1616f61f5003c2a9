pub mod docker;

pub use docker::DockerRuntime;

use crate::error::SandboxError;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

/// A host directory made visible inside the sandbox
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mount {
    pub host: PathBuf,
    pub container: String,
    pub read_only: bool,
}

impl Mount {
    pub fn read_write(host: impl Into<PathBuf>, container: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            container: container.into(),
            read_only: false,
        }
    }

    pub fn read_only(host: impl Into<PathBuf>, container: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            container: container.into(),
            read_only: true,
        }
    }
}

/// One command to run in isolation
#[derive(Debug, Clone)]
pub struct SandboxRequest {
    /// Short name used in logs and container names
    pub label: String,
    pub command: Vec<String>,
    pub stdin: Option<String>,
    pub mounts: Vec<Mount>,
    /// Credentials forwarded into the sandbox environment
    pub env: BTreeMap<String, String>,
    /// Working directory inside the sandbox
    pub workdir: Option<String>,
    pub timeout: Duration,
}

/// What came back from a finished sandboxed command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SandboxOutcome {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
    pub elapsed: Duration,
}

impl SandboxOutcome {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// Combined output for the per-agent log file.
    pub fn transcript(&self) -> String {
        format!(
            "exit code: {}\n\n--- stdout ---\n{}\n--- stderr ---\n{}\n",
            self.exit_code, self.stdout, self.stderr
        )
    }
}

/// Isolated execution capability used by the agent executor
#[async_trait]
pub trait SandboxRuntime: Send + Sync {
    /// Human-readable name for this runtime
    fn name(&self) -> &'static str;

    /// Check if this runtime is usable on the current system
    async fn is_available(&self) -> bool;

    /// One-time, idempotent setup (e.g. building the image)
    async fn ensure_image(&self) -> Result<(), SandboxError>;

    /// Run a command, bounded by `request.timeout`
    ///
    /// A timeout is reported as `SandboxError::Timeout` and must not leave
    /// the command running.
    async fn execute(&self, request: SandboxRequest) -> Result<SandboxOutcome, SandboxError>;
}
