use thiserror::Error;

/// Errors surfaced by the review pipeline.
///
/// Per-agent sandbox failures never reach this type on the normal path: the
/// executor converts them into placeholder reports. `Sandbox` is only used
/// for failures that stop the whole run, such as preparing the image.
#[derive(Debug, Error)]
pub enum MaxReviewError {
    #[error("Missing required dependencies: {}\nPlease install them and try again.", .0.join(", "))]
    Dependency(Vec<String>),

    #[error("{0}")]
    Validation(String),

    #[error("Sandbox failure: {0}")]
    Sandbox(#[from] SandboxError),

    #[error("Review processing failed: {0}")]
    Review(String),

    #[error("GitHub API error: {0}")]
    HostApi(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Operation cancelled by user")]
    Interrupted,
}

/// Errors from the sandbox runtime
#[derive(Debug, Error)]
pub enum SandboxError {
    #[error("sandbox runtime not available: {0}")]
    NotAvailable(String),

    #[error("timed out after {0}s")]
    Timeout(u64),

    #[error("failed to launch sandbox: {0}")]
    LaunchFailed(String),

    #[error("failed to prepare sandbox image {image}: {reason}")]
    ImageBuildFailed { image: String, reason: String },

    #[error("sandbox I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, MaxReviewError>;

impl MaxReviewError {
    /// Process exit code for this error.
    pub fn exit_code(&self) -> i32 {
        match self {
            MaxReviewError::Interrupted => 130,
            _ => 1,
        }
    }
}

impl From<config::ConfigError> for MaxReviewError {
    fn from(err: config::ConfigError) -> Self {
        MaxReviewError::Config(err.to_string())
    }
}

impl From<octocrab::Error> for MaxReviewError {
    fn from(err: octocrab::Error) -> Self {
        MaxReviewError::HostApi(err.to_string())
    }
}
