pub mod agents;
pub mod artifacts;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod git;
pub mod github;
pub mod reports;
pub mod sandbox;
pub mod types;

pub use error::{MaxReviewError, Result};
