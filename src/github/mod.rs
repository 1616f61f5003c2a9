pub mod client;
pub mod host;
pub mod publisher;

pub use client::GitHubClient;
pub use host::ReviewHost;
pub use publisher::{PublishResult, ReviewPublisher};
