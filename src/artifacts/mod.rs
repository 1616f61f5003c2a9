pub mod run_dir;
pub mod store;

pub use run_dir::{ExistingRunAction, RunArtifactSet};
pub use store::{load_agent_review, write_json_atomic, ArtifactLoad};