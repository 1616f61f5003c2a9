pub mod formatters;
pub mod merger;

pub use formatters::{comment_body, render_text};
pub use merger::{MergeOptions, ReviewMerger};