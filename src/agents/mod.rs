pub mod executor;
pub mod prompt;
pub mod spec;

pub use executor::{AgentExecutor, AgentOutcome, AgentRunReport, ExecutionContext, ExecutorConfig};
pub use prompt::ReviewPrompt;
pub use spec::{resolve, ResolvedSelection};
