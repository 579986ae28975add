use thiserror::Error;

#[derive(Debug, Error)]
pub enum AgentError {
    #[error("Language model error: {0}")]
    LanguageModel(#[from] plotchat_llm::LanguageModelError),
    #[error("Invariant: {0}")]
    Invariant(String),
    /// The model requested a tool name that is not in the registry.
    #[error("Unknown tool requested: {0}")]
    UnknownTool(String),
    #[error("Tool execution error: {0}")]
    ToolExecution(#[source] BoxedError),
    #[error("The maximum number of turns ({0}) has been exceeded.")]
    MaxTurnsExceeded(usize),
}

pub type BoxedError = Box<dyn std::error::Error + Send + Sync>;
