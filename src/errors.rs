use thiserror::Error;

#[non_exhaustive]
#[derive(Error, Debug)]
pub enum AgentError {
    #[error("Tool not found: {0}")]
    ToolNotFound(String),

    #[error("Unable to validate JSON after {attempts} attempts: {snippet}")]
    InvalidJsonAfterMaxAttempts { attempts: u32, snippet: String },

    #[error("No backend configured: {0}")]
    NoBackendConfigured(String),

    #[error("Tool execution failed: {0}")]
    ExecutionError(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Provider error: {0}")]
    Provider(#[from] anyhow::Error),
}

pub type AgentResult<T> = Result<T, AgentError>;
