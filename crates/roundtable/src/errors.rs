use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors a toolkit reports back to the model as part of a tool response
#[non_exhaustive]
#[derive(Error, Debug, Clone, Deserialize, Serialize, PartialEq)]
pub enum AgentError {
    #[error("Tool not found: {0}")]
    ToolNotFound(String),

    #[error("Invalid parameters: {0}")]
    InvalidParameters(String),

    #[error("Tool execution failed: {0}")]
    ExecutionError(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type AgentResult<T> = Result<T, AgentError>;

/// Errors that abort a room run
#[derive(Error, Debug)]
pub enum RoomError {
    #[error("Provider call failed: {0}")]
    Provider(#[from] anyhow::Error),

    #[error("Supervisor returned an invalid route: {0}")]
    InvalidRoute(String),

    #[error("Unknown node: {0}")]
    UnknownNode(String),

    #[error("Recursion limit of {0} reached without hitting a stop condition")]
    RecursionLimit(usize),

    #[error("Failed to render prompt: {0}")]
    Prompt(#[from] tera::Error),
}

pub type RoomResult<T> = Result<T, RoomError>;
