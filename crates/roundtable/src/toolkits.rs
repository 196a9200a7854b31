//! The fixed set of actions agents can take.
//!
//! A toolkit groups related tools. Agents expose each tool to the model as
//! `<toolkit>__<tool>` and route calls back to the owning toolkit.

mod clock;
mod code;
mod documents;
mod scraper;
mod search;

pub use clock::ClockToolkit;
pub use code::{CodeRunner, CodeToolkit};
pub use documents::{DocumentTool, DocumentsToolkit, WorkingDirectory};
pub use scraper::ScraperToolkit;
pub use search::SearchToolkit;

use async_trait::async_trait;
use serde_json::Value;

use crate::errors::{AgentError, AgentResult};
use crate::models::content::Content;
use crate::models::tool::{Tool, ToolCall};

/// A named group of tools an agent can call
#[async_trait]
pub trait Toolkit: Send + Sync {
    /// Get the name of the toolkit
    fn name(&self) -> &str;

    /// Get the toolkit description
    fn description(&self) -> &str;

    /// Instructions appended to the system prompt of agents holding this toolkit
    fn instructions(&self) -> &str;

    /// Get available tools
    fn tools(&self) -> &[Tool];

    /// Call a tool by its unprefixed name
    async fn call(&self, tool_call: ToolCall) -> AgentResult<Vec<Content>>;
}

pub(crate) fn required_str<'a>(params: &'a Value, key: &str) -> AgentResult<&'a str> {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .ok_or_else(|| AgentError::InvalidParameters(format!("Missing '{}' parameter", key)))
}

pub(crate) fn optional_usize(params: &Value, key: &str) -> AgentResult<Option<usize>> {
    match params.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(value) => value
            .as_u64()
            .map(|n| Some(n as usize))
            .ok_or_else(|| {
                AgentError::InvalidParameters(format!(
                    "'{}' must be a non-negative integer",
                    key
                ))
            }),
    }
}
