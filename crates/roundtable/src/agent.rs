use futures::stream::BoxStream;
use futures::TryStreamExt;
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;

use crate::errors::{AgentError, AgentResult, RoomResult};
use crate::graph::TeamState;
use crate::models::content::Content;
use crate::models::message::{Message, MessageContent, ToolRequest, ToolResponse};
use crate::models::role::Role;
use crate::models::tool::{Tool, ToolCall};
use crate::prompt_template::{load_prompt, load_prompt_file, AGENT_PROMPT};
use crate::providers::base::Provider;
use crate::toolkits::Toolkit;

pub const DEFAULT_MAX_ITERATIONS: usize = 15;
pub const DEFAULT_CHAT_LENGTH: usize = 8000;
pub const ITERATION_LIMIT_MESSAGE: &str = "Agent stopped due to iteration limit or time limit.";
const TRUNCATION_NOTICE: &str = "\n[output truncated to fit the chat length]";

#[derive(Clone, Debug, Serialize)]
struct ToolkitInfo {
    name: String,
    description: String,
    instructions: String,
}

impl ToolkitInfo {
    fn new(name: &str, description: &str, instructions: &str) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            instructions: instructions.to_string(),
        }
    }
}

/// A chat completion model bound to a role prompt and the toolkits it may use
pub struct Agent {
    name: String,
    system_prompt: String,
    toolkits: Vec<Box<dyn Toolkit>>,
    provider: Arc<dyn Provider>,
    max_iterations: usize,
    chat_length: usize,
}

impl Agent {
    /// `system_prompt` is a tera template; it may reference `team_members` and `current_files`
    pub fn new(
        name: impl Into<String>,
        system_prompt: impl Into<String>,
        provider: Arc<dyn Provider>,
    ) -> Self {
        Self {
            name: name.into(),
            system_prompt: system_prompt.into(),
            toolkits: Vec::new(),
            provider,
            max_iterations: DEFAULT_MAX_ITERATIONS,
            chat_length: DEFAULT_CHAT_LENGTH,
        }
    }

    pub fn with_toolkit(mut self, toolkit: impl Toolkit + 'static) -> Self {
        self.toolkits.push(Box::new(toolkit));
        self
    }

    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations.max(1);
        self
    }

    /// Approximate token budget of a prompt
    pub fn with_chat_length(mut self, chat_length: usize) -> Self {
        self.chat_length = chat_length;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get all tools from all toolkits with proper toolkit prefixing
    fn get_prefixed_tools(&self) -> Vec<Tool> {
        let mut tools = Vec::new();
        for toolkit in &self.toolkits {
            for tool in toolkit.tools() {
                tools.push(Tool::new(
                    format!("{}__{}", toolkit.name(), tool.name),
                    &tool.description,
                    tool.input_schema.clone(),
                ));
            }
        }
        tools
    }

    /// Find the appropriate toolkit for a tool call based on the prefixed name
    fn get_toolkit_for_tool<'a>(
        &'a self,
        prefixed_name: &'a str,
    ) -> Option<(&'a dyn Toolkit, &'a str)> {
        let (toolkit_name, tool_name) = prefixed_name.split_once("__")?;
        self.toolkits
            .iter()
            .find(|toolkit| toolkit.name() == toolkit_name)
            .map(|toolkit| (&**toolkit, tool_name))
    }

    /// Dispatch a single tool call to the appropriate toolkit
    async fn dispatch_tool_call(
        &self,
        tool_call: AgentResult<ToolCall>,
    ) -> AgentResult<Vec<Content>> {
        let call = tool_call?;
        let (toolkit, tool_name) = self
            .get_toolkit_for_tool(&call.name)
            .ok_or_else(|| AgentError::ToolNotFound(call.name.clone()))?;

        tracing::debug!(agent = %self.name, tool = %call.name, "calling tool");
        let result = toolkit
            .call(ToolCall::new(tool_name, call.arguments))
            .await;
        if let Err(e) = &result {
            tracing::debug!(agent = %self.name, tool = %call.name, error = %e, "tool failed");
        }
        result
    }

    fn get_system_prompt(&self, context: &TeamState) -> RoomResult<String> {
        let role_prompt = load_prompt(&self.system_prompt, &context.prompt_context())?;
        let toolkits: Vec<ToolkitInfo> = self
            .toolkits
            .iter()
            .map(|t| ToolkitInfo::new(t.name(), t.description(), t.instructions()))
            .collect();

        Ok(load_prompt_file(
            AGENT_PROMPT,
            &json!({
                "role_prompt": role_prompt.trim(),
                "toolkits": toolkits,
            }),
        )?)
    }

    /// Create a stream that yields each message as it's generated by the agent.
    /// This includes both the assistant's responses and any tool responses. When the
    /// iteration limit is reached a final assistant message says so.
    pub async fn reply(
        &self,
        messages: &[Message],
        context: &TeamState,
    ) -> RoomResult<BoxStream<'_, RoomResult<Message>>> {
        let mut messages = messages.to_vec();
        let tools = self.get_prefixed_tools();
        let system_prompt = self.get_system_prompt(context)?;

        Ok(Box::pin(async_stream::try_stream! {
            let mut done = false;
            for _ in 0..self.max_iterations {
                trim_messages(&system_prompt, &mut messages, self.chat_length);

                let (response, usage) = self.provider.complete(
                    &system_prompt,
                    &messages,
                    &tools,
                ).await?;
                tracing::debug!(agent = %self.name, total_tokens = ?usage.total_tokens, "completion");

                yield response.clone();

                // Ensure the above message is delivered before long running tools start
                tokio::task::yield_now().await;

                let tool_requests: Vec<&ToolRequest> = response.tool_requests();
                if tool_requests.is_empty() {
                    done = true;
                    break;
                }

                let futures: Vec<_> = tool_requests
                    .iter()
                    .map(|request| self.dispatch_tool_call(request.tool_call.clone()))
                    .collect();
                let outputs = futures::future::join_all(futures).await;

                let mut message_tool_response = Message::user();
                for (request, output) in tool_requests.iter().zip(outputs.into_iter()) {
                    message_tool_response = message_tool_response.with_tool_response(
                        request.id.clone(),
                        output,
                    );
                }

                yield message_tool_response.clone();

                messages.push(response.clone());
                messages.push(message_tool_response);
            }

            if !done {
                tracing::warn!(agent = %self.name, limit = self.max_iterations, "iteration limit reached");
                yield Message::assistant().with_text(ITERATION_LIMIT_MESSAGE);
            }
        }))
    }

    /// Run the tool loop to completion and return the final answer
    pub async fn invoke(&self, messages: &[Message], context: &TeamState) -> RoomResult<String> {
        let replies: Vec<Message> = self.reply(messages, context).await?.try_collect().await?;
        Ok(replies
            .iter()
            .rev()
            .find(|m| m.role == Role::Assistant && !m.has_tool_request())
            .map(|m| m.text())
            .unwrap_or_default())
    }
}

fn estimate_tokens(system_prompt: &str, messages: &[Message]) -> usize {
    let chars: usize = messages
        .iter()
        .flat_map(|m| m.content.iter())
        .map(|content| match content {
            MessageContent::Text(text) => text.text.len(),
            MessageContent::ToolRequest(request) => request
                .tool_call
                .as_ref()
                .map(|call| call.name.len() + call.arguments.to_string().len())
                .unwrap_or(0),
            MessageContent::ToolResponse(_) => content
                .as_tool_response_text()
                .map(|t| t.len())
                .unwrap_or(0),
        })
        .sum();
    (system_prompt.len() + chars) / 4
}

/// Drop the oldest messages after the first until the prompt fits `chat_length`.
///
/// Tool responses left without their request are dropped along with it. The
/// latest tool call and its responses are never dropped; when they alone are
/// too long the tool output is shortened instead.
fn trim_messages(system_prompt: &str, messages: &mut Vec<Message>, chat_length: usize) {
    let mut pending = pending_exchange_start(messages);
    let mut dropped = 0;
    while pending > 1 && estimate_tokens(system_prompt, messages) > chat_length {
        messages.remove(1);
        pending -= 1;
        dropped += 1;
        while pending > 1 && is_tool_response(&messages[1]) {
            messages.remove(1);
            pending -= 1;
            dropped += 1;
        }
    }
    if dropped > 0 {
        tracing::debug!(dropped, "trimmed conversation to fit the chat length");
    }

    let tokens = estimate_tokens(system_prompt, messages);
    if tokens > chat_length && pending < messages.len() {
        shorten_tool_output(&mut messages[pending..], (tokens - chat_length + 1) * 4);
    }
}

fn is_tool_response(message: &Message) -> bool {
    message
        .content
        .iter()
        .any(|c| c.as_tool_response().is_some())
}

/// Index where the tool exchange still awaiting an answer starts, or the
/// conversation length when the last message is not a tool response
fn pending_exchange_start(messages: &[Message]) -> usize {
    let responses = messages
        .iter()
        .rev()
        .take_while(|m| is_tool_response(m))
        .count();
    if responses == 0 {
        return messages.len();
    }
    match messages.len().checked_sub(responses + 1) {
        Some(request) if messages[request].has_tool_request() => request,
        _ => messages.len() - responses,
    }
}

/// Cut `excess_chars` out of the tool output, shortening every text in proportion
fn shorten_tool_output(exchange: &mut [Message], excess_chars: usize) {
    let texts: Vec<&mut String> = exchange
        .iter_mut()
        .flat_map(|m| m.content.iter_mut())
        .filter_map(|content| match content {
            MessageContent::ToolResponse(ToolResponse {
                tool_result: Ok(contents),
                ..
            }) => Some(contents),
            _ => None,
        })
        .flat_map(|contents| contents.iter_mut())
        .map(|content| match content {
            Content::Text(text) => &mut text.text,
        })
        .collect();

    let total: usize = texts.iter().map(|t| t.len()).sum();
    if total == 0 {
        return;
    }
    let budget = total.saturating_sub(excess_chars + TRUNCATION_NOTICE.len() * texts.len());
    for text in texts {
        let mut keep = text.len() * budget / total;
        if keep >= text.len() {
            continue;
        }
        while !text.is_char_boundary(keep) {
            keep -= 1;
        }
        text.truncate(keep);
        text.push_str(TRUNCATION_NOTICE);
    }
    tracing::debug!(excess_chars, "shortened tool output to fit the chat length");
}
