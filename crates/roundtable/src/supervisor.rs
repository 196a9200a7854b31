use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;

use crate::errors::{RoomError, RoomResult};
use crate::graph::{Node, StateUpdate, TeamState};
use crate::models::message::Message;
use crate::models::tool::Tool;
use crate::prompt_template::{
    embedded_template, load_prompt, load_prompt_file, ROUTE_PROMPT, SUPERVISOR_PROMPT,
};
use crate::providers::base::{Provider, ToolChoice};

/// Routing label that ends a team run
pub const FINISH: &str = "FINISH";
pub const ROUTE_TOOL: &str = "route";

/// Decides which worker acts next by forcing the model to call `route`
pub struct Supervisor {
    name: String,
    system_prompt: String,
    members: Vec<String>,
    provider: Arc<dyn Provider>,
    route_tool: Tool,
}

impl Supervisor {
    /// `system_prompt` is a tera template; it may reference `team_members`
    pub fn new(
        name: impl Into<String>,
        system_prompt: impl Into<String>,
        members: Vec<String>,
        provider: Arc<dyn Provider>,
    ) -> Self {
        let route_tool = Tool::new(
            ROUTE_TOOL,
            "Select the next role.",
            json!({
                "type": "object",
                "required": ["next"],
                "properties": {
                    "next": {
                        "title": "Next",
                        "anyOf": [{"enum": options(&members)}]
                    }
                }
            }),
        );
        Self {
            name: name.into(),
            system_prompt: system_prompt.into(),
            members,
            provider,
            route_tool,
        }
    }

    /// A supervisor using the bundled supervisor prompt
    pub fn with_default_prompt(
        name: impl Into<String>,
        members: Vec<String>,
        provider: Arc<dyn Provider>,
    ) -> RoomResult<Self> {
        let template = embedded_template(SUPERVISOR_PROMPT)?;
        Ok(Self::new(name, template, members, provider))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn members(&self) -> &[String] {
        &self.members
    }

    fn options(&self) -> Vec<String> {
        options(&self.members)
    }

    /// Ask the model who should act next
    pub async fn decide(&self, messages: &[Message]) -> RoomResult<String> {
        let system = load_prompt(
            &self.system_prompt,
            &json!({"team_members": self.members.join(", ")}),
        )?;
        let options = self.options();
        let route_prompt = load_prompt_file(
            ROUTE_PROMPT,
            &json!({"options": format_options(&options)}),
        )?;

        let mut prompt = messages.to_vec();
        prompt.push(Message::system().with_text(route_prompt));

        let (response, _usage) = self
            .provider
            .complete_with_choice(
                system.trim(),
                &prompt,
                std::slice::from_ref(&self.route_tool),
                &ToolChoice::Required(ROUTE_TOOL.to_string()),
            )
            .await?;

        let next = parse_route(&response, &options)?;
        tracing::info!(supervisor = %self.name, next = %next, "routing decision");
        Ok(next)
    }
}

#[async_trait]
impl Node for Supervisor {
    async fn run(&self, state: &TeamState) -> RoomResult<StateUpdate> {
        let next = self.decide(&state.messages).await?;
        Ok(StateUpdate::route(next))
    }
}

fn options(members: &[String]) -> Vec<String> {
    std::iter::once(FINISH.to_string())
        .chain(members.iter().cloned())
        .collect()
}

fn format_options(options: &[String]) -> String {
    let quoted: Vec<String> = options.iter().map(|o| format!("'{}'", o)).collect();
    format!("[{}]", quoted.join(", "))
}

/// Read the decision from the route call, or from a bare reply naming an option
fn parse_route(response: &Message, options: &[String]) -> RoomResult<String> {
    let from_tool = response
        .tool_requests()
        .into_iter()
        .filter_map(|request| request.tool_call.as_ref().ok())
        .find(|call| call.name == ROUTE_TOOL)
        .and_then(|call| next_field(&call.arguments));

    let text = response.text();
    let text = text.trim();
    let next = from_tool
        .or_else(|| {
            serde_json::from_str::<Value>(text)
                .ok()
                .and_then(|value| next_field(&value))
        })
        .or_else(|| options.iter().find(|o| o.as_str() == text).cloned())
        .ok_or_else(|| RoomError::InvalidRoute(text.to_string()))?;

    if options.contains(&next) {
        Ok(next)
    } else {
        Err(RoomError::InvalidRoute(next))
    }
}

fn next_field(value: &Value) -> Option<String> {
    value
        .get("next")
        .and_then(|v| v.as_str())
        .map(|s| s.to_string())
}
