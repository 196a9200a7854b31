use async_trait::async_trait;
use chrono::format::{Item, StrftimeItems};
use chrono::Local;
use serde_json::json;
use std::fmt::Write;

use super::Toolkit;
use crate::errors::{AgentError, AgentResult};
use crate::models::content::Content;
use crate::models::tool::{Tool, ToolCall};

pub const DEFAULT_DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

pub struct ClockToolkit {
    tools: Vec<Tool>,
}

impl Default for ClockToolkit {
    fn default() -> Self {
        Self::new()
    }
}

impl ClockToolkit {
    pub fn new() -> Self {
        let current_date = Tool::new(
            "current_date",
            "Get the current time",
            json!({
                "type": "object",
                "required": [],
                "properties": {
                    "date_format": {
                        "type": "string",
                        "default": DEFAULT_DATE_FORMAT,
                        "description": "strftime format of the result"
                    }
                }
            }),
        );
        Self {
            tools: vec![current_date],
        }
    }

    fn current_date(&self, date_format: &str) -> AgentResult<String> {
        let items: Vec<Item> = StrftimeItems::new(date_format).collect();
        if items.iter().any(|item| matches!(item, Item::Error)) {
            return Err(AgentError::InvalidParameters(format!(
                "Invalid date format: {}",
                date_format
            )));
        }

        let mut formatted = String::new();
        write!(
            formatted,
            "{}",
            Local::now().format_with_items(items.into_iter())
        )
        .map_err(|e| AgentError::ExecutionError(e.to_string()))?;
        Ok(formatted)
    }
}

#[async_trait]
impl Toolkit for ClockToolkit {
    fn name(&self) -> &str {
        "clock"
    }

    fn description(&self) -> &str {
        "Tells the current local date and time"
    }

    fn instructions(&self) -> &str {
        "Use current_date whenever the answer depends on today's date or time."
    }

    fn tools(&self) -> &[Tool] {
        &self.tools
    }

    async fn call(&self, tool_call: ToolCall) -> AgentResult<Vec<Content>> {
        match tool_call.name.as_str() {
            "current_date" => {
                let date_format = tool_call
                    .arguments
                    .get("date_format")
                    .and_then(|v| v.as_str())
                    .unwrap_or(DEFAULT_DATE_FORMAT);
                Ok(vec![Content::text(self.current_date(date_format)?)])
            }
            _ => Err(AgentError::ToolNotFound(tool_call.name)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_current_date_default_format() {
        let toolkit = ClockToolkit::new();
        let result = toolkit
            .call(ToolCall::new("current_date", json!({})))
            .await
            .unwrap();
        let text = result[0].as_text().unwrap();
        assert!(chrono::NaiveDateTime::parse_from_str(text, DEFAULT_DATE_FORMAT).is_ok());
    }

    #[tokio::test]
    async fn test_current_date_custom_format() {
        let toolkit = ClockToolkit::new();
        let result = toolkit
            .call(ToolCall::new("current_date", json!({"date_format": "%Y"})))
            .await
            .unwrap();
        let year: i32 = result[0].as_text().unwrap().parse().unwrap();
        assert!(year >= 2024);
    }

    #[tokio::test]
    async fn test_invalid_format() {
        let toolkit = ClockToolkit::new();
        let err = toolkit
            .call(ToolCall::new("current_date", json!({"date_format": "%Q"})))
            .await
            .unwrap_err();
        assert!(matches!(err, AgentError::InvalidParameters(_)));
    }

    #[tokio::test]
    async fn test_unknown_tool() {
        let toolkit = ClockToolkit::new();
        let err = toolkit
            .call(ToolCall::new("sundial", json!({})))
            .await
            .unwrap_err();
        assert_eq!(err, AgentError::ToolNotFound("sundial".into()));
    }
}
