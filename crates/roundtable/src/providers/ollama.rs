use super::base::{Provider, ToolChoice, Usage};
use super::configs::OllamaProviderConfig;
use super::utils::{
    check_response_error, create_request_payload, get_openai_usage, openai_response_to_message,
    RequestOptions,
};
use crate::models::message::Message;
use crate::models::tool::Tool;
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use reqwest::Client;
use reqwest::StatusCode;
use serde_json::Value;
use std::time::Duration;

pub const OLLAMA_HOST: &str = "http://localhost:11434";
pub const OLLAMA_MODEL: &str = "mistral:7b-instruct-v0.2-q8_0";

/// A local Ollama server through its OpenAI compatible endpoint
pub struct OllamaProvider {
    client: Client,
    config: OllamaProviderConfig,
}

impl OllamaProvider {
    pub fn new(config: OllamaProviderConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(600)) // 10 minutes timeout
            .build()?;

        Ok(Self { client, config })
    }

    async fn post(&self, payload: Value) -> Result<Value> {
        let url = format!(
            "{}/v1/chat/completions",
            self.config.host.trim_end_matches('/')
        );

        let response = self.client.post(&url).json(&payload).send().await?;

        match response.status() {
            StatusCode::OK => Ok(response.json().await?),
            status if status == StatusCode::TOO_MANY_REQUESTS || status.as_u16() >= 500 => {
                Err(anyhow!("Server error: {}", status))
            }
            status => Err(anyhow!(
                "Request failed: {}\nPayload: {}",
                status,
                payload
            )),
        }
    }
}

#[async_trait]
impl Provider for OllamaProvider {
    async fn complete(
        &self,
        system: &str,
        messages: &[Message],
        tools: &[Tool],
    ) -> Result<(Message, Usage)> {
        self.complete_with_choice(system, messages, tools, &ToolChoice::Auto)
            .await
    }

    async fn complete_with_choice(
        &self,
        system: &str,
        messages: &[Message],
        tools: &[Tool],
        tool_choice: &ToolChoice,
    ) -> Result<(Message, Usage)> {
        let options = RequestOptions {
            model: &self.config.model,
            temperature: self.config.temperature,
            max_tokens: self.config.max_tokens,
        };
        let payload = create_request_payload(options, system, messages, tools, tool_choice)?;

        let response = self.post(payload).await?;
        check_response_error(&response)?;

        let message = openai_response_to_message(&response)?;
        // Older Ollama builds omit usage
        let usage = get_openai_usage(&response).unwrap_or_default();

        Ok((message, usage))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config(host: String) -> OllamaProviderConfig {
        OllamaProviderConfig {
            host,
            model: OLLAMA_MODEL.to_string(),
            temperature: None,
            max_tokens: None,
        }
    }

    async fn _setup_mock_server(response_body: Value) -> (MockServer, OllamaProvider) {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(response_body))
            .mount(&mock_server)
            .await;

        let provider = OllamaProvider::new(config(mock_server.uri())).unwrap();
        (mock_server, provider)
    }

    #[tokio::test]
    async fn test_complete_tool_request() -> Result<()> {
        let response_body = json!({
            "id": "chatcmpl-tool",
            "object": "chat.completion",
            "choices": [{
                "index": 0,
                "message": {
                    "role": "assistant",
                    "content": null,
                    "tool_calls": [{
                        "id": "call_h5d3s25w",
                        "type": "function",
                        "function": {
                            "name": "documents__read_document",
                            "arguments": "{\"file_name\":\"outline.txt\"}"
                        }
                    }]
                },
                "finish_reason": "tool_calls"
            }],
            "usage": {
                "prompt_tokens": 63,
                "completion_tokens": 70,
                "total_tokens": 133
            }
        });

        let (_, provider) = _setup_mock_server(response_body).await;
        let messages = vec![Message::user().with_text("Read the outline")];
        let tool = Tool::new(
            "documents__read_document",
            "Read the specified document.",
            json!({
                "type": "object",
                "properties": {"file_name": {"type": "string"}},
                "required": ["file_name"]
            }),
        );

        let (message, usage) = provider
            .complete("You are a note taker.", &messages, &[tool])
            .await?;

        let tool_call = message.tool_requests()[0].tool_call.clone().unwrap();
        assert_eq!(tool_call.name, "documents__read_document");
        assert_eq!(tool_call.arguments, json!({"file_name": "outline.txt"}));
        assert_eq!(usage.total_tokens, Some(133));
        Ok(())
    }

    #[tokio::test]
    async fn test_missing_usage_defaults() -> Result<()> {
        let (_, provider) = _setup_mock_server(json!({
            "choices": [{"message": {"role": "assistant", "content": "ok"}}]
        }))
        .await;

        let (message, usage) = provider
            .complete("sys", &[Message::user().with_text("hi")], &[])
            .await?;
        assert_eq!(message.text(), "ok");
        assert_eq!(usage.total_tokens, None);
        Ok(())
    }

    #[tokio::test]
    async fn test_server_error() -> Result<()> {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&mock_server)
            .await;

        let provider = OllamaProvider::new(config(mock_server.uri()))?;
        let messages = vec![Message::user().with_text("Hello?")];
        let result = provider
            .complete("You are a helpful assistant.", &messages, &[])
            .await;

        assert!(result
            .unwrap_err()
            .to_string()
            .contains("Server error: 500"));
        Ok(())
    }
}
