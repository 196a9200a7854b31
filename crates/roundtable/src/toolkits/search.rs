use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use std::time::Duration;

use super::{optional_usize, required_str, Toolkit};
use crate::errors::{AgentError, AgentResult};
use crate::models::content::Content;
use crate::models::tool::{Tool, ToolCall};
use crate::settings::ToolSettings;

pub const TAVILY_HOST: &str = "https://api.tavily.com";
pub const DUCKDUCKGO_HOST: &str = "https://api.duckduckgo.com";

/// One hit, whichever backend produced it
#[derive(Debug, Clone, PartialEq)]
struct SearchResult {
    title: String,
    url: String,
    content: String,
}

#[derive(Debug, Clone)]
enum Backend {
    Tavily { host: String, api_key: String },
    DuckDuckGo { host: String },
}

pub struct SearchToolkit {
    tools: Vec<Tool>,
    client: Client,
    backend: Backend,
    max_results: usize,
}

impl SearchToolkit {
    /// Search with Tavily
    pub fn tavily(api_key: impl Into<String>, max_results: usize) -> Self {
        Self::with_backend(
            Backend::Tavily {
                host: TAVILY_HOST.to_string(),
                api_key: api_key.into(),
            },
            max_results,
        )
    }

    /// Search with the keyless DuckDuckGo instant answer API
    pub fn duckduckgo(max_results: usize) -> Self {
        Self::with_backend(
            Backend::DuckDuckGo {
                host: DUCKDUCKGO_HOST.to_string(),
            },
            max_results,
        )
    }

    /// Tavily when a key is configured, DuckDuckGo otherwise
    pub fn from_settings(settings: &ToolSettings) -> Self {
        match &settings.search_api_key {
            Some(key) if !key.is_empty() => Self::tavily(key, settings.max_search_results),
            _ => Self::duckduckgo(settings.max_search_results),
        }
    }

    /// Point the backend at another host
    pub fn with_host(mut self, new_host: impl Into<String>) -> Self {
        match &mut self.backend {
            Backend::Tavily { host, .. } | Backend::DuckDuckGo { host } => *host = new_host.into(),
        }
        self
    }

    fn with_backend(backend: Backend, max_results: usize) -> Self {
        let web_search = Tool::new(
            "web_search",
            "Search the web for up-to-date information. Returns the title, url and a summary of each result.",
            json!({
                "type": "object",
                "required": ["query"],
                "properties": {
                    "query": {
                        "type": "string",
                        "description": "The search query."
                    },
                    "max_results": {
                        "type": "integer",
                        "default": max_results,
                        "description": "Maximum number of results to return."
                    }
                }
            }),
        );
        let client = Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .unwrap_or_default();

        Self {
            tools: vec![web_search],
            client,
            backend,
            max_results,
        }
    }

    async fn search(&self, query: &str, max_results: usize) -> AgentResult<Vec<SearchResult>> {
        tracing::debug!(query, max_results, "web search");
        let mut results = match &self.backend {
            Backend::Tavily { host, api_key } => {
                let url = format!("{}/search", host.trim_end_matches('/'));
                let body = json!({
                    "api_key": api_key,
                    "query": query,
                    "max_results": max_results,
                });
                let response = self.get_json(self.client.post(url).json(&body)).await?;
                parse_tavily(&response)
            }
            Backend::DuckDuckGo { host } => {
                let url = format!("{}/", host.trim_end_matches('/'));
                let request = self.client.get(url).query(&[
                    ("q", query),
                    ("format", "json"),
                    ("no_html", "1"),
                    ("skip_disambig", "1"),
                ]);
                let response = self.get_json(request).await?;
                parse_duckduckgo(&response)
            }
        };
        results.truncate(max_results);
        Ok(results)
    }

    async fn get_json(&self, request: reqwest::RequestBuilder) -> AgentResult<Value> {
        let response = request
            .send()
            .await
            .map_err(|e| AgentError::ExecutionError(format!("Search request failed: {}", e)))?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AgentError::ExecutionError(format!(
                "Search API error {}: {}",
                status, body
            )));
        }
        response
            .json()
            .await
            .map_err(|e| AgentError::ExecutionError(format!("Invalid search response: {}", e)))
    }
}

fn parse_tavily(value: &Value) -> Vec<SearchResult> {
    value
        .get("results")
        .and_then(|r| r.as_array())
        .map(|results| {
            results
                .iter()
                .map(|r| SearchResult {
                    title: str_field(r, "title"),
                    url: str_field(r, "url"),
                    content: str_field(r, "content"),
                })
                .collect()
        })
        .unwrap_or_default()
}

fn parse_duckduckgo(value: &Value) -> Vec<SearchResult> {
    let mut results = Vec::new();

    let abstract_text = str_field(value, "AbstractText");
    if !abstract_text.is_empty() {
        results.push(SearchResult {
            title: str_field(value, "Heading"),
            url: str_field(value, "AbstractURL"),
            content: abstract_text,
        });
    }

    if let Some(topics) = value.get("RelatedTopics").and_then(|t| t.as_array()) {
        for topic in topics {
            // Disambiguation groups nest their topics one level down
            let nested = topic.get("Topics").and_then(|t| t.as_array());
            for entry in nested
                .map(|n| n.iter().collect::<Vec<_>>())
                .unwrap_or_else(|| vec![topic])
            {
                let text = str_field(entry, "Text");
                if text.is_empty() {
                    continue;
                }
                let title = text.split(" - ").next().unwrap_or(&text).to_string();
                results.push(SearchResult {
                    title,
                    url: str_field(entry, "FirstURL"),
                    content: text,
                });
            }
        }
    }

    results
}

fn str_field(value: &Value, key: &str) -> String {
    value
        .get(key)
        .and_then(|v| v.as_str())
        .unwrap_or_default()
        .to_string()
}

fn format_results(results: &[SearchResult]) -> String {
    if results.is_empty() {
        return "No results found.".to_string();
    }
    results
        .iter()
        .map(|r| format!("Title: {}\nURL: {}\nContent: {}", r.title, r.url, r.content))
        .collect::<Vec<_>>()
        .join("\n\n")
}

#[async_trait]
impl Toolkit for SearchToolkit {
    fn name(&self) -> &str {
        "search"
    }

    fn description(&self) -> &str {
        "Searches the web"
    }

    fn instructions(&self) -> &str {
        "Use web_search to find up-to-date information. Cite the urls you rely on."
    }

    fn tools(&self) -> &[Tool] {
        &self.tools
    }

    async fn call(&self, tool_call: ToolCall) -> AgentResult<Vec<Content>> {
        match tool_call.name.as_str() {
            "web_search" => {
                let query = required_str(&tool_call.arguments, "query")?;
                let max_results = optional_usize(&tool_call.arguments, "max_results")?
                    .unwrap_or(self.max_results);
                let results = self.search(query, max_results).await?;
                Ok(vec![Content::text(format_results(&results))])
            }
            _ => Err(AgentError::ToolNotFound(tool_call.name)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn search(toolkit: &SearchToolkit, args: Value) -> AgentResult<String> {
        toolkit
            .call(ToolCall::new("web_search", args))
            .await
            .map(|c| c[0].as_text().unwrap().to_string())
    }

    #[tokio::test]
    async fn test_tavily_search() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/search"))
            .and(body_partial_json(json!({
                "api_key": "tvly-key",
                "query": "rust async",
                "max_results": 5
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "results": [
                    {"title": "Async Book", "url": "https://rust-lang.github.io/async-book", "content": "Futures explained"},
                    {"title": "Tokio", "url": "https://tokio.rs", "content": "A runtime"}
                ]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let toolkit = SearchToolkit::tavily("tvly-key", 5).with_host(server.uri());
        let output = search(&toolkit, json!({"query": "rust async"})).await.unwrap();
        assert_eq!(
            output,
            "Title: Async Book\nURL: https://rust-lang.github.io/async-book\nContent: Futures explained\n\n\
             Title: Tokio\nURL: https://tokio.rs\nContent: A runtime"
        );
    }

    #[tokio::test]
    async fn test_duckduckgo_search_respects_max_results() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(query_param("q", "rust"))
            .and(query_param("format", "json"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "Heading": "Rust",
                "AbstractText": "Rust is a systems language.",
                "AbstractURL": "https://en.wikipedia.org/wiki/Rust",
                "RelatedTopics": [
                    {"Text": "Cargo - the Rust package manager", "FirstURL": "https://duckduckgo.com/Cargo"},
                    {"Name": "Games", "Topics": [
                        {"Text": "Rust (video game) - survival game", "FirstURL": "https://duckduckgo.com/Rust_game"}
                    ]}
                ]
            })))
            .mount(&server)
            .await;

        let toolkit = SearchToolkit::duckduckgo(5).with_host(server.uri());
        let output = search(&toolkit, json!({"query": "rust", "max_results": 2}))
            .await
            .unwrap();
        assert!(output.starts_with("Title: Rust\nURL: https://en.wikipedia.org/wiki/Rust"));
        assert!(output.contains("Title: Cargo\n"));
        assert!(!output.contains("video game"));
    }

    #[tokio::test]
    async fn test_no_results() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"RelatedTopics": []})))
            .mount(&server)
            .await;

        let toolkit = SearchToolkit::duckduckgo(5).with_host(server.uri());
        let output = search(&toolkit, json!({"query": "zzzz"})).await.unwrap();
        assert_eq!(output, "No results found.");
    }

    #[tokio::test]
    async fn test_api_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401).set_body_string("invalid key"))
            .mount(&server)
            .await;

        let toolkit = SearchToolkit::tavily("bad", 5).with_host(server.uri());
        let err = search(&toolkit, json!({"query": "x"})).await.unwrap_err();
        match err {
            AgentError::ExecutionError(msg) => assert!(msg.contains("invalid key")),
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[test]
    fn test_backend_from_settings() {
        let mut settings = ToolSettings::default();
        assert!(matches!(
            SearchToolkit::from_settings(&settings).backend,
            Backend::DuckDuckGo { .. }
        ));
        settings.search_api_key = Some("key".into());
        assert!(matches!(
            SearchToolkit::from_settings(&settings).backend,
            Backend::Tavily { .. }
        ));
    }
}
