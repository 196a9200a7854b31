use async_trait::async_trait;
use lazy_static::lazy_static;
use reqwest::Client;
use scraper::{ElementRef, Html, Node, Selector};
use serde_json::json;
use std::time::Duration;

use super::Toolkit;
use crate::errors::{AgentError, AgentResult};
use crate::models::content::Content;
use crate::models::tool::{Tool, ToolCall};

lazy_static! {
    static ref TITLE: Selector = Selector::parse("title").unwrap();
    static ref BODY: Selector = Selector::parse("body").unwrap();
}

/// Elements whose text never reaches the reader
const INVISIBLE: &[&str] = &["script", "style", "noscript", "template"];

/// Elements that start a new line of text
const BLOCKS: &[&str] = &[
    "p", "div", "br", "hr", "h1", "h2", "h3", "h4", "h5", "h6", "li", "ul", "ol", "tr", "td",
    "th", "table", "section", "article", "header", "footer", "nav", "pre", "blockquote",
];

pub struct ScraperToolkit {
    tools: Vec<Tool>,
    client: Client,
}

impl Default for ScraperToolkit {
    fn default() -> Self {
        Self::new()
    }
}

impl ScraperToolkit {
    pub fn new() -> Self {
        let scrape_webpages = Tool::new(
            "scrape_webpages",
            "Scrape the provided web pages for detailed information.",
            json!({
                "type": "object",
                "required": ["urls"],
                "properties": {
                    "urls": {
                        "type": "array",
                        "items": {"type": "string"},
                        "description": "The urls of the pages to scrape."
                    }
                }
            }),
        );
        let client = Client::builder()
            .timeout(Duration::from_secs(60))
            .user_agent(concat!("roundtable/", env!("CARGO_PKG_VERSION")))
            .build()
            .unwrap_or_default();

        Self {
            tools: vec![scrape_webpages],
            client,
        }
    }

    async fn fetch(&self, url: &str) -> AgentResult<String> {
        let parsed = url::Url::parse(url)
            .map_err(|e| AgentError::InvalidParameters(format!("Invalid url '{}': {}", url, e)))?;
        tracing::debug!(url = %parsed, "scraping page");

        let response = self
            .client
            .get(parsed)
            .send()
            .await
            .map_err(|e| AgentError::ExecutionError(format!("Failed to fetch {}: {}", url, e)))?;
        if !response.status().is_success() {
            return Err(AgentError::ExecutionError(format!(
                "Failed to fetch {}: {}",
                url,
                response.status()
            )));
        }
        let html = response
            .text()
            .await
            .map_err(|e| AgentError::ExecutionError(format!("Failed to read {}: {}", url, e)))?;

        Ok(to_document(&html))
    }
}

/// Render a page as the `<Document>` block handed to the model
fn to_document(html: &str) -> String {
    let document = Html::parse_document(html);
    let title = document
        .select(&TITLE)
        .next()
        .map(|el| collapse_whitespace(&el.text().collect::<String>()))
        .unwrap_or_default();
    let text = document
        .select(&BODY)
        .next()
        .map(page_text)
        .unwrap_or_default();
    format!("<Document name=\"{}\">\n{}\n</Document>", title, text)
}

/// Visible text of an element, one block per line
fn page_text(body: ElementRef) -> String {
    let mut text = String::new();
    collect_text(body, &mut text);
    text.lines()
        .map(collapse_whitespace)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

fn collect_text(element: ElementRef, out: &mut String) {
    for child in element.children() {
        match child.value() {
            Node::Text(text) => out.push_str(text),
            Node::Element(el) if INVISIBLE.contains(&el.name()) => {}
            Node::Element(el) => {
                let block = BLOCKS.contains(&el.name());
                if block {
                    out.push('\n');
                }
                if let Some(child) = ElementRef::wrap(child) {
                    collect_text(child, out);
                }
                if block {
                    out.push('\n');
                }
            }
            _ => {}
        }
    }
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[async_trait]
impl Toolkit for ScraperToolkit {
    fn name(&self) -> &str {
        "scraper"
    }

    fn description(&self) -> &str {
        "Reads the text of web pages"
    }

    fn instructions(&self) -> &str {
        "Use scrape_webpages on urls found by your team to get more detailed information."
    }

    fn tools(&self) -> &[Tool] {
        &self.tools
    }

    async fn call(&self, tool_call: ToolCall) -> AgentResult<Vec<Content>> {
        if tool_call.name != "scrape_webpages" {
            return Err(AgentError::ToolNotFound(tool_call.name));
        }
        let urls: Vec<&str> = tool_call
            .arguments
            .get("urls")
            .and_then(|v| v.as_array())
            .map(|urls| urls.iter().filter_map(|u| u.as_str()).collect())
            .unwrap_or_default();
        if urls.is_empty() {
            return Err(AgentError::InvalidParameters(
                "'urls' must be a non-empty list of urls".into(),
            ));
        }

        let mut documents = Vec::with_capacity(urls.len());
        for url in urls {
            documents.push(self.fetch(url).await?);
        }
        Ok(vec![Content::text(documents.join("\n\n"))])
    }
}
