//! Web search via the DuckDuckGo instant answer API

use super::{cancellable, Tool, ToolContext, ToolOutput};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use std::fmt::Write;
use std::time::Duration;

const DUCKDUCKGO_URL: &str = "https://api.duckduckgo.com/";
const MAX_RELATED: usize = 5;

pub struct WebSearchTool {
    client: Client,
}

impl Default for WebSearchTool {
    fn default() -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(20))
            .user_agent(concat!("thread-chat/", env!("CARGO_PKG_VERSION")))
            .build()
            .unwrap_or_else(|_| Client::new());
        Self { client }
    }
}

#[derive(Debug, Deserialize)]
struct WebSearchInput {
    query: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
struct InstantAnswer {
    heading: String,
    abstract_text: String,
    #[serde(rename = "AbstractURL")]
    abstract_url: String,
    answer: Value,
    related_topics: Vec<RelatedTopic>,
}

/// Either a topic or a named group of topics
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RelatedTopic {
    Topic {
        #[serde(rename = "Text")]
        text: String,
        #[serde(rename = "FirstURL", default)]
        first_url: String,
    },
    Group {
        #[serde(rename = "Topics")]
        topics: Vec<RelatedTopic>,
    },
}

fn flatten_topics<'a>(topics: &'a [RelatedTopic], out: &mut Vec<(&'a str, &'a str)>) {
    for topic in topics {
        match topic {
            RelatedTopic::Topic { text, first_url } => out.push((text, first_url)),
            RelatedTopic::Group { topics } => flatten_topics(topics, out),
        }
    }
}

/// Render an instant answer as plain text for the model
fn format_results(query: &str, answer: &InstantAnswer) -> Option<String> {
    let mut out = String::new();

    if !answer.heading.is_empty() {
        let _ = writeln!(out, "{}", answer.heading);
    }
    let direct = match &answer.answer {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        _ => String::new(),
    };
    if !direct.is_empty() {
        let _ = writeln!(out, "Answer: {direct}");
    }
    if !answer.abstract_text.is_empty() {
        let _ = writeln!(out, "{}", answer.abstract_text);
        if !answer.abstract_url.is_empty() {
            let _ = writeln!(out, "Source: {}", answer.abstract_url);
        }
    }

    let mut related = Vec::new();
    flatten_topics(&answer.related_topics, &mut related);
    let related: Vec<_> = related
        .into_iter()
        .filter(|(text, _)| !text.is_empty())
        .take(MAX_RELATED)
        .collect();
    if !related.is_empty() {
        let _ = writeln!(out, "Related results for '{query}':");
        for (text, url) in related {
            if url.is_empty() {
                let _ = writeln!(out, "- {text}");
            } else {
                let _ = writeln!(out, "- {text} ({url})");
            }
        }
    }

    let out = out.trim_end().to_string();
    (!out.is_empty()).then_some(out)
}

impl WebSearchTool {
    async fn search(&self, query: &str) -> ToolOutput {
        let response = match self
            .client
            .get(DUCKDUCKGO_URL)
            .query(&[
                ("q", query),
                ("format", "json"),
                ("no_html", "1"),
                ("skip_disambig", "1"),
            ])
            .send()
            .await
        {
            Ok(r) => r,
            Err(e) => return ToolOutput::error(format!("Search request failed: {e}")),
        };

        let status = response.status();
        if !status.is_success() {
            return ToolOutput::error(format!("Search service returned {status}"));
        }
        // Served as application/x-javascript, so parse the text ourselves
        let body = match response.text().await {
            Ok(b) => b,
            Err(e) => return ToolOutput::error(format!("Failed to read search response: {e}")),
        };
        let answer: InstantAnswer = match serde_json::from_str(&body) {
            Ok(a) => a,
            Err(e) => return ToolOutput::error(format!("Unexpected search response: {e}")),
        };

        match format_results(query, &answer) {
            Some(text) => ToolOutput::success(text),
            None => ToolOutput::success(format!(
                "No instant results found for '{query}'. Answer from your own knowledge and say so."
            )),
        }
    }
}

#[async_trait]
impl Tool for WebSearchTool {
    fn name(&self) -> &'static str {
        "web_search"
    }

    fn description(&self) -> String {
        "Look up a short encyclopedic answer about a topic, person, place or thing. Returns instant-answer summaries, not full web results or breaking news.".to_string()
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "required": ["query"],
            "properties": {
                "query": {
                    "type": "string",
                    "description": "What to search for"
                }
            }
        })
    }

    async fn run(&self, input: Value, ctx: ToolContext) -> ToolOutput {
        let input: WebSearchInput = match serde_json::from_value(input) {
            Ok(i) => i,
            Err(e) => return ToolOutput::error(format!("Invalid input: {e}")),
        };
        let query = input.query.trim();
        if query.is_empty() {
            return ToolOutput::error("query must not be empty");
        }

        tracing::debug!(query = %query, "Running web search");
        cancellable(&ctx, self.search(query)).await
    }
}
