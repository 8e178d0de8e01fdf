// src/completion/perplexity.rs
//! Perplexity chat-completions client. Requires `PERPLEXITY_API_KEY` (or an
//! explicit key from config).

use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::{Completion, CompletionRequest, CompletionService, Message, SearchResult};
use crate::error::ServiceError;

pub const DEFAULT_ENDPOINT: &str = "https://api.perplexity.ai/chat/completions";

pub struct PerplexityClient {
    http: reqwest::Client,
    endpoint: String,
    api_key: String,
}

impl PerplexityClient {
    pub fn new(endpoint: impl Into<String>, api_key: impl Into<String>) -> Result<Self, ServiceError> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("sector-digest/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self {
            http,
            endpoint: endpoint.into(),
            api_key: api_key.into(),
        })
    }
}

#[derive(Serialize)]
struct Req<'a> {
    model: &'a str,
    temperature: f32,
    messages: &'a [Message],
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ReqFormat<'a>>,
}

#[derive(Serialize)]
struct ReqFormat<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    json_schema: ReqSchema<'a>,
}

#[derive(Serialize)]
struct ReqSchema<'a> {
    schema: &'a serde_json::Value,
}

#[derive(Deserialize)]
struct Resp {
    #[serde(default)]
    choices: Vec<Choice>,
    #[serde(default)]
    search_results: Vec<SearchResult>,
    /// Older responses only carry bare URLs.
    #[serde(default)]
    citations: Vec<String>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMsg,
}

#[derive(Deserialize)]
struct ChoiceMsg {
    #[serde(default)]
    content: String,
}

#[async_trait::async_trait]
impl CompletionService for PerplexityClient {
    async fn complete(&self, req: &CompletionRequest) -> Result<Completion, ServiceError> {
        if self.api_key.is_empty() {
            return Err(ServiceError::MissingApiKey);
        }

        let body = Req {
            model: &req.model,
            temperature: req.temperature,
            messages: &req.messages,
            response_format: req.response_format.as_ref().map(|f| ReqFormat {
                kind: "json_schema",
                json_schema: ReqSchema { schema: &f.schema },
            }),
        };

        let timeout_secs = req.timeout.as_secs();
        let resp = self
            .http
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .timeout(req.timeout)
            .json(&body)
            .send()
            .await
            .map_err(|e| classify(e, timeout_secs))?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(ServiceError::Status {
                status: status.as_u16(),
                body: text.chars().take(300).collect(),
            });
        }

        let parsed: Resp = resp.json().await.map_err(|e| {
            if e.is_timeout() {
                ServiceError::Timeout(timeout_secs)
            } else {
                ServiceError::Malformed(e.to_string())
            }
        })?;

        let content = parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| ServiceError::Malformed("no choices in response".into()))?;

        let search_results = if parsed.search_results.is_empty() {
            parsed
                .citations
                .into_iter()
                .map(|url| SearchResult {
                    url,
                    ..Default::default()
                })
                .collect()
        } else {
            parsed.search_results
        };

        tracing::debug!(
            target: "completion",
            stage = req.stage.as_str(),
            model = %req.model,
            chars = content.len(),
            hits = search_results.len(),
            "completion received"
        );

        Ok(Completion {
            content,
            search_results,
            structured: req.response_format.is_some(),
        })
    }

    fn name(&self) -> &'static str {
        "perplexity"
    }
}

fn classify(e: reqwest::Error, timeout_secs: u64) -> ServiceError {
    if e.is_timeout() {
        ServiceError::Timeout(timeout_secs)
    } else {
        ServiceError::Http(e)
    }
}
