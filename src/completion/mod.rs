// src/completion/mod.rs
//! Completion Service abstraction: prompt in, text (plus search hits) out.
//!
//! The pipeline only sees [`CompletionService`]. Retries are the caller's
//! business; implementations make exactly one attempt per call.

pub mod perplexity;

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ServiceError;

pub use perplexity::PerplexityClient;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

/// Pipeline step a request belongs to (logging, metrics, test dispatch).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Trends,
    Articles,
    Synthesis,
    Impact,
}

impl Stage {
    pub fn as_str(self) -> &'static str {
        match self {
            Stage::Trends => "trends",
            Stage::Articles => "articles",
            Stage::Synthesis => "synthesis",
            Stage::Impact => "impact",
        }
    }
}

/// JSON-schema constraint on the reply.
#[derive(Debug, Clone, PartialEq)]
pub struct ResponseFormat {
    pub schema: serde_json::Value,
}

#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub stage: Stage,
    pub model: String,
    pub temperature: f32,
    pub messages: Vec<Message>,
    pub response_format: Option<ResponseFormat>,
    pub timeout: Duration,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchResult {
    #[serde(default)]
    pub title: String,
    pub url: String,
    #[serde(default)]
    pub date: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Completion {
    pub content: String,
    /// Hits the service consulted; empty when it reports none.
    pub search_results: Vec<SearchResult>,
    /// The request carried a response schema, so `content` should be JSON.
    pub structured: bool,
}

impl Completion {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            ..Default::default()
        }
    }

    pub fn with_search_results(mut self, results: Vec<SearchResult>) -> Self {
        self.search_results = results;
        self
    }
}

#[async_trait::async_trait]
pub trait CompletionService: Send + Sync {
    /// One attempt; fails with `ServiceError` on transport errors, non-2xx or timeout.
    async fn complete(&self, req: &CompletionRequest) -> Result<Completion, ServiceError>;

    fn name(&self) -> &'static str;
}

pub type DynCompletion = Arc<dyn CompletionService>;

// ------------------------------------------------------------
// Mock for tests and dry runs
// ------------------------------------------------------------

type Handler = dyn Fn(&CompletionRequest) -> Result<Completion, ServiceError> + Send + Sync;

/// Answers from a closure and records every request it saw.
pub struct MockCompletion {
    handler: Box<Handler>,
    calls: Mutex<Vec<CompletionRequest>>,
}

impl MockCompletion {
    pub fn new(
        handler: impl Fn(&CompletionRequest) -> Result<Completion, ServiceError> + Send + Sync + 'static,
    ) -> Self {
        Self {
            handler: Box::new(handler),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Replies in order; once exhausted every call fails as malformed.
    pub fn scripted(replies: Vec<Result<Completion, ServiceError>>) -> Self {
        let queue = Mutex::new(VecDeque::from(replies));
        Self::new(move |_| {
            queue
                .lock()
                .map_err(|_| ServiceError::Malformed("mock script poisoned".into()))?
                .pop_front()
                .unwrap_or_else(|| Err(ServiceError::Malformed("mock script exhausted".into())))
        })
    }

    pub fn calls(&self) -> Vec<CompletionRequest> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    pub fn calls_for(&self, stage: Stage) -> usize {
        self.calls().iter().filter(|c| c.stage == stage).count()
    }
}

#[async_trait::async_trait]
impl CompletionService for MockCompletion {
    async fn complete(&self, req: &CompletionRequest) -> Result<Completion, ServiceError> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(req.clone());
        }
        let mut out = (self.handler)(req)?;
        out.structured = req.response_format.is_some();
        Ok(out)
    }

    fn name(&self) -> &'static str {
        "mock"
    }
}
