// src/error.rs
//! Error taxonomy for the ingestion pipeline.
//!
//! Skip-vs-fatal is decided by the caller: `ServiceError` and
//! `TopicError` end one topic, `RotationError` ends the whole run.

use thiserror::Error;

/// Failures talking to the Completion Service.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("completion service timed out after {0}s")]
    Timeout(u64),

    #[error("completion service returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("completion service request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("completion service response malformed: {0}")]
    Malformed(String),

    #[error("completion service api key missing")]
    MissingApiKey,
}

/// Failures of the persistence collaborator.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Optimistic write lost against a concurrent writer.
    #[error("state {key:?} changed concurrently (expected version {expected:?}, found {found:?})")]
    Conflict {
        key: String,
        expected: Option<u64>,
        found: Option<u64>,
    },

    #[error("{kind} {id} not found")]
    NotFound { kind: &'static str, id: i64 },

    #[error("duplicate {kind} key {key:?}")]
    Duplicate { kind: &'static str, key: String },

    #[error("store io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("store json error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Scheduler failures. All of them are fatal to the run.
#[derive(Debug, Error)]
pub enum RotationError {
    #[error("sector queue is empty")]
    EmptyQueue,

    #[error("persisted rotation state is corrupt: {0}")]
    CorruptState(String),

    #[error("rotation state still contended after {0} attempts")]
    Contention(usize),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Why a topic (or a whole sector) produced no article.
#[derive(Debug, Error)]
pub enum TopicError {
    #[error(transparent)]
    Service(#[from] ServiceError),

    #[error("insufficient results: {0}")]
    InsufficientResults(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl TopicError {
    /// Skips are expected outcomes; everything else is a failure worth alerting on.
    pub fn is_skip(&self) -> bool {
        matches!(self, TopicError::InsufficientResults(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insufficient_results_is_a_skip() {
        assert!(TopicError::InsufficientResults("0 trusted".into()).is_skip());
        assert!(!TopicError::Service(ServiceError::Timeout(60)).is_skip());
    }

    #[test]
    fn conflict_message_names_the_key() {
        let e = StoreError::Conflict {
            key: "sector_rotation".into(),
            expected: Some(3),
            found: Some(4),
        };
        assert!(e.to_string().contains("sector_rotation"));
    }
}
