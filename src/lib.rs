// src/lib.rs
// Public library surface for the binary and integration tests.

pub mod citations;
pub mod completion;
pub mod config;
pub mod error;
pub mod metrics;
pub mod parse;
pub mod pipeline;
pub mod prompts;
pub mod rotation;
pub mod sectors;
pub mod store;
pub mod trust;
pub mod upsert;

// ---- Re-exports for stable public API ----
pub use crate::citations::{filter_and_renumber, ExtraSourcePolicy, FilterStats, Reconciled};
pub use crate::error::{RotationError, ServiceError, StoreError, TopicError};
pub use crate::pipeline::{Pipeline, RunReport, TopicOutcome};
pub use crate::rotation::SectorRotation;
pub use crate::trust::{TrustClassifier, TrustTier};
