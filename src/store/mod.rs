// src/store/mod.rs
//! Persistence collaborator: records, the `Store`/`StoreTx` traits and a
//! local backend.
//!
//! Entity writes happen inside a [`StoreTx`]. Creates are visible (with ids)
//! to later calls on the same transaction before anything is committed;
//! dropping a transaction without [`StoreTx::commit`] discards its writes.
//!
//! The rotation-state blob is a separate key/value API with optimistic
//! versioning so the load→mutate→save cycle can be made atomic.

pub mod local;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::StoreError;

pub use local::LocalStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SourceId(pub i64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TagId(pub i64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ArticleId(pub i64);

/// Persisted source. `url` is the natural key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Source {
    pub id: SourceId,
    pub title: String,
    pub url: String,
    pub domain: String,
    pub sector: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewSource {
    pub title: String,
    pub url: String,
    pub domain: String,
    pub sector: String,
}

/// Persisted tag. `name` is the natural key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tag {
    pub id: TagId,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Article {
    pub id: ArticleId,
    pub title: String,
    /// Citation-renumbered body.
    pub content: String,
    pub sector: String,
    /// 0..=10
    pub impact_score: u8,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewArticle {
    pub title: String,
    pub content: String,
    pub sector: String,
    pub impact_score: u8,
}

/// Article with its linked sources and tags, in link order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArticleView {
    pub article: Article,
    pub sources: Vec<Source>,
    pub tags: Vec<Tag>,
}

/// A versioned key/value state row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateRecord {
    pub value: String,
    pub version: u64,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreStats {
    pub articles: usize,
    pub sources: usize,
    pub tags: usize,
}

#[async_trait::async_trait]
pub trait Store: Send + Sync {
    /// Open a unit of work for entity writes.
    async fn begin(&self) -> Result<Box<dyn StoreTx + '_>, StoreError>;

    /// Read a state row. `None` when the key was never written.
    async fn load_state(&self, key: &str) -> Result<Option<StateRecord>, StoreError>;

    /// Write a state row if its current version equals `expected_version`
    /// (`None` = the row must not exist yet). Returns the new version.
    async fn save_state(
        &self,
        key: &str,
        value: String,
        expected_version: Option<u64>,
    ) -> Result<u64, StoreError>;

    async fn article(&self, id: ArticleId) -> Result<Option<ArticleView>, StoreError>;

    async fn stats(&self) -> Result<StoreStats, StoreError>;
}

#[async_trait::async_trait]
pub trait StoreTx: Send {
    /// Single batched lookup by natural key.
    async fn get_sources_by_urls(&mut self, urls: &[String]) -> Result<Vec<Source>, StoreError>;

    /// Insert and flush: the id is usable immediately, nothing is committed.
    async fn create_source(&mut self, new: &NewSource) -> Result<Source, StoreError>;

    async fn get_tags_by_names(&mut self, names: &[String]) -> Result<Vec<Tag>, StoreError>;

    async fn create_tag(&mut self, name: &str) -> Result<Tag, StoreError>;

    async fn create_article(&mut self, new: &NewArticle) -> Result<Article, StoreError>;

    async fn article_source_ids(&mut self, article: ArticleId) -> Result<Vec<SourceId>, StoreError>;

    async fn article_tag_ids(&mut self, article: ArticleId) -> Result<Vec<TagId>, StoreError>;

    /// Fails with `Duplicate` if the pair already exists.
    async fn link_article_source(
        &mut self,
        article: ArticleId,
        source: SourceId,
    ) -> Result<(), StoreError>;

    /// Fails with `Duplicate` if the pair already exists.
    async fn link_article_tag(&mut self, article: ArticleId, tag: TagId) -> Result<(), StoreError>;

    async fn commit(&mut self) -> Result<(), StoreError>;
}
