// src/upsert.rs
//! Batch get-or-create for entities with a natural key, and guarded linking.
//!
//! One batched lookup per call; only missing keys are inserted, through the
//! same transaction so their ids can be linked before commit. Output ids
//! follow input order and a key repeated inside one batch reuses the id of
//! its first occurrence.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use tracing::debug;

use crate::error::StoreError;
use crate::store::{ArticleId, NewArticle, NewSource, SourceId, Store, StoreTx, TagId};

#[async_trait]
pub trait Upsert: Send + Sync {
    type Id: Copy + Send + Sync;

    fn natural_key(&self) -> String;

    /// Existing rows for `keys`, as `(natural_key, id)`.
    async fn find_existing(
        tx: &mut dyn StoreTx,
        keys: &[String],
    ) -> Result<Vec<(String, Self::Id)>, StoreError>;

    async fn insert(&self, tx: &mut dyn StoreTx) -> Result<Self::Id, StoreError>;
}

#[async_trait]
impl Upsert for NewSource {
    type Id = SourceId;

    fn natural_key(&self) -> String {
        self.url.trim().to_string()
    }

    async fn find_existing(
        tx: &mut dyn StoreTx,
        keys: &[String],
    ) -> Result<Vec<(String, SourceId)>, StoreError> {
        Ok(tx
            .get_sources_by_urls(keys)
            .await?
            .into_iter()
            .map(|s| (s.url, s.id))
            .collect())
    }

    async fn insert(&self, tx: &mut dyn StoreTx) -> Result<SourceId, StoreError> {
        let mut new = self.clone();
        new.url = self.natural_key();
        Ok(tx.create_source(&new).await?.id)
    }
}

/// Tags are keyed by their trimmed name.
#[async_trait]
impl Upsert for String {
    type Id = TagId;

    fn natural_key(&self) -> String {
        self.trim().to_string()
    }

    async fn find_existing(
        tx: &mut dyn StoreTx,
        keys: &[String],
    ) -> Result<Vec<(String, TagId)>, StoreError> {
        Ok(tx
            .get_tags_by_names(keys)
            .await?
            .into_iter()
            .map(|t| (t.name, t.id))
            .collect())
    }

    async fn insert(&self, tx: &mut dyn StoreTx) -> Result<TagId, StoreError> {
        Ok(tx.create_tag(&self.natural_key()).await?.id)
    }
}

pub async fn get_or_create<R: Upsert>(
    tx: &mut dyn StoreTx,
    batch: &[R],
) -> Result<Vec<R::Id>, StoreError> {
    if batch.is_empty() {
        return Ok(Vec::new());
    }
    let keys: Vec<String> = batch.iter().map(Upsert::natural_key).collect();

    let mut seen = HashSet::new();
    let distinct: Vec<String> = keys
        .iter()
        .filter(|k| seen.insert(k.as_str()))
        .cloned()
        .collect();

    let mut ids: HashMap<String, R::Id> = R::find_existing(tx, &distinct).await?.into_iter().collect();
    let found = ids.len();

    let mut out = Vec::with_capacity(batch.len());
    for (record, key) in batch.iter().zip(keys) {
        let id = match ids.get(&key) {
            Some(id) => *id,
            None => {
                let id = record.insert(tx).await?;
                ids.insert(key, id);
                id
            }
        };
        out.push(id);
    }

    debug!(
        target: "upsert",
        batch = batch.len(),
        distinct = distinct.len(),
        reused = found,
        created = ids.len() - found,
        "get_or_create"
    );
    Ok(out)
}

/// Link only pairs not already present. Returns how many links were added.
pub async fn link_sources(
    tx: &mut dyn StoreTx,
    article: ArticleId,
    sources: &[SourceId],
) -> Result<usize, StoreError> {
    let mut linked: HashSet<SourceId> = tx.article_source_ids(article).await?.into_iter().collect();
    let mut added = 0;
    for &id in sources {
        if linked.insert(id) {
            tx.link_article_source(article, id).await?;
            added += 1;
        }
    }
    Ok(added)
}

pub async fn link_tags(
    tx: &mut dyn StoreTx,
    article: ArticleId,
    tags: &[TagId],
) -> Result<usize, StoreError> {
    let mut linked: HashSet<TagId> = tx.article_tag_ids(article).await?.into_iter().collect();
    let mut added = 0;
    for &id in tags {
        if linked.insert(id) {
            tx.link_article_tag(article, id).await?;
            added += 1;
        }
    }
    Ok(added)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersistedArticle {
    pub id: ArticleId,
    /// In citation order.
    pub source_ids: Vec<SourceId>,
    pub tag_ids: Vec<TagId>,
}

/// Create the article, upsert its sources and tags and link them, all in one
/// transaction. Nothing is written if any step fails.
pub async fn persist_article(
    store: &dyn Store,
    article: &NewArticle,
    sources: &[NewSource],
    tags: &[String],
) -> Result<PersistedArticle, StoreError> {
    let mut tx = store.begin().await?;
    let created = tx.create_article(article).await?;
    let source_ids = get_or_create(tx.as_mut(), sources).await?;
    let tag_ids = get_or_create(tx.as_mut(), tags).await?;
    link_sources(tx.as_mut(), created.id, &source_ids).await?;
    link_tags(tx.as_mut(), created.id, &tag_ids).await?;
    tx.commit().await?;
    Ok(PersistedArticle {
        id: created.id,
        source_ids,
        tag_ids,
    })
}
