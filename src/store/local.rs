// src/store/local.rs
//! `LocalStore`: in-memory backend, optionally persisted to one JSON file.
//!
//! With a file, the file is the source of truth. Every write (a transaction
//! or a state save) holds an exclusive OS lock on `<file>.lock`, re-reads the
//! file under it, and rewrites the whole file via temp file + rename before
//! releasing the lock. Separate handles and separate processes on the same
//! path therefore see each other's commits.

use std::collections::{BTreeMap, BTreeSet};
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, OwnedMutexGuard};

use super::{
    Article, ArticleId, ArticleView, NewArticle, NewSource, Source, SourceId, StateRecord, Store,
    StoreStats, StoreTx, Tag, TagId,
};
use crate::error::StoreError;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct Data {
    #[serde(default)]
    seq: Sequences,
    #[serde(default)]
    sources: Vec<Source>,
    #[serde(default)]
    tags: Vec<Tag>,
    #[serde(default)]
    articles: Vec<Article>,
    #[serde(default)]
    article_sources: Vec<(ArticleId, SourceId)>,
    #[serde(default)]
    article_tags: Vec<(ArticleId, TagId)>,
    #[serde(default)]
    state: BTreeMap<String, StateRecord>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct Sequences {
    article: i64,
    source: i64,
    tag: i64,
}

impl Data {
    fn has_article(&self, id: ArticleId) -> bool {
        self.articles.iter().any(|a| a.id == id)
    }
}

/// In-memory store with optional JSON-file persistence.
///
/// Cloning is cheap and clones share state.
#[derive(Clone)]
pub struct LocalStore {
    inner: Arc<Mutex<Data>>,
    path: Option<PathBuf>,
}

impl LocalStore {
    pub fn in_memory() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Data::default())),
            path: None,
        }
    }

    /// Open (or create on first commit) a store backed by `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        let data = read_data(&path)?;
        Ok(Self {
            inner: Arc::new(Mutex::new(data)),
            path: Some(path),
        })
    }

    /// Pull the latest committed file contents into the cache.
    fn refresh(&self, cache: &mut Data) -> Result<(), StoreError> {
        if let Some(path) = &self.path {
            *cache = read_data(path)?;
        }
        Ok(())
    }
}

fn read_data(path: &Path) -> Result<Data, StoreError> {
    match std::fs::read_to_string(path) {
        Ok(s) => Ok(serde_json::from_str(&s)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Data::default()),
        Err(e) => Err(e.into()),
    }
}

fn lock_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".lock");
    PathBuf::from(name)
}

/// Exclusive lock on the sidecar lock file; released when the handle drops.
async fn acquire_file_lock(path: Option<&Path>) -> Result<Option<File>, StoreError> {
    let Some(path) = path else {
        return Ok(None);
    };
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let lock = lock_path(path);
    let file = tokio::task::spawn_blocking(move || -> std::io::Result<File> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&lock)?;
        file.lock_exclusive()?;
        Ok(file)
    })
    .await
    .map_err(std::io::Error::other)??;
    Ok(Some(file))
}

fn persist(path: Option<&Path>, data: &Data) -> Result<(), StoreError> {
    let Some(path) = path else {
        return Ok(());
    };
    let tmp = path.with_extension("json.tmp");
    let json = serde_json::to_vec_pretty(data)?;
    let mut f = std::fs::File::create(&tmp)?;
    f.write_all(&json)?;
    f.sync_all()?;
    std::fs::rename(tmp, path)?;
    Ok(())
}

#[async_trait::async_trait]
impl Store for LocalStore {
    async fn begin(&self) -> Result<Box<dyn StoreTx + '_>, StoreError> {
        let mut guard = self.inner.clone().lock_owned().await;
        let file_lock = acquire_file_lock(self.path.as_deref()).await?;
        self.refresh(&mut guard)?;
        let work = guard.clone();
        Ok(Box::new(LocalTx {
            guard,
            work,
            path: self.path.clone(),
            _file_lock: file_lock,
        }))
    }

    async fn load_state(&self, key: &str) -> Result<Option<StateRecord>, StoreError> {
        let mut g = self.inner.lock().await;
        self.refresh(&mut g)?;
        Ok(g.state.get(key).cloned())
    }

    async fn save_state(
        &self,
        key: &str,
        value: String,
        expected_version: Option<u64>,
    ) -> Result<u64, StoreError> {
        let mut g = self.inner.lock().await;
        let _file_lock = acquire_file_lock(self.path.as_deref()).await?;
        self.refresh(&mut g)?;
        let found = g.state.get(key).map(|r| r.version);
        if found != expected_version {
            return Err(StoreError::Conflict {
                key: key.to_string(),
                expected: expected_version,
                found,
            });
        }
        let version = found.map_or(1, |v| v + 1);
        let mut next = g.clone();
        next.state.insert(
            key.to_string(),
            StateRecord {
                value,
                version,
                updated_at: Utc::now(),
            },
        );
        persist(self.path.as_deref(), &next)?;
        *g = next;
        Ok(version)
    }

    async fn article(&self, id: ArticleId) -> Result<Option<ArticleView>, StoreError> {
        let mut g = self.inner.lock().await;
        self.refresh(&mut g)?;
        let Some(article) = g.articles.iter().find(|a| a.id == id).cloned() else {
            return Ok(None);
        };
        let sources = g
            .article_sources
            .iter()
            .filter(|(a, _)| *a == id)
            .filter_map(|(_, s)| g.sources.iter().find(|x| x.id == *s).cloned())
            .collect();
        let tags = g
            .article_tags
            .iter()
            .filter(|(a, _)| *a == id)
            .filter_map(|(_, t)| g.tags.iter().find(|x| x.id == *t).cloned())
            .collect();
        Ok(Some(ArticleView {
            article,
            sources,
            tags,
        }))
    }

    async fn stats(&self) -> Result<StoreStats, StoreError> {
        let mut g = self.inner.lock().await;
        self.refresh(&mut g)?;
        Ok(StoreStats {
            articles: g.articles.len(),
            sources: g.sources.len(),
            tags: g.tags.len(),
        })
    }
}

struct LocalTx {
    guard: OwnedMutexGuard<Data>,
    work: Data,
    path: Option<PathBuf>,
    _file_lock: Option<File>,
}

#[async_trait::async_trait]
impl StoreTx for LocalTx {
    async fn get_sources_by_urls(&mut self, urls: &[String]) -> Result<Vec<Source>, StoreError> {
        let wanted: BTreeSet<&str> = urls.iter().map(String::as_str).collect();
        Ok(self
            .work
            .sources
            .iter()
            .filter(|s| wanted.contains(s.url.as_str()))
            .cloned()
            .collect())
    }

    async fn create_source(&mut self, new: &NewSource) -> Result<Source, StoreError> {
        if self.work.sources.iter().any(|s| s.url == new.url) {
            return Err(StoreError::Duplicate {
                kind: "source",
                key: new.url.clone(),
            });
        }
        self.work.seq.source += 1;
        let source = Source {
            id: SourceId(self.work.seq.source),
            title: new.title.clone(),
            url: new.url.clone(),
            domain: new.domain.clone(),
            sector: new.sector.clone(),
        };
        self.work.sources.push(source.clone());
        Ok(source)
    }

    async fn get_tags_by_names(&mut self, names: &[String]) -> Result<Vec<Tag>, StoreError> {
        let wanted: BTreeSet<&str> = names.iter().map(String::as_str).collect();
        Ok(self
            .work
            .tags
            .iter()
            .filter(|t| wanted.contains(t.name.as_str()))
            .cloned()
            .collect())
    }

    async fn create_tag(&mut self, name: &str) -> Result<Tag, StoreError> {
        if self.work.tags.iter().any(|t| t.name == name) {
            return Err(StoreError::Duplicate {
                kind: "tag",
                key: name.to_string(),
            });
        }
        self.work.seq.tag += 1;
        let tag = Tag {
            id: TagId(self.work.seq.tag),
            name: name.to_string(),
        };
        self.work.tags.push(tag.clone());
        Ok(tag)
    }

    async fn create_article(&mut self, new: &NewArticle) -> Result<Article, StoreError> {
        self.work.seq.article += 1;
        let article = Article {
            id: ArticleId(self.work.seq.article),
            title: new.title.clone(),
            content: new.content.clone(),
            sector: new.sector.clone(),
            impact_score: new.impact_score.min(10),
            created_at: Utc::now(),
        };
        self.work.articles.push(article.clone());
        Ok(article)
    }

    async fn article_source_ids(&mut self, article: ArticleId) -> Result<Vec<SourceId>, StoreError> {
        Ok(self
            .work
            .article_sources
            .iter()
            .filter(|(a, _)| *a == article)
            .map(|(_, s)| *s)
            .collect())
    }

    async fn article_tag_ids(&mut self, article: ArticleId) -> Result<Vec<TagId>, StoreError> {
        Ok(self
            .work
            .article_tags
            .iter()
            .filter(|(a, _)| *a == article)
            .map(|(_, t)| *t)
            .collect())
    }

    async fn link_article_source(
        &mut self,
        article: ArticleId,
        source: SourceId,
    ) -> Result<(), StoreError> {
        if !self.work.has_article(article) {
            return Err(StoreError::NotFound {
                kind: "article",
                id: article.0,
            });
        }
        if !self.work.sources.iter().any(|s| s.id == source) {
            return Err(StoreError::NotFound {
                kind: "source",
                id: source.0,
            });
        }
        if self.work.article_sources.contains(&(article, source)) {
            return Err(StoreError::Duplicate {
                kind: "article_source",
                key: format!("{}:{}", article.0, source.0),
            });
        }
        self.work.article_sources.push((article, source));
        Ok(())
    }

    async fn link_article_tag(&mut self, article: ArticleId, tag: TagId) -> Result<(), StoreError> {
        if !self.work.has_article(article) {
            return Err(StoreError::NotFound {
                kind: "article",
                id: article.0,
            });
        }
        if !self.work.tags.iter().any(|t| t.id == tag) {
            return Err(StoreError::NotFound {
                kind: "tag",
                id: tag.0,
            });
        }
        if self.work.article_tags.contains(&(article, tag)) {
            return Err(StoreError::Duplicate {
                kind: "article_tag",
                key: format!("{}:{}", article.0, tag.0),
            });
        }
        self.work.article_tags.push((article, tag));
        Ok(())
    }

    async fn commit(&mut self) -> Result<(), StoreError> {
        persist(self.path.as_deref(), &self.work)?;
        *self.guard = self.work.clone();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_source(url: &str) -> NewSource {
        NewSource {
            title: "t".into(),
            url: url.into(),
            domain: "example.com".into(),
            sector: "AI".into(),
        }
    }

    #[tokio::test]
    async fn dropped_tx_discards_writes() {
        let s = LocalStore::in_memory();
        {
            let mut tx = s.begin().await.unwrap();
            tx.create_source(&new_source("https://a")).await.unwrap();
        }
        assert_eq!(s.stats().await.unwrap().sources, 0);

        let mut tx = s.begin().await.unwrap();
        let created = tx.create_source(&new_source("https://a")).await.unwrap();
        // flushed: visible inside the same tx before commit
        let found = tx.get_sources_by_urls(&["https://a".into()]).await.unwrap();
        assert_eq!(found, vec![created]);
        tx.commit().await.unwrap();
        drop(tx);
        assert_eq!(s.stats().await.unwrap().sources, 1);
    }

    #[tokio::test]
    async fn unique_url_constraint() {
        let s = LocalStore::in_memory();
        let mut tx = s.begin().await.unwrap();
        tx.create_source(&new_source("https://a")).await.unwrap();
        let err = tx.create_source(&new_source("https://a")).await.unwrap_err();
        assert!(matches!(err, StoreError::Duplicate { kind: "source", .. }));
    }

    #[tokio::test]
    async fn state_versioning_detects_conflicts() {
        let s = LocalStore::in_memory();
        assert!(s.load_state("k").await.unwrap().is_none());
        let v1 = s.save_state("k", "a".into(), None).await.unwrap();
        assert_eq!(v1, 1);
        let err = s.save_state("k", "b".into(), None).await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict { found: Some(1), .. }));
        let v2 = s.save_state("k", "b".into(), Some(1)).await.unwrap();
        assert_eq!(v2, 2);
        assert_eq!(s.load_state("k").await.unwrap().unwrap().value, "b");
    }

    #[tokio::test]
    async fn file_backed_store_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("store.json");

        let s = LocalStore::open(&path).unwrap();
        let mut tx = s.begin().await.unwrap();
        tx.create_tag("OpenAI").await.unwrap();
        tx.commit().await.unwrap();
        drop(tx);
        s.save_state("sector_rotation", "{}".into(), None)
            .await
            .unwrap();

        let reopened = LocalStore::open(&path).unwrap();
        assert_eq!(reopened.stats().await.unwrap().tags, 1);
        assert_eq!(
            reopened.load_state("sector_rotation").await.unwrap().unwrap().version,
            1
        );
    }
}
