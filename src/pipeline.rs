// src/pipeline.rs
//! One batch run: pick the next sector, discover topics, and turn each topic
//! into a persisted, citation-reconciled article.
//!
//! Error boundary: scheduler errors abort the run; everything that goes wrong
//! inside a topic is logged, counted and the loop moves on.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::citations::{filter_and_renumber, FilterStats};
use crate::completion::{Completion, CompletionRequest, DynCompletion};
use crate::config::PipelineConfig;
use crate::error::{RotationError, ServiceError, TopicError};
use crate::metrics;
use crate::parse::{
    candidates_from_search_results, parse_article_candidates, parse_impact_score, parse_synthesis,
    parse_topics, ArticleCandidate,
};
use crate::prompts;
use crate::rotation::SectorRotation;
use crate::sectors::SectorCatalog;
use crate::store::{ArticleId, NewArticle, NewSource, Store};
use crate::trust::{SourceCandidate, TrustClassifier, TrustTier};
use crate::upsert::persist_article;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum TopicOutcome {
    Created {
        article_id: ArticleId,
        title: String,
        impact_score: u8,
        tags: usize,
        stats: FilterStats,
    },
    Skipped {
        reason: String,
    },
    Failed {
        error: String,
    },
}

impl TopicOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            TopicOutcome::Created { .. } => "created",
            TopicOutcome::Skipped { .. } => "skipped",
            TopicOutcome::Failed { .. } => "failed",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TopicReport {
    pub topic: String,
    #[serde(flatten)]
    pub outcome: TopicOutcome,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunReport {
    pub sector: String,
    /// Set when the sector produced no usable topics.
    pub discovery_skipped: Option<String>,
    pub topics: Vec<TopicReport>,
}

impl RunReport {
    fn count(&self, label: &str) -> usize {
        self.topics.iter().filter(|t| t.outcome.label() == label).count()
    }

    pub fn created(&self) -> usize {
        self.count("created")
    }

    pub fn skipped(&self) -> usize {
        self.count("skipped")
    }

    pub fn failed(&self) -> usize {
        self.count("failed")
    }
}

pub struct Pipeline {
    cfg: PipelineConfig,
    catalog: SectorCatalog,
    classifier: TrustClassifier,
    store: Arc<dyn Store>,
    completion: DynCompletion,
    rotation: SectorRotation,
}

impl Pipeline {
    pub fn new(
        cfg: PipelineConfig,
        catalog: SectorCatalog,
        classifier: TrustClassifier,
        store: Arc<dyn Store>,
        completion: DynCompletion,
    ) -> Self {
        let rotation = SectorRotation::new(store.clone(), cfg.state_key.clone());
        Self {
            cfg,
            catalog,
            classifier,
            store,
            completion,
            rotation,
        }
    }

    pub fn rotation(&self) -> &SectorRotation {
        &self.rotation
    }

    pub async fn run_once(&self) -> Result<RunReport, RotationError> {
        metrics::record_run_started();
        let started = Instant::now();

        let enabled = self.catalog.enabled_sectors();
        self.rotation.initialize(&enabled).await?;
        let sector = self.rotation.next().await?;
        info!(target: "pipeline", sector = %sector, provider = self.completion.name(), "run started");

        let mut report = RunReport {
            sector: sector.clone(),
            discovery_skipped: None,
            topics: Vec::new(),
        };

        match self.discover_topics(&sector).await {
            Ok(topics) => {
                for topic in topics {
                    let outcome = match self.process_topic(&sector, &topic).await {
                        Ok(outcome) => outcome,
                        Err(e) if e.is_skip() => {
                            info!(target: "pipeline", sector = %sector, topic = %topic, reason = %e, "topic skipped");
                            TopicOutcome::Skipped {
                                reason: e.to_string(),
                            }
                        }
                        Err(e) => {
                            error!(target: "pipeline", sector = %sector, topic = %topic, error = %e, "topic failed");
                            TopicOutcome::Failed {
                                error: e.to_string(),
                            }
                        }
                    };
                    metrics::record_topic(outcome.label());
                    report.topics.push(TopicReport { topic, outcome });
                }
            }
            Err(e) => {
                warn!(target: "pipeline", sector = %sector, reason = %e, "topic discovery skipped");
                report.discovery_skipped = Some(e.to_string());
            }
        }

        let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;
        metrics::record_run_finished(elapsed_ms);
        info!(
            target: "pipeline",
            sector = %sector,
            created = report.created(),
            skipped = report.skipped(),
            failed = report.failed(),
            elapsed_ms = elapsed_ms as u64,
            "run finished"
        );
        Ok(report)
    }

    /// Trending topics for `sector`; fewer than two usable ones is a skip.
    pub async fn discover_topics(&self, sector: &str) -> Result<Vec<String>, TopicError> {
        let tags = self.catalog.tags(sector);
        let req = prompts::trends_request(&self.cfg, sector, tags, self.cfg.topics_per_run);
        let reply = self.call(&req).await?;
        let topics = parse_topics(&reply.content, reply.structured, self.cfg.topics_per_run);
        if topics.is_empty() {
            return Err(TopicError::InsufficientResults(format!(
                "fewer than 2 usable topics for {sector}"
            )));
        }
        debug!(target: "pipeline", sector, topics = ?topics, "topics discovered");
        Ok(topics)
    }

    pub async fn process_topic(&self, sector: &str, topic: &str) -> Result<TopicOutcome, TopicError> {
        debug!(
            target: "pipeline",
            sector,
            topic,
            category = self.catalog.categorize(topic),
            "topic started"
        );

        // 1) candidates
        let candidates = self.find_articles(topic).await?;

        // 2) trust
        let classified: Vec<SourceCandidate> = candidates
            .into_iter()
            .map(|c| self.classifier.candidate(c.title, c.url))
            .collect();
        let total = classified.len();
        let (trusted, uncertain): (Vec<_>, Vec<_>) = classified
            .into_iter()
            .filter(|c| c.trust != TrustTier::Blacklisted)
            .partition(|c| c.trust == TrustTier::Trusted);
        debug!(
            target: "pipeline",
            topic,
            trusted = trusted.len(),
            uncertain = uncertain.len(),
            blacklisted = total - trusted.len() - uncertain.len(),
            "sources classified"
        );
        if trusted.len() < self.cfg.min_trusted_sources {
            return Err(TopicError::InsufficientResults(format!(
                "{} trusted sources (need {})",
                trusted.len(),
                self.cfg.min_trusted_sources
            )));
        }

        // 3) synthesis
        let req = prompts::synthesis_request(&self.cfg, topic, &trusted, &uncertain);
        let reply = self.call(&req).await?;
        let synthesis = parse_synthesis(&reply.content, topic);

        let mut provided = trusted;
        provided.extend(uncertain);
        let returned = self.returned_sources(&provided, &reply);

        // 4) citations
        let reconciled = filter_and_renumber(
            &synthesis.body,
            &returned,
            provided.len(),
            self.cfg.extra_source_policy(),
        );
        let stats = &reconciled.stats;
        metrics::record_citations(stats);
        if stats.cited_numbers_original.is_empty() && stats.dropped_numbers.is_empty() {
            warn!(target: "pipeline", topic, "article cites no sources");
        }
        if stats.extra_sources_added {
            warn!(
                target: "pipeline",
                topic,
                provided = stats.total_sources_provided,
                returned = stats.total_sources_returned,
                extra = stats.extra_sources_count,
                dropped = ?stats.dropped_numbers,
                "citation anomaly"
            );
        }
        debug!(
            target: "pipeline",
            topic,
            renumbered = stats.renumbered(),
            kept = reconciled.sources.len(),
            removed = stats.sources_removed,
            "citations reconciled"
        );

        // 5) impact
        let req = prompts::impact_request(&self.cfg, sector, &synthesis.title, &reconciled.text);
        let impact_score = parse_impact_score(&self.call(&req).await?.content);

        // 6) persist
        let article = NewArticle {
            title: synthesis.title.clone(),
            content: reconciled.text.clone(),
            sector: sector.to_string(),
            impact_score,
        };
        let sources: Vec<NewSource> = reconciled
            .sources
            .iter()
            .map(|s| NewSource {
                title: if s.title.trim().is_empty() {
                    s.domain.clone()
                } else {
                    s.title.clone()
                },
                url: s.url.clone(),
                domain: s.domain.clone(),
                sector: sector.to_string(),
            })
            .collect();
        let saved = persist_article(self.store.as_ref(), &article, &sources, &synthesis.tags).await?;
        metrics::record_article_created();

        info!(
            target: "pipeline",
            sector,
            topic,
            article_id = saved.id.0,
            sources = saved.source_ids.len(),
            removed = stats.sources_removed,
            impact_score,
            "article created"
        );
        Ok(TopicOutcome::Created {
            article_id: saved.id,
            title: synthesis.title,
            impact_score,
            tags: saved.tag_ids.len(),
            stats: reconciled.stats,
        })
    }

    /// Structured search hits first, then the reply text.
    async fn find_articles(&self, topic: &str) -> Result<Vec<ArticleCandidate>, TopicError> {
        let n = self.cfg.articles_per_topic;
        let req = prompts::articles_request(&self.cfg, topic, n);
        let reply = self.call(&req).await?;
        let mut found = candidates_from_search_results(&reply.search_results, n);
        if found.is_empty() {
            debug!(target: "pipeline", topic, "no search results; parsing reply text");
            found = parse_article_candidates(&reply.content, reply.structured, n);
        }
        if found.is_empty() {
            return Err(TopicError::InsufficientResults("no article candidates".into()));
        }
        Ok(found)
    }

    /// Provided sources plus, when open search is allowed, whatever else the
    /// synthesis call reports having used (new URLs only, never blacklisted).
    fn returned_sources(&self, provided: &[SourceCandidate], reply: &Completion) -> Vec<SourceCandidate> {
        let mut returned = provided.to_vec();
        if !self.cfg.allow_open_search {
            return returned;
        }
        let mut seen: HashSet<String> = provided.iter().map(|s| s.url.clone()).collect();
        for hit in &reply.search_results {
            let url = hit.url.trim();
            if !url.starts_with("http") || !seen.insert(url.to_string()) {
                continue;
            }
            let c = self.classifier.candidate(hit.title.trim(), url);
            if c.trust != TrustTier::Blacklisted {
                returned.push(c);
            }
        }
        returned
    }

    async fn call(&self, req: &CompletionRequest) -> Result<Completion, ServiceError> {
        let stage = req.stage.as_str();
        match self.completion.complete(req).await {
            Ok(reply) => {
                debug!(
                    target: "pipeline",
                    stage,
                    preview = %preview(&reply.content),
                    "completion reply"
                );
                Ok(reply)
            }
            Err(e) => {
                metrics::record_service_error(stage);
                warn!(target: "pipeline", stage, error = %e, "completion service error");
                Err(e)
            }
        }
    }
}

fn preview(s: &str) -> String {
    const MAX: usize = 200;
    let mut out: String = s.chars().take(MAX).collect();
    if s.chars().nth(MAX).is_some() {
        out.push('…');
    }
    out
}
