// src/metrics.rs
use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use once_cell::sync::OnceCell;
use std::path::Path;

use crate::citations::FilterStats;

pub struct Metrics {
    pub handle: PrometheusHandle,
}

impl Metrics {
    /// Install the process-wide Prometheus recorder.
    pub fn init() -> anyhow::Result<Self> {
        let handle = PrometheusBuilder::new()
            .install_recorder()
            .map_err(|e| anyhow::anyhow!("prometheus: install recorder: {e}"))?;
        ensure_metrics_described();
        Ok(Self { handle })
    }

    pub fn render(&self) -> String {
        self.handle.render()
    }

    /// Write the exposition text for a node-exporter textfile collector.
    /// Tmp file + rename so the collector never reads a half-written file.
    pub fn write_textfile(&self, path: &Path) -> std::io::Result<()> {
        if let Some(dir) = path.parent() {
            if !dir.as_os_str().is_empty() {
                std::fs::create_dir_all(dir)?;
            }
        }
        let tmp = path.with_extension("prom.tmp");
        std::fs::write(&tmp, self.render())?;
        std::fs::rename(&tmp, path)
    }
}

/// One-time metrics registration (so series carry HELP lines).
pub fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("pipeline_runs_total", "Pipeline runs started.");
        describe_counter!(
            "pipeline_topics_total",
            "Topics processed, labelled by outcome (created/skipped/failed)."
        );
        describe_counter!(
            "pipeline_service_errors_total",
            "Completion Service calls that failed, labelled by stage."
        );
        describe_counter!(
            "pipeline_citation_anomalies_total",
            "Articles citing numbers outside the provided source list."
        );
        describe_counter!("pipeline_articles_created_total", "Articles persisted.");
        describe_counter!(
            "pipeline_sources_removed_total",
            "Provided sources dropped because the article never cited them."
        );
        describe_histogram!("pipeline_run_ms", "Wall time of one pipeline run in milliseconds.");
        describe_gauge!("pipeline_last_run_ts", "Unix ts when the pipeline last ran.");
    });
}

pub(crate) fn record_run_started() {
    ensure_metrics_described();
    counter!("pipeline_runs_total").increment(1);
}

pub(crate) fn record_run_finished(elapsed_ms: f64) {
    histogram!("pipeline_run_ms").record(elapsed_ms);
    gauge!("pipeline_last_run_ts").set(chrono::Utc::now().timestamp() as f64);
}

pub(crate) fn record_topic(outcome: &'static str) {
    counter!("pipeline_topics_total", "outcome" => outcome).increment(1);
}

pub(crate) fn record_service_error(stage: &'static str) {
    counter!("pipeline_service_errors_total", "stage" => stage).increment(1);
}

pub(crate) fn record_citations(stats: &FilterStats) {
    if stats.extra_sources_added {
        counter!("pipeline_citation_anomalies_total").increment(1);
    }
    counter!("pipeline_sources_removed_total").increment(stats.sources_removed as u64);
}

pub(crate) fn record_article_created() {
    counter!("pipeline_articles_created_total").increment(1);
}
