//! Sector Digest: batch entrypoint
//! One parameterless run: next sector → topics → cited articles → store.
//! Meant to be triggered by cron; exits non-zero when the run aborts.

use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use sector_digest::completion::PerplexityClient;
use sector_digest::config::PipelineConfig;
use sector_digest::metrics::Metrics;
use sector_digest::pipeline::Pipeline;
use sector_digest::sectors::SectorCatalog;
use sector_digest::store::{LocalStore, Store};
use sector_digest::trust::{TrustClassifier, TrustLists};

/// Compact logs by default; `LOG_FORMAT=json` for log shippers.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("sector_digest=info,warn"));
    let json = std::env::var("LOG_FORMAT")
        .ok()
        .is_some_and(|v| v.eq_ignore_ascii_case("json"));

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(fmt::layer().json()).init();
    } else {
        registry.with(fmt::layer().compact()).init();
    }
}

async fn run(metrics: &Metrics) -> Result<()> {
    let cfg = PipelineConfig::load_default().context("loading pipeline config")?;

    let catalog = SectorCatalog::load_or_seed(cfg.sectors_path.as_deref())?;
    let lists = match cfg.trust_path.as_deref() {
        Some(p) => TrustLists::load_from_file(p)?,
        None => TrustLists::default_seed(),
    };
    let store: Arc<dyn Store> = match cfg.store_path.as_deref() {
        Some(p) => Arc::new(
            LocalStore::open(p).with_context(|| format!("opening store at {}", p.display()))?,
        ),
        None => Arc::new(LocalStore::in_memory()),
    };

    let api_key = cfg.resolve_api_key()?;
    let client = PerplexityClient::new(cfg.endpoint.clone(), api_key)
        .context("building completion client")?;

    let textfile = cfg.metrics_textfile.clone();
    let pipeline = Pipeline::new(cfg, catalog, TrustClassifier::new(&lists), store.clone(), Arc::new(client));
    let outcome = pipeline.run_once().await;

    // export even when the run aborted so the failure is visible to the collector
    if let Some(path) = textfile {
        if let Err(e) = metrics.write_textfile(&path) {
            error!(path = %path.display(), error = %e, "failed to write metrics textfile");
        }
    }

    let report = outcome.context("pipeline run aborted")?;
    let stats = store.stats().await?;
    info!(
        sector = %report.sector,
        created = report.created(),
        skipped = report.skipped(),
        failed = report.failed(),
        articles_total = stats.articles,
        sources_total = stats.sources,
        "done"
    );
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    // .env is optional
    let _ = dotenvy::dotenv();
    init_tracing();

    let metrics = match Metrics::init() {
        Ok(m) => m,
        Err(e) => {
            error!(error = %e, "metrics init failed");
            return ExitCode::FAILURE;
        }
    };

    match run(&metrics).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %format!("{e:#}"), "run failed");
            ExitCode::FAILURE
        }
    }
}
