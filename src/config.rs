// src/config.rs
use anyhow::{anyhow, bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use std::{env, fs};

use crate::citations::ExtraSourcePolicy;
use crate::completion::perplexity::DEFAULT_ENDPOINT;
use crate::rotation::DEFAULT_STATE_KEY;

pub const ENV_CONFIG_PATH: &str = "SECTOR_DIGEST_CONFIG";
pub const ENV_API_KEY: &str = "PERPLEXITY_API_KEY";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Models {
    pub trends: String,
    pub articles: String,
    pub synthesis: String,
    pub impact: String,
}

impl Default for Models {
    fn default() -> Self {
        Self {
            trends: "sonar".into(),
            articles: "sonar-pro".into(),
            synthesis: "sonar".into(),
            impact: "sonar-pro".into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// "ENV" (or empty) means: read from PERPLEXITY_API_KEY.
    pub api_key: String,
    pub endpoint: String,
    pub models: Models,
    pub temperature: f32,
    pub timeout_secs: u64,
    pub synthesis_timeout_secs: u64,
    pub topics_per_run: usize,
    pub articles_per_topic: usize,
    /// Topics with fewer trusted candidates are skipped.
    pub min_trusted_sources: usize,
    /// Keep citations of sources the service found on its own.
    pub allow_open_search: bool,
    /// Ask for JSON-schema constrained replies for topics and articles.
    pub structured_output: bool,
    pub state_key: String,
    pub store_path: Option<PathBuf>,
    pub sectors_path: Option<PathBuf>,
    pub trust_path: Option<PathBuf>,
    pub metrics_textfile: Option<PathBuf>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            api_key: "ENV".into(),
            endpoint: DEFAULT_ENDPOINT.into(),
            models: Models::default(),
            temperature: 0.1,
            timeout_secs: 60,
            synthesis_timeout_secs: 90,
            topics_per_run: 3,
            articles_per_topic: 20,
            min_trusted_sources: 1,
            allow_open_search: true,
            structured_output: false,
            state_key: DEFAULT_STATE_KEY.into(),
            store_path: None,
            sectors_path: None,
            trust_path: None,
            metrics_textfile: None,
        }
    }
}

impl PipelineConfig {
    /// Load from TOML or JSON (by extension, JSON tried as fallback).
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("reading pipeline config from {}", path.display()))?;
        let is_json = path
            .extension()
            .and_then(|s| s.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("json"));
        let cfg: Self = if is_json {
            serde_json::from_str(&content).context("parsing pipeline config as JSON")?
        } else {
            toml::from_str(&content)
                .ok()
                .or_else(|| serde_json::from_str(&content).ok())
                .ok_or_else(|| anyhow!("unsupported pipeline config format in {}", path.display()))?
        };
        Ok(cfg.sanitized())
    }

    /// Load using env var + fallbacks:
    /// 1) $SECTOR_DIGEST_CONFIG
    /// 2) config/pipeline.toml
    /// 3) config/pipeline.json
    /// 4) built-in defaults
    pub fn load_default() -> Result<Self> {
        if let Ok(p) = env::var(ENV_CONFIG_PATH) {
            let pb = PathBuf::from(p);
            if !pb.exists() {
                bail!("{ENV_CONFIG_PATH} points to non-existent path {}", pb.display());
            }
            return Self::load_from_file(&pb);
        }
        for candidate in ["config/pipeline.toml", "config/pipeline.json"] {
            let pb = PathBuf::from(candidate);
            if pb.exists() {
                return Self::load_from_file(&pb);
            }
        }
        Ok(Self::default())
    }

    /// Clamp out-of-range values back to defaults instead of rejecting the file.
    pub fn sanitized(mut self) -> Self {
        let d = Self::default();
        if !(0.0..=2.0).contains(&self.temperature) {
            self.temperature = d.temperature;
        }
        if self.timeout_secs == 0 {
            self.timeout_secs = d.timeout_secs;
        }
        if self.synthesis_timeout_secs == 0 {
            self.synthesis_timeout_secs = d.synthesis_timeout_secs;
        }
        if self.topics_per_run == 0 {
            self.topics_per_run = d.topics_per_run;
        }
        if self.articles_per_topic == 0 {
            self.articles_per_topic = d.articles_per_topic;
        }
        if self.state_key.trim().is_empty() {
            self.state_key = d.state_key;
        }
        if self.endpoint.trim().is_empty() {
            self.endpoint = d.endpoint;
        }
        self
    }

    /// Resolve `api_key = "ENV"` from the environment.
    pub fn resolve_api_key(&self) -> Result<String> {
        let key = self.api_key.trim();
        if key.is_empty() || key.eq_ignore_ascii_case("env") {
            return env::var(ENV_API_KEY).map_err(|_| anyhow!("Missing {ENV_API_KEY} env var"));
        }
        Ok(key.to_string())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn synthesis_timeout(&self) -> Duration {
        Duration::from_secs(self.synthesis_timeout_secs)
    }

    pub fn extra_source_policy(&self) -> ExtraSourcePolicy {
        if self.allow_open_search {
            ExtraSourcePolicy::AllowEchoed
        } else {
            ExtraSourcePolicy::ProvidedOnly
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_toml_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let p = dir.path().join("pipeline.toml");
        fs::write(
            &p,
            r#"
topics_per_run = 5
allow_open_search = false

[models]
trends = "sonar-reasoning"
"#,
        )
        .unwrap();
        let c = PipelineConfig::load_from_file(&p).unwrap();
        assert_eq!(c.topics_per_run, 5);
        assert_eq!(c.models.trends, "sonar-reasoning");
        assert_eq!(c.models.articles, "sonar-pro");
        assert_eq!(c.articles_per_topic, 20);
        assert_eq!(c.extra_source_policy(), ExtraSourcePolicy::ProvidedOnly);
    }

    #[test]
    fn out_of_range_values_are_clamped() {
        let c = PipelineConfig {
            temperature: 7.5,
            timeout_secs: 0,
            topics_per_run: 0,
            state_key: "  ".into(),
            ..Default::default()
        }
        .sanitized();
        assert_eq!(c.temperature, 0.1);
        assert_eq!(c.timeout_secs, 60);
        assert_eq!(c.topics_per_run, 3);
        assert_eq!(c.state_key, DEFAULT_STATE_KEY);
    }

    #[test]
    fn explicit_key_is_used_verbatim() {
        let c = PipelineConfig {
            api_key: " pplx-123 ".into(),
            ..Default::default()
        };
        assert_eq!(c.resolve_api_key().unwrap(), "pplx-123");
    }
}
