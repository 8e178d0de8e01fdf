// src/trust.rs
//! Source trust classification by domain.
//!
//! `domain` is the URL host, lowercased, with a leading `www.` removed.
//! A list entry matches a domain exactly or as a dot-suffix, so `edu`
//! covers `stanford.edu` and `reuters.com` covers `uk.reuters.com`.
//! Deny beats allow; anything unmatched (or unparseable) is `Uncertain`.

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::{fs, path::Path};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrustTier {
    Trusted,
    Uncertain,
    Blacklisted,
}

/// A search hit after classification. Ephemeral: only cited ones get persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceCandidate {
    pub title: String,
    pub url: String,
    pub domain: String,
    pub trust: TrustTier,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    pub domain: String,
    pub trust: TrustTier,
}

/// Raw allow/deny lists as written in config files.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrustLists {
    #[serde(default)]
    pub allow: Vec<String>,
    #[serde(default)]
    pub deny: Vec<String>,
}

impl TrustLists {
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("reading trust lists from {}", path.display()))?;
        let is_toml = path
            .extension()
            .and_then(|s| s.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("toml"));
        if is_toml {
            return toml::from_str(&content).context("parsing trust lists as TOML");
        }
        serde_json::from_str(&content)
            .ok()
            .or_else(|| toml::from_str(&content).ok())
            .ok_or_else(|| anyhow!("unsupported trust list format in {}", path.display()))
    }

    /// Built-in lists: established news, research and public-sector domains.
    pub fn default_seed() -> Self {
        let allow = [
            // News organizations
            "nytimes.com", "washingtonpost.com", "wsj.com", "reuters.com", "apnews.com",
            "bbc.com", "bbc.co.uk", "theguardian.com", "ft.com", "economist.com",
            "bloomberg.com", "cnbc.com", "cnn.com", "npr.org", "pbs.org",
            // Technology news
            "techcrunch.com", "theverge.com", "wired.com", "arstechnica.com",
            "venturebeat.com", "zdnet.com", "cnet.com", "engadget.com",
            // Academic & research
            "nature.com", "science.org", "sciencedirect.com", "ieee.org", "acm.org",
            "arxiv.org", "nih.gov", "edu",
            // Government
            "gov",
            // Business & finance
            "forbes.com", "fortune.com", "businessinsider.com", "marketwatch.com",
            "barrons.com", "investopedia.com",
            // Official tech blogs
            "blog.google", "openai.com", "microsoft.com", "apple.com", "aws.amazon.com",
            "blog.cloudflare.com", "engineering.fb.com",
            // Think tanks & consultancies
            "rand.org", "pewresearch.org", "mckinsey.com", "bcg.com", "deloitte.com",
            "pwc.com", "gartner.com",
            // International organizations
            "un.org", "who.int", "worldbank.org", "imf.org", "weforum.org", "oecd.org",
            "unesco.org",
            // Universities outside .edu
            "ox.ac.uk", "cam.ac.uk",
            // Healthcare
            "mayoclinic.org", "clevelandclinic.org", "hopkinsmedicine.org", "webmd.com",
            "healthline.com",
        ];
        let deny = [
            "reddit.com", "quora.com", "pinterest.com", "facebook.com", "tiktok.com",
            "x.com", "twitter.com",
        ];
        Self {
            allow: allow.iter().map(|s| s.to_string()).collect(),
            deny: deny.iter().map(|s| s.to_string()).collect(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct TrustClassifier {
    allow: HashSet<String>,
    deny: HashSet<String>,
}

impl Default for TrustClassifier {
    fn default() -> Self {
        Self::new(&TrustLists::default_seed())
    }
}

impl TrustClassifier {
    pub fn new(lists: &TrustLists) -> Self {
        Self {
            allow: normalize_entries(&lists.allow),
            deny: normalize_entries(&lists.deny),
        }
    }

    /// Never fails: malformed URLs come back as `("", Uncertain)`.
    pub fn classify(&self, url: &str) -> Classification {
        let domain = extract_domain(url);
        let trust = if domain.is_empty() {
            TrustTier::Uncertain
        } else if matches_any(&domain, &self.deny) {
            TrustTier::Blacklisted
        } else if matches_any(&domain, &self.allow) {
            TrustTier::Trusted
        } else {
            TrustTier::Uncertain
        };
        Classification { domain, trust }
    }

    pub fn candidate(&self, title: impl Into<String>, url: impl Into<String>) -> SourceCandidate {
        let url = url.into();
        let Classification { domain, trust } = self.classify(&url);
        SourceCandidate {
            title: title.into(),
            url,
            domain,
            trust,
        }
    }
}

/// Host of `url` without a leading `www.`, or `""` if it cannot be parsed.
pub fn extract_domain(url: &str) -> String {
    let Ok(parsed) = url::Url::parse(url.trim()) else {
        return String::new();
    };
    let host = parsed
        .host_str()
        .unwrap_or_default()
        .trim_end_matches('.')
        .to_ascii_lowercase();
    match host.strip_prefix("www.") {
        Some(rest) => rest.to_string(),
        None => host,
    }
}

fn normalize_entries(items: &[String]) -> HashSet<String> {
    items
        .iter()
        .map(|s| s.trim().trim_start_matches('.').to_ascii_lowercase())
        .map(|s| s.strip_prefix("www.").map(str::to_string).unwrap_or(s))
        .filter(|s| !s.is_empty())
        .collect()
}

/// Exact or dot-suffix membership: walks `a.b.c`, `b.c`, `c`.
fn matches_any(domain: &str, set: &HashSet<String>) -> bool {
    let mut rest = domain;
    loop {
        if set.contains(rest) {
            return true;
        }
        match rest.split_once('.') {
            Some((_, tail)) => rest = tail,
            None => return false,
        }
    }
}
