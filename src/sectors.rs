//! # Sector Catalog
//!
//! Static mapping `sector name → keyword tags` plus an `enabled` flag.
//! Catalog order is significant: it is the rotation order handed to the
//! scheduler and the precedence order for [`SectorCatalog::categorize`].
//!
//! - Built-in seed via [`SectorCatalog::default_seed`].
//! - Overridable from a TOML (`[[sectors]]` tables) or JSON (array) file.
//! - Never mutated at runtime.

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::{fs, path::Path};

/// Fallback label when no sector keyword matches.
pub const GENERAL_SECTOR: &str = "General";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sector {
    pub name: String,
    pub tags: Vec<String>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SectorCatalog {
    sectors: Vec<Sector>,
}

impl SectorCatalog {
    pub fn new(sectors: Vec<Sector>) -> Self {
        Self { sectors }
    }

    /// Load a catalog from TOML or JSON. The file extension is only a hint.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("reading sector catalog from {}", path.display()))?;
        let ext = path
            .extension()
            .and_then(|s| s.to_str())
            .unwrap_or_default()
            .to_ascii_lowercase();
        parse_catalog(&content, &ext)
    }

    /// Load from `path` if given, otherwise use the built-in seed.
    pub fn load_or_seed(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(p) => Self::load_from_file(p),
            None => Ok(Self::default_seed()),
        }
    }

    pub fn sectors(&self) -> &[Sector] {
        &self.sectors
    }

    pub fn get(&self, name: &str) -> Option<&Sector> {
        self.sectors.iter().find(|s| s.name == name)
    }

    /// Names of enabled sectors, in catalog order.
    pub fn enabled_sectors(&self) -> Vec<String> {
        self.sectors
            .iter()
            .filter(|s| s.enabled)
            .map(|s| s.name.clone())
            .collect()
    }

    /// Tags for `name`; unknown sectors have none.
    pub fn tags(&self, name: &str) -> &[String] {
        self.get(name).map(|s| s.tags.as_slice()).unwrap_or(&[])
    }

    /// First sector (catalog order) with a tag occurring as a whole word (or
    /// phrase) in the lowercased query. Short tags like `ai` do not match
    /// inside `retail` or `rain`.
    pub fn categorize(&self, query: &str) -> &str {
        let q = query.to_lowercase();
        for sector in &self.sectors {
            if sector.tags.iter().any(|t| contains_word(&q, &t.to_lowercase())) {
                return &sector.name;
            }
        }
        GENERAL_SECTOR
    }

    pub fn default_seed() -> Self {
        let seed: &[(&str, &[&str])] = &[
            (
                "AI",
                &[
                    "ai",
                    "artificial intelligence",
                    "machine learning",
                    "deep learning",
                    "neural networks",
                    "llm",
                    "gpt",
                    "generative ai",
                    "chatgpt",
                    "computer vision",
                    "natural language processing",
                    "ai ethics",
                    "ai regulation",
                    "ai models",
                    "transformer models",
                ],
            ),
            (
                "Education",
                &[
                    "education", "learning", "teaching", "school", "university", "student",
                    "classroom", "academic", "edtech",
                ],
            ),
            (
                "Healthcare",
                &[
                    "health", "medical", "hospital", "doctor", "patient", "medicine", "clinical",
                    "healthcare", "pharmaceutical",
                ],
            ),
            (
                "Finance",
                &[
                    "finance", "banking", "investment", "financial", "stock", "trading",
                    "cryptocurrency", "fintech", "economy",
                ],
            ),
            (
                "Technology",
                &[
                    "technology", "tech", "software", "hardware", "computing", "digital",
                    "internet", "cloud", "cybersecurity",
                ],
            ),
            (
                "Business",
                &[
                    "business", "enterprise", "corporate", "company", "startup", "entrepreneur",
                    "management", "commerce",
                ],
            ),
            (
                "Science",
                &[
                    "science", "research", "scientific", "study", "experiment", "laboratory",
                    "physics", "biology", "chemistry",
                ],
            ),
            (
                "Government",
                &[
                    "government", "policy", "regulation", "law", "legislation", "congress",
                    "senate", "federal", "political",
                ],
            ),
            (
                "Media",
                &[
                    "media", "news", "journalism", "publication", "broadcasting", "entertainment",
                    "press", "content",
                ],
            ),
            (
                "Environment",
                &[
                    "environment", "climate", "sustainability", "green", "renewable", "carbon",
                    "ecological", "conservation",
                ],
            ),
            (
                "Transportation",
                &[
                    "transportation", "automotive", "vehicle", "car", "travel", "logistics",
                    "shipping", "mobility",
                ],
            ),
            (
                "Energy",
                &[
                    "energy", "power", "electricity", "solar", "wind", "nuclear", "oil", "gas",
                    "battery",
                ],
            ),
            (
                "Manufacturing",
                &[
                    "manufacturing", "production", "factory", "industrial", "assembly",
                    "automation", "supply chain",
                ],
            ),
            (
                "Retail",
                &[
                    "retail", "shopping", "ecommerce", "store", "consumer", "sales", "marketplace",
                    "e-commerce",
                ],
            ),
            (
                "Real Estate",
                &[
                    "real estate", "property", "housing", "construction", "building",
                    "architecture", "mortgage",
                ],
            ),
            (
                "Agriculture",
                &[
                    "agriculture", "farming", "crop", "livestock", "food production",
                    "agricultural", "agritech",
                ],
            ),
            (
                "Sports",
                &[
                    "sports", "athletic", "fitness", "game", "competition", "recreation",
                    "exercise", "olympics",
                ],
            ),
            (
                "Arts",
                &[
                    "arts", "music", "film", "theater", "design", "creative", "culture",
                    "entertainment", "gallery",
                ],
            ),
            (
                "Security",
                &[
                    "security", "cybersecurity", "defense", "military", "protection",
                    "surveillance", "safety", "privacy",
                ],
            ),
            (
                "Telecommunications",
                &[
                    "telecommunications", "telecom", "mobile", "wireless", "5g", "broadband",
                    "network", "connectivity",
                ],
            ),
        ];

        let sectors = seed
            .iter()
            .map(|(name, tags)| Sector {
                name: (*name).to_string(),
                tags: tags.iter().map(|t| (*t).to_string()).collect(),
                enabled: true,
            })
            .collect();
        Self { sectors }
    }
}

fn parse_catalog(s: &str, hint_ext: &str) -> Result<SectorCatalog> {
    let try_toml = hint_ext == "toml" || s.contains("[[sectors]]");
    if try_toml {
        if let Ok(c) = parse_toml(s) {
            return Ok(c);
        }
    }
    if let Ok(c) = parse_json(s) {
        return Ok(c);
    }
    if !try_toml {
        if let Ok(c) = parse_toml(s) {
            return Ok(c);
        }
    }
    Err(anyhow!("unsupported sector catalog format"))
}

fn parse_toml(s: &str) -> Result<SectorCatalog> {
    let c: SectorCatalog = toml::from_str(s)?;
    Ok(clean(c.sectors))
}

/// Bare array or `{"sectors": [...]}`.
fn parse_json(s: &str) -> Result<SectorCatalog> {
    if let Ok(v) = serde_json::from_str::<Vec<Sector>>(s) {
        return Ok(clean(v));
    }
    let c: SectorCatalog = serde_json::from_str(s)?;
    Ok(clean(c.sectors))
}

/// Trim names/tags, drop blank names, keep the first entry per name.
fn clean(items: Vec<Sector>) -> SectorCatalog {
    let mut out: Vec<Sector> = Vec::with_capacity(items.len());
    for mut s in items {
        s.name = s.name.trim().to_string();
        if s.name.is_empty() || out.iter().any(|o| o.name == s.name) {
            continue;
        }
        s.tags = s
            .tags
            .into_iter()
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .collect();
        out.push(s);
    }
    SectorCatalog::new(out)
}

fn contains_word(haystack: &str, word: &str) -> bool {
    if word.is_empty() {
        return false;
    }
    haystack.match_indices(word).any(|(start, _)| {
        let before = haystack[..start].chars().next_back();
        let after = haystack[start + word.len()..].chars().next();
        !before.is_some_and(char::is_alphanumeric) && !after.is_some_and(char::is_alphanumeric)
    })
}
