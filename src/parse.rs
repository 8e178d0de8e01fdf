// src/parse.rs
//! Completion Service reply parsing.
//!
//! Replies are never trusted to be well formed. Each parser applies one
//! ordered fallback chain and never returns an error: the worst case is an
//! empty result, which callers treat as a skip.
//!
//! Topic chain, per reply:
//! 1. structured replies are read as JSON; a JSON failure falls through to 2
//! 2. per line: strip list markers, a leading `label:` and surrounding quotes
//! 3. drop lines outside the length band or containing meta-commentary
//! 4. truncate to the requested count; fewer than [`MIN_TOPICS`] ⇒ empty

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;

/// Below this many surviving topics the parser reports nothing.
pub const MIN_TOPICS: usize = 2;
pub const TOPIC_MIN_CHARS: usize = 10;
pub const TOPIC_MAX_CHARS: usize = 250;
pub const MAX_TAGS: usize = 10;
pub const DEFAULT_IMPACT_SCORE: u8 = 5;

// Meta-commentary, matched on word boundaries ("AI will ..." is a fine topic).
static RE_META: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(?:here are|let me|based on|i will|trending topics)\b").expect("meta phrase regex")
});

// Digits only count as a marker when followed by `.`/`)` and a space ("5G" stays intact).
static RE_LIST_MARKER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?:\s*(?:\d+[.)](?:\s|$)|[-•*#>]+))+\s*").expect("list marker regex")
});
static RE_LABEL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^(?:topic|title|trend|headline|article|subject)(?:\s*#?\d+)?\s*:\s*")
        .expect("label regex")
});
static RE_WS: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("whitespace regex"));
static RE_CITATION: Lazy<Regex> = Lazy::new(|| Regex::new(r"\[\d+\]").expect("citation regex"));
static RE_MD_LINK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\[([^\]]*)\]\((https?://[^)\s]+)\)").expect("markdown link regex"));
static RE_TAGS_HEADER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^[ \t*#]*(?i:tags)[ \t*]*:").expect("tags header regex"));
static RE_ARTICLE_HEADER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^[ \t*]*(?i:article)[ \t*]*:[ \t]*$").expect("article header regex"));
static RE_INT: Lazy<Regex> = Lazy::new(|| Regex::new(r"-?\d+").expect("integer regex"));

/// `{title, url}` pair proposed by the Completion Service, before classification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArticleCandidate {
    #[serde(default)]
    pub title: String,
    pub url: String,
}

/// Title, body and tags split out of a synthesis reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Synthesis {
    pub title: String,
    pub body: String,
    pub tags: Vec<String>,
}

// ------------------------------------------------------------
// Topics
// ------------------------------------------------------------

pub fn parse_topics(reply: &str, structured: bool, count: usize) -> Vec<String> {
    let raw: Vec<String> = if structured {
        match topics_from_json(reply) {
            Some(items) => items,
            None => {
                tracing::debug!(target: "parse", "structured topic reply is not JSON, falling back to lines");
                reply.lines().map(str::to_string).collect()
            }
        }
    } else {
        reply.lines().map(str::to_string).collect()
    };

    let mut seen = HashSet::new();
    let mut topics = Vec::new();
    for line in raw {
        let Some(topic) = clean_topic_line(&line) else {
            continue;
        };
        if seen.insert(topic.to_lowercase()) {
            topics.push(topic);
        }
    }

    if topics.len() < MIN_TOPICS {
        tracing::warn!(target: "parse", found = topics.len(), "too few valid topics");
        return Vec::new();
    }
    topics.truncate(count);
    topics
}

fn topics_from_json(reply: &str) -> Option<Vec<String>> {
    let v: Value = serde_json::from_str(strip_code_fence(reply)).ok()?;
    let arr = match &v {
        Value::Array(a) => a,
        Value::Object(o) => o
            .get("topics")
            .or_else(|| o.get("trends"))
            .and_then(Value::as_array)?,
        _ => return None,
    };
    Some(
        arr.iter()
            .filter_map(|item| match item {
                Value::String(s) => Some(s.clone()),
                Value::Object(o) => o
                    .get("title")
                    .or_else(|| o.get("topic"))
                    .and_then(Value::as_str)
                    .map(str::to_string),
                _ => None,
            })
            .collect(),
    )
}

/// Steps 2–3 for a single line. `None` means the line is rejected.
pub fn clean_topic_line(line: &str) -> Option<String> {
    let mut s = normalize_text(line);
    s = RE_LIST_MARKER.replace(&s, "").into_owned();
    s = strip_wrappers(&s);
    s = RE_LABEL.replace(&s, "").into_owned();
    s = strip_wrappers(&s);

    let len = s.chars().count();
    if !(TOPIC_MIN_CHARS..=TOPIC_MAX_CHARS).contains(&len) {
        return None;
    }
    // leftovers of a truncated JSON reply
    if s.starts_with(['{', '[', ']', '}']) {
        return None;
    }
    if RE_META.is_match(&s) {
        return None;
    }
    Some(s)
}

// ------------------------------------------------------------
// Article candidates
// ------------------------------------------------------------

pub fn parse_article_candidates(
    reply: &str,
    structured: bool,
    count: usize,
) -> Vec<ArticleCandidate> {
    let raw = if structured {
        articles_from_json(reply).unwrap_or_else(|| articles_from_text(reply))
    } else {
        articles_from_text(reply)
    };
    dedup_candidates(raw, count)
}

/// Structured search hits reported alongside a reply.
pub fn candidates_from_search_results(
    results: &[crate::completion::SearchResult],
    count: usize,
) -> Vec<ArticleCandidate> {
    let raw = results
        .iter()
        .map(|r| ArticleCandidate {
            title: normalize_text(&r.title),
            url: r.url.trim().to_string(),
        })
        .collect();
    dedup_candidates(raw, count)
}

fn dedup_candidates(raw: Vec<ArticleCandidate>, count: usize) -> Vec<ArticleCandidate> {
    let mut seen = HashSet::new();
    raw.into_iter()
        .filter(|c| is_http_url(&c.url))
        .filter(|c| seen.insert(c.url.clone()))
        .take(count)
        .collect()
}

fn articles_from_json(reply: &str) -> Option<Vec<ArticleCandidate>> {
    let v: Value = serde_json::from_str(strip_code_fence(reply)).ok()?;
    let arr = match &v {
        Value::Array(a) => a,
        Value::Object(o) => o
            .get("articles")
            .or_else(|| o.get("sources"))
            .and_then(Value::as_array)?,
        _ => return None,
    };
    Some(
        arr.iter()
            .filter_map(|item| match item {
                Value::String(s) => Some(ArticleCandidate {
                    title: String::new(),
                    url: clean_url(s),
                }),
                Value::Object(_) => serde_json::from_value::<ArticleCandidate>(item.clone())
                    .ok()
                    .map(|c| ArticleCandidate {
                        title: normalize_text(&c.title),
                        url: clean_url(&c.url),
                    }),
                _ => None,
            })
            .collect(),
    )
}

fn articles_from_text(reply: &str) -> Vec<ArticleCandidate> {
    let mut out = Vec::new();
    for line in reply.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        // [title](url)
        let links: Vec<ArticleCandidate> = RE_MD_LINK
            .captures_iter(line)
            .map(|c| ArticleCandidate {
                title: normalize_text(&c[1]),
                url: clean_url(&c[2]),
            })
            .collect();
        if !links.is_empty() {
            out.extend(links);
            continue;
        }

        let body = RE_LIST_MARKER.replace(line, "");
        // Title | URL
        if let Some((title, url)) = body.rsplit_once('|') {
            out.push(ArticleCandidate {
                title: strip_wrappers(&normalize_text(title)),
                url: clean_url(url),
            });
            continue;
        }
        // url, url, url
        if body.contains(',') {
            for part in body.split(',') {
                if let Some(tok) = part.split_whitespace().next() {
                    out.push(ArticleCandidate {
                        title: String::new(),
                        url: clean_url(tok),
                    });
                }
            }
            continue;
        }
        // bare url (possibly after some words)
        if let Some(tok) = body.split_whitespace().find(|t| t.starts_with("http")) {
            out.push(ArticleCandidate {
                title: String::new(),
                url: clean_url(tok),
            });
        }
    }
    out
}

fn clean_url(s: &str) -> String {
    s.trim()
        .trim_matches(|c: char| matches!(c, '<' | '>' | '"' | '\'' | '(' | ')' | '[' | ']'))
        .trim_end_matches(|c: char| matches!(c, '.' | ',' | ';'))
        .to_string()
}

fn is_http_url(s: &str) -> bool {
    (s.starts_with("http://") || s.starts_with("https://")) && url::Url::parse(s).is_ok()
}

// ------------------------------------------------------------
// Synthesis + impact score
// ------------------------------------------------------------

/// Split a synthesis reply into title, body and tags.
/// `topic` only feeds the fallback title.
pub fn parse_synthesis(reply: &str, topic: &str) -> Synthesis {
    let (main, tags_part) = match RE_TAGS_HEADER.find_iter(reply).last() {
        Some(m) => (&reply[..m.start()], Some(&reply[m.end()..])),
        None => (reply, None),
    };
    let tags = tags_part.map(parse_tags).unwrap_or_default();

    let lines: Vec<&str> = main.lines().collect();
    let mut title = String::new();
    let mut body = String::new();

    // The first non-empty line is the title, `##` heading or not; later
    // `##` lines are section headers and stay in the body.
    if let Some(i) = lines.iter().position(|l| !l.trim().is_empty()) {
        title = clean_title(lines[i]);
        body = lines[i + 1..].join("\n");
    }
    if let Some(m) = RE_ARTICLE_HEADER.find(&body) {
        body = body[m.end()..].to_string();
    }
    let mut body = body.trim().to_string();

    if title.is_empty() {
        title = format!("Article about {topic}");
    }
    if body.is_empty() {
        body = main.trim().to_string();
    }
    Synthesis { title, body, tags }
}

fn clean_title(line: &str) -> String {
    let s = line.trim().trim_start_matches('#').replace("**", "");
    let s = RE_CITATION.replace_all(&s, "");
    let s = RE_LABEL.replace(s.trim(), "");
    strip_wrappers(&normalize_text(&s))
}

fn parse_tags(part: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    part.split([',', '\n'])
        .map(|t| {
            let t = RE_CITATION.replace_all(t, "");
            t.trim()
                .trim_matches(|c: char| {
                    matches!(c, '[' | ']' | '#' | '"' | '\'' | '*' | '.' | '-' | '•') || c.is_whitespace()
                })
                .to_string()
        })
        .filter(|t| !t.is_empty() && t.chars().count() <= 50)
        .filter(|t| seen.insert(t.to_lowercase()))
        .take(MAX_TAGS)
        .collect()
}

/// Whole reply as an integer, else the first integer in it, else the default; clamped to 0..=10.
pub fn parse_impact_score(reply: &str) -> u8 {
    let trimmed = reply.trim();
    let n = trimmed
        .parse::<i64>()
        .ok()
        .or_else(|| RE_INT.find(trimmed).and_then(|m| m.as_str().parse::<i64>().ok()));
    match n {
        Some(v) => v.clamp(0, 10) as u8,
        None => DEFAULT_IMPACT_SCORE,
    }
}

// ------------------------------------------------------------
// Shared text helpers
// ------------------------------------------------------------

/// Decode HTML entities and collapse whitespace.
pub fn normalize_text(s: &str) -> String {
    let decoded = html_escape::decode_html_entities(s);
    RE_WS.replace_all(decoded.trim(), " ").into_owned()
}

/// Strip surrounding quotes and markdown emphasis.
fn strip_wrappers(s: &str) -> String {
    s.trim()
        .trim_matches(|c: char| matches!(c, '"' | '\'' | '*' | '_' | '\u{201C}' | '\u{201D}' | '\u{2018}' | '\u{2019}'))
        .trim()
        .to_string()
}

fn strip_code_fence(s: &str) -> &str {
    let t = s.trim();
    let Some(inner) = t.strip_prefix("```") else {
        return t;
    };
    let inner = inner.strip_prefix("json").unwrap_or(inner);
    inner.strip_suffix("```").unwrap_or(inner).trim()
}
