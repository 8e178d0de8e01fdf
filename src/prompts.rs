// src/prompts.rs
//! Request builders for the four Completion Service stages.
//!
//! Source numbering in the synthesis prompt is the contract the citation
//! engine relies on: trusted sources are listed first, then uncertain ones,
//! numbered consecutively from 1 in exactly that order.

use serde_json::json;

use crate::completion::{CompletionRequest, Message, ResponseFormat, Stage};
use crate::config::PipelineConfig;
use crate::trust::SourceCandidate;

/// Characters of article body sent to the impact stage.
pub const IMPACT_CONTENT_CHARS: usize = 3000;

pub fn trends_request(cfg: &PipelineConfig, sector: &str, tags: &[String], count: usize) -> CompletionRequest {
    let focus = if tags.is_empty() {
        String::new()
    } else {
        format!("Focus on: {}. ", tags.join(", "))
    };
    let user = format!(
        "What are the top {count} trending AI topics in {sector} right now? {focus}\
         Requirements: current (last 30 days), specific, newsworthy, AI-related. \
         List {count} topic titles only, one per line, 8-20 words each, \
         no numbering or descriptions."
    );
    let response_format = cfg.structured_output.then(|| ResponseFormat {
        schema: json!({
            "type": "object",
            "properties": {
                "topics": { "type": "array", "items": { "type": "string" } }
            },
            "required": ["topics"]
        }),
    });
    CompletionRequest {
        stage: Stage::Trends,
        model: cfg.models.trends.clone(),
        temperature: cfg.temperature,
        messages: vec![
            Message::system(format!(
                "You are a trend analyst. Find current trending AI topics in {sector}."
            )),
            Message::user(user),
        ],
        response_format,
        timeout: cfg.timeout(),
    }
}

pub fn articles_request(cfg: &PipelineConfig, topic: &str, count: usize) -> CompletionRequest {
    let user = format!(
        "Find {count} recent, high-quality articles about: {topic}\n\n\
         RULES:\n\
         - Articles must be recent (within the last 3 months)\n\
         - Articles must come from credible sources\n\
         - Find no more than {count} articles\n\
         - Return only article titles and URLs\n\
         - One per line in the format: Title | URL\n\
         - No descriptions, no explanations"
    );
    let response_format = cfg.structured_output.then(|| ResponseFormat {
        schema: json!({
            "type": "object",
            "properties": {
                "articles": {
                    "type": "array",
                    "items": {
                        "type": "object",
                        "properties": {
                            "title": { "type": "string" },
                            "url": { "type": "string" }
                        },
                        "required": ["title", "url"]
                    }
                }
            },
            "required": ["articles"]
        }),
    });
    CompletionRequest {
        stage: Stage::Articles,
        model: cfg.models.articles.clone(),
        temperature: cfg.temperature,
        messages: vec![
            Message::system(format!(
                "Find the top {count} most relevant and recent articles about: {topic}"
            )),
            Message::user(user),
        ],
        response_format,
        timeout: cfg.timeout(),
    }
}

/// Numbered source block: `[n] title: url`, trusted section first.
pub fn source_block(trusted: &[SourceCandidate], uncertain: &[SourceCandidate]) -> String {
    let mut out = String::new();
    let mut n = 0usize;
    for (header, list) in [
        ("TRUSTED SOURCES (prioritize these):", trusted),
        ("UNCERTAIN SOURCES (use for additional context):", uncertain),
    ] {
        if list.is_empty() {
            continue;
        }
        if !out.is_empty() {
            out.push_str("\n\n");
        }
        out.push_str(header);
        for s in list {
            n += 1;
            let title = if s.title.trim().is_empty() { &s.domain } else { &s.title };
            out.push_str(&format!("\n[{n}] {title}: {}", s.url));
        }
    }
    out
}

pub fn synthesis_request(
    cfg: &PipelineConfig,
    topic: &str,
    trusted: &[SourceCandidate],
    uncertain: &[SourceCandidate],
) -> CompletionRequest {
    let sources = source_block(trusted, uncertain);
    let total = trusted.len() + uncertain.len();
    let open_search = if cfg.allow_open_search {
        "- You may consult other sources if the list is insufficient\n"
    } else {
        "- Do not cite anything outside the numbered list\n"
    };
    let user = format!(
        "{topic}\n\n\
         Use information from these sources:\n\n\
         {sources}\n\n\
         RULES:\n\
         - Synthesize information from the numbered sources above\n\
         - Prioritize TRUSTED sources; use UNCERTAIN sources only for additional context\n\
         - When information conflicts, prefer TRUSTED sources\n\
         - Cite inline with the source number in brackets, e.g. [1]; valid numbers are 1 to {total}\n\
         {open_search}\
         - Stay neutral and write for a general audience\n\n\
         STRUCTURE:\n\
         - 800-1200 words\n\
         - Start with a compelling title on its own line, without citations\n\
         - Use 2-4 section headers wrapped in double asterisks (e.g. **Conclusion**)\n\
         - Plain text only: no bullet lists\n\n\
         TAGS:\n\
         - 5-10 tags: companies, technologies, key people, industries, products\n\
         - Proper capitalization (e.g. OpenAI, GPT-4), 1-3 words each, comma separated\n\n\
         FORMAT:\n\
         [Title]\n\n\
         [Article]\n\n\
         TAGS: tag1, tag2, tag3"
    );
    CompletionRequest {
        stage: Stage::Synthesis,
        model: cfg.models.synthesis.clone(),
        temperature: cfg.temperature,
        messages: vec![
            Message::system(
                "You are a professional research journalist writing comprehensive articles. \
                 Write directly without explaining your process.",
            ),
            Message::user(user),
        ],
        response_format: None,
        timeout: cfg.synthesis_timeout(),
    }
}

pub fn impact_request(cfg: &PipelineConfig, sector: &str, title: &str, content: &str) -> CompletionRequest {
    let excerpt: String = content.chars().take(IMPACT_CONTENT_CHARS).collect();
    let user = format!(
        "Evaluate the IMPACT SCORE (0-10) for this article about AI in {sector}.\n\n\
         SCALE:\n\
         10 = revolutionary change for {sector}\n\
         8 = major breakthrough that changes industry practice\n\
         6 = significant progress affecting many organizations\n\
         4 = interesting development with limited scope\n\
         2 = minor update or niche application\n\
         0 = no importance\n\n\
         Consider scale, timeline, novelty, adoption barriers and permanence.\n\n\
         ARTICLE:\n\
         Title: {title}\n\n\
         Content: {excerpt}\n\n\
         Return a single integer between 0 and 10."
    );
    CompletionRequest {
        stage: Stage::Impact,
        model: cfg.models.impact.clone(),
        temperature: cfg.temperature,
        messages: vec![
            Message::system(format!(
                "You are an expert analyst evaluating the long-term impact of AI developments in {sector}."
            )),
            Message::user(user),
        ],
        response_format: None,
        timeout: cfg.timeout(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trust::TrustTier;

    fn cand(title: &str, url: &str, trust: TrustTier) -> SourceCandidate {
        SourceCandidate {
            title: title.into(),
            url: url.into(),
            domain: crate::trust::extract_domain(url),
            trust,
        }
    }

    #[test]
    fn sources_are_numbered_trusted_first() {
        let trusted = vec![
            cand("A", "https://reuters.com/a", TrustTier::Trusted),
            cand("B", "https://bbc.com/b", TrustTier::Trusted),
        ];
        let uncertain = vec![cand("", "https://blog.example.com/c", TrustTier::Uncertain)];
        let block = source_block(&trusted, &uncertain);
        let lines: Vec<&str> = block.lines().filter(|l| l.starts_with('[')).collect();
        assert_eq!(
            lines,
            vec![
                "[1] A: https://reuters.com/a",
                "[2] B: https://bbc.com/b",
                "[3] blog.example.com: https://blog.example.com/c",
            ]
        );
        assert!(block.find("TRUSTED").unwrap() < block.find("UNCERTAIN").unwrap());
    }

    #[test]
    fn empty_section_is_omitted() {
        let uncertain = vec![cand("C", "https://x.example.org/", TrustTier::Uncertain)];
        let block = source_block(&[], &uncertain);
        assert!(!block.contains("TRUSTED SOURCES"));
        assert!(block.contains("[1] C:"));
    }

    #[test]
    fn structured_output_attaches_schema() {
        let mut cfg = PipelineConfig::default();
        assert!(trends_request(&cfg, "AI", &[], 3).response_format.is_none());
        cfg.structured_output = true;
        let req = articles_request(&cfg, "topic", 5);
        assert_eq!(req.stage, Stage::Articles);
        assert!(req.response_format.is_some());
    }

    #[test]
    fn impact_excerpt_is_bounded_and_synthesis_has_longer_timeout() {
        let cfg = PipelineConfig::default();
        let body = "é".repeat(IMPACT_CONTENT_CHARS + 500);
        let req = impact_request(&cfg, "Healthcare", "T", &body);
        let user = &req.messages[1].content;
        assert_eq!(user.matches('é').count(), IMPACT_CONTENT_CHARS);

        let syn = synthesis_request(&cfg, "topic", &[], &[]);
        assert!(syn.timeout > req.timeout);
    }
}
