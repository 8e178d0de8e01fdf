//! # Citation Renumbering & Source Filtering
//!
//! Pure reconciliation of a generated article's inline `[n]` markers against
//! the source list the Completion Service was given. No I/O.
//!
//! - `n` refers 1-based to `returned` (provided sources first, then any the
//!   service echoed from open search).
//! - Distinct cited numbers are renumbered `1..=M` in order of first
//!   appearance in the text; every occurrence is rewritten in one pass, so
//!   adjacent markers like `[1][2]` stay independent and never cascade.
//! - Markers pointing outside `1..=provided` raise the anomaly flag. They
//!   are kept only when open search is allowed and a returned source exists
//!   for them; otherwise the marker is removed from the text.
//! - Inputs are never mutated.

use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashMap};

use crate::trust::SourceCandidate;

static RE_MARKER: Lazy<Regex> = Lazy::new(|| Regex::new(r"\[(\d+)\]").expect("marker regex"));

/// Whether sources beyond the provided list may be cited.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum ExtraSourcePolicy {
    /// Keep citations of echoed extra sources (open web search permitted).
    #[default]
    AllowEchoed,
    /// Only the provided list may be cited; anything else is dropped.
    ProvidedOnly,
}

/// Original citation number → renumbered citation number.
pub type CitationMap = BTreeMap<u32, u32>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FilterStats {
    /// Sorted distinct keys of `citation_mapping`.
    pub cited_numbers_original: Vec<u32>,
    pub citation_mapping: CitationMap,
    pub sources_filtered: usize,
    pub sources_removed: usize,
    /// Provided positions that were never cited.
    pub unused_numbers: Vec<u32>,
    pub total_sources_provided: usize,
    pub total_sources_returned: usize,
    pub extra_sources_added: bool,
    pub extra_sources_count: usize,
    /// Distinct out-of-range numbers whose markers were removed.
    pub dropped_numbers: Vec<u32>,
}

impl FilterStats {
    /// True when renumbering actually changed some marker.
    pub fn renumbered(&self) -> bool {
        self.citation_mapping.iter().any(|(k, v)| k != v)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reconciled {
    pub text: String,
    /// `sources[i]` backs renumbered citation `i + 1`.
    pub sources: Vec<SourceCandidate>,
    pub stats: FilterStats,
}

/// Renumber `article_text` against `returned` and keep only cited sources.
pub fn filter_and_renumber(
    article_text: &str,
    returned: &[SourceCandidate],
    sources_provided_count: usize,
    policy: ExtraSourcePolicy,
) -> Reconciled {
    // 1) distinct numbers in order of first appearance
    let mut first_seen: Vec<u64> = Vec::new();
    for caps in RE_MARKER.captures_iter(article_text) {
        // absurdly long digit runs saturate and end up out of range
        let n = caps[1].parse::<u64>().unwrap_or(u64::MAX);
        if !first_seen.contains(&n) {
            first_seen.push(n);
        }
    }

    // 2) anomalies + which numbers survive
    let provided = sources_provided_count as u64;
    let mut out_of_range: BTreeSet<u64> = BTreeSet::new();
    let mut dropped: BTreeSet<u64> = BTreeSet::new();
    let mut kept: Vec<u64> = Vec::with_capacity(first_seen.len());
    for &n in &first_seen {
        let in_provided = n >= 1 && n <= provided;
        if !in_provided {
            out_of_range.insert(n);
        }
        let has_source = n >= 1 && n <= returned.len() as u64;
        let allowed = in_provided || policy == ExtraSourcePolicy::AllowEchoed;
        if has_source && allowed {
            kept.push(n);
        } else {
            dropped.insert(n);
        }
    }

    // 3) map in order of first appearance
    let mapping: HashMap<u64, u32> = kept
        .iter()
        .enumerate()
        .map(|(i, &n)| (n, (i + 1) as u32))
        .collect();

    // 4) single-pass rewrite
    let text = if first_seen.is_empty() {
        article_text.to_string()
    } else {
        RE_MARKER
            .replace_all(article_text, |caps: &Captures| {
                let n = caps[1].parse::<u64>().unwrap_or(u64::MAX);
                match mapping.get(&n) {
                    Some(new) => format!("[{new}]"),
                    None => String::new(),
                }
            })
            .into_owned()
    };

    // 5) cited sources in renumbered order
    let sources: Vec<SourceCandidate> = kept
        .iter()
        .map(|&n| returned[(n - 1) as usize].clone())
        .collect();

    // 6) stats
    let citation_mapping: CitationMap = kept
        .iter()
        .map(|&n| (n as u32, mapping[&n]))
        .collect();
    let unused_numbers = (1..=sources_provided_count as u32)
        .filter(|n| !citation_mapping.contains_key(n))
        .collect();
    let extra_returned = returned.len().saturating_sub(sources_provided_count);
    let stats = FilterStats {
        cited_numbers_original: citation_mapping.keys().copied().collect(),
        sources_filtered: sources.len(),
        sources_removed: sources_provided_count.saturating_sub(sources.len()),
        unused_numbers,
        total_sources_provided: sources_provided_count,
        total_sources_returned: returned.len(),
        extra_sources_added: !out_of_range.is_empty() || extra_returned > 0,
        extra_sources_count: extra_returned.max(out_of_range.len()),
        dropped_numbers: dropped
            .iter()
            .map(|&n| u32::try_from(n).unwrap_or(u32::MAX))
            .collect(),
        citation_mapping,
    };

    Reconciled {
        text,
        sources,
        stats,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trust::TrustTier;

    fn src(i: usize) -> SourceCandidate {
        SourceCandidate {
            title: format!("source {i}"),
            url: format!("https://s{i}.example.com/"),
            domain: format!("s{i}.example.com"),
            trust: TrustTier::Trusted,
        }
    }

    fn sources(n: usize) -> Vec<SourceCandidate> {
        (1..=n).map(src).collect()
    }

    #[test]
    fn renumbers_in_order_of_first_appearance() {
        let given = sources(2);
        let r = filter_and_renumber(
            "Revenue rose[2]. Costs fell[1]. Again[2].",
            &given,
            2,
            ExtraSourcePolicy::AllowEchoed,
        );
        assert_eq!(r.text, "Revenue rose[1]. Costs fell[2]. Again[1].");
        assert_eq!(r.sources, vec![src(2), src(1)]);
        assert_eq!(r.stats.sources_removed, 0);
        assert_eq!(r.stats.cited_numbers_original, vec![1, 2]);
        assert_eq!(r.stats.citation_mapping, CitationMap::from([(2, 1), (1, 2)]));
        assert!(r.stats.renumbered());
        assert!(!r.stats.extra_sources_added);
    }

    #[test]
    fn unused_sources_are_removed() {
        let given = sources(5);
        let r = filter_and_renumber("A[4] b[4] c[2]", &given, 5, ExtraSourcePolicy::AllowEchoed);
        assert_eq!(r.text, "A[1] b[1] c[2]");
        assert_eq!(r.sources, vec![src(4), src(2)]);
        assert_eq!(r.stats.unused_numbers, vec![1, 3, 5]);
        assert_eq!(r.stats.sources_removed, 3);
        assert_eq!(r.stats.sources_filtered, 2);
    }

    #[test]
    fn no_citations_is_a_no_op() {
        let given = sources(3);
        let text = "Nothing cited here [a] [ 1 ] [].";
        let r = filter_and_renumber(text, &given, 3, ExtraSourcePolicy::AllowEchoed);
        assert_eq!(r.text, text);
        assert!(r.sources.is_empty());
        assert!(!r.stats.extra_sources_added);
        assert_eq!(r.stats.unused_numbers, vec![1, 2, 3]);
    }

    #[test]
    fn adjacent_markers_are_independent() {
        let given = sources(3);
        let r = filter_and_renumber("x[3][1] y[1][3][2]", &given, 3, ExtraSourcePolicy::AllowEchoed);
        assert_eq!(r.text, "x[1][2] y[2][1][3]");
    }

    #[test]
    fn out_of_range_without_source_is_dropped_and_flagged() {
        let given = sources(2);
        let r = filter_and_renumber("a[1] b[7] c[0] d[2]", &given, 2, ExtraSourcePolicy::AllowEchoed);
        assert_eq!(r.text, "a[1] b c d[2]");
        assert!(r.stats.extra_sources_added);
        assert_eq!(r.stats.extra_sources_count, 2);
        assert_eq!(r.stats.dropped_numbers, vec![0, 7]);
        assert_eq!(r.sources.len(), 2);
    }

    #[test]
    fn echoed_extra_source_is_kept_when_allowed() {
        let returned = sources(3); // service echoed a third source
        let r = filter_and_renumber("a[3] b[1]", &returned, 2, ExtraSourcePolicy::AllowEchoed);
        assert_eq!(r.text, "a[1] b[2]");
        assert_eq!(r.sources, vec![src(3), src(1)]);
        assert!(r.stats.extra_sources_added);
        assert_eq!(r.stats.extra_sources_count, 1);
        assert_eq!(r.stats.unused_numbers, vec![2]);
        // two provided, two kept (one of them an extra) → nothing "removed"
        assert_eq!(r.stats.sources_removed, 0);
    }

    #[test]
    fn echoed_extra_source_is_dropped_when_forbidden() {
        let returned = sources(3);
        let r = filter_and_renumber("a[3] b[1]", &returned, 2, ExtraSourcePolicy::ProvidedOnly);
        assert_eq!(r.text, "a b[1]");
        assert_eq!(r.sources, vec![src(1)]);
        assert!(r.stats.extra_sources_added);
    }

    #[test]
    fn inputs_are_not_mutated() {
        let given = sources(2);
        let snapshot = given.clone();
        let _ = filter_and_renumber("[2][1]", &given, 2, ExtraSourcePolicy::AllowEchoed);
        assert_eq!(given, snapshot);
    }
}
