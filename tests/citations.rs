// tests/citations.rs
use rand::seq::SliceRandom;
use rand::Rng;
use sector_digest::trust::{SourceCandidate, TrustTier};
use sector_digest::{filter_and_renumber, ExtraSourcePolicy};

fn sources(n: usize) -> Vec<SourceCandidate> {
    (1..=n)
        .map(|i| SourceCandidate {
            title: format!("Source {i}"),
            url: format!("https://news{i}.example.com/story"),
            domain: format!("news{i}.example.com"),
            trust: if i % 2 == 0 {
                TrustTier::Uncertain
            } else {
                TrustTier::Trusted
            },
        })
        .collect()
}

fn markers(text: &str) -> Vec<u32> {
    let re = regex::Regex::new(r"\[(\d+)\]").unwrap();
    re.captures_iter(text).map(|c| c[1].parse().unwrap()).collect()
}

#[test]
fn repeated_first_marker_pattern_is_renumbered_by_first_appearance() {
    let mut rng = rand::rng();
    for _ in 0..50 {
        let provided = rng.random_range(3..=15);
        let mut pool: Vec<usize> = (1..=provided).collect();
        pool.shuffle(&mut rng);
        let (a, b, c) = (pool[0], pool[1], pool[2]);

        let text = format!("One[{a}] two[{b}] again[{a}] three[{c}].");
        let given = sources(provided);
        let r = filter_and_renumber(&text, &given, provided, ExtraSourcePolicy::AllowEchoed);

        assert_eq!(r.text, "One[1] two[2] again[1] three[3].");
        assert_eq!(
            r.sources,
            vec![given[a - 1].clone(), given[b - 1].clone(), given[c - 1].clone()]
        );
        assert_eq!(r.stats.sources_removed, provided - 3);
        assert!(!r.stats.extra_sources_added);
    }
}

#[test]
fn renumbered_markers_are_contiguous_and_sources_line_up() {
    let given = sources(8);
    let text = "Intro[7]. Body[3][7] and[5]. More[3]. Tail[8][5].";
    let r = filter_and_renumber(text, &given, 8, ExtraSourcePolicy::AllowEchoed);

    let seen = markers(&r.text);
    let max = *seen.iter().max().unwrap() as usize;
    assert_eq!(max, r.sources.len());
    for n in 1..=max as u32 {
        assert!(seen.contains(&n), "missing [{n}] in {}", r.text);
    }
    // mapping inverted must point each new number at the right original source
    for (orig, new) in &r.stats.citation_mapping {
        assert_eq!(r.sources[*new as usize - 1], given[*orig as usize - 1]);
    }
    assert_eq!(r.stats.unused_numbers, vec![1, 2, 4, 6]);
    assert_eq!(r.stats.cited_numbers_original, vec![3, 5, 7, 8]);
}

#[test]
fn invented_citation_is_flagged_and_removed() {
    let given = sources(3);
    let r = filter_and_renumber(
        "Claim[2]. Invented[9]. Other[3].",
        &given,
        3,
        ExtraSourcePolicy::AllowEchoed,
    );
    assert!(r.stats.extra_sources_added);
    assert_eq!(r.stats.extra_sources_count, 1);
    assert_eq!(r.text, "Claim[1]. Invented. Other[2].");
    assert_eq!(r.stats.total_sources_returned, 3);
    assert_eq!(r.stats.total_sources_provided, 3);
}

#[test]
fn echoed_sources_count_even_when_uncited() {
    let returned = sources(5);
    let r = filter_and_renumber("Only[1].", &returned, 3, ExtraSourcePolicy::AllowEchoed);
    assert!(r.stats.extra_sources_added);
    assert_eq!(r.stats.extra_sources_count, 2);
    assert_eq!(r.sources.len(), 1);
    assert_eq!(r.stats.sources_removed, 2);
}

#[test]
fn text_without_markers_passes_through() {
    let given = sources(4);
    let text = "A plain paragraph.\n\n**Conclusion**\nNothing cited.";
    let r = filter_and_renumber(text, &given, 4, ExtraSourcePolicy::ProvidedOnly);
    assert_eq!(r.text, text);
    assert!(r.sources.is_empty());
    assert!(r.stats.citation_mapping.is_empty());
    assert!(!r.stats.extra_sources_added);
    assert_eq!(r.stats.sources_removed, 4);
}
