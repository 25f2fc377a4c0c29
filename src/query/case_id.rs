//! Case identifier recognition (KKO:2022:18, KHO 2023:5, KKO:1995-II-12)

use regex::Regex;
use std::sync::OnceLock;

fn modern_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?i)\b(KKO|KHO)\s*[:\s]\s*(\d{4})\s*:\s*(\d+)\b")
            .expect("case id pattern is valid")
    })
}

fn legacy_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?i)\b(KKO|KHO)\s*:?\s*(\d{4})-([IVXLCDM]+)-(\d+)\b")
            .expect("legacy case id pattern is valid")
    })
}

/// Extract case identifiers mentioned in free text.
///
/// Identifiers are upper-cased and returned in order of first appearance
/// without duplicates.
pub fn extract_case_ids(text: &str) -> Vec<String> {
    let mut found: Vec<(usize, String)> = Vec::new();

    for caps in modern_pattern().captures_iter(text) {
        let start = caps.get(0).map(|m| m.start()).unwrap_or(0);
        found.push((
            start,
            format!("{}:{}:{}", caps[1].to_uppercase(), &caps[2], &caps[3]),
        ));
    }

    for caps in legacy_pattern().captures_iter(text) {
        let start = caps.get(0).map(|m| m.start()).unwrap_or(0);
        found.push((
            start,
            format!(
                "{}:{}-{}-{}",
                caps[1].to_uppercase(),
                &caps[2],
                caps[3].to_uppercase(),
                &caps[4]
            ),
        ));
    }

    found.sort_by_key(|(start, _)| *start);

    let mut ids: Vec<String> = Vec::with_capacity(found.len());
    for (_, id) in found {
        if !ids.contains(&id) {
            ids.push(id);
        }
    }
    ids
}

/// Whether the text names at least one specific case
pub fn mentions_case_id(text: &str) -> bool {
    modern_pattern().is_match(text) || legacy_pattern().is_match(text)
}
