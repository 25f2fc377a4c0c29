//! Prefix generation for compound-word recall

/// Turns one query term into the prefixes the prefix-match source looks up
pub trait PrefixStrategy: Send + Sync {
    fn generate_variants(&self, term: &str) -> Vec<String>;
}

/// Shortest prefix ever produced, in characters
const MIN_PREFIX_CHARS: usize = 4;

/// Truncates long terms at fixed fractions of their length
///
/// Finnish compounds such as `oikeuspaikkasäännös` rarely appear verbatim in
/// other sections, but their leading stems do. Terms shorter than
/// `min_term_chars` are passed through whole.
#[derive(Debug, Clone)]
pub struct FractionalPrefixStrategy {
    fractions: Vec<f32>,
    min_term_chars: usize,
}

impl FractionalPrefixStrategy {
    pub fn new(fractions: Vec<f32>, min_term_chars: usize) -> Self {
        Self {
            fractions,
            min_term_chars,
        }
    }
}

impl Default for FractionalPrefixStrategy {
    fn default() -> Self {
        Self::new(vec![0.5, 0.65, 0.8], 8)
    }
}

impl PrefixStrategy for FractionalPrefixStrategy {
    fn generate_variants(&self, term: &str) -> Vec<String> {
        let term = term.to_lowercase();
        let chars: Vec<char> = term.chars().collect();

        if chars.len() < MIN_PREFIX_CHARS {
            return Vec::new();
        }
        if chars.len() < self.min_term_chars {
            return vec![term];
        }

        let mut variants: Vec<String> = Vec::with_capacity(self.fractions.len());
        for fraction in &self.fractions {
            let cut = ((chars.len() as f32) * fraction).floor() as usize;
            let cut = cut.clamp(MIN_PREFIX_CHARS, chars.len());
            let prefix: String = chars[..cut].iter().collect();
            if !variants.contains(&prefix) {
                variants.push(prefix);
            }
        }
        variants
    }
}

/// Prefixes for every term of a query, deduplicated in first-seen order
pub fn query_prefixes(strategy: &dyn PrefixStrategy, text: &str) -> Vec<String> {
    let mut prefixes = Vec::new();
    for term in text.split(|c: char| !c.is_alphanumeric()) {
        for prefix in strategy.generate_variants(term) {
            if !prefixes.contains(&prefix) {
                prefixes.push(prefix);
            }
        }
    }
    prefixes
}
