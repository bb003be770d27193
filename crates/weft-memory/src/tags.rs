use std::collections::BTreeSet;

/// A small stopword list for the tag-extraction heuristic (§4.G.1) — this is
/// a tokenizer, not an intent classifier, so the list stays short and
/// domain-agnostic.
const STOPWORDS: &[&str] = &[
    "the", "and", "for", "are", "but", "not", "you", "your", "with", "this", "that", "have",
    "from", "was", "were", "will", "would", "could", "should", "can", "what", "when", "where",
    "how", "why", "who", "which", "their", "they", "them", "about", "into", "then", "than",
    "there", "here",
];

/// Lowercases `text`, splits on non-alphanumeric boundaries, discards
/// stopwords, and keeps unique tokens of length >= 3 (§4.G.1).
pub fn extract_tags(text: &str) -> BTreeSet<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|tok| tok.len() >= 3)
        .filter(|tok| !STOPWORDS.contains(tok))
        .map(|tok| tok.to_string())
        .collect()
}

/// Jaccard similarity between two tag sets, in [0, 1]. Two empty sets are
/// defined as dissimilar (0.0) rather than NaN, since an empty hint should
/// never force every candidate record to qualify.
pub fn jaccard(a: &BTreeSet<String>, b: &BTreeSet<String>) -> f64 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    let intersection = a.intersection(b).count();
    let union = a.union(b).count();
    intersection as f64 / union as f64
}
