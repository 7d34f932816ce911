//! Keyword extraction shared by the registry and the router.
//!
//! A command's keywords are its lower-cased, punctuation-trimmed words,
//! minus short tokens and stop words. The registry accumulates them per
//! conversation; the router compares a new command against them.

use std::collections::BTreeSet;

/// Tokens this short (in characters) or shorter are never keywords.
const MIN_KEYWORD_CHARS: usize = 3;

/// Words that carry no topic information.
///
/// Articles, auxiliary verbs, pronouns, prepositions and spoken filler.
/// Must stay sorted: lookups use binary search.
const STOP_WORDS: &[&str] = &[
    "about", "actually", "after", "again", "all", "also", "and", "any", "are", "because", "been",
    "before", "being", "but", "can", "could", "did", "does", "doing", "done", "for", "from",
    "gonna", "had", "has", "have", "her", "here", "hers", "him", "his", "how", "into", "its",
    "itself", "just", "let", "like", "maybe", "mine", "more", "myself", "need", "not", "now",
    "okay", "one", "our", "ours", "out", "please", "really", "she", "should", "some", "than",
    "thank", "thanks", "that", "the", "their", "them", "then", "there", "these", "they", "thing",
    "this", "those", "too", "very", "wanna", "want", "was", "were", "what", "when", "where",
    "which", "while", "who", "why", "will", "with", "would", "yeah", "yes", "you", "your",
    "yours",
];

/// Extract the normalized keyword set of a command.
///
/// Duplicates collapse; an empty or all-filler command yields an empty set.
pub fn extract_keywords(text: &str) -> BTreeSet<String> {
    text.to_lowercase()
        .split_whitespace()
        .map(|token| token.trim_matches(|c: char| !c.is_alphanumeric()))
        .filter(|token| token.chars().count() >= MIN_KEYWORD_CHARS)
        .filter(|token| !is_stop_word(token))
        .map(str::to_string)
        .collect()
}

/// Whether `word` (already lower-cased) is a stop word.
pub fn is_stop_word(word: &str) -> bool {
    STOP_WORDS.binary_search(&word).is_ok()
}

/// Jaccard similarity of two keyword sets: |A ∩ B| / |A ∪ B|.
///
/// Defined as `0.0` when either set is empty.
pub fn jaccard(a: &BTreeSet<String>, b: &BTreeSet<String>) -> f64 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    let intersection = a.intersection(b).count();
    let union = a.len() + b.len() - intersection;
    intersection as f64 / union as f64
}
