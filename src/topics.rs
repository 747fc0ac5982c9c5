//! Topic term extraction.
//!
//! Frequency-weighted, stopword-filtered term extraction with no external
//! corpus. Used to tag conversation segments and to match retrieval queries
//! against stored topics.

use std::collections::HashMap;

/// Minimum word length to consider for topic extraction.
const MIN_TOPIC_WORD_LENGTH: usize = 3;
/// Maximum word length to consider for topic extraction.
const MAX_TOPIC_WORD_LENGTH: usize = 30;

static STOP_WORDS: &[&str] = &[
    "the", "a", "an", "is", "are", "was", "were", "be", "been", "being", "have", "has", "had",
    "do", "does", "did", "will", "would", "could", "should", "may", "might", "must", "shall",
    "can", "need", "dare", "ought", "used", "to", "of", "in", "for", "on", "with", "at", "by",
    "from", "as", "into", "through", "during", "before", "after", "above", "below", "between",
    "under", "again", "further", "then", "once", "here", "there", "when", "where", "why",
    "how", "all", "each", "few", "more", "most", "other", "some", "such", "no", "nor", "not",
    "only", "own", "same", "so", "than", "too", "very", "just", "also", "now", "and", "but",
    "or", "if", "because", "until", "while", "this", "that", "these", "those", "what", "which",
    "who", "whom", "whose", "it", "its", "they", "them", "their", "we", "us", "our", "you",
    "your", "i", "my", "me", "he", "him", "his", "she", "her",
];

/// Extracts the top `limit` terms from `text` by frequency.
///
/// Terms are lowercased, split on non-alphanumeric boundaries, length-bounded,
/// stopword-filtered, and purely numeric tokens are discarded. Ties break
/// alphabetically so extraction is deterministic. Degenerate input yields an
/// empty list rather than an error.
#[must_use]
pub fn extract_topics(text: &str, limit: usize) -> Vec<String> {
    let words = text
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| w.len() >= MIN_TOPIC_WORD_LENGTH && w.len() <= MAX_TOPIC_WORD_LENGTH)
        .map(str::to_lowercase)
        .filter(|w| !STOP_WORDS.contains(&w.as_str()))
        .filter(|w| !w.chars().all(char::is_numeric));

    let mut freq: HashMap<String, usize> = HashMap::new();
    for word in words {
        *freq.entry(word).or_insert(0) += 1;
    }

    let mut sorted: Vec<_> = freq.into_iter().collect();
    sorted.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    sorted.into_iter().take(limit).map(|(w, _)| w).collect()
}

/// Returns true if the two topic lists share at least one term.
#[must_use]
pub fn overlaps(a: &[String], b: &[String]) -> bool {
    a.iter().any(|t| b.contains(t))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filters_stop_words_and_numbers() {
        let topics = extract_topics("what is the purpose of the retry system in 2024?", 10);
        assert!(topics.contains(&"retry".to_string()));
        assert!(topics.contains(&"system".to_string()));
        assert!(!topics.contains(&"the".to_string()));
        assert!(!topics.contains(&"2024".to_string()));
    }

    #[test]
    fn test_frequency_ranking() {
        let topics = extract_topics("database database database config config parser", 2);
        assert_eq!(topics, vec!["database".to_string(), "config".to_string()]);
    }

    #[test]
    fn test_degenerate_input_yields_empty() {
        assert!(extract_topics("", 5).is_empty());
        assert!(extract_topics("?? !! .. 12 34", 5).is_empty());
    }

    #[test]
    fn test_overlap() {
        let a = vec!["alpha".to_string(), "beta".to_string()];
        let b = vec!["beta".to_string()];
        let c = vec!["gamma".to_string()];
        assert!(overlaps(&a, &b));
        assert!(!overlaps(&a, &c));
    }
}
