//! Answer comparison and scoring heuristics shared by the exercise modules.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::services::types::CefrLevel;

/// Minimum similarity for a near-miss answer to count as correct.
pub const SIMILARITY_THRESHOLD: f64 = 0.85;
/// Answers this short must match exactly after normalization.
const EXACT_MATCH_MAX_LEN: usize = 3;

const LEVEL_UP_SCORE: f64 = 85.0;
const LEVEL_DOWN_SCORE: f64 = 50.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ScoreBand {
    Excellent,
    Good,
    Fair,
    NeedsWork,
}

impl ScoreBand {
    pub fn from_score(score: f64) -> Self {
        if score >= 90.0 {
            Self::Excellent
        } else if score >= 75.0 {
            Self::Good
        } else if score >= 50.0 {
            Self::Fair
        } else {
            Self::NeedsWork
        }
    }

    pub fn message(self) -> &'static str {
        match self {
            Self::Excellent => "Excellent work!",
            Self::Good => "Good job, keep it up.",
            Self::Fair => "Not bad, but there is room to improve.",
            Self::NeedsWork => "Keep practicing, you will get there.",
        }
    }
}

/// Lowercases, drops punctuation other than apostrophes and collapses whitespace.
pub fn normalize_answer(value: &str) -> String {
    let cleaned: String = value
        .chars()
        .map(|c| {
            let c = if c == '\u{2019}' { '\'' } else { c };
            if c.is_alphanumeric() || c == '\'' {
                c.to_ascii_lowercase()
            } else {
                ' '
            }
        })
        .collect();
    cleaned.split_whitespace().collect::<Vec<_>>().join(" ")
}

pub fn levenshtein(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    if a.is_empty() {
        return b.len();
    }
    if b.is_empty() {
        return a.len();
    }

    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut curr = vec![0; b.len() + 1];

    for (i, ca) in a.iter().enumerate() {
        curr[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let cost = usize::from(ca != cb);
            curr[j + 1] = (prev[j + 1] + 1).min(curr[j] + 1).min(prev[j] + cost);
        }
        std::mem::swap(&mut prev, &mut curr);
    }

    prev[b.len()]
}

/// `1 - distance / longest`, in `[0, 1]`, over normalized text.
pub fn string_similarity(a: &str, b: &str) -> f64 {
    let a = normalize_answer(a);
    let b = normalize_answer(b);
    let longest = a.chars().count().max(b.chars().count());
    if longest == 0 {
        return 1.0;
    }
    1.0 - levenshtein(&a, &b) as f64 / longest as f64
}

/// Share of reference words (with multiplicity) found in the candidate.
pub fn word_overlap_ratio(reference: &str, candidate: &str) -> f64 {
    let reference = normalize_answer(reference);
    let reference_words: Vec<&str> = reference.split_whitespace().collect();
    if reference_words.is_empty() {
        return 0.0;
    }

    let candidate = normalize_answer(candidate);
    let mut available: HashMap<&str, usize> = HashMap::new();
    for word in candidate.split_whitespace() {
        *available.entry(word).or_default() += 1;
    }

    let matched = reference_words
        .iter()
        .filter(|word| match available.get_mut(*word) {
            Some(n) if *n > 0 => {
                *n -= 1;
                true
            }
            _ => false,
        })
        .count();

    matched as f64 / reference_words.len() as f64
}

pub fn is_answer_correct(expected: &str, given: &str) -> bool {
    let expected_norm = normalize_answer(expected);
    let given_norm = normalize_answer(given);
    if given_norm.is_empty() {
        return false;
    }
    if expected_norm == given_norm {
        return true;
    }
    if expected_norm.chars().count() <= EXACT_MATCH_MAX_LEN {
        return false;
    }
    string_similarity(&expected_norm, &given_norm) >= SIMILARITY_THRESHOLD
}

/// Integer percentage, 0 when there is nothing to grade.
pub fn percentage(correct: usize, total: usize) -> f64 {
    if total == 0 {
        return 0.0;
    }
    (correct as f64 * 100.0 / total as f64).round()
}

pub fn suggest_next_level(level: CefrLevel, score: f64) -> CefrLevel {
    if score >= LEVEL_UP_SCORE {
        level.next()
    } else if score < LEVEL_DOWN_SCORE {
        level.prev()
    } else {
        level
    }
}

pub fn word_count(text: &str) -> usize {
    text.split_whitespace()
        .filter(|w| w.chars().any(char::is_alphanumeric))
        .count()
}

/// Distinct words over total words.
pub fn lexical_variety(text: &str) -> f64 {
    let normalized = normalize_answer(text);
    let words: Vec<&str> = normalized.split_whitespace().collect();
    if words.is_empty() {
        return 0.0;
    }
    let distinct: std::collections::HashSet<&str> = words.iter().copied().collect();
    distinct.len() as f64 / words.len() as f64
}

pub fn sentence_count(text: &str) -> usize {
    text.split(['.', '!', '?'])
        .filter(|s| word_count(s) > 0)
        .count()
}

pub fn clamp_score(score: f64) -> f64 {
    if score.is_finite() {
        score.clamp(0.0, 100.0).round()
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_strips_punctuation() {
        assert_eq!(normalize_answer("  The  Cat's, hat! "), "the cat's hat");
        assert_eq!(normalize_answer("don\u{2019}t"), "don't");
    }

    #[test]
    fn test_levenshtein_known_values() {
        assert_eq!(levenshtein("kitten", "sitting"), 3);
        assert_eq!(levenshtein("", "abc"), 3);
        assert_eq!(levenshtein("same", "same"), 0);
    }

    #[test]
    fn test_similarity_of_empty_strings() {
        assert_eq!(string_similarity("", ""), 1.0);
        assert_eq!(string_similarity("abc", ""), 0.0);
    }

    #[test]
    fn test_word_overlap_counts_multiplicity() {
        assert_eq!(word_overlap_ratio("the cat the hat", "the cat"), 0.5);
        assert_eq!(word_overlap_ratio("", "anything"), 0.0);
        assert_eq!(word_overlap_ratio("Hello world", "world, hello!"), 1.0);
    }

    #[test]
    fn test_answer_correctness() {
        assert!(is_answer_correct("Photosynthesis", "photosynthesis"));
        assert!(is_answer_correct("photosynthesis", "photosynthesys"));
        assert!(!is_answer_correct("B", "C"));
        assert!(!is_answer_correct("went", "gone"));
        assert!(!is_answer_correct("anything", "   "));
    }

    #[test]
    fn test_score_bands() {
        assert_eq!(ScoreBand::from_score(95.0), ScoreBand::Excellent);
        assert_eq!(ScoreBand::from_score(90.0), ScoreBand::Excellent);
        assert_eq!(ScoreBand::from_score(80.0), ScoreBand::Good);
        assert_eq!(ScoreBand::from_score(50.0), ScoreBand::Fair);
        assert_eq!(ScoreBand::from_score(49.9), ScoreBand::NeedsWork);
    }

    #[test]
    fn test_level_suggestion() {
        assert_eq!(suggest_next_level(CefrLevel::B1, 90.0), CefrLevel::B2);
        assert_eq!(suggest_next_level(CefrLevel::B1, 60.0), CefrLevel::B1);
        assert_eq!(suggest_next_level(CefrLevel::B1, 20.0), CefrLevel::A2);
    }

    #[test]
    fn test_text_metrics() {
        let text = "I like tea. I like coffee too! Do you?";
        assert_eq!(word_count(text), 9);
        assert_eq!(sentence_count(text), 3);
        assert!(lexical_variety(text) < 1.0);
        assert_eq!(percentage(2, 3), 67.0);
        assert_eq!(percentage(0, 0), 0.0);
    }
}
