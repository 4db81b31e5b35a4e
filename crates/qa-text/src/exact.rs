//! Exact-match similarity between a query and a fragment.

use std::collections::HashSet;

use crate::tokenizer::Tokenizer;

/// Bonus when the whole query appears verbatim (case-insensitive).
const VERBATIM_BONUS: f32 = 1.0;

/// Weight of the query-token coverage ratio.
const TOKEN_OVERLAP_WEIGHT: f32 = 0.8;

/// Weight of the phrase-window coverage ratio.
const PHRASE_OVERLAP_WEIGHT: f32 = 0.6;

/// Length in characters of the sliding phrase window.
pub const PHRASE_WINDOW: usize = 4;

/// Score how literally `text` matches `query`.
///
/// The result is the sum of three signals: a verbatim substring bonus,
/// the fraction of query tokens present in the text, and the fraction of
/// query phrase windows present in the text. Range is `[0, 2.4]`.
pub fn exact_match_score(tokenizer: &Tokenizer, query: &str, text: &str) -> f32 {
    if query.trim().is_empty() || text.is_empty() {
        return 0.0;
    }

    let mut score = 0.0;

    if text.to_lowercase().contains(&query.to_lowercase()) {
        score += VERBATIM_BONUS;
    }

    score += TOKEN_OVERLAP_WEIGHT * token_overlap(tokenizer, query, text);
    score += PHRASE_OVERLAP_WEIGHT * phrase_overlap(query, text);

    score
}

/// Fraction of distinct query tokens that also occur in the text.
pub fn token_overlap(tokenizer: &Tokenizer, query: &str, text: &str) -> f32 {
    let query_tokens: HashSet<String> = tokenizer.tokenize(query).into_iter().collect();
    if query_tokens.is_empty() {
        return 0.0;
    }

    let text_tokens: HashSet<String> = tokenizer.tokenize(text).into_iter().collect();
    let shared = query_tokens.intersection(&text_tokens).count();

    shared as f32 / query_tokens.len() as f32
}

/// Fraction of the query's character windows found verbatim in the text.
///
/// Windows are taken over the raw query, so the comparison is case
/// sensitive. Queries shorter than one window score 0.
pub fn phrase_overlap(query: &str, text: &str) -> f32 {
    let chars: Vec<char> = query.chars().collect();
    if chars.len() < PHRASE_WINDOW {
        return 0.0;
    }

    let windows: Vec<String> = chars
        .windows(PHRASE_WINDOW)
        .map(|w| w.iter().collect())
        .collect();
    let found = windows.iter().filter(|w| text.contains(w.as_str())).count();

    found as f32 / windows.len() as f32
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::OnceLock;

    fn tokenizer() -> &'static Tokenizer {
        static TOKENIZER: OnceLock<Tokenizer> = OnceLock::new();
        TOKENIZER.get_or_init(Tokenizer::new)
    }

    #[test]
    fn test_full_match_scores_maximum() {
        let score = exact_match_score(
            tokenizer(),
            "rust borrow checker",
            "the rust borrow checker enforces ownership",
        );
        assert!((score - 2.4).abs() < 1e-5);
    }

    #[test]
    fn test_verbatim_is_case_insensitive() {
        let lower = exact_match_score(tokenizer(), "borrow checker", "the borrow checker");
        let mixed = exact_match_score(tokenizer(), "Borrow Checker", "the borrow checker");
        assert!(lower > mixed);
        assert!(mixed >= 1.0);
    }

    #[test]
    fn test_no_overlap_is_zero() {
        let score = exact_match_score(tokenizer(), "quantum", "ownership and lifetimes");
        assert_eq!(score, 0.0);
    }

    #[test]
    fn test_empty_inputs() {
        assert_eq!(exact_match_score(tokenizer(), "", "anything"), 0.0);
        assert_eq!(exact_match_score(tokenizer(), "   ", "anything"), 0.0);
        assert_eq!(exact_match_score(tokenizer(), "query", ""), 0.0);
    }

    #[test]
    fn test_phrase_overlap() {
        assert_eq!(phrase_overlap("abc", "abcdef"), 0.0);
        assert_eq!(phrase_overlap("abcd", "xxabcdxx"), 1.0);
        assert!((phrase_overlap("abcde", "abcd") - 0.5).abs() < 1e-6);
        assert_eq!(phrase_overlap("自然语言处理", "自然语言处理是分支"), 1.0);
    }

    #[test]
    fn test_token_overlap_partial() {
        let ratio = token_overlap(tokenizer(), "ownership lifetimes", "ownership rules");
        assert!((ratio - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_score_is_bounded() {
        let score = exact_match_score(
            tokenizer(),
            "自然语言处理",
            "自然语言处理是人工智能的一个重要分支",
        );
        assert!(score >= 1.6);
        assert!(score <= 2.4 + 1e-5);
    }
}
