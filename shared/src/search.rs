//! The skill-search tokenizer and match policy shared by the Spoke's local
//! catalog and the Hub's cross-device aggregate search.
//!
//! Tokenization splits on Unicode word boundaries *and* camelCase boundaries
//! (`HassTurnOn` -> `{hass, turn, on}`), then strips a short stop-word list
//! that never removes action verbs, so "turn on" still matches `TurnOn`
//! methods but a bare "on" does not swallow every result containing the
//! word "information".

use once_cell::sync::Lazy;
use std::collections::HashSet;

/// Articles and pronouns only, deliberately short, and deliberately never
/// includes a verb, since verbs carry the user's intent ("turn", "get",
/// "set", "describe", ...).
static STOP_WORDS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "a", "an", "the", "it", "its", "this", "that", "these", "those", "i", "me", "my", "you",
        "your", "he", "him", "his", "she", "her", "they", "them", "their", "of", "to", "for",
        "and", "or",
    ]
    .into_iter()
    .collect()
});

/// Splits `camelCase`/`PascalCase` identifiers at lower->upper and
/// upper-run->upper-lower boundaries, e.g. `HassTurnOn` -> `["Hass",
/// "Turn", "On"]`, `HTTPServer` -> `["HTTP", "Server"]`.
fn split_camel_case(word: &str) -> Vec<String> {
    let chars: Vec<char> = word.chars().collect();
    if chars.is_empty() {
        return Vec::new();
    }

    let mut parts = Vec::new();
    let mut current = String::new();
    for (i, &c) in chars.iter().enumerate() {
        let boundary = i > 0
            && ((chars[i - 1].is_lowercase() && c.is_uppercase())
                || (c.is_uppercase()
                    && i + 1 < chars.len()
                    && chars[i + 1].is_lowercase()
                    && chars[i - 1].is_uppercase()));
        if boundary && !current.is_empty() {
            parts.push(std::mem::take(&mut current));
        }
        current.push(c);
    }
    if !current.is_empty() {
        parts.push(current);
    }
    parts
}

/// Tokenizes free text (a method name, class name, signature, docstring, or
/// summary) into lowercase words, splitting on Unicode word boundaries and
/// camelCase boundaries.
pub fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|s| !s.is_empty())
        .flat_map(split_camel_case)
        .map(|s| s.to_lowercase())
        .filter(|s| !s.is_empty())
        .collect()
}

/// Tokenizes a user query the same way, then strips stop words.
pub fn tokenize_query(query: &str) -> Vec<String> {
    tokenize(query)
        .into_iter()
        .filter(|w| !STOP_WORDS.contains(w.as_str()))
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchMode {
    /// Every query word must appear among the candidate's tokens.
    All,
    /// At least one query word must appear.
    Any,
}

/// Whether `candidate_text`'s tokens satisfy `query_words` under `mode`.
pub fn matches(candidate_text: &str, query_words: &[String], mode: MatchMode) -> bool {
    if query_words.is_empty() {
        return true;
    }
    let candidate_tokens: HashSet<String> = tokenize(candidate_text).into_iter().collect();
    match mode {
        MatchMode::All => query_words.iter().all(|w| candidate_tokens.contains(w)),
        MatchMode::Any => query_words.iter().any(|w| candidate_tokens.contains(w)),
    }
}

/// Filters `items` by `query` against `searchable(&item)`, trying
/// all-words-must-match first and falling back to any-word-matches only if
/// that yields nothing. An empty query matches everything.
pub fn filter_all_then_any<'a, T>(
    items: &'a [T],
    query: &str,
    searchable: impl Fn(&T) -> String,
) -> Vec<&'a T> {
    let query_words = tokenize_query(query);
    if query_words.is_empty() {
        return items.iter().collect();
    }

    let all_matches: Vec<&T> = items
        .iter()
        .filter(|item| matches(&searchable(item), &query_words, MatchMode::All))
        .collect();
    if !all_matches.is_empty() {
        return all_matches;
    }
    items
        .iter()
        .filter(|item| matches(&searchable(item), &query_words, MatchMode::Any))
        .collect()
}
