//! Text tokenizer: splits raw text into word, whitespace and punctuation runs.
//!
//! Concatenating the output always reproduces the input exactly.

use regex::Regex;
use std::collections::BTreeMap;
use std::sync::LazyLock;

use crate::types::{Token, TokenKind};

static RE_TOKEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\w+|\s+|[^\w\s]+").unwrap());

/// Split text into runs. `\w` is Unicode-aware, so ă â î ș ț stay inside words.
pub fn tokenize(text: &str) -> Vec<Token> {
    RE_TOKEN.find_iter(text).map(|m| m.as_str().to_string()).collect()
}

/// Word runs only, in order of appearance.
pub fn tokenize_words(text: &str) -> Vec<Token> {
    tokenize(text)
        .into_iter()
        .filter(|t| TokenKind::of(t) == TokenKind::Word)
        .collect()
}

/// Word multiset of a text.
pub fn word_counts(text: &str) -> BTreeMap<String, u64> {
    count(tokenize_words(text))
}

/// Multiset of every run (words, whitespace, punctuation).
pub fn token_counts(text: &str) -> BTreeMap<String, u64> {
    count(tokenize(text))
}

fn count(tokens: Vec<Token>) -> BTreeMap<String, u64> {
    let mut counts = BTreeMap::new();
    for t in tokens {
        *counts.entry(t).or_insert(0) += 1;
    }
    counts
}
