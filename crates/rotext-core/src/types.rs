use serde::{Deserialize, Serialize};

/// Atomic text unit: a word, a punctuation run or a whitespace run.
pub type Token = String;

/// Coarse class of a token as produced by the text tokenizer.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum TokenKind {
    Word,
    Whitespace,
    Punctuation,
}

impl TokenKind {
    /// Classify a token by its first character. Empty tokens count as
    /// punctuation.
    pub fn of(token: &str) -> Self {
        match token.chars().next() {
            Some(c) if c.is_whitespace() => Self::Whitespace,
            Some(c) if c.is_alphanumeric() || c == '_' => Self::Word,
            _ => Self::Punctuation,
        }
    }
}

/// Concatenate tokens back into text.
pub fn join_tokens(tokens: &[Token]) -> String {
    let mut out = String::with_capacity(tokens.iter().map(|t| t.len()).sum());
    for t in tokens {
        out.push_str(t);
    }
    out
}
