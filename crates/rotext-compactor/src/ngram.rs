//! Smoothed n-gram context model.
//!
//! Counts how often each token follows each `(n-1)`-token context and turns
//! the counts into Laplace-smoothed integer frequency tables for the coder.
//!
//! Any string is a valid token. Tokens are stored under a key that cannot
//! collide with the markers or the separator: a token equal to a marker,
//! containing the separator, or starting with [`ESCAPE`] gets an [`ESCAPE`]
//! prefix and has its escape and separator characters rewritten.

use rotext_core::{CompressError, Result, Token};
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::collections::{BTreeMap, BTreeSet};

use crate::frequency::FrequencyTable;

/// Padding placed before the first token.
pub const START_MARKER: &str = "<s>";
/// Padding after the last token; names the end-of-sequence symbol.
pub const END_MARKER: &str = "</s>";
/// Joins context keys into a single string. Never appears inside a key.
pub const CONTEXT_SEPARATOR: char = '\u{1F}';
/// Leads every escaped token key.
pub const ESCAPE: char = '\u{1B}';

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextModel {
    order: usize,
    alpha: u32,
    counts: BTreeMap<String, BTreeMap<String, u64>>,
    totals: BTreeMap<String, u64>,
    /// Distinct training token keys in lexicographic order, end marker excluded.
    vocabulary: Vec<String>,
}

impl ContextModel {
    /// Count every `order`-token window of the padded sequence.
    pub fn train(tokens: &[Token], order: usize, alpha: u32) -> Result<Self> {
        if order < 1 {
            return Err(CompressError::invalid("n-gram order must be at least 1"));
        }
        if alpha < 1 {
            return Err(CompressError::invalid("smoothing constant must be at least 1"));
        }

        let keys: Vec<Cow<'_, str>> = tokens.iter().map(|t| escape(t)).collect();
        let mut padded: Vec<&str> = Vec::with_capacity(keys.len() + order);
        padded.extend(std::iter::repeat(START_MARKER).take(order - 1));
        padded.extend(keys.iter().map(|k| k.as_ref()));
        padded.push(END_MARKER);

        let mut counts: BTreeMap<String, BTreeMap<String, u64>> = BTreeMap::new();
        let mut totals: BTreeMap<String, u64> = BTreeMap::new();
        for window in padded.windows(order) {
            let (context, target) = window.split_at(order - 1);
            let key = join_context(context);
            *counts
                .entry(key.clone())
                .or_default()
                .entry(target[0].to_string())
                .or_insert(0) += 1;
            *totals.entry(key).or_insert(0) += 1;
        }

        let vocabulary: Vec<String> = keys
            .iter()
            .map(|k| k.to_string())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();

        Ok(Self { order, alpha, counts, totals, vocabulary })
    }

    pub fn order(&self) -> usize {
        self.order
    }

    pub fn alpha(&self) -> u32 {
        self.alpha
    }

    /// `V`: distinct targets seen in training, end marker included.
    pub fn vocabulary_size(&self) -> usize {
        self.vocabulary.len() + 1
    }

    pub fn context_count(&self) -> usize {
        self.counts.len()
    }

    /// Index of the end-of-sequence symbol, always the last one.
    pub fn end_symbol(&self) -> usize {
        self.vocabulary.len()
    }

    /// Coder alphabet: the vocabulary in key order, then [`END_MARKER`]
    /// standing for the end-of-sequence symbol.
    pub fn symbols(&self) -> impl Iterator<Item = Cow<'_, str>> {
        self.vocabulary
            .iter()
            .map(|k| unescape(k))
            .chain(std::iter::once(Cow::Borrowed(END_MARKER)))
    }

    /// Symbol index of a training token. The end-of-sequence symbol has no
    /// token; see [`end_symbol`](Self::end_symbol).
    pub fn symbol_index(&self, token: &str) -> Option<usize> {
        let key = escape(token);
        self.vocabulary.binary_search_by(|k| k.as_str().cmp(key.as_ref())).ok()
    }

    /// Token for a vocabulary index. `None` for the end-of-sequence symbol
    /// and anything past it.
    pub fn symbol(&self, index: usize) -> Option<Cow<'_, str>> {
        self.vocabulary.get(index).map(|k| unescape(k))
    }

    /// Context key for the token following `history`: its last `n-1`
    /// tokens, left-padded with start markers.
    pub fn context_of<S: AsRef<str>>(&self, history: &[S]) -> String {
        let width = self.order - 1;
        let available = history.len().min(width);
        let keys: Vec<Cow<'_, str>> = history[history.len() - available..]
            .iter()
            .map(|s| escape(s.as_ref()))
            .collect();
        let mut context: Vec<&str> = Vec::with_capacity(width);
        context.extend(std::iter::repeat(START_MARKER).take(width - available));
        context.extend(keys.iter().map(|k| k.as_ref()));
        join_context(&context)
    }

    /// Context key for the symbol following the already coded `history`.
    pub(crate) fn context_of_symbols(&self, history: &[u32]) -> Result<String> {
        let width = self.order - 1;
        let tail = &history[history.len().saturating_sub(width)..];
        let mut context: Vec<&str> = Vec::with_capacity(width);
        context.extend(std::iter::repeat(START_MARKER).take(width - tail.len()));
        for &s in tail {
            let key = self.vocabulary.get(s as usize).ok_or_else(|| {
                CompressError::mismatch(history.len(), format!("symbol {s} outside the model vocabulary"))
            })?;
            context.push(key);
        }
        Ok(join_context(&context))
    }

    pub fn count(&self, context: &str, token: &str) -> u64 {
        self.count_key(context, &escape(token))
    }

    /// How often the sequence ended right after `context`.
    pub fn end_count(&self, context: &str) -> u64 {
        self.count_key(context, END_MARKER)
    }

    pub fn context_total(&self, context: &str) -> u64 {
        self.totals.get(context).copied().unwrap_or(0)
    }

    /// `(count(context, token) + α) / (count(context) + α·V)`.
    pub fn probability(&self, context: &str, token: &str) -> f64 {
        self.smoothed(context, self.count(context, token))
    }

    pub fn end_probability(&self, context: &str) -> f64 {
        self.smoothed(context, self.end_count(context))
    }

    /// Cumulative table for `context`, enumerating [`symbols`](Self::symbols).
    /// Only the observed targets are stored; every other symbol has
    /// frequency `α`, so an unseen context gets the uniform table. Totals
    /// above the coder limit are scaled down deterministically.
    pub fn distribution(&self, context: &str) -> Result<FrequencyTable> {
        let alpha = self.alpha as u64;
        let mut observed: Vec<(usize, u64)> = match self.counts.get(context) {
            Some(targets) => targets
                .iter()
                .filter_map(|(key, &c)| self.key_index(key).map(|i| (i, c + alpha)))
                .collect(),
            None => Vec::new(),
        };
        observed.sort_unstable_by_key(|&(i, _)| i);
        FrequencyTable::sparse(self.vocabulary_size(), alpha, &observed)
    }

    /// Average code length in bits per token (end of sequence included)
    /// when `tokens` is coded with this model.
    pub fn cross_entropy(&self, tokens: &[Token]) -> f64 {
        let mut bits = 0.0;
        for (i, token) in tokens.iter().enumerate() {
            let context = self.context_of(&tokens[..i]);
            bits -= self.probability(&context, token).log2();
        }
        bits -= self.end_probability(&self.context_of(tokens)).log2();
        bits / (tokens.len() + 1) as f64
    }

    fn count_key(&self, context: &str, key: &str) -> u64 {
        self.counts
            .get(context)
            .and_then(|m| m.get(key))
            .copied()
            .unwrap_or(0)
    }

    fn smoothed(&self, context: &str, count: u64) -> f64 {
        let alpha = self.alpha as f64;
        let denominator = self.context_total(context) as f64 + alpha * self.vocabulary_size() as f64;
        (count as f64 + alpha) / denominator
    }

    fn key_index(&self, key: &str) -> Option<usize> {
        if key == END_MARKER {
            return Some(self.end_symbol());
        }
        self.vocabulary.binary_search_by(|k| k.as_str().cmp(key)).ok()
    }
}

fn join_context(context: &[&str]) -> String {
    let mut key = String::new();
    for (i, t) in context.iter().enumerate() {
        if i > 0 {
            key.push(CONTEXT_SEPARATOR);
        }
        key.push_str(t);
    }
    key
}

fn escape(token: &str) -> Cow<'_, str> {
    let reserved = token == START_MARKER
        || token == END_MARKER
        || token.starts_with(ESCAPE)
        || token.contains(CONTEXT_SEPARATOR);
    if !reserved {
        return Cow::Borrowed(token);
    }
    let mut out = String::with_capacity(token.len() + 2);
    out.push(ESCAPE);
    for c in token.chars() {
        match c {
            ESCAPE => {
                out.push(ESCAPE);
                out.push(ESCAPE);
            }
            CONTEXT_SEPARATOR => {
                out.push(ESCAPE);
                out.push('s');
            }
            c => out.push(c),
        }
    }
    Cow::Owned(out)
}

fn unescape(key: &str) -> Cow<'_, str> {
    let Some(body) = key.strip_prefix(ESCAPE) else {
        return Cow::Borrowed(key);
    };
    let mut out = String::with_capacity(body.len());
    let mut chars = body.chars();
    while let Some(c) = chars.next() {
        if c != ESCAPE {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('s') => out.push(CONTEXT_SEPARATOR),
            Some(other) => out.push(other),
            None => {}
        }
    }
    Cow::Owned(out)
}
