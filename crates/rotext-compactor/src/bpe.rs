//! Subword vocabulary: byte-pair merge training and greedy application.
//!
//! Words are split into characters plus a trailing end-of-word marker
//! symbol. Training repeatedly merges the most frequent adjacent pair;
//! ties go to the lexicographically smallest `(left, right)` so that the
//! merge list is reproducible.

use rotext_core::{CompressError, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use tracing::debug;

/// Reserved end-of-word marker. Closes every tokenized word.
pub const END_OF_WORD: &str = "</w>";

/// One learned merge: `left + right -> merged`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeOp {
    pub left: String,
    pub right: String,
    pub merged: String,
}

impl MergeOp {
    pub fn new(left: &str, right: &str) -> Self {
        Self {
            left: left.to_string(),
            right: right.to_string(),
            merged: format!("{left}{right}"),
        }
    }
}

/// Frozen, ordered merge list plus the subword frequencies it produced on
/// its training corpus.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SubwordVocabulary {
    merges: Vec<MergeOp>,
    frequencies: BTreeMap<String, u64>,
    /// left -> right -> every rank of that pair, ascending.
    #[serde(skip)]
    ranks: HashMap<String, HashMap<String, Vec<usize>>>,
}

impl PartialEq for SubwordVocabulary {
    fn eq(&self, other: &Self) -> bool {
        self.merges == other.merges && self.frequencies == other.frequencies
    }
}

impl SubwordVocabulary {
    /// A vocabulary with no merges: every word splits into characters.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Build from an already-learned merge list.
    pub fn from_merges(merges: Vec<MergeOp>) -> Self {
        let mut vocab = Self { merges, ..Self::default() };
        vocab.rebuild_ranks();
        vocab
    }

    /// Learn up to `budget` merges from a word multiset.
    pub fn train<S: AsRef<str>>(words: &[(S, u64)], budget: usize) -> Result<Self> {
        let mut counts: BTreeMap<&str, u64> = BTreeMap::new();
        for (word, count) in words {
            let word = word.as_ref();
            if word.contains(END_OF_WORD) {
                return Err(CompressError::invalid(format!(
                    "training word contains reserved marker: {word:?}"
                )));
            }
            if word.is_empty() || *count == 0 {
                continue;
            }
            *counts.entry(word).or_insert(0) += count;
        }

        let mut corpus: Vec<(Vec<String>, u64)> = counts
            .into_iter()
            .map(|(w, c)| (split_word(w), c))
            .collect();

        let mut merges = Vec::new();
        while merges.len() < budget {
            let Some((pair, freq)) = most_frequent_pair(&corpus) else {
                debug!(merges = merges.len(), "no pairs left, stopping early");
                break;
            };
            let op = MergeOp::new(&pair.0, &pair.1);
            for (symbols, _) in corpus.iter_mut() {
                merge_in_place(symbols, &op);
            }
            if merges.len() % 500 == 0 {
                debug!(step = merges.len(), merged = %op.merged, freq, "learned merge");
            }
            merges.push(op);
        }

        let mut frequencies = BTreeMap::new();
        for (symbols, count) in &corpus {
            for s in symbols {
                *frequencies.entry(s.clone()).or_insert(0) += count;
            }
        }

        debug!(merges = merges.len(), subwords = frequencies.len(), "subword vocabulary trained");
        let mut vocab = Self { merges, frequencies, ranks: HashMap::new() };
        vocab.rebuild_ranks();
        Ok(vocab)
    }

    /// Train on every run of a raw text: words, whitespace and punctuation
    /// all pass through the subword layer.
    pub fn train_from_text(text: &str, budget: usize) -> Result<Self> {
        let counts: Vec<(String, u64)> = rotext_core::text::token_counts(text).into_iter().collect();
        Self::train(&counts, budget)
    }

    fn rebuild_ranks(&mut self) {
        self.ranks.clear();
        for (rank, op) in self.merges.iter().enumerate() {
            self.ranks
                .entry(op.left.clone())
                .or_default()
                .entry(op.right.clone())
                .or_default()
                .push(rank);
        }
    }

    /// First rank of `left + right` at or after `from`.
    fn rank_from(&self, left: &str, right: &str, from: usize) -> Option<usize> {
        let ranks = self.ranks.get(left)?.get(right)?;
        ranks.get(ranks.partition_point(|&r| r < from)).copied()
    }

    pub fn merges(&self) -> &[MergeOp] {
        &self.merges
    }

    pub fn len(&self) -> usize {
        self.merges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.merges.is_empty()
    }

    /// Subword frequencies over the training corpus after all merges.
    pub fn frequencies(&self) -> &BTreeMap<String, u64> {
        &self.frequencies
    }

    /// Split one word into subwords by applying the merges in list order.
    /// The last subword ends with [`END_OF_WORD`].
    pub fn tokenize_word(&self, word: &str) -> Vec<String> {
        let mut symbols = split_word(word);
        if self.ranks.is_empty() {
            return symbols;
        }
        // Merges between `next` and the chosen rank match nothing in the
        // word, so jumping straight to it is the same as walking the list.
        let mut next = 0;
        loop {
            let best = symbols
                .windows(2)
                .filter_map(|w| self.rank_from(&w[0], &w[1], next))
                .min();
            match best {
                Some(rank) => {
                    merge_in_place(&mut symbols, &self.merges[rank]);
                    next = rank + 1;
                }
                None => break,
            }
        }
        symbols
    }

    /// Tokenize every whitespace-separated word of `text`. Whitespace-only
    /// input yields nothing.
    pub fn tokenize_text(&self, text: &str) -> Vec<String> {
        text.split_whitespace()
            .flat_map(|w| self.tokenize_word(w))
            .collect()
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let mut vocab: Self = serde_json::from_str(json)?;
        vocab.rebuild_ranks();
        Ok(vocab)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        std::fs::write(path, self.to_json()?)?;
        Ok(())
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => {
                CompressError::ModelNotFound(format!("subword vocabulary at {}", path.display()))
            }
            _ => CompressError::Io(e),
        })?;
        Self::from_json(&raw)
    }

    /// Stable digest of the ordered merge list (FNV-1a, 64 bit).
    pub fn fingerprint(&self) -> u64 {
        const OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
        const PRIME: u64 = 0x0000_0100_0000_01b3;
        let mut hash = OFFSET;
        for op in &self.merges {
            for byte in op.left.bytes().chain([0u8]).chain(op.right.bytes()).chain([0xff]) {
                hash ^= byte as u64;
                hash = hash.wrapping_mul(PRIME);
            }
        }
        hash
    }
}

/// Concatenate subwords back into words. A marker closes the current word;
/// a trailing unterminated word is flushed as-is.
pub fn detokenize<S: AsRef<str>>(subwords: &[S]) -> Vec<String> {
    let mut words = Vec::new();
    let mut current = String::new();
    for piece in subwords {
        let piece = piece.as_ref();
        match piece.strip_suffix(END_OF_WORD) {
            Some(stem) => {
                current.push_str(stem);
                words.push(std::mem::take(&mut current));
            }
            None => current.push_str(piece),
        }
    }
    if !current.is_empty() {
        words.push(current);
    }
    words
}

fn split_word(word: &str) -> Vec<String> {
    word.chars()
        .map(String::from)
        .chain(std::iter::once(END_OF_WORD.to_string()))
        .collect()
}

/// Merge every non-overlapping occurrence of `op`, left to right,
/// re-checking the same position after each merge.
fn merge_in_place(symbols: &mut Vec<String>, op: &MergeOp) {
    let mut i = 0;
    while i + 1 < symbols.len() {
        if symbols[i] == op.left && symbols[i + 1] == op.right {
            symbols[i] = op.merged.clone();
            symbols.remove(i + 1);
        } else {
            i += 1;
        }
    }
}

fn most_frequent_pair(corpus: &[(Vec<String>, u64)]) -> Option<((String, String), u64)> {
    let mut pairs: HashMap<(&str, &str), u64> = HashMap::new();
    for (symbols, count) in corpus {
        for w in symbols.windows(2) {
            *pairs.entry((w[0].as_str(), w[1].as_str())).or_insert(0) += count;
        }
    }
    pairs
        .into_iter()
        .max_by(|(pa, fa), (pb, fb)| fa.cmp(fb).then_with(|| pb.cmp(pa)))
        .map(|((l, r), f)| ((l.to_string(), r.to_string()), f))
}
