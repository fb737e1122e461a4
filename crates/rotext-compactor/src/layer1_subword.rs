//! Layer 1: Subword expansion: every token becomes its BPE subwords.

use rotext_core::{CompressError, ProcessingState, Result, Stage};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::bpe::{detokenize, SubwordVocabulary, END_OF_WORD};

pub const KEY: &str = "subword";

/// What the inverse needs: how many tokens to expect, and which vocabulary
/// produced the subwords.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubwordRecord {
    pub token_count: usize,
    pub merge_count: usize,
    pub fingerprint: u64,
}

pub struct SubwordLayer {
    vocabulary: Arc<SubwordVocabulary>,
}

impl SubwordLayer {
    pub fn new(vocabulary: Arc<SubwordVocabulary>) -> Self {
        Self { vocabulary }
    }

    pub fn vocabulary(&self) -> &SubwordVocabulary {
        &self.vocabulary
    }
}

impl Stage for SubwordLayer {
    fn name(&self) -> &str {
        KEY
    }

    fn apply(&self, mut state: ProcessingState) -> Result<ProcessingState> {
        if let Some(bad) = state.tokens.iter().find(|t| t.contains(END_OF_WORD)) {
            return Err(CompressError::invalid(format!(
                "token contains the end-of-word marker: {bad:?}"
            )));
        }
        state.record(
            KEY,
            &SubwordRecord {
                token_count: state.tokens.len(),
                merge_count: self.vocabulary.len(),
                fingerprint: self.vocabulary.fingerprint(),
            },
        )?;

        let subwords: Vec<String> = state
            .tokens
            .iter()
            .flat_map(|t| self.vocabulary.tokenize_word(t))
            .collect();
        debug!(tokens = state.tokens.len(), subwords = subwords.len(), "subword expansion");
        state.tokens = subwords;
        Ok(state)
    }

    fn invert(&self, mut state: ProcessingState) -> Result<ProcessingState> {
        if state.lossy {
            return Ok(state);
        }
        let record: SubwordRecord = state.metadata.require(KEY)?;
        if record.fingerprint != self.vocabulary.fingerprint() {
            warn!(
                stored = record.fingerprint,
                current = self.vocabulary.fingerprint(),
                "subword vocabulary differs from the one used to compress"
            );
        }
        let tokens = detokenize(&state.tokens);
        if tokens.len() != record.token_count {
            return Err(CompressError::mismatch(
                tokens.len().min(record.token_count),
                format!("expected {} tokens after joining subwords, got {}", record.token_count, tokens.len()),
            ));
        }
        state.tokens = tokens;
        Ok(state)
    }
}
