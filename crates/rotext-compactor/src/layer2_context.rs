//! Layer 2: Context model: learns trigram statistics, tokens pass through.

use rotext_core::{CompressError, ProcessingState, Result, Stage};
use std::sync::Arc;
use tracing::debug;

use crate::ngram::ContextModel;

pub const KEY: &str = "context";

pub struct ContextLayer {
    order: usize,
    alpha: u32,
}

impl ContextLayer {
    pub fn new(order: usize, alpha: u32) -> Self {
        Self { order, alpha }
    }
}

impl Stage for ContextLayer {
    fn name(&self) -> &str {
        KEY
    }

    fn apply(&self, mut state: ProcessingState) -> Result<ProcessingState> {
        let model = ContextModel::train(&state.tokens, self.order, self.alpha)?;
        debug!(
            contexts = model.context_count(),
            vocabulary = model.vocabulary_size(),
            "context model trained"
        );
        state.record(KEY, &model)?;
        state.share(Arc::new(model));
        Ok(state)
    }

    /// Rebuild the model from the decoded tokens; it must equal the stored
    /// one or the two sides did not see the same sequence.
    fn invert(&self, state: ProcessingState) -> Result<ProcessingState> {
        if state.lossy {
            return Ok(state);
        }
        let stored: ContextModel = state.metadata.require(KEY)?;
        let rebuilt = ContextModel::train(&state.tokens, stored.order(), stored.alpha())?;
        if rebuilt != stored {
            return Err(CompressError::mismatch(
                state.tokens.len(),
                "context model rebuilt from decoded tokens differs from the stored one",
            ));
        }
        Ok(state)
    }
}
