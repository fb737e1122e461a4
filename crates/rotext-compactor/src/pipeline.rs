//! Compression pipeline: orchestrates the reversible stages.

use rotext_core::{
    join_tokens, text, CompressError, CompressorConfig, MetadataRecord, ProcessingState, Result,
    Stage, Token,
};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, debug_span, warn};

use crate::bpe::SubwordVocabulary;
use crate::layer1_subword::SubwordLayer;
use crate::layer2_context::ContextLayer;
use crate::layer3_entropy::EntropyLayer;
use crate::stats::{CompressionStats, EntropySummary};

/// Everything needed to restore the input: the bitstream, the stage
/// records, and any tokens no stage turned into payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompressedArtifact {
    pub payload: Vec<u8>,
    pub metadata: MetadataRecord,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tokens: Vec<Token>,
    #[serde(default)]
    pub lossy: bool,
}

impl CompressedArtifact {
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

/// Compression result with statistics.
#[derive(Debug, Clone)]
pub struct CompressionResult {
    pub artifact: CompressedArtifact,
    pub stats: CompressionStats,
    pub layers_applied: Vec<String>,
}

impl CompressionResult {
    pub fn ratio(&self) -> f64 {
        self.stats.ratio()
    }
}

/// The main compactor pipeline: an ordered list of stages, applied in
/// order and inverted in reverse.
pub struct CompactorPipeline {
    stages: Vec<Box<dyn Stage>>,
    lossy: bool,
}

impl CompactorPipeline {
    /// The standard subword → context → entropy pipeline.
    pub fn new(config: &CompressorConfig, vocabulary: Arc<SubwordVocabulary>) -> Result<Self> {
        config.validate()?;
        Self::builder()
            .stage(SubwordLayer::new(vocabulary))
            .stage(ContextLayer::new(config.context.order, config.context.alpha))
            .stage(EntropyLayer::new(config.coder.source))
            .lossy(config.lossy)
            .build()
    }

    /// Train a vocabulary on `corpus` with the configured merge budget and
    /// build the standard pipeline around it.
    pub fn from_corpus(config: &CompressorConfig, corpus: &str) -> Result<Self> {
        let vocabulary = SubwordVocabulary::train_from_text(corpus, config.subword.merge_budget)?;
        Self::new(config, Arc::new(vocabulary))
    }

    pub fn builder() -> PipelineBuilder {
        PipelineBuilder::default()
    }

    pub fn layers(&self) -> Vec<&str> {
        self.stages.iter().map(|s| s.name()).collect()
    }

    pub fn is_lossy(&self) -> bool {
        self.lossy
    }

    /// Tokenize `text` and compress it.
    pub fn compress(&self, text: &str) -> Result<CompressionResult> {
        let tokens = text::tokenize(text);
        self.compress_tokens(tokens)
    }

    /// Compress an externally tokenized sequence.
    pub fn compress_tokens(&self, tokens: Vec<Token>) -> Result<CompressionResult> {
        if tokens.is_empty() {
            return Err(CompressError::invalid("empty token sequence"));
        }
        if let Some(i) = tokens.iter().position(|t| t.is_empty()) {
            return Err(CompressError::invalid(format!("empty token at position {i}")));
        }
        if self.lossy {
            warn!("compressing in lossy mode; the output cannot be fully restored");
        }

        let original_bytes: usize = tokens.iter().map(|t| t.len()).sum();
        let token_count = tokens.len();
        let base = CompressionStats::new(0, 0, 0, token_count).with_token_entropy(&tokens);

        let state = self.apply(ProcessingState::new(tokens).lossy(self.lossy))?;

        let summary = state.shared::<EntropySummary>();
        let artifact = CompressedArtifact {
            payload: state.payload.unwrap_or_default(),
            metadata: state.metadata,
            tokens: state.tokens,
            lossy: state.lossy,
        };
        let mut stats = CompressionStats {
            original_bytes,
            compressed_bytes: artifact.payload.len(),
            metadata_bytes: artifact.metadata.byte_len(),
            ..base
        };
        if let Some(summary) = summary {
            stats = stats.with_summary(&summary);
        }
        debug!(
            original = stats.original_bytes,
            compressed = stats.compressed_bytes,
            ratio = stats.ratio(),
            "compressed"
        );

        Ok(CompressionResult {
            artifact,
            stats,
            layers_applied: self.layers().into_iter().map(String::from).collect(),
        })
    }

    pub fn decompress(&self, artifact: &CompressedArtifact) -> Result<String> {
        Ok(join_tokens(&self.decompress_tokens(artifact)?))
    }

    pub fn decompress_tokens(&self, artifact: &CompressedArtifact) -> Result<Vec<Token>> {
        let mut state = ProcessingState::from_parts(
            artifact.payload.clone(),
            artifact.metadata.clone(),
            artifact.lossy,
        );
        state.tokens = artifact.tokens.clone();
        Ok(self.invert(state)?.tokens)
    }

    /// Run every stage forward. The first failure aborts the run.
    pub fn apply(&self, mut state: ProcessingState) -> Result<ProcessingState> {
        for stage in &self.stages {
            let span = debug_span!("stage", name = stage.name(), direction = "apply");
            let _guard = span.enter();
            state = stage.apply(state).map_err(|e| e.in_stage(stage.name()))?;
        }
        Ok(state)
    }

    /// Run every stage's inverse, last stage first.
    pub fn invert(&self, mut state: ProcessingState) -> Result<ProcessingState> {
        for stage in self.stages.iter().rev() {
            let span = debug_span!("stage", name = stage.name(), direction = "invert");
            let _guard = span.enter();
            state = stage.invert(state).map_err(|e| e.in_stage(stage.name()))?;
        }
        Ok(state)
    }
}

#[derive(Default)]
pub struct PipelineBuilder {
    stages: Vec<Box<dyn Stage>>,
    lossy: bool,
}

impl PipelineBuilder {
    pub fn stage(mut self, stage: impl Stage + 'static) -> Self {
        self.stages.push(Box::new(stage));
        self
    }

    pub fn boxed_stage(mut self, stage: Box<dyn Stage>) -> Self {
        self.stages.push(stage);
        self
    }

    pub fn lossy(mut self, lossy: bool) -> Self {
        self.lossy = lossy;
        self
    }

    /// Fails when two stages share a metadata key.
    pub fn build(self) -> Result<CompactorPipeline> {
        let mut keys = HashSet::new();
        for stage in &self.stages {
            if !keys.insert(stage.key().to_string()) {
                return Err(CompressError::invalid(format!(
                    "duplicate stage key: {}",
                    stage.key()
                )));
            }
        }
        Ok(CompactorPipeline { stages: self.stages, lossy: self.lossy })
    }
}
