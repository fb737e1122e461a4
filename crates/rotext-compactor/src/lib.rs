//! Rotext Compactor: lossless statistical compression for Romanian text.
//!
//! Layers:
//! 1. Subword: BPE expansion of every token
//! 2. Context: smoothed trigram model over the subwords (tokens unchanged)
//! 3. Entropy: arithmetic coding driven by the model's probabilities, or
//!    an order-0 Huffman / Shannon-Fano prefix code
//!
//! Decompression runs each layer's inverse in reverse order.

pub mod arith;
pub mod bpe;
pub mod cache;
pub mod frequency;
pub mod layer1_subword;
pub mod layer2_context;
pub mod layer3_entropy;
pub mod ngram;
pub mod pipeline;
pub mod prefix;
pub mod stats;

pub use bpe::{MergeOp, SubwordVocabulary};
pub use cache::VocabularyCache;
pub use ngram::ContextModel;
pub use pipeline::{CompactorPipeline, CompressedArtifact, CompressionResult, PipelineBuilder};
pub use prefix::PrefixCode;
pub use stats::{compare_order0_coders, CoderReport, CompressionStats};
