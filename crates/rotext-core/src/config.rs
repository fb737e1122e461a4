use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::debug;

use crate::error::{CompressError, Result};

/// Default number of merge operations learned by the subword trainer.
pub const DEFAULT_MERGE_BUDGET: usize = 5000;
/// Default n-gram order (trigram).
pub const DEFAULT_ORDER: usize = 3;
/// Default Laplace smoothing constant.
pub const DEFAULT_ALPHA: u32 = 1;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CompressorConfig {
    #[serde(default)]
    pub subword: SubwordConfig,
    #[serde(default)]
    pub context: ContextConfig,
    #[serde(default)]
    pub coder: CoderConfig,
    #[serde(default)]
    pub lossy: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SubwordConfig {
    pub merge_budget: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ContextConfig {
    pub order: usize,
    pub alpha: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CoderConfig {
    pub source: ProbabilitySource,
}

/// Where the entropy coder takes its symbol frequencies from.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ProbabilitySource {
    /// Per-context tables from the n-gram model.
    #[default]
    Contextual,
    /// Order-0 token frequencies over the whole sequence.
    Static,
    /// Every symbol equally likely.
    Uniform,
    /// Order-0 Huffman prefix code instead of the arithmetic coder.
    Huffman,
    /// Order-0 Shannon-Fano prefix code.
    ShannonFano,
}

impl Default for SubwordConfig {
    fn default() -> Self {
        Self { merge_budget: DEFAULT_MERGE_BUDGET }
    }
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self { order: DEFAULT_ORDER, alpha: DEFAULT_ALPHA }
    }
}

impl Default for CoderConfig {
    fn default() -> Self {
        Self { source: ProbabilitySource::Contextual }
    }
}

impl Default for CompressorConfig {
    fn default() -> Self {
        Self {
            subword: SubwordConfig::default(),
            context: ContextConfig::default(),
            coder: CoderConfig::default(),
            lossy: false,
        }
    }
}

impl CompressorConfig {
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)?;
        let config = Self::from_json_str(&raw)?;
        debug!(path = %path.display(), source = ?config.coder.source, "loaded compressor config");
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.context.order < 1 {
            return Err(CompressError::invalid("context order must be at least 1"));
        }
        if self.context.alpha < 1 {
            return Err(CompressError::invalid("smoothing constant must be at least 1"));
        }
        Ok(())
    }
}
