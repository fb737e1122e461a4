//! Layer 3: Entropy coding: tokens in, bitstream out.
//!
//! The arithmetic coder serves the uniform, static and contextual sources;
//! the Huffman and Shannon-Fano sources use an order-0 prefix code built
//! from the same per-symbol counts as the static source.

use rotext_core::{CompressError, ProbabilitySource, ProcessingState, Result, Stage, Token};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::debug;

use crate::arith;
use crate::frequency::{ContextualModel, FrequencyModel, StaticModel, UniformModel};
use crate::layer2_context;
use crate::ngram::ContextModel;
use crate::prefix::PrefixCode;
use crate::stats::{ideal_code_length, EntropySummary};

pub const KEY: &str = "entropy";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntropyRecord {
    pub token_count: usize,
    pub source: ProbabilitySource,
    /// Sorted distinct tokens; the contextual source takes its alphabet
    /// from the context model instead.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub alphabet: Vec<Token>,
    /// Per-symbol counts for the static and prefix-code sources.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub frequencies: Vec<u64>,
}

pub struct EntropyLayer {
    source: ProbabilitySource,
    context_key: String,
}

impl EntropyLayer {
    pub fn new(source: ProbabilitySource) -> Self {
        Self { source, context_key: layer2_context::KEY.to_string() }
    }

    /// Read the contextual model from a different metadata key.
    pub fn with_context_key(mut self, key: impl Into<String>) -> Self {
        self.context_key = key.into();
        self
    }

    pub fn source(&self) -> ProbabilitySource {
        self.source
    }

    fn context_model(&self, state: &ProcessingState) -> Result<Arc<ContextModel>> {
        if let Some(model) = state.shared::<ContextModel>() {
            return Ok(model);
        }
        match state.metadata.get::<ContextModel>(&self.context_key)? {
            Some(model) => Ok(Arc::new(model)),
            None => Err(CompressError::ModelNotFound(format!(
                "context model under '{}'; the context stage must run before the entropy stage",
                self.context_key
            ))),
        }
    }
}

impl Stage for EntropyLayer {
    fn name(&self) -> &str {
        KEY
    }

    fn apply(&self, mut state: ProcessingState) -> Result<ProcessingState> {
        let tokens = std::mem::take(&mut state.tokens);
        let mut record = EntropyRecord {
            token_count: tokens.len(),
            source: self.source,
            alphabet: Vec::new(),
            frequencies: Vec::new(),
        };

        let (payload, summary) = if tokens.is_empty() {
            (Vec::new(), EntropySummary::default())
        } else {
            match self.source {
                ProbabilitySource::Contextual => {
                    let model = self.context_model(&state)?;
                    let symbols = contextual_symbols(&model, &tokens)?;
                    let mut coder_model = ContextualModel::new(&model);
                    encode_with(&symbols, &mut coder_model, model.vocabulary_size())?
                }
                ProbabilitySource::Static => {
                    let (alphabet, counts) = alphabet_with_counts(&tokens);
                    let symbols = indexed_symbols(&alphabet, &tokens);
                    let mut coder_model = StaticModel::new(&counts)?;
                    let encoded = encode_with(&symbols, &mut coder_model, alphabet.len())?;
                    record.alphabet = alphabet;
                    record.frequencies = counts;
                    encoded
                }
                ProbabilitySource::Uniform => {
                    let (alphabet, _) = alphabet_with_counts(&tokens);
                    let symbols = indexed_symbols(&alphabet, &tokens);
                    let mut coder_model = UniformModel::new(alphabet.len())?;
                    let encoded = encode_with(&symbols, &mut coder_model, alphabet.len())?;
                    record.alphabet = alphabet;
                    encoded
                }
                ProbabilitySource::Huffman | ProbabilitySource::ShannonFano => {
                    let (alphabet, counts) = alphabet_with_counts(&tokens);
                    let symbols = indexed_symbols(&alphabet, &tokens);
                    let code = prefix_code(self.source, &counts)?;
                    let payload = code.encode(&symbols)?;
                    let summary = EntropySummary {
                        symbols: symbols.len(),
                        alphabet_size: alphabet.len(),
                        payload_bits: payload.len() * 8,
                        ideal_bits: ideal_code_length(&symbols, &mut StaticModel::new(&counts)?)?,
                    };
                    record.alphabet = alphabet;
                    record.frequencies = counts;
                    (payload, summary)
                }
            }
        };

        debug!(
            symbols = summary.symbols,
            bytes = payload.len(),
            source = ?self.source,
            "entropy coded"
        );
        state.record(KEY, &record)?;
        state.share(Arc::new(summary));
        state.payload = Some(payload);
        Ok(state)
    }

    fn invert(&self, mut state: ProcessingState) -> Result<ProcessingState> {
        if state.lossy {
            return Ok(state);
        }
        let record: EntropyRecord = state.metadata.require(KEY)?;
        let payload = state
            .payload
            .take()
            .ok_or_else(|| CompressError::invalid("no encoded payload to decode"))?;
        if record.token_count == 0 {
            state.tokens = Vec::new();
            return Ok(state);
        }

        state.tokens = match record.source {
            ProbabilitySource::Contextual => {
                let model = self.context_model(&state)?;
                let mut coder_model = ContextualModel::new(&model);
                let symbols = arith::decode(&payload, record.token_count, &mut coder_model)?;
                symbols
                    .iter()
                    .enumerate()
                    .map(|(i, &s)| {
                        model
                            .symbol(s as usize)
                            .map(|t| t.into_owned())
                            .ok_or_else(|| CompressError::mismatch(i, "decoded the end-of-sequence symbol"))
                    })
                    .collect::<Result<Vec<_>>>()?
            }
            ProbabilitySource::Static => {
                if record.alphabet.len() != record.frequencies.len() {
                    return Err(CompressError::invalid("static alphabet and frequencies differ in length"));
                }
                let mut coder_model = StaticModel::new(&record.frequencies)?;
                let symbols = arith::decode(&payload, record.token_count, &mut coder_model)?;
                lookup(&record.alphabet, &symbols)?
            }
            ProbabilitySource::Uniform => {
                let mut coder_model = UniformModel::new(record.alphabet.len())?;
                let symbols = arith::decode(&payload, record.token_count, &mut coder_model)?;
                lookup(&record.alphabet, &symbols)?
            }
            ProbabilitySource::Huffman | ProbabilitySource::ShannonFano => {
                if record.alphabet.len() != record.frequencies.len() {
                    return Err(CompressError::invalid("prefix-code alphabet and frequencies differ in length"));
                }
                let code = prefix_code(record.source, &record.frequencies)?;
                let symbols = code.decode(&payload, record.token_count)?;
                lookup(&record.alphabet, &symbols)?
            }
        };
        Ok(state)
    }
}

fn encode_with<M: FrequencyModel>(
    symbols: &[u32],
    model: &mut M,
    alphabet_size: usize,
) -> Result<(Vec<u8>, EntropySummary)> {
    let payload = arith::encode(symbols, model)?;
    let ideal_bits = ideal_code_length(symbols, model)?;
    let summary = EntropySummary {
        symbols: symbols.len(),
        alphabet_size,
        payload_bits: payload.len() * 8,
        ideal_bits,
    };
    Ok((payload, summary))
}

fn prefix_code(source: ProbabilitySource, counts: &[u64]) -> Result<PrefixCode> {
    match source {
        ProbabilitySource::ShannonFano => PrefixCode::shannon_fano(counts),
        _ => PrefixCode::huffman(counts),
    }
}

fn contextual_symbols(model: &ContextModel, tokens: &[Token]) -> Result<Vec<u32>> {
    tokens
        .iter()
        .enumerate()
        .map(|(i, t)| {
            model
                .symbol_index(t)
                .map(|s| s as u32)
                .ok_or_else(|| CompressError::mismatch(i, format!("token {t:?} missing from the context model")))
        })
        .collect()
}

/// Sorted distinct tokens and how often each occurs.
pub(crate) fn alphabet_with_counts(tokens: &[Token]) -> (Vec<Token>, Vec<u64>) {
    let mut counts: BTreeMap<&str, u64> = BTreeMap::new();
    for t in tokens {
        *counts.entry(t.as_str()).or_insert(0) += 1;
    }
    let alphabet = counts.keys().map(|t| t.to_string()).collect();
    let freqs = counts.values().copied().collect();
    (alphabet, freqs)
}

pub(crate) fn indexed_symbols(alphabet: &[Token], tokens: &[Token]) -> Vec<u32> {
    let index: HashMap<&str, u32> = alphabet
        .iter()
        .enumerate()
        .map(|(i, t)| (t.as_str(), i as u32))
        .collect();
    tokens.iter().map(|t| index[t.as_str()]).collect()
}

fn lookup(alphabet: &[Token], symbols: &[u32]) -> Result<Vec<Token>> {
    symbols
        .iter()
        .enumerate()
        .map(|(i, &s)| {
            alphabet
                .get(s as usize)
                .cloned()
                .ok_or_else(|| CompressError::mismatch(i, format!("symbol {s} outside the stored alphabet")))
        })
        .collect()
}
