//! Compression statistics.

use rotext_core::{ProbabilitySource, Result, Token};
use serde::{Deserialize, Serialize};

use crate::arith;
use crate::frequency::{FrequencyModel, StaticModel};
use crate::layer3_entropy::{alphabet_with_counts, indexed_symbols};
use crate::prefix::PrefixCode;

/// Left in the processing state by the entropy layer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EntropySummary {
    pub symbols: usize,
    pub alphabet_size: usize,
    pub payload_bits: usize,
    /// Sum of `-log2 p` over the coded symbols under the model used.
    pub ideal_bits: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CompressionStats {
    pub original_bytes: usize,
    pub compressed_bytes: usize,
    pub metadata_bytes: usize,
    pub token_count: usize,
    /// Symbols handed to the coder (subwords when the subword layer ran).
    pub symbol_count: usize,
    pub unique_symbols: usize,
    pub bits_per_symbol: f64,
    /// Model entropy per symbol; the floor the coder approaches.
    pub ideal_bits_per_symbol: f64,
    /// Order-0 entropy of the input tokens, bits per token.
    pub token_entropy: f64,
}

impl CompressionStats {
    pub fn new(original_bytes: usize, compressed_bytes: usize, metadata_bytes: usize, token_count: usize) -> Self {
        Self {
            original_bytes,
            compressed_bytes,
            metadata_bytes,
            token_count,
            ..Self::default()
        }
    }

    pub fn with_token_entropy(mut self, tokens: &[Token]) -> Self {
        self.token_entropy = empirical_entropy(tokens);
        self
    }

    pub fn with_summary(mut self, summary: &EntropySummary) -> Self {
        self.symbol_count = summary.symbols;
        self.unique_symbols = summary.alphabet_size;
        if summary.symbols > 0 {
            self.bits_per_symbol = summary.payload_bits as f64 / summary.symbols as f64;
            self.ideal_bits_per_symbol = summary.ideal_bits / summary.symbols as f64;
        }
        self
    }

    /// Payload size over input size; 1.0 for empty input.
    pub fn ratio(&self) -> f64 {
        if self.original_bytes == 0 {
            return 1.0;
        }
        self.compressed_bytes as f64 / self.original_bytes as f64
    }

    /// Percentage of input bytes saved by the payload alone.
    pub fn space_saved_pct(&self) -> f64 {
        if self.original_bytes == 0 {
            return 0.0;
        }
        (1.0 - self.ratio()) * 100.0
    }
}

/// Total `-log2 p` of `symbols` under `model`.
pub fn ideal_code_length<M: FrequencyModel + ?Sized>(symbols: &[u32], model: &mut M) -> Result<f64> {
    let mut bits = 0.0;
    for (i, &s) in symbols.iter().enumerate() {
        let table = model.table(&symbols[..i])?;
        let p = table.frequency(s as usize) as f64 / table.total() as f64;
        bits -= p.log2();
    }
    Ok(bits)
}

/// Shannon entropy in bits per token of the empirical token distribution.
pub fn empirical_entropy(tokens: &[Token]) -> f64 {
    if tokens.is_empty() {
        return 0.0;
    }
    let mut counts: std::collections::HashMap<&str, usize> = std::collections::HashMap::new();
    for t in tokens {
        *counts.entry(t.as_str()).or_insert(0) += 1;
    }
    let n = tokens.len() as f64;
    counts
        .values()
        .map(|&c| {
            let p = c as f64 / n;
            -p * p.log2()
        })
        .sum()
}

/// One order-0 coder's result on a token sequence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoderReport {
    pub method: ProbabilitySource,
    pub compressed_bytes: usize,
    pub bits_per_symbol: f64,
    /// Decoding the output gave back the input.
    pub roundtrip: bool,
}

/// Code `tokens` with Shannon-Fano, Huffman and static arithmetic coding,
/// all driven by the same token counts, and report each one.
pub fn compare_order0_coders(tokens: &[Token]) -> Result<Vec<CoderReport>> {
    if tokens.is_empty() {
        return Ok(Vec::new());
    }
    let (alphabet, counts) = alphabet_with_counts(tokens);
    let symbols = indexed_symbols(&alphabet, tokens);

    let mut reports = Vec::with_capacity(3);
    for method in [ProbabilitySource::ShannonFano, ProbabilitySource::Huffman] {
        let code = match method {
            ProbabilitySource::ShannonFano => PrefixCode::shannon_fano(&counts)?,
            _ => PrefixCode::huffman(&counts)?,
        };
        let bytes = code.encode(&symbols)?;
        let roundtrip = code.decode(&bytes, symbols.len())? == symbols;
        reports.push(report(method, &bytes, symbols.len(), roundtrip));
    }

    let bytes = arith::encode(&symbols, &mut StaticModel::new(&counts)?)?;
    let decoded = arith::decode(&bytes, symbols.len(), &mut StaticModel::new(&counts)?)?;
    reports.push(report(ProbabilitySource::Static, &bytes, symbols.len(), decoded == symbols));
    Ok(reports)
}

fn report(method: ProbabilitySource, bytes: &[u8], symbols: usize, roundtrip: bool) -> CoderReport {
    CoderReport {
        method,
        compressed_bytes: bytes.len(),
        bits_per_symbol: (bytes.len() * 8) as f64 / symbols as f64,
        roundtrip,
    }
}
