//! Cumulative frequency tables and the models that hand them to the coder.

use rotext_core::{CompressError, Result};
use std::collections::HashMap;
use std::sync::Arc;

use crate::ngram::ContextModel;

/// Largest table total the 32-bit coder accepts. Keeping `total` at or
/// below a quarter of the coding range guarantees every symbol with a
/// nonzero frequency a nonempty sub-interval.
pub const MAX_TOTAL: u64 = 1 << 30;

/// Half-open, contiguous symbol intervals covering `[0, total)`.
///
/// A dense table stores every cumulative value. A sparse table stores a
/// shared base frequency plus the symbols that differ from it, so a context
/// that saw a handful of targets costs memory for that handful only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrequencyTable {
    repr: Repr,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Repr {
    /// `cumulative[s]..cumulative[s + 1]` is the interval of symbol `s`.
    Dense { cumulative: Vec<u64> },
    Sparse {
        symbols: usize,
        base: u64,
        /// Sorted by symbol, and therefore by start.
        entries: Vec<SparseEntry>,
        total: u64,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct SparseEntry {
    symbol: usize,
    freq: u64,
    start: u64,
}

impl FrequencyTable {
    pub fn from_frequencies(freqs: &[u64]) -> Result<Self> {
        if freqs.is_empty() {
            return Err(CompressError::invalid("frequency table needs at least one symbol"));
        }
        let mut cumulative = Vec::with_capacity(freqs.len() + 1);
        let mut acc = 0u64;
        cumulative.push(0);
        for &f in freqs {
            acc = acc
                .checked_add(f)
                .ok_or_else(|| CompressError::invalid("frequency total overflows"))?;
            cumulative.push(acc);
        }
        check_total(acc as u128)?;
        Ok(Self { repr: Repr::Dense { cumulative } })
    }

    /// Like [`from_frequencies`](Self::from_frequencies), scaling the
    /// frequencies down when their total exceeds [`MAX_TOTAL`]. Nonzero
    /// entries stay nonzero.
    pub fn fit(freqs: &[u64]) -> Result<Self> {
        let total: u128 = freqs.iter().map(|&f| f as u128).sum();
        if total <= MAX_TOTAL as u128 {
            return Self::from_frequencies(freqs);
        }
        let scale = scaler(freqs.len(), total)?;
        let scaled: Vec<u64> = freqs.iter().map(|&f| scale(f)).collect();
        Self::from_frequencies(&scaled)
    }

    /// `symbols` symbols of frequency `base`, except those listed in
    /// `exceptions` as `(symbol, frequency)` pairs with strictly increasing
    /// symbols. Scales like [`fit`](Self::fit); the result has the same
    /// intervals as the equivalent dense table.
    pub fn sparse(symbols: usize, base: u64, exceptions: &[(usize, u64)]) -> Result<Self> {
        if symbols == 0 {
            return Err(CompressError::invalid("frequency table needs at least one symbol"));
        }
        let ordered = exceptions.windows(2).all(|w| w[0].0 < w[1].0);
        if !ordered || exceptions.last().is_some_and(|&(s, _)| s >= symbols) {
            return Err(CompressError::invalid(
                "sparse entries must be distinct, sorted and inside the alphabet",
            ));
        }
        let listed: u128 = exceptions.iter().map(|&(_, f)| f as u128).sum();
        let total = base as u128 * (symbols - exceptions.len()) as u128 + listed;

        let (base, freqs): (u64, Vec<u64>) = if total <= MAX_TOTAL as u128 {
            (base, exceptions.iter().map(|&(_, f)| f).collect())
        } else {
            let scale = scaler(symbols, total)?;
            (scale(base), exceptions.iter().map(|&(_, f)| scale(f)).collect())
        };

        let mut entries = Vec::with_capacity(exceptions.len());
        let mut next = 0usize;
        let mut acc = 0u64;
        for (&(symbol, _), freq) in exceptions.iter().zip(freqs) {
            acc += base * (symbol - next) as u64;
            entries.push(SparseEntry { symbol, freq, start: acc });
            acc += freq;
            next = symbol + 1;
        }
        acc += base * (symbols - next) as u64;
        check_total(acc as u128)?;
        Ok(Self { repr: Repr::Sparse { symbols, base, entries, total: acc } })
    }

    pub fn uniform(symbols: usize) -> Result<Self> {
        Self::sparse(symbols, 1, &[])
    }

    /// Number of symbols.
    pub fn len(&self) -> usize {
        match &self.repr {
            Repr::Dense { cumulative } => cumulative.len() - 1,
            Repr::Sparse { symbols, .. } => *symbols,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn total(&self) -> u64 {
        match &self.repr {
            Repr::Dense { cumulative } => cumulative[cumulative.len() - 1],
            Repr::Sparse { total, .. } => *total,
        }
    }

    /// Every cumulative value, `len() + 1` of them. Materializes sparse
    /// tables.
    pub fn cumulative(&self) -> Vec<u64> {
        match &self.repr {
            Repr::Dense { cumulative } => cumulative.clone(),
            Repr::Sparse { symbols, .. } => (0..=*symbols).map(|s| self.start(s)).collect(),
        }
    }

    /// `[low, high)` of `symbol`, or `None` when out of range.
    pub fn interval(&self, symbol: usize) -> Option<(u64, u64)> {
        if symbol >= self.len() {
            return None;
        }
        Some((self.start(symbol), self.start(symbol + 1)))
    }

    pub fn frequency(&self, symbol: usize) -> u64 {
        self.interval(symbol).map(|(lo, hi)| hi - lo).unwrap_or(0)
    }

    /// Symbol whose interval contains `scaled`.
    pub fn find(&self, scaled: u64) -> Option<usize> {
        if scaled >= self.total() {
            return None;
        }
        match &self.repr {
            Repr::Dense { cumulative } => Some(cumulative.partition_point(|&c| c <= scaled) - 1),
            Repr::Sparse { base, entries, .. } => {
                let k = entries.partition_point(|e| e.start <= scaled);
                let (from_symbol, from) = match k.checked_sub(1).map(|j| &entries[j]) {
                    Some(e) if scaled < e.start + e.freq => return Some(e.symbol),
                    Some(e) => (e.symbol + 1, e.start + e.freq),
                    None => (0, 0),
                };
                if *base == 0 {
                    return None;
                }
                Some(from_symbol + ((scaled - from) / base) as usize)
            }
        }
    }

    /// Cumulative value before `symbol`; `total()` for `symbol == len()`.
    fn start(&self, symbol: usize) -> u64 {
        match &self.repr {
            Repr::Dense { cumulative } => cumulative[symbol],
            Repr::Sparse { base, entries, .. } => {
                let k = entries.partition_point(|e| e.symbol < symbol);
                match k.checked_sub(1).map(|j| &entries[j]) {
                    Some(e) => e.start + e.freq + base * (symbol - e.symbol - 1) as u64,
                    None => base * symbol as u64,
                }
            }
        }
    }
}

fn check_total(total: u128) -> Result<()> {
    if total == 0 {
        return Err(CompressError::invalid("frequency table total is zero"));
    }
    if total > MAX_TOTAL as u128 {
        return Err(CompressError::invalid(format!(
            "frequency total {total} exceeds coder limit {MAX_TOTAL}"
        )));
    }
    Ok(())
}

/// Maps frequencies of an oversized table onto `MAX_TOTAL - symbols`,
/// keeping nonzero values nonzero.
fn scaler(symbols: usize, total: u128) -> Result<impl Fn(u64) -> u64> {
    let n = symbols as u128;
    if n >= MAX_TOTAL as u128 {
        return Err(CompressError::invalid("alphabet too large for the coder"));
    }
    let target = MAX_TOTAL as u128 - n;
    Ok(move |f: u64| match f {
        0 => 0,
        f => ((f as u128 * target / total) as u64).max(1),
    })
}

/// Supplies the table the next symbol is coded with. Encoder and decoder
/// must see the same tables for the same history.
pub trait FrequencyModel {
    /// `history` holds every symbol coded so far.
    fn table(&mut self, history: &[u32]) -> Result<Arc<FrequencyTable>>;
}

/// Every symbol equally likely.
#[derive(Debug, Clone)]
pub struct UniformModel {
    table: Arc<FrequencyTable>,
}

impl UniformModel {
    pub fn new(symbols: usize) -> Result<Self> {
        Ok(Self { table: Arc::new(FrequencyTable::uniform(symbols)?) })
    }
}

impl FrequencyModel for UniformModel {
    fn table(&mut self, _history: &[u32]) -> Result<Arc<FrequencyTable>> {
        Ok(Arc::clone(&self.table))
    }
}

/// Order-0 table: one fixed frequency per symbol.
#[derive(Debug, Clone)]
pub struct StaticModel {
    table: Arc<FrequencyTable>,
}

impl StaticModel {
    pub fn new(freqs: &[u64]) -> Result<Self> {
        Ok(Self { table: Arc::new(FrequencyTable::fit(freqs)?) })
    }
}

impl FrequencyModel for StaticModel {
    fn table(&mut self, _history: &[u32]) -> Result<Arc<FrequencyTable>> {
        Ok(Arc::clone(&self.table))
    }
}

/// Per-context tables from a [`ContextModel`], built on first use. The
/// tables are sparse, so the cache grows with the observed n-grams rather
/// than with contexts times vocabulary.
/// Symbol indices follow [`ContextModel::symbols`].
pub struct ContextualModel<'a> {
    model: &'a ContextModel,
    cache: HashMap<String, Arc<FrequencyTable>>,
}

impl<'a> ContextualModel<'a> {
    pub fn new(model: &'a ContextModel) -> Self {
        Self { model, cache: HashMap::new() }
    }
}

impl FrequencyModel for ContextualModel<'_> {
    fn table(&mut self, history: &[u32]) -> Result<Arc<FrequencyTable>> {
        let context = self.model.context_of_symbols(history)?;
        if let Some(table) = self.cache.get(&context) {
            return Ok(Arc::clone(table));
        }
        let table = Arc::new(self.model.distribution(&context)?);
        self.cache.insert(context, Arc::clone(&table));
        Ok(table)
    }
}
