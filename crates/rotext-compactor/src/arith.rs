//! Binary arithmetic coder with 32-bit precision.
//!
//! The working interval `[low, high]` lives in `u64` so that
//! `range * cumulative` never overflows (`range <= 2^32`,
//! `total <= 2^30`). Renormalization emits settled leading bits and defers
//! straddling ones through a pending counter; the first opposite bit that
//! follows resolves them.
//!
//! The stream is not self-terminating: the decoder must be told how many
//! symbols to read.

use rotext_core::{CompressError, Result};

use crate::frequency::{FrequencyModel, FrequencyTable};

const PRECISION: u32 = 32;
const MAX: u64 = (1 << PRECISION) - 1;
const HALF: u64 = 1 << (PRECISION - 1);
const QUARTER: u64 = 1 << (PRECISION - 2);
const THREE_QUARTERS: u64 = HALF + QUARTER;

/// MSB-first bit sink.
#[derive(Debug, Default)]
pub struct BitWriter {
    bytes: Vec<u8>,
    current: u8,
    filled: u8,
}

impl BitWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn write_bit(&mut self, bit: bool) {
        self.current = (self.current << 1) | bit as u8;
        self.filled += 1;
        if self.filled == 8 {
            self.bytes.push(self.current);
            self.current = 0;
            self.filled = 0;
        }
    }

    /// Bits written so far.
    pub fn bit_len(&self) -> usize {
        self.bytes.len() * 8 + self.filled as usize
    }

    /// Pad the last byte with zero bits and return the buffer.
    pub fn finish(mut self) -> Vec<u8> {
        if self.filled > 0 {
            self.bytes.push(self.current << (8 - self.filled));
        }
        self.bytes
    }
}

/// MSB-first bit source. Reads past the end yield zeros.
#[derive(Debug)]
pub struct BitReader<'a> {
    bytes: &'a [u8],
    position: usize,
}

impl<'a> BitReader<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, position: 0 }
    }

    pub fn read_bit(&mut self) -> bool {
        let byte = self.position / 8;
        let bit = match self.bytes.get(byte) {
            Some(b) => (b >> (7 - self.position % 8)) & 1 == 1,
            None => false,
        };
        self.position += 1;
        bit
    }

    /// Bits consumed so far, including any zero padding read past the end.
    pub fn position(&self) -> usize {
        self.position
    }
}

#[derive(Debug)]
pub struct ArithmeticEncoder {
    low: u64,
    high: u64,
    pending: u64,
    out: BitWriter,
    symbols: usize,
}

impl Default for ArithmeticEncoder {
    fn default() -> Self {
        Self::new()
    }
}

impl ArithmeticEncoder {
    pub fn new() -> Self {
        Self {
            low: 0,
            high: MAX,
            pending: 0,
            out: BitWriter::new(),
            symbols: 0,
        }
    }

    /// Narrow the interval to `symbol`'s share of `table`.
    pub fn encode(&mut self, symbol: usize, table: &FrequencyTable) -> Result<()> {
        let index = self.symbols;
        let (sym_low, sym_high) = table.interval(symbol).ok_or_else(|| {
            CompressError::mismatch(index, format!("symbol {symbol} outside a table of {}", table.len()))
        })?;
        if sym_low == sym_high {
            return Err(CompressError::mismatch(index, format!("symbol {symbol} has zero frequency")));
        }
        let total = table.total();
        let range = self.high - self.low + 1;
        let new_high = (self.low + range * sym_high / total)
            .checked_sub(1)
            .ok_or(CompressError::RangeCollapse { index })?;
        let new_low = self.low + range * sym_low / total;
        if new_high < new_low {
            return Err(CompressError::RangeCollapse { index });
        }
        self.high = new_high;
        self.low = new_low;

        loop {
            if self.high < HALF {
                self.emit(false);
            } else if self.low >= HALF {
                self.emit(true);
                self.low -= HALF;
                self.high -= HALF;
            } else if self.low >= QUARTER && self.high < THREE_QUARTERS {
                self.pending += 1;
                self.low -= QUARTER;
                self.high -= QUARTER;
            } else {
                break;
            }
            self.low <<= 1;
            self.high = (self.high << 1) | 1;
        }
        self.symbols += 1;
        Ok(())
    }

    fn emit(&mut self, bit: bool) {
        self.out.write_bit(bit);
        for _ in 0..self.pending {
            self.out.write_bit(!bit);
        }
        self.pending = 0;
    }

    /// Flush two bits that pin a point inside the final interval, then pad
    /// to a whole byte.
    pub fn finish(mut self) -> Vec<u8> {
        self.pending += 1;
        let bit = self.low >= QUARTER;
        self.emit(bit);
        self.out.finish()
    }

    pub fn symbols_encoded(&self) -> usize {
        self.symbols
    }
}

#[derive(Debug)]
pub struct ArithmeticDecoder<'a> {
    low: u64,
    high: u64,
    value: u64,
    input: BitReader<'a>,
    symbols: usize,
}

impl<'a> ArithmeticDecoder<'a> {
    /// Seed `value` with the first 32 bits of `bytes`.
    pub fn new(bytes: &'a [u8]) -> Self {
        let mut input = BitReader::new(bytes);
        let mut value = 0u64;
        for _ in 0..PRECISION {
            value = (value << 1) | input.read_bit() as u64;
        }
        Self { low: 0, high: MAX, value, input, symbols: 0 }
    }

    /// Identify the next symbol under `table` and consume it.
    pub fn decode(&mut self, table: &FrequencyTable) -> Result<usize> {
        let index = self.symbols;
        if self.value < self.low || self.value > self.high {
            return Err(CompressError::mismatch(index, "code value left the coding interval"));
        }
        let total = table.total();
        let range = self.high - self.low + 1;
        let scaled = ((self.value - self.low + 1) * total - 1) / range;
        let symbol = table.find(scaled).ok_or_else(|| {
            CompressError::mismatch(index, format!("scaled value {scaled} outside total {total}"))
        })?;
        let (sym_low, sym_high) = table
            .interval(symbol)
            .ok_or_else(|| CompressError::mismatch(index, "symbol lookup failed"))?;

        let new_high = (self.low + range * sym_high / total)
            .checked_sub(1)
            .ok_or(CompressError::RangeCollapse { index })?;
        let new_low = self.low + range * sym_low / total;
        if new_high < new_low {
            return Err(CompressError::RangeCollapse { index });
        }
        self.high = new_high;
        self.low = new_low;

        loop {
            if self.high < HALF {
                // nothing to subtract
            } else if self.low >= HALF {
                self.low -= HALF;
                self.high -= HALF;
                self.value -= HALF;
            } else if self.low >= QUARTER && self.high < THREE_QUARTERS {
                self.low -= QUARTER;
                self.high -= QUARTER;
                self.value -= QUARTER;
            } else {
                break;
            }
            self.low <<= 1;
            self.high = (self.high << 1) | 1;
            self.value = (self.value << 1) | self.input.read_bit() as u64;
        }
        self.symbols += 1;
        Ok(symbol)
    }

    pub fn symbols_decoded(&self) -> usize {
        self.symbols
    }

    pub fn bits_consumed(&self) -> usize {
        self.input.position()
    }
}

/// Encode a symbol sequence, asking `model` for each symbol's table.
pub fn encode<M: FrequencyModel + ?Sized>(symbols: &[u32], model: &mut M) -> Result<Vec<u8>> {
    let mut encoder = ArithmeticEncoder::new();
    for (i, &s) in symbols.iter().enumerate() {
        let table = model.table(&symbols[..i])?;
        encoder.encode(s as usize, &table)?;
    }
    Ok(encoder.finish())
}

/// Decode exactly `count` symbols from `bytes`.
pub fn decode<M: FrequencyModel + ?Sized>(bytes: &[u8], count: usize, model: &mut M) -> Result<Vec<u32>> {
    let mut decoder = ArithmeticDecoder::new(bytes);
    let mut symbols = Vec::with_capacity(count);
    for _ in 0..count {
        let table = model.table(&symbols)?;
        let s = decoder.decode(&table)?;
        symbols.push(s as u32);
    }
    Ok(symbols)
}
