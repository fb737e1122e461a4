//! Order-0 prefix codes: Huffman and Shannon-Fano.
//!
//! Both build a binary code tree from per-symbol counts. The tree is rebuilt
//! on decode from the same counts, so only the counts travel in metadata.
//! Construction is deterministic: ties are broken by symbol index.

use rotext_core::{CompressError, Result};
use std::cmp::Reverse;
use std::collections::BinaryHeap;

use crate::arith::{BitReader, BitWriter};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Node {
    Leaf(usize),
    Branch(usize, usize),
}

/// A complete prefix code over symbols `0..len()`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrefixCode {
    nodes: Vec<Node>,
    root: usize,
    codes: Vec<Vec<bool>>,
}

impl PrefixCode {
    /// Optimal code: repeatedly join the two lightest subtrees. Equal
    /// weights are taken in creation order, leaves first by symbol.
    pub fn huffman(freqs: &[u64]) -> Result<Self> {
        check_alphabet(freqs)?;
        let mut nodes: Vec<Node> = (0..freqs.len()).map(Node::Leaf).collect();
        let mut heap: BinaryHeap<Reverse<(u128, usize)>> = freqs
            .iter()
            .enumerate()
            .map(|(i, &f)| Reverse((f as u128, i)))
            .collect();
        while heap.len() > 1 {
            let (Some(Reverse((wa, a))), Some(Reverse((wb, b)))) = (heap.pop(), heap.pop()) else {
                break;
            };
            nodes.push(Node::Branch(a, b));
            heap.push(Reverse((wa + wb, nodes.len() - 1)));
        }
        let root = nodes.len() - 1;
        Ok(Self::from_tree(nodes, root, freqs.len()))
    }

    /// Top-down code: sort by descending count, split where the two halves'
    /// weights are closest, recurse.
    pub fn shannon_fano(freqs: &[u64]) -> Result<Self> {
        check_alphabet(freqs)?;
        let mut items: Vec<(usize, u64)> = freqs.iter().copied().enumerate().collect();
        items.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
        let mut nodes = Vec::with_capacity(2 * items.len());
        let root = split(&items, &mut nodes);
        Ok(Self::from_tree(nodes, root, freqs.len()))
    }

    fn from_tree(mut nodes: Vec<Node>, mut root: usize, symbols: usize) -> Self {
        // A lone symbol still costs one bit per occurrence.
        if let Node::Leaf(_) = nodes[root] {
            nodes.push(Node::Branch(root, root));
            root = nodes.len() - 1;
        }
        let mut codes: Vec<Option<Vec<bool>>> = vec![None; symbols];
        let mut stack = vec![(root, Vec::new())];
        while let Some((index, prefix)) = stack.pop() {
            match nodes[index] {
                Node::Leaf(symbol) => {
                    if codes[symbol].is_none() {
                        codes[symbol] = Some(prefix);
                    }
                }
                Node::Branch(left, right) => {
                    let mut one = prefix.clone();
                    one.push(true);
                    let mut zero = prefix;
                    zero.push(false);
                    stack.push((right, one));
                    stack.push((left, zero));
                }
            }
        }
        let codes = codes.into_iter().map(Option::unwrap_or_default).collect();
        Self { nodes, root, codes }
    }

    pub fn len(&self) -> usize {
        self.codes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.codes.is_empty()
    }

    pub fn code(&self, symbol: usize) -> Option<&[bool]> {
        self.codes.get(symbol).map(|c| c.as_slice())
    }

    /// Total bits needed for symbols occurring `freqs[s]` times each.
    pub fn encoded_bits(&self, freqs: &[u64]) -> u64 {
        freqs
            .iter()
            .zip(&self.codes)
            .map(|(&f, c)| f * c.len() as u64)
            .sum()
    }

    pub fn encode(&self, symbols: &[u32]) -> Result<Vec<u8>> {
        let mut out = BitWriter::new();
        for (i, &s) in symbols.iter().enumerate() {
            let code = self.code(s as usize).ok_or_else(|| {
                CompressError::mismatch(i, format!("symbol {s} outside a code of {}", self.len()))
            })?;
            for &bit in code {
                out.write_bit(bit);
            }
        }
        Ok(out.finish())
    }

    /// Decode exactly `count` symbols.
    pub fn decode(&self, bytes: &[u8], count: usize) -> Result<Vec<u32>> {
        let limit = bytes.len() * 8;
        let mut input = BitReader::new(bytes);
        let mut symbols = Vec::with_capacity(count);
        for i in 0..count {
            let mut node = self.root;
            loop {
                match self.nodes[node] {
                    Node::Leaf(symbol) => {
                        symbols.push(symbol as u32);
                        break;
                    }
                    Node::Branch(left, right) => {
                        if input.position() >= limit {
                            return Err(CompressError::mismatch(i, "prefix-coded stream ended early"));
                        }
                        node = if input.read_bit() { right } else { left };
                    }
                }
            }
        }
        Ok(symbols)
    }
}

fn check_alphabet(freqs: &[u64]) -> Result<()> {
    if freqs.is_empty() {
        return Err(CompressError::invalid("prefix code needs at least one symbol"));
    }
    Ok(())
}

/// Build the Shannon-Fano subtree for `items` and return its node index.
fn split(items: &[(usize, u64)], nodes: &mut Vec<Node>) -> usize {
    if let [(symbol, _)] = items {
        nodes.push(Node::Leaf(*symbol));
        return nodes.len() - 1;
    }
    let total: u128 = items.iter().map(|&(_, f)| f as u128).sum();
    let mut acc = 0u128;
    let mut best = 1;
    let mut best_diff = u128::MAX;
    for (i, &(_, f)) in items.iter().enumerate() {
        acc += f as u128;
        let diff = (2 * acc).abs_diff(total);
        if diff < best_diff {
            best_diff = diff;
            best = i + 1;
        }
    }
    let at = best.clamp(1, items.len() - 1);
    let left = split(&items[..at], nodes);
    let right = split(&items[at..], nodes);
    nodes.push(Node::Branch(left, right));
    nodes.len() - 1
}
