//! Processing state threaded through every pipeline stage.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::any::{Any, TypeId};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use crate::error::{CompressError, Result};
use crate::types::Token;

/// Reversibility data, one opaque serialized record per stage key.
///
/// Stages own the shape of their record; the bag only stores bytes and
/// deserializes on request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetadataRecord {
    entries: BTreeMap<String, Vec<u8>>,
}

impl MetadataRecord {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serialize `record` under `key`, replacing any previous entry.
    pub fn put<T: Serialize>(&mut self, key: &str, record: &T) -> Result<()> {
        let bytes = serde_json::to_vec(record)?;
        self.entries.insert(key.to_string(), bytes);
        Ok(())
    }

    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        match self.entries.get(key) {
            Some(bytes) => Ok(Some(serde_json::from_slice(bytes)?)),
            None => Ok(None),
        }
    }

    /// Like [`get`](Self::get) but a missing entry is an error.
    pub fn require<T: DeserializeOwned>(&self, key: &str) -> Result<T> {
        self.get(key)?
            .ok_or_else(|| CompressError::MissingMetadata(key.to_string()))
    }

    pub fn raw(&self, key: &str) -> Option<&[u8]> {
        self.entries.get(key).map(|b| b.as_slice())
    }

    pub fn insert_raw(&mut self, key: &str, bytes: Vec<u8>) {
        self.entries.insert(key.to_string(), bytes);
    }

    pub fn remove(&mut self, key: &str) -> Option<Vec<u8>> {
        self.entries.remove(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(|k| k.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Total serialized size of all records.
    pub fn byte_len(&self) -> usize {
        self.entries.iter().map(|(k, v)| k.len() + v.len()).sum()
    }
}

/// Mutable state owned by one compress/decompress call.
#[derive(Debug, Default)]
pub struct ProcessingState {
    pub tokens: Vec<Token>,
    pub metadata: MetadataRecord,
    /// When set, stages skip metadata writes and their inverse is identity.
    pub lossy: bool,
    /// Encoded bitstream, present once the entropy stage has run.
    pub payload: Option<Vec<u8>>,
    shared: HashMap<TypeId, Arc<dyn Any + Send + Sync>>,
}

impl ProcessingState {
    pub fn new(tokens: Vec<Token>) -> Self {
        Self { tokens, ..Self::default() }
    }

    pub fn lossy(mut self, lossy: bool) -> Self {
        self.lossy = lossy;
        self
    }

    /// Rebuild a state for decompression from a stored payload and metadata.
    pub fn from_parts(payload: Vec<u8>, metadata: MetadataRecord, lossy: bool) -> Self {
        Self {
            payload: Some(payload),
            metadata,
            lossy,
            ..Self::default()
        }
    }

    /// Write a stage record unless the state is lossy.
    pub fn record<T: Serialize>(&mut self, key: &str, record: &T) -> Result<()> {
        if self.lossy {
            return Ok(());
        }
        self.metadata.put(key, record)
    }

    /// Hand a value to a later stage of the same run. One slot per type.
    pub fn share<T: Any + Send + Sync>(&mut self, value: Arc<T>) {
        self.shared.insert(TypeId::of::<T>(), value);
    }

    pub fn shared<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        self.shared
            .get(&TypeId::of::<T>())
            .and_then(|v| Arc::clone(v).downcast::<T>().ok())
    }

    pub fn take_shared<T: Any + Send + Sync>(&mut self) -> Option<Arc<T>> {
        self.shared
            .remove(&TypeId::of::<T>())
            .and_then(|v| v.downcast::<T>().ok())
    }
}
