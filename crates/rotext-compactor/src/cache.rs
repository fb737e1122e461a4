//! Load-once cache of frozen subword vocabularies.

use parking_lot::RwLock;
use rotext_core::{CompressError, Result};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

use crate::bpe::SubwordVocabulary;

/// Shared, read-mostly map of name → vocabulary. Readers never block each
/// other; loading and training take the write lock, so concurrent
/// re-training of the same name is serialized.
#[derive(Default)]
pub struct VocabularyCache {
    entries: RwLock<HashMap<String, Arc<SubwordVocabulary>>>,
}

impl VocabularyCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<Arc<SubwordVocabulary>> {
        self.entries.read().get(name).cloned()
    }

    /// Like [`get`](Self::get) but a missing entry is an error.
    pub fn require(&self, name: &str) -> Result<Arc<SubwordVocabulary>> {
        self.get(name)
            .ok_or_else(|| CompressError::ModelNotFound(format!("subword vocabulary '{name}'")))
    }

    pub fn insert(&self, name: &str, vocabulary: SubwordVocabulary) -> Arc<SubwordVocabulary> {
        let vocabulary = Arc::new(vocabulary);
        self.entries.write().insert(name.to_string(), Arc::clone(&vocabulary));
        vocabulary
    }

    /// Return the cached vocabulary for `path`, reading it from disk on
    /// first use.
    pub fn get_or_load(&self, path: impl AsRef<Path>) -> Result<Arc<SubwordVocabulary>> {
        let path = path.as_ref();
        let name = path.to_string_lossy().into_owned();
        self.get_or_try_insert_with(&name, || {
            debug!(path = %path.display(), "loading subword vocabulary");
            SubwordVocabulary::load(path)
        })
    }

    /// Return the cached vocabulary for `name`, building it with `build`
    /// on first use. `build` runs under the write lock.
    pub fn get_or_try_insert_with<F>(&self, name: &str, build: F) -> Result<Arc<SubwordVocabulary>>
    where
        F: FnOnce() -> Result<SubwordVocabulary>,
    {
        if let Some(v) = self.get(name) {
            return Ok(v);
        }
        let mut entries = self.entries.write();
        if let Some(v) = entries.get(name) {
            return Ok(Arc::clone(v));
        }
        let vocabulary = Arc::new(build()?);
        entries.insert(name.to_string(), Arc::clone(&vocabulary));
        Ok(vocabulary)
    }

    pub fn remove(&self, name: &str) -> Option<Arc<SubwordVocabulary>> {
        self.entries.write().remove(name)
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    pub fn clear(&self) {
        self.entries.write().clear();
    }
}
