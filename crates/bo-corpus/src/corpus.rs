//! A corpus: raw items plus the index built over their embeddings.

use std::sync::Arc;

use serde_json::Value;
use tracing::info;

use bo_index::{BoundedIndex, IndexConfig};
use bo_types::{validation_error, BoResult, CorpusError, Matrix};

use crate::embedder::Embedder;
use crate::storage::{Record, Storage};

/// What the optimizer searches over.
pub trait Corpus {
    fn storage(&self) -> &dyn Storage;

    fn index(&self) -> &Arc<BoundedIndex>;

    /// Dimensionality of queries against this corpus.
    fn dims(&self) -> usize {
        self.index().dims()
    }
}

/// Storage and index composed side by side; row `i` of the index is record
/// `i` of the storage.
#[derive(Debug)]
pub struct ComposedCorpus {
    storage: Box<dyn Storage>,
    index: Arc<BoundedIndex>,
}

impl ComposedCorpus {
    pub fn new(storage: Box<dyn Storage>, index: BoundedIndex) -> BoResult<Self> {
        if storage.len() != index.len() {
            return Err(validation_error!(
                "storage holds {} records but the index holds {} embeddings",
                storage.len(),
                index.len()
            ));
        }
        Ok(Self {
            storage,
            index: Arc::new(index),
        })
    }

    /// Embed the `key` field of every record and index the result.
    pub fn index_storage(
        storage: Box<dyn Storage>,
        embedder: &dyn Embedder,
        key: &str,
        config: &IndexConfig,
    ) -> BoResult<Self> {
        if !storage.keys().iter().any(|k| k == key) {
            return Err(CorpusError::MissingKey {
                key: key.to_string(),
            }
            .into());
        }

        info!(
            "Indexing {} records on field {:?} ({} dims)",
            storage.len(),
            key,
            embedder.dims()
        );
        let transform = |records: &[&Record]| -> BoResult<Vec<String>> {
            records.iter().map(|record| field_text(record, key)).collect()
        };
        let embeddings = embedder.encode_storage(storage.as_ref(), &transform)?;

        Self::index_embeddings(storage, embeddings, config)
    }

    /// Index precomputed embeddings, one row per record.
    pub fn index_embeddings(
        storage: Box<dyn Storage>,
        embeddings: Matrix,
        config: &IndexConfig,
    ) -> BoResult<Self> {
        let index = BoundedIndex::from_config(embeddings, config)?;
        Self::new(storage, index)
    }

    pub fn record(&self, idx: usize) -> Option<&Record> {
        self.storage.get(idx)
    }
}

impl Corpus for ComposedCorpus {
    fn storage(&self) -> &dyn Storage {
        self.storage.as_ref()
    }

    fn index(&self) -> &Arc<BoundedIndex> {
        &self.index
    }
}

fn field_text(record: &Record, key: &str) -> BoResult<String> {
    match record.get(key) {
        Some(Value::String(s)) => Ok(s.clone()),
        Some(Value::Null) | None => Err(CorpusError::MissingKey {
            key: key.to_string(),
        }
        .into()),
        Some(other) => Ok(other.to_string()),
    }
}
