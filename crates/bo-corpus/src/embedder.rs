//! Batch text encoders.
//!
//! Embedding is CPU (or accelerator) heavy, so storages are encoded in
//! fixed-size batches and the batch outputs concatenated in input order.

use bo_types::{BoResult, CorpusError, Matrix};
use tracing::debug;

use crate::storage::{Record, Storage};

/// Turns raw records into the texts handed to an embedder.
pub type TextTransform<'a> = dyn Fn(&[&Record]) -> BoResult<Vec<String>> + 'a;

/// Encodes text into fixed-width vectors.
pub trait Embedder: Send + Sync {
    /// Number of texts encoded per call when encoding a storage.
    fn batch(&self) -> usize;

    /// Width of the produced vectors.
    fn dims(&self) -> usize;

    /// Encode one batch into a `[texts.len(), dims]` matrix.
    fn encode_batch(&self, texts: &[String]) -> BoResult<Matrix>;

    /// [`Embedder::encode_batch`] plus output shape checks.
    fn encode(&self, texts: &[String]) -> BoResult<Matrix> {
        let encoded = self.encode_batch(texts)?;

        if encoded.rows() != texts.len() {
            return Err(CorpusError::BatchSize {
                expected: texts.len(),
                actual: encoded.rows(),
            }
            .into());
        }
        if encoded.cols() != self.dims() {
            return Err(CorpusError::EmbeddingDimension {
                expected: self.dims(),
                actual: encoded.cols(),
            }
            .into());
        }

        Ok(encoded)
    }

    /// Encode a whole storage, `batch()` records at a time.
    fn encode_storage(&self, storage: &dyn Storage, transform: &TextTransform<'_>) -> BoResult<Matrix> {
        let total = storage.len();
        if total == 0 {
            return Err(CorpusError::EmptyStorage.into());
        }

        let batch = self.batch().max(1);
        let mut parts = Vec::with_capacity(total.div_ceil(batch));

        for idx in (0..total).step_by(batch) {
            debug!(
                "Encoding storage batch: idx={} batch_size={} total={}",
                idx, batch, total
            );
            let records = storage.slice(idx..idx + batch);
            let texts = transform(&records)?;
            parts.push(self.encode(&texts)?);
        }

        Ok(Matrix::concat(parts)?)
    }
}

// ---- Feature hashing ----

const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

fn fnv1a(bytes: &[u8]) -> u64 {
    bytes
        .iter()
        .fold(FNV_OFFSET, |hash, &b| (hash ^ u64::from(b)).wrapping_mul(FNV_PRIME))
}

/// Signed bag-of-words feature hashing.
///
/// Deterministic and dependency-free: each lowercase alphanumeric token adds
/// `+1` or `-1` to one of `dims` buckets. Useful when no model runtime is
/// available, and as a stand-in embedder in tests.
#[derive(Debug, Clone)]
pub struct HashingEmbedder {
    dims: usize,
    batch: usize,
    normalize: bool,
}

impl HashingEmbedder {
    pub fn new(dims: usize) -> Self {
        Self {
            dims: dims.max(1),
            batch: 64,
            normalize: true,
        }
    }

    pub fn with_batch(mut self, batch: usize) -> Self {
        self.batch = batch.max(1);
        self
    }

    pub fn with_normalize(mut self, normalize: bool) -> Self {
        self.normalize = normalize;
        self
    }

    fn embed_one(&self, text: &str) -> Vec<f64> {
        let mut out = vec![0.0; self.dims];
        for token in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
        {
            let hash = fnv1a(token.to_lowercase().as_bytes());
            let bucket = (hash % self.dims as u64) as usize;
            let sign = if hash >> 63 == 0 { 1.0 } else { -1.0 };
            out[bucket] += sign;
        }

        if self.normalize {
            let norm = out.iter().map(|v| v * v).sum::<f64>().sqrt();
            if norm > 0.0 {
                out.iter_mut().for_each(|v| *v /= norm);
            }
        }
        out
    }
}

impl Embedder for HashingEmbedder {
    fn batch(&self) -> usize {
        self.batch
    }

    fn dims(&self) -> usize {
        self.dims
    }

    fn encode_batch(&self, texts: &[String]) -> BoResult<Matrix> {
        let rows: Vec<f64> = texts.iter().flat_map(|t| self.embed_one(t)).collect();
        Matrix::from_flat(texts.len(), self.dims, rows)
    }
}

// ---- Closure adapter ----

/// Wraps a closure as an [`Embedder`].
pub struct FnEmbedder<F> {
    dims: usize,
    batch: usize,
    encode: F,
}

impl<F> FnEmbedder<F>
where
    F: Fn(&[String]) -> BoResult<Matrix> + Send + Sync,
{
    pub fn new(dims: usize, batch: usize, encode: F) -> Self {
        Self { dims, batch, encode }
    }
}

impl<F> Embedder for FnEmbedder<F>
where
    F: Fn(&[String]) -> BoResult<Matrix> + Send + Sync,
{
    fn batch(&self) -> usize {
        self.batch
    }

    fn dims(&self) -> usize {
        self.dims
    }

    fn encode_batch(&self, texts: &[String]) -> BoResult<Matrix> {
        (self.encode)(texts)
    }
}
