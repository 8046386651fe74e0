//! # bo-corpus
//!
//! Raw corpus storage, the embedder contract, and [`ComposedCorpus`], which
//! ties a storage to the [`bo_index::BoundedIndex`] built from its
//! embeddings.

pub mod corpus;
pub mod embedder;
pub mod storage;

pub use corpus::{ComposedCorpus, Corpus};
pub use embedder::{Embedder, FnEmbedder, HashingEmbedder, TextTransform};
pub use storage::{ConcatStorage, JsonlStorage, Record, Storage};
