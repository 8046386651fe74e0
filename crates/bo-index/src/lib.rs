//! # bo-index
//!
//! Bounded nearest-neighbour search over a fixed embedding matrix.
//!
//! Provides the distance variants, the search backends (flat scan and an
//! exact k-d tree), an optional whitening transform applied before indexing,
//! and [`BoundedIndex`], the single validated search entry point.

mod backend;
mod distance;
mod index;
mod kdtree;
mod whitening;

pub use backend::{BackendKind, FlatBackend, SearchBackend};
pub use distance::Distance;
pub use index::{BoundedIndex, IndexConfig};
pub use kdtree::KdTreeBackend;
pub use whitening::Whitening;
