//! The bounded index: one validated search entry point over any backend.

use serde::{Deserialize, Serialize};
use tracing::info;

use bo_types::{Array, BoError, BoResult, Bounds, IndexError, Matrix, SearchResult};

use crate::backend::{BackendKind, SearchBackend};
use crate::distance::Distance;
use crate::whitening::Whitening;

/// Declarative description of how to build a [`BoundedIndex`].
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexConfig {
    pub backend: BackendKind,
    pub distance: Distance,
    /// Whiten the embeddings down to this many dimensions before indexing.
    pub whiten: Option<usize>,
    /// Override the bounds derived from the embedding extrema.
    pub bounds: Option<Bounds>,
}

impl IndexConfig {
    pub fn new(distance: Distance) -> Self {
        Self {
            distance,
            ..Self::default()
        }
    }

    pub fn with_backend(mut self, backend: BackendKind) -> Self {
        self.backend = backend;
        self
    }

    pub fn with_whitening(mut self, reduced: usize) -> Self {
        self.whiten = Some(reduced);
        self
    }

    pub fn with_bounds(mut self, bounds: Bounds) -> Self {
        self.bounds = Some(bounds);
        self
    }
}

/// Immutable embedding matrix + bounds + distance, searched through a
/// pluggable [`SearchBackend`].
///
/// [`BoundedIndex::search`] is the only way to reach the backend, so every
/// backend gets the same shape, dimension, bounds and `k` checks, and none of
/// them has to gather the matched vectors itself.
#[derive(Debug)]
pub struct BoundedIndex {
    embeddings: Matrix,
    bounds: Bounds,
    distance: Distance,
    backend: Box<dyn SearchBackend>,
    whitening: Option<Whitening>,
}

impl BoundedIndex {
    /// Build a flat index. `distance` may be a [`Distance`] or its name.
    pub fn from_embeddings<D>(embeddings: Matrix, distance: D) -> BoResult<Self>
    where
        D: TryInto<Distance>,
        BoError: From<D::Error>,
    {
        Self::from_config(embeddings, &IndexConfig::new(distance.try_into()?))
    }

    pub fn from_config(embeddings: Matrix, config: &IndexConfig) -> BoResult<Self> {
        if embeddings.is_empty() || embeddings.cols() == 0 {
            return Err(IndexError::Empty.into());
        }

        let (embeddings, whitening) = match config.whiten {
            Some(reduced) => {
                let whitening = Whitening::fit(&embeddings, reduced)?;
                (whitening.transform_matrix(&embeddings)?, Some(whitening))
            }
            None => (embeddings, None),
        };

        let backend = config.backend.build(&embeddings, config.distance)?;
        let index = Self {
            bounds: Bounds::from_matrix(&embeddings)?,
            embeddings,
            distance: config.distance,
            backend,
            whitening,
        };

        let index = match &config.bounds {
            Some(bounds) => index.with_bounds(bounds.clone())?,
            None => index,
        };

        info!(
            "Built {} index over {} embeddings ({} dims, {} distance)",
            index.backend.name(),
            index.len(),
            index.dims(),
            index.distance
        );
        Ok(index)
    }

    /// Replace the derived bounds.
    pub fn with_bounds(mut self, bounds: Bounds) -> BoResult<Self> {
        if bounds.dims() != self.dims() {
            return Err(IndexError::DimensionMismatch {
                expected: self.dims(),
                actual: bounds.dims(),
            }
            .into());
        }
        self.bounds = bounds;
        Ok(self)
    }

    /// Search for the `k` nearest rows.
    ///
    /// Checks, in order: the query is 1-D, has `dims` entries, lies within
    /// the bounds, and `k >= 1`. `k` larger than the row count returns every
    /// row.
    pub fn search(&self, query: &Array, k: usize) -> BoResult<SearchResult> {
        if query.ndim() != 1 {
            return Err(IndexError::Shape { ndim: query.ndim() }.into());
        }

        let query = query.as_slice();
        if query.len() != self.dims() {
            return Err(IndexError::DimensionMismatch {
                expected: self.dims(),
                actual: query.len(),
            }
            .into());
        }

        if !self.in_range(query) {
            return Err(IndexError::OutOfBounds.into());
        }

        if k < 1 {
            return Err(IndexError::InvalidK { k }.into());
        }

        let k = k.min(self.len());
        let nearest = self.backend.nearest(&self.embeddings, query, k)?;
        let vectors = self.embeddings.gather(&nearest.indices);

        Ok(SearchResult {
            query: query.to_vec(),
            vectors,
            distances: nearest.distances,
            indices: nearest.indices,
        })
    }

    pub fn search_vector(&self, query: &[f64], k: usize) -> BoResult<SearchResult> {
        self.search(&Array::from(query), k)
    }

    /// Whether `query` has the index dimensionality and lies within the
    /// bounds (inclusive).
    pub fn in_range(&self, query: &[f64]) -> bool {
        query.len() == self.dims() && self.bounds.contains(query)
    }

    pub fn dims(&self) -> usize {
        self.embeddings.cols()
    }

    pub fn len(&self) -> usize {
        self.embeddings.rows()
    }

    pub fn is_empty(&self) -> bool {
        self.embeddings.is_empty()
    }

    pub fn bounds(&self) -> &Bounds {
        &self.bounds
    }

    pub fn lower(&self) -> &[f64] {
        self.bounds.lower()
    }

    pub fn upper(&self) -> &[f64] {
        self.bounds.upper()
    }

    /// Indexed embeddings. Whitened when the index was built with whitening.
    pub fn embeddings(&self) -> &Matrix {
        &self.embeddings
    }

    pub fn distance(&self) -> Distance {
        self.distance
    }

    pub fn whitening(&self) -> Option<&Whitening> {
        self.whitening.as_ref()
    }

    pub fn backend_name(&self) -> &str {
        self.backend.name()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bo_types::NearestNeighbors;
    use proptest::prelude::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn unit_square() -> Matrix {
        Matrix::from_rows(vec![
            vec![0.0, 0.0],
            vec![1.0, 0.0],
            vec![0.0, 1.0],
            vec![1.0, 1.0],
        ])
        .unwrap()
    }

    fn index_error(result: BoResult<SearchResult>) -> IndexError {
        match result {
            Err(BoError::Index(e)) => e,
            other => panic!("expected index error, got {other:?}"),
        }
    }

    /// Backend that counts calls, to prove validation happens first.
    #[derive(Debug)]
    struct CountingBackend(Arc<AtomicUsize>);

    impl SearchBackend for CountingBackend {
        fn nearest(&self, _: &Matrix, _: &[f64], k: usize) -> BoResult<NearestNeighbors> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(NearestNeighbors {
                indices: (0..k).collect(),
                distances: vec![0.0; k],
            })
        }

        fn name(&self) -> &str {
            "counting"
        }
    }

    fn counting_index() -> (BoundedIndex, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let embeddings = unit_square();
        let index = BoundedIndex {
            bounds: Bounds::from_matrix(&embeddings).unwrap(),
            embeddings,
            distance: Distance::Euclidean,
            backend: Box::new(CountingBackend(calls.clone())),
            whitening: None,
        };
        (index, calls)
    }

    #[test]
    fn nearest_corner() {
        let index = BoundedIndex::from_embeddings(unit_square(), Distance::Euclidean).unwrap();

        let result = index.search_vector(&[0.1, 0.1], 1).unwrap();
        assert_eq!(result.indices, vec![0]);
        assert!((result.distances[0] - 0.02_f64.sqrt()).abs() < 1e-9);
        assert_eq!(result.vectors.to_rows(), vec![vec![0.0, 0.0]]);
        assert_eq!(result.query, vec![0.1, 0.1]);

        let result = index.search_vector(&[0.1, 0.1], 2).unwrap();
        assert_eq!(result.indices[0], 0);
        assert!(result.indices[1] == 1 || result.indices[1] == 2);
        assert!(result.distances[0] < result.distances[1]);
        assert_eq!(result.vectors.rows(), 2);
    }

    #[test]
    fn ties_resolve_to_lowest_row() {
        let index = BoundedIndex::from_embeddings(unit_square(), "euclidean").unwrap();
        let result = index.search_vector(&[0.1, 0.1], 3).unwrap();
        assert_eq!(result.indices, vec![0, 1, 2]);
    }

    #[test]
    fn bounds_are_inclusive() {
        let index = BoundedIndex::from_embeddings(unit_square(), Distance::Euclidean).unwrap();
        assert_eq!(index.bounds().pairs(), vec![[0.0, 1.0], [0.0, 1.0]]);

        assert_eq!(
            index_error(index.search_vector(&[2.0, 2.0], 1)),
            IndexError::OutOfBounds
        );
        let result = index.search_vector(&[1.0, 1.0], 1).unwrap();
        assert_eq!(result.indices, vec![3]);
        assert_eq!(result.distances, vec![0.0]);
    }

    #[test]
    fn validation_order_is_shape_dims_bounds_k() {
        let (index, calls) = counting_index();

        let batch = Array::from_shape(vec![1, 2], vec![5.0, 5.0]).unwrap();
        assert_eq!(index_error(index.search(&batch, 0)), IndexError::Shape { ndim: 2 });

        assert_eq!(
            index_error(index.search_vector(&[5.0, 5.0, 5.0], 0)),
            IndexError::DimensionMismatch {
                expected: 2,
                actual: 3
            }
        );

        assert_eq!(
            index_error(index.search_vector(&[5.0, 5.0], 0)),
            IndexError::OutOfBounds
        );

        assert_eq!(
            index_error(index.search_vector(&[0.5, 0.5], 0)),
            IndexError::InvalidK { k: 0 }
        );

        assert_eq!(calls.load(Ordering::SeqCst), 0);

        index.search_vector(&[0.5, 0.5], 1).unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn k_is_capped_at_row_count() {
        let index = BoundedIndex::from_embeddings(unit_square(), Distance::Euclidean).unwrap();
        let result = index.search_vector(&[0.5, 0.5], 10).unwrap();
        assert_eq!(result.len(), 4);
    }

    #[test]
    fn override_bounds() {
        let config = IndexConfig::new(Distance::Euclidean)
            .with_bounds(Bounds::from_pairs(&[[-1.0, 2.0], [-1.0, 2.0]]).unwrap());
        let index = BoundedIndex::from_config(unit_square(), &config).unwrap();
        assert_eq!(index.lower(), &[-1.0, -1.0]);
        assert!(index.search_vector(&[2.0, 2.0], 1).is_ok());

        let wrong = Bounds::from_pairs(&[[0.0, 1.0]]).unwrap();
        assert!(BoundedIndex::from_embeddings(unit_square(), Distance::Euclidean)
            .unwrap()
            .with_bounds(wrong)
            .is_err());
    }

    #[test]
    fn empty_embeddings_are_rejected() {
        let err = BoundedIndex::from_embeddings(Matrix::empty(3), Distance::Euclidean).unwrap_err();
        assert!(matches!(err, BoError::Index(IndexError::Empty)));

        let err = BoundedIndex::from_embeddings(unit_square(), "hamming").unwrap_err();
        assert!(matches!(err, BoError::Index(IndexError::UnknownDistance { .. })));
    }

    #[test]
    fn kd_tree_and_flat_agree_through_wrapper() {
        let rows = (0..64)
            .map(|i| vec![(i % 8) as f64, (i / 8) as f64 * 0.5])
            .collect();
        let m = Matrix::from_rows(rows).unwrap();
        let flat = BoundedIndex::from_embeddings(m.clone(), Distance::Euclidean).unwrap();
        let tree = BoundedIndex::from_config(
            m,
            &IndexConfig::new(Distance::Euclidean).with_backend(BackendKind::kd_tree()),
        )
        .unwrap();
        assert_eq!(tree.backend_name(), "kd_tree");

        for q in [[0.0, 0.0], [3.3, 1.7], [7.0, 3.5], [4.5, 2.0]] {
            let a = flat.search_vector(&q, 5).unwrap();
            let b = tree.search_vector(&q, 5).unwrap();
            assert_eq!(a.indices, b.indices);
            assert_eq!(a.vectors, b.vectors);
        }
    }

    #[test]
    fn whitened_index_lives_in_reduced_space() {
        let rows = (0..40)
            .map(|i| {
                let t = i as f64 / 10.0;
                vec![t, 2.0 * t + t.sin(), t.cos()]
            })
            .collect();
        let m = Matrix::from_rows(rows).unwrap();
        let config = IndexConfig::new(Distance::Euclidean).with_whitening(2);
        let index = BoundedIndex::from_config(m.clone(), &config).unwrap();

        assert_eq!(index.dims(), 2);
        assert_eq!(index.bounds().dims(), 2);
        assert_eq!(index.embeddings().cols(), 2);

        // A raw row maps onto its own whitened row.
        let whitening = index.whitening().unwrap();
        let query = whitening.transform(m.row(7)).unwrap();
        let result = index.search_vector(&query, 1).unwrap();
        assert_eq!(result.indices, vec![7]);
    }

    fn arb_matrix() -> impl Strategy<Value = Vec<Vec<f64>>> {
        (1usize..4).prop_flat_map(|dims| {
            prop::collection::vec(prop::collection::vec(-10.0f64..10.0, dims), 1..40)
        })
    }

    proptest! {
        #[test]
        fn search_is_sorted_and_matches_brute_force(rows in arb_matrix(), k in 1usize..8, pick in 0usize..40, t in 0.0f64..1.0) {
            let m = Matrix::from_rows(rows).unwrap();
            let index = BoundedIndex::from_embeddings(m.clone(), Distance::Euclidean).unwrap();

            // A point on the segment between a row and the lower corner is in range.
            let anchor = m.row(pick % m.rows());
            let query: Vec<f64> = anchor
                .iter()
                .zip(index.lower())
                .map(|(a, lo)| lo + t * (a - lo))
                .collect();
            prop_assume!(index.in_range(&query));

            let result = index.search_vector(&query, k).unwrap();
            prop_assert_eq!(result.len(), k.min(m.rows()));
            prop_assert!(result.distances.windows(2).all(|w| w[0] <= w[1]));

            let mut expected: Vec<(usize, f64)> = Distance::Euclidean
                .to_rows(&query, &m)
                .into_iter()
                .enumerate()
                .collect();
            expected.sort_by(|a, b| a.1.total_cmp(&b.1).then(a.0.cmp(&b.0)));
            let expected: Vec<usize> = expected.into_iter().take(k).map(|(i, _)| i).collect();
            prop_assert_eq!(result.indices, expected);
        }

        #[test]
        fn out_of_range_queries_never_reach_backend(shift in 0.001f64..100.0, dim in 0usize..2) {
            let (index, calls) = counting_index();
            let mut query = vec![0.5, 0.5];
            query[dim] = index.upper()[dim] + shift;

            prop_assert!(!index.in_range(&query));
            prop_assert!(matches!(
                index.search_vector(&query, 1),
                Err(BoError::Index(IndexError::OutOfBounds))
            ));
            prop_assert_eq!(calls.load(Ordering::SeqCst), 0);
        }

        #[test]
        fn in_range_is_idempotent(x in -2.0f64..3.0, y in -2.0f64..3.0) {
            let index = BoundedIndex::from_embeddings(unit_square(), Distance::Euclidean).unwrap();
            let first = index.in_range(&[x, y]);
            for _ in 0..5 {
                prop_assert_eq!(index.in_range(&[x, y]), first);
            }
            prop_assert_eq!(index.bounds().pairs(), vec![[0.0, 1.0], [0.0, 1.0]]);
        }
    }
}
