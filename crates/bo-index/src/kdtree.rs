//! Exact k-d tree over the embedding rows.

use std::collections::BinaryHeap;

use bo_types::{BoResult, Matrix, NearestNeighbors};

use crate::backend::{candidate_order, SearchBackend};
use crate::distance::Distance;

#[derive(Debug, Clone)]
enum Node {
    Leaf(Vec<usize>),
    Split {
        dim: usize,
        value: f64,
        left: Box<Node>,
        right: Box<Node>,
    },
}

/// Rows left of a split have `row[dim] <= value`, rows right have
/// `row[dim] >= value`.
#[derive(Debug, Clone)]
pub struct KdTreeBackend {
    root: Node,
    leaf_size: usize,
}

/// Max-heap entry: the worst of the current best `k` sits on top.
#[derive(Debug, Clone, Copy)]
struct Candidate(usize, f64);

impl PartialEq for Candidate {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other).is_eq()
    }
}

impl Eq for Candidate {}

impl PartialOrd for Candidate {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Candidate {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        candidate_order(&(self.0, self.1), &(other.0, other.1))
    }
}

impl KdTreeBackend {
    pub fn build(embeddings: &Matrix, leaf_size: usize) -> Self {
        let leaf_size = leaf_size.max(1);
        let rows: Vec<usize> = (0..embeddings.rows()).collect();
        Self {
            root: Self::build_node(embeddings, rows, leaf_size),
            leaf_size,
        }
    }

    pub fn leaf_size(&self) -> usize {
        self.leaf_size
    }

    fn build_node(embeddings: &Matrix, mut rows: Vec<usize>, leaf_size: usize) -> Node {
        if rows.len() <= leaf_size {
            return Node::Leaf(rows);
        }

        // Split on the widest dimension.
        let mut best = (0, 0.0);
        for dim in 0..embeddings.cols() {
            let (lo, hi) = rows.iter().fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &r| {
                let v = embeddings.row(r)[dim];
                (lo.min(v), hi.max(v))
            });
            if hi - lo > best.1 {
                best = (dim, hi - lo);
            }
        }

        let (dim, spread) = best;
        if spread <= 0.0 {
            // All remaining rows coincide.
            return Node::Leaf(rows);
        }

        rows.sort_unstable_by(|&a, &b| {
            embeddings.row(a)[dim].total_cmp(&embeddings.row(b)[dim])
        });
        let mid = rows.len() / 2;
        let value = embeddings.row(rows[mid])[dim];
        let right = rows.split_off(mid);

        Node::Split {
            dim,
            value,
            left: Box::new(Self::build_node(embeddings, rows, leaf_size)),
            right: Box::new(Self::build_node(embeddings, right, leaf_size)),
        }
    }

    fn visit(
        node: &Node,
        embeddings: &Matrix,
        query: &[f64],
        k: usize,
        heap: &mut BinaryHeap<Candidate>,
    ) {
        match node {
            Node::Leaf(rows) => {
                for &row in rows {
                    let candidate = Candidate(row, Distance::Euclidean.between(query, embeddings.row(row)));
                    if heap.len() < k {
                        heap.push(candidate);
                    } else if heap.peek().is_some_and(|worst| candidate < *worst) {
                        heap.pop();
                        heap.push(candidate);
                    }
                }
            }
            Node::Split {
                dim,
                value,
                left,
                right,
            } => {
                let diff = query[*dim] - value;
                let (near, far) = if diff < 0.0 { (left, right) } else { (right, left) };

                Self::visit(near, embeddings, query, k, heap);

                // Equal distances on the far side can still win on row index.
                let explore_far = heap.len() < k
                    || heap.peek().is_some_and(|worst| diff.abs() <= worst.1);
                if explore_far {
                    Self::visit(far, embeddings, query, k, heap);
                }
            }
        }
    }
}

impl SearchBackend for KdTreeBackend {
    fn nearest(&self, embeddings: &Matrix, query: &[f64], k: usize) -> BoResult<NearestNeighbors> {
        let mut heap = BinaryHeap::with_capacity(k + 1);
        Self::visit(&self.root, embeddings, query, k, &mut heap);

        let (indices, distances) = heap
            .into_sorted_vec()
            .into_iter()
            .map(|Candidate(row, dist)| (row, dist))
            .unzip();
        Ok(NearestNeighbors { indices, distances })
    }

    fn name(&self) -> &str {
        "kd_tree"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::FlatBackend;
    use rand::{Rng, SeedableRng};
    use rand_chacha::ChaCha8Rng;

    fn random_matrix(rows: usize, cols: usize, seed: u64) -> Matrix {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let data = (0..rows)
            .map(|_| (0..cols).map(|_| rng.gen_range(-1.0..=1.0)).collect())
            .collect();
        Matrix::from_rows(data).unwrap()
    }

    #[test]
    fn matches_flat_scan() {
        let m = random_matrix(300, 4, 7);
        let tree = KdTreeBackend::build(&m, 8);
        let flat = FlatBackend::new(Distance::Euclidean);

        let mut rng = ChaCha8Rng::seed_from_u64(11);
        for _ in 0..50 {
            let q: Vec<f64> = (0..4).map(|_| rng.gen_range(-1.0..=1.0)).collect();
            for k in [1, 5, 17] {
                let a = tree.nearest(&m, &q, k).unwrap();
                let b = flat.nearest(&m, &q, k).unwrap();
                assert_eq!(a.indices, b.indices);
                assert_eq!(a.distances, b.distances);
            }
        }
    }

    #[test]
    fn duplicate_rows_tie_by_index() {
        let m = Matrix::from_rows(vec![vec![1.0, 1.0]; 40]).unwrap();
        let tree = KdTreeBackend::build(&m, 4);
        let nn = tree.nearest(&m, &[1.0, 1.0], 3).unwrap();
        assert_eq!(nn.indices, vec![0, 1, 2]);
    }

    #[test]
    fn grid_ties_across_splits() {
        let rows = (0..10)
            .flat_map(|x| (0..10).map(move |y| vec![x as f64, y as f64]))
            .collect();
        let m = Matrix::from_rows(rows).unwrap();
        let tree = KdTreeBackend::build(&m, 2);
        let flat = FlatBackend::new(Distance::Euclidean);

        let q = [4.5, 4.5];
        let a = tree.nearest(&m, &q, 4).unwrap();
        let b = flat.nearest(&m, &q, 4).unwrap();
        assert_eq!(a.indices, b.indices);
        assert_eq!(tree.leaf_size(), 2);
    }
}
