//! K-medoids proposals: cluster the indexed embeddings once, then evaluate
//! each cluster medoid as one trial.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use bo_index::Distance;
use bo_types::{BoResult, Matrix, OptimizerError};

use crate::client::TrialGenerator;
use crate::search::{parameter_names, Parameters};
use crate::trial::{ObjectiveDirection, Trial, TrialHandle};

fn default_max_iter() -> usize {
    300
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KMedoidsOptions {
    pub n_clusters: usize,
    /// Defaults to the index distance.
    #[serde(default)]
    pub distance: Option<Distance>,
    #[serde(default = "default_max_iter")]
    pub max_iter: usize,
    #[serde(default)]
    pub seed: u64,
}

impl KMedoidsOptions {
    pub fn new(n_clusters: usize) -> Self {
        Self {
            n_clusters,
            distance: None,
            max_iter: default_max_iter(),
            seed: 0,
        }
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_distance(mut self, distance: Distance) -> Self {
        self.distance = Some(distance);
        self
    }
}

/// Fitted k-medoids clustering (alternating assignment and medoid update,
/// k-medoids++ initialization).
#[derive(Debug, Clone, PartialEq)]
pub struct KMedoids {
    medoids: Vec<usize>,
    labels: Vec<usize>,
    inertia: f64,
    n_iter: usize,
}

impl KMedoids {
    pub fn fit(embeddings: &Matrix, distance: Distance, options: &KMedoidsOptions) -> BoResult<Self> {
        let k = options.n_clusters;
        if k == 0 || k > embeddings.rows() {
            return Err(OptimizerError::InvalidStep {
                message: format!(
                    "n_clusters must be in 1..={}, got {}",
                    embeddings.rows(),
                    k
                ),
            }
            .into());
        }

        let mut medoids = init_medoids(embeddings, distance, k, options.seed);
        let (mut labels, mut inertia) = assign(embeddings, distance, &medoids);
        let mut n_iter = 0;

        while n_iter < options.max_iter {
            n_iter += 1;
            let updated = update_medoids(embeddings, distance, &medoids, &labels);
            if updated == medoids {
                break;
            }
            medoids = updated;
            (labels, inertia) = assign(embeddings, distance, &medoids);
        }

        debug!("k-medoids converged after {} iterations, inertia {}", n_iter, inertia);
        Ok(Self {
            medoids,
            labels,
            inertia,
            n_iter,
        })
    }

    /// Row indices of the medoids, one per cluster.
    pub fn medoids(&self) -> &[usize] {
        &self.medoids
    }

    /// Cluster of each row.
    pub fn labels(&self) -> &[usize] {
        &self.labels
    }

    /// Sum of distances from each row to its medoid.
    pub fn inertia(&self) -> f64 {
        self.inertia
    }

    pub fn n_iter(&self) -> usize {
        self.n_iter
    }
}

fn nearest_medoid(embeddings: &Matrix, distance: Distance, medoids: &[usize], row: &[f64]) -> (usize, f64) {
    medoids
        .iter()
        .enumerate()
        .map(|(cluster, &m)| (cluster, distance.between(row, embeddings.row(m))))
        .min_by(|a, b| a.1.total_cmp(&b.1).then(a.0.cmp(&b.0)))
        .unwrap_or((0, f64::INFINITY))
}

fn init_medoids(embeddings: &Matrix, distance: Distance, k: usize, seed: u64) -> Vec<usize> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let n = embeddings.rows();
    let mut medoids = vec![rng.gen_range(0..n)];

    while medoids.len() < k {
        let weights: Vec<f64> = (0..n)
            .map(|i| {
                if medoids.contains(&i) {
                    0.0
                } else {
                    nearest_medoid(embeddings, distance, &medoids, embeddings.row(i)).1.max(0.0).powi(2)
                }
            })
            .collect();
        let total: f64 = weights.iter().sum();

        let next = if total > 0.0 {
            let mut target = rng.gen::<f64>() * total;
            weights
                .iter()
                .position(|&w| {
                    target -= w;
                    w > 0.0 && target <= 0.0
                })
                .or_else(|| weights.iter().rposition(|&w| w > 0.0))
        } else {
            // Every remaining row coincides with a medoid.
            None
        };
        let next = next.or_else(|| (0..n).find(|i| !medoids.contains(i)));
        match next {
            Some(i) => medoids.push(i),
            None => break,
        }
    }
    medoids
}

fn assign(embeddings: &Matrix, distance: Distance, medoids: &[usize]) -> (Vec<usize>, f64) {
    let nearest: Vec<(usize, f64)> = (0..embeddings.rows())
        .into_par_iter()
        .map(|i| nearest_medoid(embeddings, distance, medoids, embeddings.row(i)))
        .collect();
    let inertia = nearest.iter().map(|&(_, d)| d).sum();
    (nearest.into_iter().map(|(cluster, _)| cluster).collect(), inertia)
}

fn update_medoids(embeddings: &Matrix, distance: Distance, medoids: &[usize], labels: &[usize]) -> Vec<usize> {
    (0..medoids.len())
        .into_par_iter()
        .map(|cluster| {
            let members: Vec<usize> = (0..labels.len()).filter(|&i| labels[i] == cluster).collect();
            let cost = |candidate: usize| -> f64 {
                members
                    .iter()
                    .map(|&j| distance.between(embeddings.row(j), embeddings.row(candidate)))
                    .sum()
            };
            let current = medoids[cluster];
            members
                .iter()
                .copied()
                .chain(std::iter::once(current))
                .map(|candidate| (candidate, cost(candidate)))
                .min_by(|a, b| a.1.total_cmp(&b.1).then(a.0.cmp(&b.0)))
                .map_or(current, |(candidate, _)| candidate)
        })
        .collect()
}

/// Proposes each medoid of a [`KMedoids`] fit exactly once, in cluster order.
#[derive(Debug)]
pub struct KMedoidsGenerator {
    candidates: Vec<Parameters>,
    trials: Vec<Trial>,
    objective_key: String,
    direction: ObjectiveDirection,
}

impl KMedoidsGenerator {
    pub fn new(
        embeddings: &Matrix,
        distance: Distance,
        options: &KMedoidsOptions,
        objective_key: impl Into<String>,
        direction: ObjectiveDirection,
    ) -> BoResult<Self> {
        let distance = options.distance.unwrap_or(distance);
        let fit = KMedoids::fit(embeddings, distance, options)?;
        info!(
            "Fitted {} medoids over {} embeddings ({} distance)",
            fit.medoids().len(),
            embeddings.rows(),
            distance
        );

        let names = parameter_names(embeddings.cols());
        let candidates: Vec<Parameters> = fit
            .medoids()
            .iter()
            .map(|&m| names.iter().cloned().zip(embeddings.row(m).iter().copied()).collect())
            .collect();

        Ok(Self {
            candidates,
            trials: Vec::new(),
            objective_key: objective_key.into(),
            direction,
        })
    }

    /// Number of trials this generator will propose.
    pub fn budget(&self) -> usize {
        self.candidates.len()
    }
}

impl TrialGenerator for KMedoidsGenerator {
    fn propose_next(&mut self) -> BoResult<(Parameters, TrialHandle)> {
        let handle = TrialHandle(self.trials.len());
        let parameters = self
            .candidates
            .get(handle.0)
            .cloned()
            .ok_or(OptimizerError::ScheduleExhausted {
                trials: self.trials.len(),
            })?;
        self.trials.push(Trial::new(handle, parameters.clone(), "kmedoids"));
        Ok((parameters, handle))
    }

    fn complete(&mut self, handle: TrialHandle, value: f64) -> BoResult<()> {
        let trial = self
            .trials
            .get_mut(handle.0)
            .ok_or(OptimizerError::UnknownTrial { trial: handle.0 })?;
        if trial.is_completed() {
            return Err(OptimizerError::TrialAlreadyCompleted { trial: handle.0 }.into());
        }
        trial.mark_completed(value);
        Ok(())
    }

    fn objective_key(&self) -> &str {
        &self.objective_key
    }

    fn direction(&self) -> ObjectiveDirection {
        self.direction
    }

    fn trials(&self) -> Vec<&Trial> {
        self.trials.iter().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn blobs() -> Matrix {
        Matrix::from_rows(vec![
            vec![0.0, 0.0],
            vec![0.1, 0.0],
            vec![0.0, 0.1],
            vec![5.0, 5.0],
            vec![5.1, 5.0],
            vec![5.0, 5.1],
        ])
        .unwrap()
    }

    #[test]
    fn separates_two_blobs() {
        let fit = KMedoids::fit(&blobs(), Distance::Euclidean, &KMedoidsOptions::new(2).with_seed(3)).unwrap();
        let labels = fit.labels();
        assert_eq!(labels[0], labels[1]);
        assert_eq!(labels[0], labels[2]);
        assert_eq!(labels[3], labels[4]);
        assert_ne!(labels[0], labels[3]);

        let mut medoids = fit.medoids().to_vec();
        medoids.sort_unstable();
        assert!(medoids[0] < 3 && medoids[1] >= 3);
        assert!(fit.inertia() < 1.0);
    }

    #[test]
    fn single_cluster_picks_the_most_central_row() {
        let data = Matrix::from_rows(vec![vec![0.0], vec![1.0], vec![2.0], vec![10.0]]).unwrap();
        let fit = KMedoids::fit(&data, Distance::Euclidean, &KMedoidsOptions::new(1)).unwrap();
        // Sum of distances is minimised at 1.0 or 2.0 (both 11); lower index wins.
        assert_eq!(fit.medoids(), &[1]);
    }

    #[test]
    fn every_row_its_own_medoid() {
        let fit = KMedoids::fit(&blobs(), Distance::Euclidean, &KMedoidsOptions::new(6)).unwrap();
        let mut medoids = fit.medoids().to_vec();
        medoids.sort_unstable();
        assert_eq!(medoids, vec![0, 1, 2, 3, 4, 5]);
        assert_eq!(fit.inertia(), 0.0);
    }

    #[test]
    fn rejects_bad_cluster_counts() {
        assert!(KMedoids::fit(&blobs(), Distance::Euclidean, &KMedoidsOptions::new(0)).is_err());
        assert!(KMedoids::fit(&blobs(), Distance::Euclidean, &KMedoidsOptions::new(7)).is_err());
    }

    #[test]
    fn generator_proposes_each_medoid_once() {
        let mut generator = KMedoidsGenerator::new(
            &blobs(),
            Distance::Euclidean,
            &KMedoidsOptions::new(2).with_seed(1),
            "entropy",
            ObjectiveDirection::Minimize,
        )
        .unwrap();
        assert_eq!(generator.budget(), 2);

        let (first, a) = generator.propose_next().unwrap();
        let (_, b) = generator.propose_next().unwrap();
        assert_eq!(first.len(), 2);
        assert!(first.contains_key("x0") && first.contains_key("x1"));
        assert!(generator.propose_next().is_err());

        generator.complete(a, 0.1).unwrap();
        generator.complete(b, 0.2).unwrap();
        assert!(generator.complete(a, 0.3).is_err());
        assert!(generator.trials().iter().all(|t| t.is_completed()));
    }
}
