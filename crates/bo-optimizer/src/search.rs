//! Search space definitions and candidate sampling strategies.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use bo_types::{Bounds, OptimizerError};

/// A proposed point: parameter name to coordinate.
pub type Parameters = HashMap<String, f64>;

/// Names of the query coordinates, in query order: `x0, x1, ...`.
pub fn parameter_names(dims: usize) -> Vec<String> {
    (0..dims).map(|i| format!("x{i}")).collect()
}

/// A single continuous dimension `[low, high]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterDef {
    pub name: String,
    pub low: f64,
    pub high: f64,
}

impl ParameterDef {
    fn span(&self) -> f64 {
        self.high - self.low
    }
}

/// The full search space: an ordered list of parameter definitions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchSpace {
    pub parameters: Vec<ParameterDef>,
}

impl SearchSpace {
    pub fn new() -> Self {
        Self {
            parameters: Vec::new(),
        }
    }

    pub fn add_float(mut self, name: impl Into<String>, low: f64, high: f64) -> Self {
        self.parameters.push(ParameterDef {
            name: name.into(),
            low,
            high,
        });
        self
    }

    /// One dimension per bound, named by [`parameter_names`].
    pub fn from_bounds(bounds: &Bounds) -> Self {
        parameter_names(bounds.dims())
            .into_iter()
            .zip(bounds.pairs())
            .fold(Self::new(), |space, (name, [lo, hi])| {
                space.add_float(name, lo, hi)
            })
    }

    pub fn names(&self) -> Vec<String> {
        self.parameters.iter().map(|p| p.name.clone()).collect()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.parameters.iter().any(|p| p.name == name)
    }

    pub fn len(&self) -> usize {
        self.parameters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parameters.is_empty()
    }
}

impl Default for SearchSpace {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Search strategies
// ---------------------------------------------------------------------------

/// Common trait for all search strategies.
pub trait SearchStrategy: Send {
    /// Generate the next batch of parameter combinations to evaluate.
    fn suggest(&mut self, count: usize) -> Vec<Parameters>;

    /// Report a completed trial so adaptive strategies can learn.
    /// `reward` is always "higher is better".
    fn report(&mut self, _params: &Parameters, _reward: f64) {}

    /// Human-readable strategy name.
    fn name(&self) -> &str;
}

// ---- Grid search ----

/// Regular grid with `steps` points per dimension, visited in row-major
/// order and restarted from the first point once exhausted.
#[derive(Debug, Clone)]
pub struct GridSearch {
    space: SearchSpace,
    steps: usize,
    total: usize,
    cursor: usize,
}

impl GridSearch {
    pub fn new(space: SearchSpace, steps: usize) -> Result<Self, OptimizerError> {
        let steps = steps.max(2);
        let total = u32::try_from(space.len())
            .ok()
            .and_then(|dims| steps.checked_pow(dims))
            .ok_or_else(|| OptimizerError::InvalidStep {
                message: format!(
                    "grid of {} steps over {} dimensions is too large",
                    steps,
                    space.len()
                ),
            })?;

        Ok(Self {
            space,
            steps,
            total,
            cursor: 0,
        })
    }

    /// Number of distinct grid points.
    pub fn size(&self) -> usize {
        self.total
    }

    fn point(&self, mut ordinal: usize) -> Parameters {
        let mut params = HashMap::with_capacity(self.space.len());
        // Last dimension varies fastest.
        for param in self.space.parameters.iter().rev() {
            let i = ordinal % self.steps;
            ordinal /= self.steps;
            let t = i as f64 / (self.steps - 1) as f64;
            let value = (param.low + t * param.span()).clamp(param.low, param.high);
            params.insert(param.name.clone(), value);
        }
        params
    }
}

impl SearchStrategy for GridSearch {
    fn suggest(&mut self, count: usize) -> Vec<Parameters> {
        (0..count)
            .map(|_| {
                let point = self.point(self.cursor);
                self.cursor = (self.cursor + 1) % self.total;
                point
            })
            .collect()
    }

    fn name(&self) -> &str {
        "grid"
    }
}

// ---- Random search ----

/// Independent uniform sampling across the search space.
#[derive(Debug, Clone)]
pub struct RandomSearch {
    space: SearchSpace,
    rng: ChaCha8Rng,
}

impl RandomSearch {
    pub fn new(space: SearchSpace, seed: u64) -> Self {
        Self {
            space,
            rng: ChaCha8Rng::seed_from_u64(seed),
        }
    }

    fn sample_one(&mut self) -> Parameters {
        self.space
            .parameters
            .iter()
            .map(|param| (param.name.clone(), self.rng.gen_range(param.low..=param.high)))
            .collect()
    }
}

impl SearchStrategy for RandomSearch {
    fn suggest(&mut self, count: usize) -> Vec<Parameters> {
        (0..count).map(|_| self.sample_one()).collect()
    }

    fn name(&self) -> &str {
        "random"
    }
}

// ---- Bayesian search (incumbent perturbation) ----

/// Sequential model-based search using a simple incumbent heuristic.
///
/// Tracks observed (params, reward) pairs. With probability
/// `exploration_weight` it samples uniformly; otherwise it perturbs the best
/// observed point by up to `perturbation` of each dimension's span.
#[derive(Debug, Clone)]
pub struct BayesianSearch {
    space: SearchSpace,
    observations: Vec<(Parameters, f64)>,
    exploration_weight: f64,
    perturbation: f64,
    rng: ChaCha8Rng,
}

impl BayesianSearch {
    pub fn new(space: SearchSpace, exploration_weight: f64, seed: u64) -> Self {
        Self {
            space,
            observations: Vec::new(),
            exploration_weight: exploration_weight.clamp(0.0, 1.0),
            perturbation: 0.1,
            rng: ChaCha8Rng::seed_from_u64(seed),
        }
    }

    pub fn with_perturbation(mut self, perturbation: f64) -> Self {
        self.perturbation = perturbation.abs();
        self
    }

    pub fn observations(&self) -> usize {
        self.observations.len()
    }

    /// Pure exploration sample.
    fn explore(&mut self) -> Parameters {
        self.space
            .parameters
            .iter()
            .map(|param| (param.name.clone(), self.rng.gen_range(param.low..=param.high)))
            .collect()
    }

    /// Exploitation: perturb the best-known point.
    fn exploit(&mut self) -> Parameters {
        let best = self
            .observations
            .iter()
            .max_by(|a, b| a.1.total_cmp(&b.1))
            .map(|(params, _)| params.clone());

        let Some(base) = best else {
            return self.explore();
        };

        let mut perturbed = HashMap::with_capacity(self.space.len());
        for param in &self.space.parameters {
            let value = match base.get(&param.name) {
                Some(v) => {
                    let width = self.perturbation * param.span();
                    let noise = self.rng.gen_range(-width..=width);
                    (v + noise).clamp(param.low, param.high)
                }
                None => self.rng.gen_range(param.low..=param.high),
            };
            perturbed.insert(param.name.clone(), value);
        }
        perturbed
    }
}

impl SearchStrategy for BayesianSearch {
    fn suggest(&mut self, count: usize) -> Vec<Parameters> {
        (0..count)
            .map(|_| {
                if self.observations.is_empty() || self.rng.gen::<f64>() < self.exploration_weight {
                    self.explore()
                } else {
                    self.exploit()
                }
            })
            .collect()
    }

    fn report(&mut self, params: &Parameters, reward: f64) {
        self.observations.push((params.clone(), reward));
    }

    fn name(&self) -> &str {
        "bayesian"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_space() -> SearchSpace {
        SearchSpace::new()
            .add_float("x0", -1.0, 1.0)
            .add_float("x1", 0.5, 1.0)
    }

    fn assert_in_space(space: &SearchSpace, params: &Parameters) {
        assert_eq!(params.len(), space.len());
        for p in &space.parameters {
            let v = params[&p.name];
            assert!(v >= p.low && v <= p.high, "{} = {v} outside [{}, {}]", p.name, p.low, p.high);
        }
    }

    #[test]
    fn space_from_bounds_names_dimensions_in_order() {
        let bounds = Bounds::from_pairs(&[[0.0, 1.0], [-2.0, 2.0], [5.0, 5.0]]).unwrap();
        let space = SearchSpace::from_bounds(&bounds);
        assert_eq!(space.names(), vec!["x0", "x1", "x2"]);
        assert_eq!(space.parameters[1].low, -2.0);
        assert!(space.contains("x2"));
        assert!(!space.contains("x3"));
    }

    #[test]
    fn grid_search_visits_every_point_then_cycles() {
        let space = SearchSpace::new()
            .add_float("a", 0.0, 1.0)
            .add_float("b", 10.0, 20.0);
        let mut gs = GridSearch::new(space, 3).unwrap();
        assert_eq!(gs.size(), 9);

        let first = gs.suggest(9);
        assert_eq!(first[0]["a"], 0.0);
        assert_eq!(first[0]["b"], 10.0);
        assert_eq!(first[1]["b"], 15.0);
        assert_eq!(first[8]["a"], 1.0);
        assert_eq!(first[8]["b"], 20.0);

        let again = gs.suggest(1);
        assert_eq!(again[0], first[0]);
    }

    #[test]
    fn grid_search_rejects_huge_grids() {
        let space = SearchSpace::from_bounds(&Bounds::new(vec![0.0; 128], vec![1.0; 128]).unwrap());
        assert!(GridSearch::new(space, 10).is_err());
    }

    #[test]
    fn random_search_respects_bounds_and_seed() {
        let space = sample_space();
        let mut a = RandomSearch::new(space.clone(), 7);
        let mut b = RandomSearch::new(space.clone(), 7);

        let sa = a.suggest(50);
        assert_eq!(sa, b.suggest(50));
        for params in &sa {
            assert_in_space(&space, params);
        }
    }

    #[test]
    fn bayesian_search_starts_with_exploration() {
        let space = sample_space();
        let mut bs = BayesianSearch::new(space.clone(), 0.3, 1);
        let suggestions = bs.suggest(10);
        assert_eq!(suggestions.len(), 10);
        for params in &suggestions {
            assert_in_space(&space, params);
        }
    }

    #[test]
    fn bayesian_search_exploits_after_reports() {
        let space = SearchSpace::new().add_float("lr", 0.0, 1.0);
        // exploration_weight = 0: always exploit once something is reported
        let mut bs = BayesianSearch::new(space, 0.0, 3).with_perturbation(0.05);

        let mut good = HashMap::new();
        good.insert("lr".to_string(), 0.5);
        bs.report(&good, 0.95);

        let mut bad = HashMap::new();
        bad.insert("lr".to_string(), 0.9);
        bs.report(&bad, 0.1);
        assert_eq!(bs.observations(), 2);

        for params in bs.suggest(20) {
            let v = params["lr"];
            assert!((v - 0.5).abs() <= 0.05 + 1e-12, "lr {v} not near incumbent");
        }
    }

    #[test]
    fn degenerate_dimension_is_supported() {
        let space = SearchSpace::new().add_float("x0", 2.0, 2.0);
        let mut rs = RandomSearch::new(space.clone(), 0);
        assert_eq!(rs.suggest(1)[0]["x0"], 2.0);

        let mut bs = BayesianSearch::new(space, 0.0, 0);
        let mut p = HashMap::new();
        p.insert("x0".to_string(), 2.0);
        bs.report(&p, 1.0);
        assert_eq!(bs.suggest(1)[0]["x0"], 2.0);
    }
}
