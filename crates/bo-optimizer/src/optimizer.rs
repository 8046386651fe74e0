//! The optimization loop: propose a point, snap it to the corpus, score it.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info};

use bo_corpus::Corpus;
use bo_index::BoundedIndex;
use bo_types::{BoError, BoResult, OptimizerError, SearchResult};

use crate::client::{StrategyClient, TrialGenerator};
use crate::generation::{terminate_budget, GenerationStepConfig, GenerationStrategy};
use crate::medoids::{KMedoidsGenerator, KMedoidsOptions};
use crate::render::{RenderContext, RenderRequest, Renderer};
use crate::search::{parameter_names, Parameters, SearchSpace};
use crate::steps::RemainingSteps;
use crate::trial::{ObjectiveDirection, Trial, TrialHandle};

/// Objective key reported to the trial generator.
pub const OBJECTIVE_KEY: &str = "entropy";

/// Scores the corpus item(s) matched by a query.
pub type Evaluate = Box<dyn FnMut(&SearchResult) -> BoResult<f64> + Send>;

/// Outcome of a single optimizer step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizationState {
    pub query: Vec<f64>,
    pub result: SearchResult,
    pub evaluation: f64,
    pub trial: TrialHandle,
}

pub struct CorpusOptimizer {
    index: Arc<BoundedIndex>,
    evaluate: Evaluate,
    generator: Box<dyn TrialGenerator>,
    space: SearchSpace,
    names: Vec<String>,
    remaining: RemainingSteps,
    history: Vec<OptimizationState>,
}

impl fmt::Debug for CorpusOptimizer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CorpusOptimizer")
            .field("dims", &self.names.len())
            .field("remaining", &self.remaining)
            .field("history", &self.history.len())
            .finish()
    }
}

impl CorpusOptimizer {
    /// Optimize over `index` with a schedule of generation steps. The trial
    /// budget is derived from the schedule.
    pub fn new<F>(
        index: Arc<BoundedIndex>,
        evaluate: F,
        steps: &[GenerationStepConfig],
        direction: ObjectiveDirection,
        seed: u64,
    ) -> BoResult<Self>
    where
        F: FnMut(&SearchResult) -> BoResult<f64> + Send + 'static,
    {
        let space = SearchSpace::from_bounds(index.bounds());
        let strategy = GenerationStrategy::new(steps, &space, seed)?;
        let client = StrategyClient::new(strategy, space, OBJECTIVE_KEY, direction);
        Self::with_generator(index, evaluate, Box::new(client), terminate_budget(steps))
    }

    /// Optimize with a caller-supplied generator. Its candidates must carry
    /// one value per name in [`parameter_names`].
    pub fn with_generator<F>(
        index: Arc<BoundedIndex>,
        evaluate: F,
        generator: Box<dyn TrialGenerator>,
        budget: i64,
    ) -> BoResult<Self>
    where
        F: FnMut(&SearchResult) -> BoResult<f64> + Send + 'static,
    {
        let remaining = RemainingSteps::from_budget(budget)?;
        let space = SearchSpace::from_bounds(index.bounds());
        let names = parameter_names(index.dims());

        info!(
            "Optimizer ready: {} dims over {} items, budget {}, direction {:?}",
            names.len(),
            index.len(),
            budget,
            generator.direction()
        );

        Ok(Self {
            index,
            evaluate: Box::new(evaluate),
            generator,
            space,
            names,
            remaining,
            history: Vec::new(),
        })
    }

    /// Evaluate the medoid of each k-medoids cluster of the indexed
    /// embeddings, one per step.
    pub fn kmedoids<F>(
        index: Arc<BoundedIndex>,
        evaluate: F,
        options: &KMedoidsOptions,
        direction: ObjectiveDirection,
    ) -> BoResult<Self>
    where
        F: FnMut(&SearchResult) -> BoResult<f64> + Send + 'static,
    {
        let generator = KMedoidsGenerator::new(
            index.embeddings(),
            index.distance(),
            options,
            OBJECTIVE_KEY,
            direction,
        )?;
        let budget = generator.budget() as i64;
        Self::with_generator(index, evaluate, Box::new(generator), budget)
    }

    pub fn for_corpus<C, F>(
        corpus: &C,
        evaluate: F,
        steps: &[GenerationStepConfig],
        direction: ObjectiveDirection,
        seed: u64,
    ) -> BoResult<Self>
    where
        C: Corpus + ?Sized,
        F: FnMut(&SearchResult) -> BoResult<f64> + Send + 'static,
    {
        Self::new(Arc::clone(corpus.index()), evaluate, steps, direction, seed)
    }

    /// Run one trial. Fails once the budget is spent.
    pub fn step(&mut self) -> BoResult<OptimizationState> {
        self.remaining.step()?;

        let (parameters, trial) = self.generator.propose_next()?;
        let query = self.query_from(&parameters)?;
        let result = self.index.search_vector(&query, 1)?;

        // A failing evaluation leaves the trial running on the generator side.
        let evaluation = (self.evaluate)(&result)?;
        self.generator.complete(trial, evaluation)?;

        debug!(
            "Trial {} matched item {:?} with {} = {}",
            trial,
            result.indices.first(),
            OBJECTIVE_KEY,
            evaluation
        );

        let state = OptimizationState {
            query,
            result,
            evaluation,
            trial,
        };
        self.history.push(state.clone());
        Ok(state)
    }

    /// Step until the budget is spent or `max_steps` trials have run.
    pub fn run(&mut self, max_steps: Option<usize>) -> BoResult<Vec<OptimizationState>> {
        if max_steps.is_none() && self.remaining.is_unbounded() {
            return Err(OptimizerError::Unbounded.into());
        }

        let mut states = Vec::new();
        while !self.terminate() && max_steps.map_or(true, |cap| states.len() < cap) {
            states.push(self.step()?);
        }
        info!(
            "Optimization stopped after {} steps ({} total)",
            states.len(),
            self.history.len()
        );
        Ok(states)
    }

    pub fn terminate(&self) -> bool {
        self.remaining.done()
    }

    pub fn remaining(&self) -> RemainingSteps {
        self.remaining
    }

    pub fn index(&self) -> &Arc<BoundedIndex> {
        &self.index
    }

    pub fn space(&self) -> &SearchSpace {
        &self.space
    }

    pub fn parameter_names(&self) -> &[String] {
        &self.names
    }

    pub fn history(&self) -> &[OptimizationState] {
        &self.history
    }

    /// Best step so far under the generator's direction.
    pub fn best(&self) -> Option<&OptimizationState> {
        let direction = self.generator.direction();
        self.history.iter().fold(None, |best, state| match best {
            Some(b) if !direction.is_better(state.evaluation, b.evaluation) => Some(b),
            _ => Some(state),
        })
    }

    /// `(corpus index, evaluation)` of the nearest item per step, in step order.
    pub fn evaluations(&self) -> Vec<(usize, f64)> {
        self.history
            .iter()
            .filter_map(|s| s.result.indices.first().map(|&idx| (idx, s.evaluation)))
            .collect()
    }

    /// Trials whose evaluation never completed.
    pub fn pending(&self) -> Vec<&Trial> {
        self.generator
            .trials()
            .into_iter()
            .filter(|t| !t.is_completed())
            .collect()
    }

    pub fn render(&self, request: &RenderRequest, renderer: &mut dyn Renderer) -> BoResult<()> {
        let trials = self
            .generator
            .trials()
            .into_iter()
            .filter(|t| t.is_completed())
            .collect();
        let context = RenderContext {
            space: &self.space,
            trials,
            objective_key: self.generator.objective_key(),
            direction: self.generator.direction(),
        };
        crate::render::render(request, &context, renderer)
    }

    fn query_from(&self, parameters: &Parameters) -> BoResult<Vec<f64>> {
        self.names
            .iter()
            .map(|name| {
                parameters.get(name).copied().ok_or_else(|| {
                    BoError::from(OptimizerError::MissingParameter { name: name.clone() })
                })
            })
            .collect()
    }
}
