//! Declarative generation schedules: an ordered list of model phases, each
//! proposing a fixed number of trials (or unboundedly many, if last).

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use tracing::{debug, info};

use bo_types::OptimizerError;

use crate::search::{BayesianSearch, GridSearch, Parameters, RandomSearch, SearchSpace, SearchStrategy};

const DEFAULT_GRID_STEPS: usize = 5;
const DEFAULT_EXPLORATION_WEIGHT: f64 = 0.3;

/// Candidate generation model for one phase. Parsed case-insensitively, in
/// configs as well as through [`FromStr`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum ModelKind {
    /// Also accepted as `sobol`.
    Random,
    Grid,
    /// Also accepted as `gpei`.
    Bayesian,
}

impl ModelKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Random => "random",
            Self::Grid => "grid",
            Self::Bayesian => "bayesian",
        }
    }
}

impl fmt::Display for ModelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ModelKind {
    type Err = OptimizerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "random" | "sobol" => Ok(Self::Random),
            "grid" => Ok(Self::Grid),
            "bayesian" | "gpei" => Ok(Self::Bayesian),
            _ => Err(OptimizerError::UnknownModel {
                model: s.to_string(),
            }),
        }
    }
}

impl TryFrom<String> for ModelKind {
    type Error = OptimizerError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<ModelKind> for String {
    fn from(model: ModelKind) -> Self {
        model.as_str().to_string()
    }
}

fn default_num_trials() -> i64 {
    -1
}

/// One phase of a generation schedule as written in configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationStepConfig {
    pub model: ModelKind,
    /// Trials this phase proposes; `-1` for unbounded.
    #[serde(default = "default_num_trials")]
    pub num_trials: i64,
    #[serde(default)]
    pub model_kwargs: HashMap<String, Value>,
}

impl GenerationStepConfig {
    pub fn new(model: ModelKind, num_trials: i64) -> Self {
        Self {
            model,
            num_trials,
            model_kwargs: HashMap::new(),
        }
    }

    pub fn with_kwarg(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.model_kwargs.insert(key.into(), value.into());
        self
    }
}

/// Total trial budget of a schedule: the sum of `num_trials`, or `-1` if any
/// phase is unbounded.
pub fn terminate_budget(steps: &[GenerationStepConfig]) -> i64 {
    if steps.iter().any(|s| s.num_trials < 0) {
        return -1;
    }
    steps.iter().map(|s| s.num_trials).sum()
}

/// An executable phase.
pub struct GenerationStep {
    model: ModelKind,
    num_trials: i64,
    generated: usize,
    strategy: Box<dyn SearchStrategy>,
}

impl fmt::Debug for GenerationStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GenerationStep")
            .field("model", &self.model)
            .field("num_trials", &self.num_trials)
            .field("generated", &self.generated)
            .field("strategy", &self.strategy.name())
            .finish()
    }
}

impl GenerationStep {
    pub fn model(&self) -> ModelKind {
        self.model
    }

    pub fn num_trials(&self) -> i64 {
        self.num_trials
    }

    pub fn generated(&self) -> usize {
        self.generated
    }

    pub fn is_unbounded(&self) -> bool {
        self.num_trials < 0
    }

    fn exhausted(&self) -> bool {
        !self.is_unbounded() && self.generated as i64 >= self.num_trials
    }
}

fn kwarg_u64(kwargs: &HashMap<String, Value>, key: &str) -> Result<Option<u64>, OptimizerError> {
    match kwargs.get(key) {
        None => Ok(None),
        Some(value) => value.as_u64().map(Some).ok_or_else(|| OptimizerError::InvalidStep {
            message: format!("model kwarg {key} must be a non-negative integer, got {value}"),
        }),
    }
}

fn kwarg_f64(kwargs: &HashMap<String, Value>, key: &str) -> Result<Option<f64>, OptimizerError> {
    match kwargs.get(key) {
        None => Ok(None),
        Some(value) => value.as_f64().map(Some).ok_or_else(|| OptimizerError::InvalidStep {
            message: format!("model kwarg {key} must be a number, got {value}"),
        }),
    }
}

/// Build an executable phase from its configuration.
pub fn generation_step(
    config: &GenerationStepConfig,
    space: &SearchSpace,
    seed: u64,
) -> Result<GenerationStep, OptimizerError> {
    if config.num_trials < -1 {
        return Err(OptimizerError::InvalidStep {
            message: format!("num_trials must be >= -1, got {}", config.num_trials),
        });
    }

    let kwargs = &config.model_kwargs;
    for key in kwargs.keys() {
        if !matches!(
            key.as_str(),
            "seed" | "grid_steps" | "exploration_weight" | "perturbation"
        ) {
            debug!("Ignoring unrecognised model kwarg {:?} for {}", key, config.model);
        }
    }

    let seed = kwarg_u64(kwargs, "seed")?.unwrap_or(seed);
    let strategy: Box<dyn SearchStrategy> = match config.model {
        ModelKind::Random => Box::new(RandomSearch::new(space.clone(), seed)),
        ModelKind::Grid => {
            let steps = kwarg_u64(kwargs, "grid_steps")?
                .map(|s| s as usize)
                .unwrap_or(DEFAULT_GRID_STEPS);
            Box::new(GridSearch::new(space.clone(), steps)?)
        }
        ModelKind::Bayesian => {
            let weight = kwarg_f64(kwargs, "exploration_weight")?
                .unwrap_or(DEFAULT_EXPLORATION_WEIGHT);
            let mut search = BayesianSearch::new(space.clone(), weight, seed);
            if let Some(perturbation) = kwarg_f64(kwargs, "perturbation")? {
                search = search.with_perturbation(perturbation);
            }
            Box::new(search)
        }
    };

    Ok(GenerationStep {
        model: config.model,
        num_trials: config.num_trials,
        generated: 0,
        strategy,
    })
}

/// Runs phases in order, each exactly once, advancing when a finite phase
/// has proposed its quota.
#[derive(Debug)]
pub struct GenerationStrategy {
    steps: Vec<GenerationStep>,
    current: usize,
    proposed: usize,
}

impl GenerationStrategy {
    /// Phase `i` is seeded with `seed + i` unless its kwargs carry a seed.
    pub fn new(
        configs: &[GenerationStepConfig],
        space: &SearchSpace,
        seed: u64,
    ) -> Result<Self, OptimizerError> {
        let steps = configs
            .iter()
            .enumerate()
            .map(|(i, config)| generation_step(config, space, seed.wrapping_add(i as u64)))
            .collect::<Result<Vec<_>, _>>()?;
        Self::from_steps(steps)
    }

    pub fn from_steps(steps: Vec<GenerationStep>) -> Result<Self, OptimizerError> {
        if steps.is_empty() {
            return Err(OptimizerError::InvalidStep {
                message: "generation schedule has no steps".to_string(),
            });
        }
        if let Some(pos) = steps.iter().position(GenerationStep::is_unbounded) {
            if pos + 1 != steps.len() {
                return Err(OptimizerError::InvalidStep {
                    message: format!(
                        "step {pos} ({}) is unbounded but is not the last step",
                        steps[pos].model
                    ),
                });
            }
        }

        Ok(Self {
            steps,
            current: 0,
            proposed: 0,
        })
    }

    /// Budget of the whole schedule, see [`terminate_budget`].
    pub fn budget(&self) -> i64 {
        if self.steps.iter().any(GenerationStep::is_unbounded) {
            return -1;
        }
        self.steps.iter().map(|s| s.num_trials).sum()
    }

    pub fn steps(&self) -> &[GenerationStep] {
        &self.steps
    }

    /// Index of the active phase, or `steps().len()` once exhausted.
    pub fn current_index(&self) -> usize {
        self.current
    }

    pub fn proposed(&self) -> usize {
        self.proposed
    }

    /// Propose one candidate along with the name of the model behind it.
    pub fn next_candidate(&mut self) -> Result<(Parameters, ModelKind), OptimizerError> {
        while self.current < self.steps.len() && self.steps[self.current].exhausted() {
            self.current += 1;
            if let Some(next) = self.steps.get(self.current) {
                info!(
                    "Generation schedule advancing to step {} ({}, {} trials) after {} proposals",
                    self.current, next.model, next.num_trials, self.proposed
                );
            }
        }

        let step = self
            .steps
            .get_mut(self.current)
            .ok_or(OptimizerError::ScheduleExhausted {
                trials: self.proposed,
            })?;

        let candidate = step
            .strategy
            .suggest(1)
            .pop()
            .ok_or_else(|| OptimizerError::InvalidStep {
                message: format!("{} produced no candidate", step.strategy.name()),
            })?;
        step.generated += 1;
        self.proposed += 1;

        Ok((candidate, step.model))
    }

    /// Forward an observation to every phase so later models see earlier data.
    pub fn report(&mut self, params: &Parameters, reward: f64) {
        for step in &mut self.steps {
            step.strategy.report(params, reward);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn space() -> SearchSpace {
        SearchSpace::new().add_float("x0", 0.0, 1.0).add_float("x1", -1.0, 1.0)
    }

    #[test]
    fn budget_rule() {
        let steps = |counts: &[i64]| -> Vec<GenerationStepConfig> {
            counts
                .iter()
                .map(|&n| GenerationStepConfig::new(ModelKind::Random, n))
                .collect()
        };
        assert_eq!(terminate_budget(&steps(&[5, 10, -1])), -1);
        assert_eq!(terminate_budget(&steps(&[5, 10, 15])), 30);
        assert_eq!(terminate_budget(&steps(&[])), 0);
    }

    #[test]
    fn model_aliases() {
        assert_eq!("sobol".parse::<ModelKind>().unwrap(), ModelKind::Random);
        assert_eq!("GPEI".parse::<ModelKind>().unwrap(), ModelKind::Bayesian);
        assert!(matches!(
            "tpe".parse::<ModelKind>(),
            Err(OptimizerError::UnknownModel { .. })
        ));

        let config: GenerationStepConfig =
            serde_json::from_value(json!({"model": "gpei", "num_trials": 3})).unwrap();
        assert_eq!(config.model, ModelKind::Bayesian);
        let config: GenerationStepConfig = serde_json::from_value(json!({"model": "sobol"})).unwrap();
        assert_eq!(config.num_trials, -1);
    }

    #[test]
    fn config_and_from_str_agree_on_names() {
        for name in ["GPEI", "Sobol", "GRID", "bayesian", "Random"] {
            let parsed: ModelKind = name.parse().unwrap();
            let config: GenerationStepConfig =
                serde_json::from_value(json!({"model": name, "num_trials": 1})).unwrap();
            assert_eq!(config.model, parsed, "{name}");
        }

        let err = serde_json::from_value::<GenerationStepConfig>(json!({"model": "tpe"})).unwrap_err();
        assert!(err.to_string().contains("Unknown generation model: tpe"));
        assert_eq!(
            serde_json::to_value(GenerationStepConfig::new(ModelKind::Bayesian, 2)).unwrap()["model"],
            json!("bayesian")
        );
    }

    #[test]
    fn steps_run_in_order_then_exhaust() {
        let configs = vec![
            GenerationStepConfig::new(ModelKind::Random, 2),
            GenerationStepConfig::new(ModelKind::Grid, 0),
            GenerationStepConfig::new(ModelKind::Bayesian, 3),
        ];
        let mut strategy = GenerationStrategy::new(&configs, &space(), 11).unwrap();
        assert_eq!(strategy.budget(), 5);

        let models: Vec<ModelKind> = (0..5).map(|_| strategy.next_candidate().unwrap().1).collect();
        assert_eq!(
            models,
            vec![
                ModelKind::Random,
                ModelKind::Random,
                ModelKind::Bayesian,
                ModelKind::Bayesian,
                ModelKind::Bayesian
            ]
        );
        assert!(matches!(
            strategy.next_candidate(),
            Err(OptimizerError::ScheduleExhausted { trials: 5 })
        ));
    }

    #[test]
    fn unbounded_step_must_be_last() {
        let configs = vec![
            GenerationStepConfig::new(ModelKind::Random, -1),
            GenerationStepConfig::new(ModelKind::Bayesian, 3),
        ];
        assert!(GenerationStrategy::new(&configs, &space(), 0).is_err());

        let configs = vec![
            GenerationStepConfig::new(ModelKind::Random, 2),
            GenerationStepConfig::new(ModelKind::Bayesian, -1),
        ];
        let mut strategy = GenerationStrategy::new(&configs, &space(), 0).unwrap();
        assert_eq!(strategy.budget(), -1);
        for _ in 0..50 {
            strategy.next_candidate().unwrap();
        }
        assert_eq!(strategy.current_index(), 1);
    }

    #[test]
    fn kwargs_are_validated() {
        let bad = GenerationStepConfig::new(ModelKind::Grid, 4).with_kwarg("grid_steps", "many");
        assert!(matches!(
            generation_step(&bad, &space(), 0),
            Err(OptimizerError::InvalidStep { .. })
        ));

        let ignored = GenerationStepConfig::new(ModelKind::Random, 4).with_kwarg("acquisition", "ei");
        assert!(generation_step(&ignored, &space(), 0).is_ok());

        let below = GenerationStepConfig::new(ModelKind::Random, -2);
        assert!(generation_step(&below, &space(), 0).is_err());
    }

    #[test]
    fn seed_kwarg_overrides_schedule_seed() {
        let config = GenerationStepConfig::new(ModelKind::Random, 1).with_kwarg("seed", 99);
        let mut a = GenerationStrategy::new(&[config.clone()], &space(), 1).unwrap();
        let mut b = GenerationStrategy::new(&[config], &space(), 2).unwrap();
        assert_eq!(a.next_candidate().unwrap().0, b.next_candidate().unwrap().0);
    }

    #[test]
    fn grid_kwarg_controls_resolution() {
        let config = GenerationStepConfig::new(ModelKind::Grid, 3).with_kwarg("grid_steps", 2);
        let mut strategy = GenerationStrategy::new(&[config], &space(), 0).unwrap();
        let (first, _) = strategy.next_candidate().unwrap();
        let (second, _) = strategy.next_candidate().unwrap();
        assert_eq!(first["x0"], 0.0);
        assert_eq!(first["x1"], -1.0);
        assert_eq!(second["x1"], 1.0);
    }
}
