//! The trial-generator seam between the optimizer loop and the schedule.

use std::collections::BTreeMap;

use tracing::debug;

use bo_types::{BoResult, OptimizerError};

use crate::generation::GenerationStrategy;
use crate::search::{Parameters, SearchSpace};
use crate::trial::{ObjectiveDirection, Trial, TrialHandle};

/// Proposes candidates and accepts their objective values.
pub trait TrialGenerator: Send {
    fn propose_next(&mut self) -> BoResult<(Parameters, TrialHandle)>;

    fn complete(&mut self, handle: TrialHandle, value: f64) -> BoResult<()>;

    /// Name of the scalar being optimized.
    fn objective_key(&self) -> &str;

    fn direction(&self) -> ObjectiveDirection;

    /// Every trial proposed so far, in proposal order.
    fn trials(&self) -> Vec<&Trial>;
}

/// [`TrialGenerator`] backed by a [`GenerationStrategy`] and an in-memory
/// trial ledger.
#[derive(Debug)]
pub struct StrategyClient {
    strategy: GenerationStrategy,
    space: SearchSpace,
    objective_key: String,
    direction: ObjectiveDirection,
    trials: BTreeMap<TrialHandle, Trial>,
    next_handle: usize,
}

impl StrategyClient {
    pub fn new(
        strategy: GenerationStrategy,
        space: SearchSpace,
        objective_key: impl Into<String>,
        direction: ObjectiveDirection,
    ) -> Self {
        Self {
            strategy,
            space,
            objective_key: objective_key.into(),
            direction,
            trials: BTreeMap::new(),
            next_handle: 0,
        }
    }

    pub fn space(&self) -> &SearchSpace {
        &self.space
    }

    pub fn strategy(&self) -> &GenerationStrategy {
        &self.strategy
    }

    pub fn trial(&self, handle: TrialHandle) -> Option<&Trial> {
        self.trials.get(&handle)
    }

    /// Trials proposed but never completed.
    pub fn pending(&self) -> Vec<&Trial> {
        self.trials.values().filter(|t| !t.is_completed()).collect()
    }
}

impl TrialGenerator for StrategyClient {
    fn propose_next(&mut self) -> BoResult<(Parameters, TrialHandle)> {
        let (parameters, model) = self.strategy.next_candidate()?;
        let handle = TrialHandle(self.next_handle);
        self.next_handle += 1;

        debug!("Proposed trial {} from {}: {:?}", handle, model, parameters);
        self.trials
            .insert(handle, Trial::new(handle, parameters.clone(), model.as_str()));
        Ok((parameters, handle))
    }

    fn complete(&mut self, handle: TrialHandle, value: f64) -> BoResult<()> {
        let trial = self
            .trials
            .get_mut(&handle)
            .ok_or(OptimizerError::UnknownTrial { trial: handle.0 })?;
        if trial.is_completed() {
            return Err(OptimizerError::TrialAlreadyCompleted { trial: handle.0 }.into());
        }

        trial.mark_completed(value);
        debug!("Completed trial {} with {} = {}", handle, self.objective_key, value);
        let reward = self.direction.as_reward(value);
        self.strategy.report(&trial.parameters, reward);
        Ok(())
    }

    fn objective_key(&self) -> &str {
        &self.objective_key
    }

    fn direction(&self) -> ObjectiveDirection {
        self.direction
    }

    fn trials(&self) -> Vec<&Trial> {
        self.trials.values().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generation::{GenerationStepConfig, ModelKind};
    use bo_types::BoError;

    fn client(trials: i64) -> StrategyClient {
        let space = SearchSpace::new().add_float("x0", 0.0, 1.0);
        let strategy = GenerationStrategy::new(
            &[GenerationStepConfig::new(ModelKind::Random, trials)],
            &space,
            5,
        )
        .unwrap();
        StrategyClient::new(strategy, space, "entropy", ObjectiveDirection::Minimize)
    }

    #[test]
    fn handles_are_sequential_and_tracked() {
        let mut client = client(3);
        let (_, a) = client.propose_next().unwrap();
        let (_, b) = client.propose_next().unwrap();
        assert_eq!(a, TrialHandle(0));
        assert_eq!(b, TrialHandle(1));
        assert_eq!(client.pending().len(), 2);

        client.complete(a, 0.5).unwrap();
        assert_eq!(client.pending().len(), 1);
        assert_eq!(client.trial(a).unwrap().value, Some(0.5));
        assert_eq!(client.trial(a).unwrap().generated_by, "random");
        assert_eq!(client.objective_key(), "entropy");
    }

    #[test]
    fn completion_errors() {
        let mut client = client(2);
        let (_, handle) = client.propose_next().unwrap();
        client.complete(handle, 1.0).unwrap();

        assert!(matches!(
            client.complete(handle, 2.0),
            Err(BoError::Optimizer(OptimizerError::TrialAlreadyCompleted { trial: 0 }))
        ));
        assert!(matches!(
            client.complete(TrialHandle(9), 2.0),
            Err(BoError::Optimizer(OptimizerError::UnknownTrial { trial: 9 }))
        ));
    }

    #[test]
    fn exhausted_schedule_propagates() {
        let mut client = client(1);
        client.propose_next().unwrap();
        assert!(matches!(
            client.propose_next(),
            Err(BoError::Optimizer(OptimizerError::ScheduleExhausted { .. }))
        ));
        assert_eq!(client.trials().len(), 1);
    }
}
