//! Trial countdown gating optimizer termination.

use serde::{Deserialize, Serialize};

use bo_types::OptimizerError;

/// Remaining optimization steps. `-1` never terminates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemainingSteps {
    count: i64,
}

impl RemainingSteps {
    pub const UNBOUNDED: i64 = -1;

    pub fn bounded(count: usize) -> Self {
        Self {
            count: count as i64,
        }
    }

    pub fn unbounded() -> Self {
        Self {
            count: Self::UNBOUNDED,
        }
    }

    /// From a trial budget: `-1` or a non-negative count.
    pub fn from_budget(budget: i64) -> Result<Self, OptimizerError> {
        if budget < Self::UNBOUNDED {
            return Err(OptimizerError::InvalidStep {
                message: format!("trial budget must be >= -1, got {budget}"),
            });
        }
        Ok(Self { count: budget })
    }

    /// Consume one step. Fails once the count has reached zero.
    pub fn step(&mut self) -> Result<(), OptimizerError> {
        if self.done() {
            return Err(OptimizerError::Terminated);
        }
        if !self.is_unbounded() {
            self.count -= 1;
        }
        Ok(())
    }

    pub fn done(&self) -> bool {
        self.count == 0
    }

    pub fn is_unbounded(&self) -> bool {
        self.count == Self::UNBOUNDED
    }

    pub fn count(&self) -> i64 {
        self.count
    }
}
