//! Trial ledger entries and objective direction.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::search::Parameters;

/// Unique trial identifier.
pub type TrialId = Uuid;

/// Whether we are maximizing or minimizing the objective.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObjectiveDirection {
    Maximize,
    #[default]
    Minimize,
}

impl ObjectiveDirection {
    /// `true` if `candidate` beats `incumbent` in this direction.
    pub fn is_better(&self, candidate: f64, incumbent: f64) -> bool {
        match self {
            Self::Maximize => candidate > incumbent,
            Self::Minimize => candidate < incumbent,
        }
    }

    /// Map an objective value onto a "higher is better" reward.
    pub fn as_reward(&self, value: f64) -> f64 {
        match self {
            Self::Maximize => value,
            Self::Minimize => -value,
        }
    }
}

/// Opaque handle returned with each proposal and passed back on completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TrialHandle(pub usize);

impl std::fmt::Display for TrialHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrialStatus {
    Running,
    Completed,
}

/// A single proposal and, once reported, its objective value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trial {
    pub id: TrialId,
    pub handle: TrialHandle,
    pub parameters: Parameters,
    /// Name of the generation step that proposed this trial.
    pub generated_by: String,
    pub status: TrialStatus,
    pub value: Option<f64>,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl Trial {
    pub fn new(handle: TrialHandle, parameters: Parameters, generated_by: &str) -> Self {
        Self {
            id: Uuid::new_v4(),
            handle,
            parameters,
            generated_by: generated_by.to_string(),
            status: TrialStatus::Running,
            value: None,
            started_at: Utc::now(),
            finished_at: None,
        }
    }

    pub fn mark_completed(&mut self, value: f64) {
        self.status = TrialStatus::Completed;
        self.value = Some(value);
        self.finished_at = Some(Utc::now());
    }

    pub fn is_completed(&self) -> bool {
        self.status == TrialStatus::Completed
    }

    /// Wall-clock duration, if finished.
    pub fn duration_ms(&self) -> Option<i64> {
        self.finished_at
            .map(|end| (end - self.started_at).num_milliseconds())
    }
}
