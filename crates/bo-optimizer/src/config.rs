//! Run configuration for the `bo-search` binary.

use serde::{Deserialize, Serialize};
use std::path::Path;

use bo_index::IndexConfig;
use bo_types::{config_error, BoResult};

use crate::bleu::BleuKind;
use crate::generation::{terminate_budget, GenerationStepConfig, ModelKind};
use crate::medoids::KMedoidsOptions;
use crate::trial::ObjectiveDirection;

fn default_steps() -> Vec<GenerationStepConfig> {
    vec![
        GenerationStepConfig::new(ModelKind::Random, 5),
        GenerationStepConfig::new(ModelKind::Bayesian, 25),
    ]
}

fn default_storage_key() -> String {
    "text".to_string()
}

fn default_score_key() -> String {
    "score".to_string()
}

fn default_embedding_dims() -> usize {
    64
}

/// Score items by BLEU between two of their fields instead of `score_key`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BleuConfig {
    pub target_key: String,
    pub references_key: String,
    #[serde(default)]
    pub method: BleuKind,
}

/// Everything needed to index a corpus and optimize over it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunConfig {
    #[serde(default)]
    pub index: IndexConfig,

    /// Generation schedule. Its budget bounds the run.
    #[serde(default = "default_steps")]
    pub steps: Vec<GenerationStepConfig>,

    #[serde(default)]
    pub direction: ObjectiveDirection,

    #[serde(default)]
    pub seed: u64,

    /// Record field that gets embedded.
    #[serde(default = "default_storage_key")]
    pub storage_key: String,

    /// Numeric record field used as the objective of the matched item.
    #[serde(default = "default_score_key")]
    pub score_key: String,

    #[serde(default = "default_embedding_dims")]
    pub embedding_dims: usize,

    /// Step cap, required when the schedule is unbounded.
    #[serde(default)]
    pub max_steps: Option<usize>,

    /// Evaluate k-medoids cluster centres instead of running `steps`.
    #[serde(default)]
    pub kmedoids: Option<KMedoidsOptions>,

    #[serde(default)]
    pub bleu: Option<BleuConfig>,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            index: IndexConfig::default(),
            steps: default_steps(),
            direction: ObjectiveDirection::default(),
            seed: 0,
            storage_key: default_storage_key(),
            score_key: default_score_key(),
            embedding_dims: default_embedding_dims(),
            max_steps: None,
            kmedoids: None,
            bleu: None,
        }
    }
}

impl RunConfig {
    pub fn from_json_str(json: &str) -> BoResult<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file<P: AsRef<Path>>(path: P) -> BoResult<Self> {
        let path = path.as_ref();
        tracing::info!("Loading run config from: {}", path.display());
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    pub fn with_steps(mut self, steps: Vec<GenerationStepConfig>) -> Self {
        self.steps = steps;
        self
    }

    pub fn with_max_steps(mut self, max_steps: usize) -> Self {
        self.max_steps = Some(max_steps);
        self
    }

    /// Trial budget implied by the schedule.
    pub fn budget(&self) -> i64 {
        terminate_budget(&self.steps)
    }

    pub fn validate(&self) -> BoResult<()> {
        if self.steps.is_empty() {
            return Err(config_error!("at least one generation step is required"));
        }
        if let Some(step) = self.steps.iter().find(|s| s.num_trials < -1) {
            return Err(config_error!(
                "num_trials must be >= -1, got {} for {}",
                step.num_trials,
                step.model
            ));
        }
        if let Some(kmedoids) = &self.kmedoids {
            if kmedoids.n_clusters == 0 {
                return Err(config_error!("kmedoids.n_clusters must be positive"));
            }
        } else if self.budget() < 0 && self.max_steps.is_none() {
            return Err(config_error!(
                "schedule is unbounded; set max_steps to cap the run"
            ));
        }
        if self.embedding_dims == 0 {
            return Err(config_error!("embedding_dims must be positive"));
        }
        if self.storage_key.is_empty() || self.score_key.is_empty() {
            return Err(config_error!("storage_key and score_key must be non-empty"));
        }
        if let Some(bleu) = &self.bleu {
            if bleu.target_key.is_empty() || bleu.references_key.is_empty() {
                return Err(config_error!("bleu target_key and references_key must be non-empty"));
            }
        }
        if let Some(reduced) = self.index.whiten {
            if reduced == 0 || reduced > self.embedding_dims {
                return Err(config_error!(
                    "whiten must be in 1..={}, got {}",
                    self.embedding_dims,
                    reduced
                ));
            }
        }
        Ok(())
    }
}
