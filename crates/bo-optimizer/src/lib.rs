//! # bo-optimizer
//!
//! Sequential model-based search over a [`bo_index::BoundedIndex`]: a
//! generation schedule proposes points inside the index bounds, each point is
//! snapped to its nearest corpus item, and the item's score is fed back to the
//! schedule.

pub mod bleu;
pub mod client;
pub mod config;
pub mod exams;
pub mod generation;
pub mod medoids;
pub mod optimizer;
pub mod render;
pub mod scoring;
pub mod search;
pub mod steps;
pub mod telemetry;
pub mod trial;

pub use bleu::{
    exp_smoothed_bleu, sentence_bleu, tokenize_13a, BleuKind, SacreBleu, Score, SentenceBleu,
    Smoothing,
};
pub use client::{StrategyClient, TrialGenerator};
pub use config::{BleuConfig, RunConfig};
pub use exams::{Accumulation, Exam, ExamReport, Examinator};
pub use generation::{
    generation_step, terminate_budget, GenerationStep, GenerationStepConfig, GenerationStrategy,
    ModelKind,
};
pub use medoids::{KMedoids, KMedoidsGenerator, KMedoidsOptions};
pub use optimizer::{CorpusOptimizer, Evaluate, OptimizationState, OBJECTIVE_KEY};
pub use render::{Observation, RenderContext, RenderKind, RenderRequest, Renderer};
pub use scoring::{bleu_scorer, field_scorer};
pub use search::{
    parameter_names, BayesianSearch, GridSearch, ParameterDef, Parameters, RandomSearch,
    SearchSpace, SearchStrategy,
};
pub use steps::RemainingSteps;
pub use trial::{ObjectiveDirection, Trial, TrialHandle, TrialId, TrialStatus};
