//! Post-run exams over the step-ordered evaluation history.

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use tracing::info;

use bo_index::BoundedIndex;
use bo_types::{internal_error, BoResult};

/// Report column names.
pub mod columns {
    pub const STEP_IDX: &str = "step_idx";
    pub const ORIGINAL: &str = "original";
    pub const ACC_MIN: &str = "acc_min";
    pub const ACC_MAX: &str = "acc_max";
    pub const ACC_AVG: &str = "acc_avg";
}

/// Scores an optimization history. `results` holds `(corpus index, evaluation)`
/// per step, in step order; the output has one score per step.
pub trait Exam: Send + Sync {
    fn run(&self, index: &BoundedIndex, results: &[(usize, f64)]) -> BoResult<Vec<f64>>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Accumulation {
    Min,
    Max,
    Avg,
}

impl Exam for Accumulation {
    fn run(&self, _index: &BoundedIndex, results: &[(usize, f64)]) -> BoResult<Vec<f64>> {
        let mut acc = Vec::with_capacity(results.len());
        let mut sum = 0.0;
        for (i, &(_, value)) in results.iter().enumerate() {
            sum += value;
            let next = match (self, acc.last()) {
                (_, None) => value,
                (Self::Min, Some(&prev)) => f64::min(prev, value),
                (Self::Max, Some(&prev)) => f64::max(prev, value),
                (Self::Avg, Some(_)) => sum / (i + 1) as f64,
            };
            acc.push(next);
        }
        Ok(acc)
    }
}

/// Column-oriented exam output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExamReport {
    pub step_idx: Vec<usize>,
    pub original: Vec<f64>,
    pub scores: BTreeMap<String, Vec<f64>>,
}

impl ExamReport {
    pub fn len(&self) -> usize {
        self.step_idx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.step_idx.is_empty()
    }

    pub fn column(&self, name: &str) -> Option<&[f64]> {
        match name {
            columns::ORIGINAL => Some(&self.original),
            _ => self.scores.get(name).map(Vec::as_slice),
        }
    }

    /// One JSON object per step. A column shorter than `step_idx` yields
    /// `null` past its end.
    pub fn to_records(&self) -> Vec<Map<String, Value>> {
        self.step_idx
            .iter()
            .enumerate()
            .map(|(row, &step)| {
                let mut record = Map::new();
                record.insert(columns::STEP_IDX.to_string(), Value::from(step));
                record.insert(
                    columns::ORIGINAL.to_string(),
                    Value::from(self.original.get(row).copied()),
                );
                for (name, scores) in &self.scores {
                    record.insert(name.clone(), Value::from(scores.get(row).copied()));
                }
                record
            })
            .collect()
    }
}

/// A named set of exams, run in parallel.
pub struct Examinator {
    exams: Vec<(String, Box<dyn Exam>)>,
}

impl Examinator {
    pub fn new() -> Self {
        Self { exams: Vec::new() }
    }

    pub fn with_exam(mut self, name: impl Into<String>, exam: impl Exam + 'static) -> Self {
        self.exams.push((name.into(), Box::new(exam)));
        self
    }

    /// Running minimum, maximum and mean.
    pub fn presets() -> Self {
        Self::new()
            .with_exam(columns::ACC_MIN, Accumulation::Min)
            .with_exam(columns::ACC_MAX, Accumulation::Max)
            .with_exam(columns::ACC_AVG, Accumulation::Avg)
    }

    pub fn names(&self) -> Vec<&str> {
        self.exams.iter().map(|(name, _)| name.as_str()).collect()
    }

    pub fn examine(&self, index: &BoundedIndex, results: &[(usize, f64)]) -> BoResult<ExamReport> {
        let scores = self
            .exams
            .par_iter()
            .map(|(name, exam)| {
                let scores = exam.run(index, results)?;
                if scores.len() != results.len() {
                    return Err(internal_error!(
                        "exam {} produced {} scores for {} steps",
                        name,
                        scores.len(),
                        results.len()
                    ));
                }
                Ok((name.clone(), scores))
            })
            .collect::<BoResult<BTreeMap<_, _>>>()?;

        info!("Ran {} exams over {} steps", scores.len(), results.len());
        Ok(ExamReport {
            step_idx: (0..results.len()).collect(),
            original: results.iter().map(|&(_, value)| value).collect(),
            scores,
        })
    }
}

impl Default for Examinator {
    fn default() -> Self {
        Self::presets()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bo_index::Distance;
    use bo_types::Matrix;

    fn index() -> BoundedIndex {
        let embeddings = Matrix::from_rows(vec![vec![0.0], vec![1.0], vec![2.0]]).unwrap();
        BoundedIndex::from_embeddings(embeddings, Distance::Euclidean).unwrap()
    }

    #[test]
    fn accumulations_run_over_history() {
        let results = [(2, 3.0), (0, 1.0), (1, 2.0), (2, 6.0)];
        let idx = index();
        assert_eq!(Accumulation::Min.run(&idx, &results).unwrap(), vec![3.0, 1.0, 1.0, 1.0]);
        assert_eq!(Accumulation::Max.run(&idx, &results).unwrap(), vec![3.0, 3.0, 3.0, 6.0]);
        assert_eq!(Accumulation::Avg.run(&idx, &results).unwrap(), vec![3.0, 2.0, 2.0, 3.0]);
    }

    #[test]
    fn presets_report_has_all_columns() {
        let report = Examinator::presets()
            .examine(&index(), &[(0, 0.5), (1, 0.25)])
            .unwrap();
        assert_eq!(report.step_idx, vec![0, 1]);
        assert_eq!(report.original, vec![0.5, 0.25]);
        assert_eq!(report.column(columns::ACC_MIN).unwrap(), &[0.5, 0.25]);
        assert_eq!(report.column(columns::ACC_AVG).unwrap(), &[0.5, 0.375]);

        let records = report.to_records();
        assert_eq!(records.len(), 2);
        assert_eq!(records[1][columns::ACC_MAX], Value::from(0.5));
        assert_eq!(records[1][columns::STEP_IDX], Value::from(1));
    }

    #[test]
    fn ragged_deserialized_report_still_renders() {
        let report: ExamReport = serde_json::from_str(
            r#"{"step_idx": [0, 1, 2], "original": [0.5], "scores": {"acc_min": [0.5, 0.25]}}"#,
        )
        .unwrap();
        let records = report.to_records();
        assert_eq!(records.len(), 3);
        assert_eq!(records[0][columns::ORIGINAL], Value::from(0.5));
        assert_eq!(records[1][columns::ORIGINAL], Value::Null);
        assert_eq!(records[1][columns::ACC_MIN], Value::from(0.25));
        assert_eq!(records[2][columns::ACC_MIN], Value::Null);
    }

    #[test]
    fn empty_history_gives_empty_report() {
        let report = Examinator::presets().examine(&index(), &[]).unwrap();
        assert!(report.is_empty());
        assert_eq!(report.scores.len(), 3);
    }

    struct Short;

    impl Exam for Short {
        fn run(&self, _: &BoundedIndex, _: &[(usize, f64)]) -> BoResult<Vec<f64>> {
            Ok(Vec::new())
        }
    }

    #[test]
    fn misaligned_exam_is_an_error() {
        let examinator = Examinator::new().with_exam("short", Short);
        assert!(examinator.examine(&index(), &[(0, 1.0)]).is_err());
        assert_eq!(examinator.names(), vec!["short"]);
    }
}
