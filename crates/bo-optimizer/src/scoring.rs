//! Scoring functions that read the objective from corpus records.

use serde_json::Value;

use bo_corpus::Storage;
use bo_types::{BoResult, CorpusError, OptimizerError, SearchResult};

use crate::bleu::Score;

fn nearest_row(result: &SearchResult) -> BoResult<usize> {
    let (idx, _) = result.nearest().ok_or_else(|| OptimizerError::Evaluation {
        message: "search returned no match".to_string(),
    })?;
    Ok(idx)
}

/// Scores the nearest match by a numeric field of its record.
///
/// The field is read once up front; records where it is missing or not a
/// number only fail when a search actually lands on them.
pub fn field_scorer(
    storage: &dyn Storage,
    key: &str,
) -> BoResult<impl FnMut(&SearchResult) -> BoResult<f64> + Send + 'static> {
    let scores: Vec<Option<f64>> = storage
        .column(key)?
        .into_iter()
        .map(|value| value.as_f64())
        .collect();
    let key = key.to_string();

    Ok(move |result: &SearchResult| -> BoResult<f64> {
        let idx = nearest_row(result)?;
        scores
            .get(idx)
            .copied()
            .flatten()
            .ok_or_else(|| CorpusError::MissingKey { key: key.clone() }.into())
    })
}

fn reference_texts(value: Value) -> Option<Vec<String>> {
    let texts: Option<Vec<String>> = match value {
        Value::String(text) => Some(vec![text]),
        Value::Array(items) => items
            .into_iter()
            .map(|item| match item {
                Value::String(text) => Some(text),
                _ => None,
            })
            .collect(),
        _ => None,
    };
    texts.filter(|texts| !texts.is_empty())
}

/// Scores the nearest match by the BLEU of its `target_key` text against
/// its `references_key` texts (a string or a list of strings).
///
/// Both fields must exist in the storage. Records with a missing or
/// malformed value fail when a search lands on them.
pub fn bleu_scorer<S>(
    storage: &dyn Storage,
    target_key: &str,
    references_key: &str,
    score: S,
) -> BoResult<impl FnMut(&SearchResult) -> BoResult<f64> + Send + 'static>
where
    S: Score + 'static,
{
    let targets: Vec<Option<String>> = storage
        .column(target_key)?
        .into_iter()
        .map(|value| match value {
            Value::String(text) => Some(text),
            _ => None,
        })
        .collect();
    let references: Vec<Option<Vec<String>>> = storage
        .column(references_key)?
        .into_iter()
        .map(reference_texts)
        .collect();
    let target_key = target_key.to_string();
    let references_key = references_key.to_string();

    Ok(move |result: &SearchResult| -> BoResult<f64> {
        let idx = nearest_row(result)?;
        let target = targets
            .get(idx)
            .and_then(|target| target.as_deref())
            .ok_or_else(|| CorpusError::MissingKey {
                key: target_key.clone(),
            })?;
        let refs = references
            .get(idx)
            .and_then(|refs| refs.as_ref())
            .ok_or_else(|| CorpusError::MissingKey {
                key: references_key.clone(),
            })?;
        Ok(score.score(target, refs))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bleu::{BleuKind, SacreBleu, SentenceBleu, Smoothing};
    use bo_corpus::JsonlStorage;
    use bo_types::{BoError, Matrix};

    fn result(idx: usize) -> SearchResult {
        SearchResult {
            query: vec![0.0],
            vectors: Matrix::from_rows(vec![vec![0.0]]).unwrap(),
            distances: vec![0.0],
            indices: vec![idx],
        }
    }

    #[test]
    fn reads_numeric_field_of_nearest() {
        let storage = JsonlStorage::from_jsonl_str(
            "{\"score\": 0.25}\n{\"score\": \"high\"}\n{\"other\": 1}\n{\"score\": 3}",
        )
        .unwrap();
        let mut score = field_scorer(&storage, "score").unwrap();

        assert_eq!(score(&result(0)).unwrap(), 0.25);
        assert_eq!(score(&result(3)).unwrap(), 3.0);
        assert!(matches!(
            score(&result(1)),
            Err(BoError::Corpus(CorpusError::MissingKey { .. }))
        ));
        assert!(score(&result(2)).is_err());
    }

    const ANSWERS: &str = r#"{"answer": "the cat sat on the mat", "gold": ["the cat sat on the mat", "a cat sat"]}
{"answer": "x y z", "gold": "a b c"}
{"answer": 7, "gold": "a b c"}
{"answer": "a b", "gold": []}"#;

    #[test]
    fn bleu_of_nearest_record() {
        let storage = JsonlStorage::from_jsonl_str(ANSWERS).unwrap();
        let mut score = bleu_scorer(&storage, "answer", "gold", SentenceBleu::new(Smoothing::Method1)).unwrap();

        assert!((score(&result(0)).unwrap() - 1.0).abs() < 1e-12);
        assert_eq!(score(&result(1)).unwrap(), 0.0);
        assert!(matches!(
            score(&result(2)),
            Err(BoError::Corpus(CorpusError::MissingKey { ref key })) if key == "answer"
        ));
        assert!(matches!(
            score(&result(3)),
            Err(BoError::Corpus(CorpusError::MissingKey { ref key })) if key == "gold"
        ));
    }

    #[test]
    fn bleu_scorer_takes_boxed_flavours() {
        let storage = JsonlStorage::from_jsonl_str(ANSWERS).unwrap();
        let mut score = bleu_scorer(&storage, "answer", "gold", BleuKind::Sacre.scorer()).unwrap();
        assert_eq!(score(&result(0)).unwrap(), 1.0);

        assert!(bleu_scorer(&storage, "answer", "references", SacreBleu).is_err());
    }

    #[test]
    fn unknown_field_fails_up_front() {
        let storage = JsonlStorage::from_jsonl_str("{\"score\": 1}").unwrap();
        assert!(field_scorer(&storage, "accuracy").is_err());
    }
}
