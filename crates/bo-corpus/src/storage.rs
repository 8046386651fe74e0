//! Row-oriented storage of raw corpus items.

use std::fmt::Debug;
use std::ops::Range;
use std::path::Path;

use serde_json::Value;

use bo_types::{BoResult, CorpusError};

/// One corpus item: a JSON object.
pub type Record = serde_json::Map<String, Value>;

/// Read access to corpus items by position.
pub trait Storage: Send + Sync + Debug {
    /// Field names, in first-seen order.
    fn keys(&self) -> Vec<String>;

    fn len(&self) -> usize;

    fn get(&self, idx: usize) -> Option<&Record>;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// All values of one field, `Null` where a record lacks it.
    fn column(&self, key: &str) -> Result<Vec<Value>, CorpusError> {
        if !self.keys().iter().any(|k| k == key) {
            return Err(CorpusError::MissingKey {
                key: key.to_string(),
            });
        }
        Ok((0..self.len())
            .map(|idx| {
                self.get(idx)
                    .and_then(|record| record.get(key))
                    .cloned()
                    .unwrap_or(Value::Null)
            })
            .collect())
    }

    /// Records in `range`, clamped to the storage length.
    fn slice(&self, range: Range<usize>) -> Vec<&Record> {
        let end = range.end.min(self.len());
        (range.start..end).filter_map(|idx| self.get(idx)).collect()
    }
}

// ---- In-memory JSONL storage ----

/// Keeps every record in memory. Fast, but sized by available RAM.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct JsonlStorage {
    records: Vec<Record>,
    keys: Vec<String>,
}

impl JsonlStorage {
    pub fn from_records(records: Vec<Record>) -> Self {
        let mut keys: Vec<String> = Vec::new();
        for record in &records {
            for key in record.keys() {
                if !keys.contains(key) {
                    keys.push(key.clone());
                }
            }
        }
        Self { records, keys }
    }

    /// Parse one JSON object per line. Blank lines are skipped.
    pub fn from_jsonl_str(text: &str) -> Result<Self, CorpusError> {
        let mut records = Vec::new();
        for (line_idx, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let value: Value = serde_json::from_str(line).map_err(|e| CorpusError::Parse {
                line: line_idx + 1,
                message: e.to_string(),
            })?;
            match value {
                Value::Object(record) => records.push(record),
                other => {
                    return Err(CorpusError::Parse {
                        line: line_idx + 1,
                        message: format!("expected a JSON object, got {other}"),
                    })
                }
            }
        }
        Ok(Self::from_records(records))
    }

    pub fn from_jsonl_file<P: AsRef<Path>>(path: P) -> BoResult<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(CorpusError::FileNotFound {
                path: path.display().to_string(),
            }
            .into());
        }
        if !path.is_file() {
            return Err(CorpusError::NotAFile {
                path: path.display().to_string(),
            }
            .into());
        }

        tracing::info!("Loading JSONL corpus from: {}", path.display());
        let text = std::fs::read_to_string(path)?;
        let storage = Self::from_jsonl_str(&text)?;
        tracing::info!("Loaded {} records from {}", storage.len(), path.display());
        Ok(storage)
    }
}

impl Storage for JsonlStorage {
    fn keys(&self) -> Vec<String> {
        self.keys.clone()
    }

    fn len(&self) -> usize {
        self.records.len()
    }

    fn get(&self, idx: usize) -> Option<&Record> {
        self.records.get(idx)
    }
}

// ---- Concatenation ----

/// Several storages read back to back as one.
#[derive(Debug, Default)]
pub struct ConcatStorage {
    parts: Vec<Box<dyn Storage>>,
}

impl ConcatStorage {
    pub fn new(parts: Vec<Box<dyn Storage>>) -> Self {
        Self { parts }
    }

    pub fn push(&mut self, part: Box<dyn Storage>) {
        self.parts.push(part);
    }
}

impl Storage for ConcatStorage {
    fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = Vec::new();
        for key in self.parts.iter().flat_map(|p| p.keys()) {
            if !keys.contains(&key) {
                keys.push(key);
            }
        }
        keys
    }

    fn len(&self) -> usize {
        self.parts.iter().map(|p| p.len()).sum()
    }

    fn get(&self, mut idx: usize) -> Option<&Record> {
        for part in &self.parts {
            if idx < part.len() {
                return part.get(idx);
            }
            idx -= part.len();
        }
        None
    }
}
