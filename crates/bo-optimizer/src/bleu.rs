//! Sentence-level BLEU between a target text and its references.
//!
//! Two flavours are provided. [`SentenceBleu`] splits on whitespace and
//! smooths zero n-gram precisions with one of the Chen & Cherry methods.
//! [`SacreBleu`] tokenizes punctuation mteval-style and uses exponential
//! smoothing. Both report scores in `[0, 1]` (method 7 can exceed 1 on
//! near-perfect matches).

use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use bo_types::{config_error, BoError};

/// Highest n-gram order scored.
const MAX_ORDER: usize = 4;
const METHOD1_EPSILON: f64 = 0.1;
const METHOD4_K: f64 = 5.0;

/// Scores a target text against one or more references.
pub trait Score: Send + Sync {
    fn score(&self, target: &str, references: &[String]) -> f64;
}

impl<S: Score + ?Sized> Score for Box<S> {
    fn score(&self, target: &str, references: &[String]) -> f64 {
        (**self).score(target, references)
    }
}

// ---- N-gram statistics ----

fn ngram_counts<T: Hash + Eq>(tokens: &[T], n: usize) -> HashMap<&[T], usize> {
    let mut counts = HashMap::new();
    if n > 0 {
        for gram in tokens.windows(n) {
            *counts.entry(gram).or_insert(0) += 1;
        }
    }
    counts
}

/// `(clipped matches, hypothesis n-grams)` for one order. Each hypothesis
/// n-gram counts at most as often as it appears in any single reference.
fn clipped_matches<T: Hash + Eq>(hypothesis: &[T], references: &[Vec<T>], n: usize) -> (usize, usize) {
    let counts = ngram_counts(hypothesis, n);
    let reference_counts: Vec<_> = references.iter().map(|r| ngram_counts(r, n)).collect();

    let matches = counts
        .iter()
        .map(|(gram, &count)| {
            let max_ref = reference_counts
                .iter()
                .map(|rc| rc.get(*gram).copied().unwrap_or(0))
                .max()
                .unwrap_or(0);
            count.min(max_ref)
        })
        .sum();
    (matches, counts.values().sum())
}

/// Modified precision as a `(numerator, denominator)` pair, denominator at
/// least 1.
fn modified_precision<T: Hash + Eq>(hypothesis: &[T], references: &[Vec<T>], n: usize) -> (usize, usize) {
    let (matches, total) = clipped_matches(hypothesis, references, n);
    (matches, total.max(1))
}

/// Reference length closest to `hyp_len`, the shorter one on ties.
fn closest_reference_length(hyp_len: usize, ref_lens: impl Iterator<Item = usize>) -> usize {
    ref_lens
        .min_by_key(|&len| (len.abs_diff(hyp_len), len))
        .unwrap_or(0)
}

fn brevity_penalty(ref_len: usize, hyp_len: usize) -> f64 {
    if hyp_len > ref_len {
        1.0
    } else if hyp_len == 0 {
        0.0
    } else {
        (1.0 - ref_len as f64 / hyp_len as f64).exp()
    }
}

// ---- Smoothing ----

/// Smoothing applied to zero n-gram precisions (Chen & Cherry, 2014).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Smoothing {
    /// No smoothing; a zero precision becomes the smallest positive float.
    Method0,
    /// Add epsilon (0.1) to zero-count numerators.
    Method1,
    /// Geometric back-off scaled by the hypothesis length.
    Method4,
    /// Method 4 followed by averaging with the neighbouring orders.
    #[default]
    Method7,
}

impl Smoothing {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Method0 => "method0",
            Self::Method1 => "method1",
            Self::Method4 => "method4",
            Self::Method7 => "method7",
        }
    }

    fn apply<T: Hash + Eq>(
        self,
        precisions: &[(usize, usize)],
        hypothesis: &[T],
        references: &[Vec<T>],
    ) -> Vec<f64> {
        match self {
            Self::Method0 => precisions
                .iter()
                .map(|&(num, den)| {
                    if num == 0 {
                        f64::MIN_POSITIVE
                    } else {
                        num as f64 / den as f64
                    }
                })
                .collect(),
            Self::Method1 => precisions
                .iter()
                .map(|&(num, den)| {
                    if num == 0 {
                        METHOD1_EPSILON / den as f64
                    } else {
                        num as f64 / den as f64
                    }
                })
                .collect(),
            Self::Method4 => geometric_backoff(precisions, hypothesis.len()),
            Self::Method7 => {
                let smoothed = geometric_backoff(precisions, hypothesis.len());
                let next = modified_precision(hypothesis, references, MAX_ORDER + 1);
                average_neighbours(smoothed, next)
            }
        }
    }
}

fn geometric_backoff(precisions: &[(usize, usize)], hyp_len: usize) -> Vec<f64> {
    let mut increment = 1;
    precisions
        .iter()
        .map(|&(num, den)| {
            if num == 0 && hyp_len > 1 {
                let numerator = 1.0 / (2f64.powi(increment) * METHOD4_K / (hyp_len as f64).ln());
                increment += 1;
                numerator / den as f64
            } else {
                num as f64 / den as f64
            }
        })
        .collect()
}

/// Replace each precision with the mean of itself, the previous smoothed
/// value and the next unsmoothed one. `next` is the precision one order past
/// the last.
fn average_neighbours(mut precisions: Vec<f64>, next: (usize, usize)) -> Vec<f64> {
    let Some(&first) = precisions.first() else {
        return precisions;
    };
    let mut following = precisions.clone();
    following.push(next.0 as f64 / next.1 as f64);

    let mut previous = first + 1.0;
    for (i, value) in precisions.iter_mut().enumerate() {
        *value = (previous + *value + following[i + 1]) / 3.0;
        previous = *value;
    }
    precisions
}

impl fmt::Display for Smoothing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Smoothing {
    type Err = BoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "method0" | "none" => Ok(Self::Method0),
            "method1" => Ok(Self::Method1),
            "method4" => Ok(Self::Method4),
            "method7" => Ok(Self::Method7),
            _ => Err(config_error!(
                "Invalid smoothing function: {}. Valid options: method0, method1, method4, method7",
                s
            )),
        }
    }
}

impl TryFrom<String> for Smoothing {
    type Error = BoError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<Smoothing> for String {
    fn from(smoothing: Smoothing) -> Self {
        smoothing.as_str().to_string()
    }
}

// ---- Sentence BLEU ----

/// Uniformly weighted 1..=4-gram BLEU of `hypothesis` against `references`.
///
/// Returns 0 when no unigram matches, before any smoothing.
pub fn sentence_bleu<T: Hash + Eq>(hypothesis: &[T], references: &[Vec<T>], smoothing: Smoothing) -> f64 {
    let precisions: Vec<(usize, usize)> = (1..=MAX_ORDER)
        .map(|n| modified_precision(hypothesis, references, n))
        .collect();
    if precisions[0].0 == 0 {
        return 0.0;
    }

    let hyp_len = hypothesis.len();
    let ref_len = closest_reference_length(hyp_len, references.iter().map(Vec::len));
    let weight = 1.0 / MAX_ORDER as f64;
    let log_sum: f64 = smoothing
        .apply(&precisions, hypothesis, references)
        .iter()
        .map(|&p| weight * p.max(f64::MIN_POSITIVE).ln())
        .sum();

    brevity_penalty(ref_len, hyp_len) * log_sum.exp()
}

/// Whitespace-tokenized sentence BLEU.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SentenceBleu {
    smoothing: Smoothing,
}

impl SentenceBleu {
    pub fn new(smoothing: Smoothing) -> Self {
        Self { smoothing }
    }

    /// Build from a smoothing name, rejecting unknown names.
    pub fn from_name(smoothing: &str) -> Result<Self, BoError> {
        Ok(Self::new(smoothing.parse()?))
    }

    pub fn smoothing(&self) -> Smoothing {
        self.smoothing
    }
}

impl Score for SentenceBleu {
    fn score(&self, target: &str, references: &[String]) -> f64 {
        let hypothesis: Vec<&str> = target.split_whitespace().collect();
        let references: Vec<Vec<&str>> = references
            .iter()
            .map(|r| r.split_whitespace().collect())
            .collect();
        sentence_bleu(&hypothesis, &references, self.smoothing)
    }
}

// ---- mteval-style BLEU ----

fn is_mteval_punctuation(c: char) -> bool {
    matches!(c, '{'..='~' | '['..='`' | ' '..='&' | '('..='+' | ':'..='@' | '/')
}

/// mteval 13a tokenization: symbols become their own tokens, periods and
/// commas split unless they sit between digits, and a dash splits after a
/// digit.
pub fn tokenize_13a(text: &str) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    let mut spaced = String::with_capacity(text.len() * 2);

    for (i, &c) in chars.iter().enumerate() {
        let prev_digit = i > 0 && chars[i - 1].is_ascii_digit();
        let next_digit = chars.get(i + 1).is_some_and(char::is_ascii_digit);
        let split = match c {
            '.' | ',' => !(prev_digit && next_digit),
            '-' => prev_digit,
            _ => is_mteval_punctuation(c),
        };
        if split {
            spaced.push(' ');
            spaced.push(c);
            spaced.push(' ');
        } else {
            spaced.push(c);
        }
    }

    spaced.split_whitespace().map(str::to_string).collect()
}

/// BLEU with exponential smoothing over pre-tokenized text: the `m`-th order
/// with no match gets precision `1 / (2^m * total)`. A hypothesis shorter
/// than four tokens scores 0.
pub fn exp_smoothed_bleu<T: Hash + Eq>(hypothesis: &[T], references: &[Vec<T>]) -> f64 {
    if hypothesis.is_empty() {
        return 0.0;
    }

    let mut smooth = 1.0;
    let mut log_sum = 0.0;
    for n in 1..=MAX_ORDER {
        let (matches, total) = clipped_matches(hypothesis, references, n);
        if total == 0 {
            return 0.0;
        }
        let precision = if matches == 0 {
            smooth *= 2.0;
            1.0 / (smooth * total as f64)
        } else {
            matches as f64 / total as f64
        };
        log_sum += precision.ln();
    }

    let hyp_len = hypothesis.len();
    let ref_len = closest_reference_length(hyp_len, references.iter().map(Vec::len));
    let penalty = if hyp_len < ref_len {
        (1.0 - ref_len as f64 / hyp_len as f64).exp()
    } else {
        1.0
    };
    penalty * (log_sum / MAX_ORDER as f64).exp()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SacreBleu;

impl Score for SacreBleu {
    fn score(&self, target: &str, references: &[String]) -> f64 {
        let hypothesis = tokenize_13a(target);
        let references: Vec<Vec<String>> = references.iter().map(|r| tokenize_13a(r)).collect();
        exp_smoothed_bleu(&hypothesis, &references)
    }
}

/// Which BLEU flavour a run scores with.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BleuKind {
    Sentence {
        #[serde(default)]
        smoothing: Smoothing,
    },
    Sacre,
}

impl Default for BleuKind {
    fn default() -> Self {
        Self::Sentence {
            smoothing: Smoothing::default(),
        }
    }
}

impl BleuKind {
    pub fn scorer(self) -> Box<dyn Score> {
        match self {
            Self::Sentence { smoothing } => Box::new(SentenceBleu::new(smoothing)),
            Self::Sacre => Box::new(SacreBleu),
        }
    }
}
