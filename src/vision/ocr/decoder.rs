// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! CTC (Connectionist Temporal Classification) greedy decoding
//!
//! The recognition model emits one score vector per timestep. Decoding takes
//! the best class at every step (best path), then:
//! - drops the blank class (index 0)
//! - collapses consecutive repeats of the same class
//!
//! A blank between two equal classes separates them, so `a _ a` decodes to
//! `aa` while `a a` decodes to `a`.

use ndarray::{Array2, ArrayView1};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;

use super::error::DecodeError;
use super::vocabulary::{Vocabulary, BLANK_INDEX};

/// Per-timestep class scores, shape `[time_steps, num_classes]`
#[derive(Debug, Clone, PartialEq)]
pub struct LogitMatrix {
    scores: Array2<f32>,
}

impl LogitMatrix {
    pub fn new(scores: Array2<f32>) -> Self {
        Self { scores }
    }

    /// Build from row-major data
    pub fn from_shape_vec(
        time_steps: usize,
        num_classes: usize,
        data: Vec<f32>,
    ) -> Result<Self, ndarray::ShapeError> {
        Array2::from_shape_vec((time_steps, num_classes), data).map(Self::new)
    }

    pub fn time_steps(&self) -> usize {
        self.scores.nrows()
    }

    pub fn num_classes(&self) -> usize {
        self.scores.ncols()
    }

    pub fn scores(&self) -> &Array2<f32> {
        &self.scores
    }

    /// Best class of every timestep, in order
    pub fn best_path(&self) -> Vec<usize> {
        self.scores.rows().into_iter().map(argmax).collect()
    }
}

/// Index of the highest score; ties go to the lowest index
///
/// NaN never wins. A row with no comparable score (empty, or all NaN)
/// resolves to the blank.
pub fn argmax(row: ArrayView1<'_, f32>) -> usize {
    let mut max_score = f32::NEG_INFINITY;
    let mut max_index = BLANK_INDEX;

    for (index, &score) in row.iter().enumerate() {
        if score > max_score {
            max_score = score;
            max_index = index;
        }
    }

    max_index
}

/// Final recognized string
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DecodedText(String);

impl DecodedText {
    pub fn new(text: impl Into<String>) -> Self {
        Self(text.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for DecodedText {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for DecodedText {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl From<DecodedText> for String {
    fn from(text: DecodedText) -> Self {
        text.0
    }
}

/// Decoder settings; everything beyond the collapse rule is opt-in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecodeOptions {
    /// Reject logits whose class count is not `vocabulary.len() + 1`
    pub enforce_class_count: bool,
    /// Strip leading and trailing whitespace from the output
    pub trim_output: bool,
    /// Replace every whitespace run with a single space
    pub collapse_whitespace: bool,
}

impl Default for DecodeOptions {
    fn default() -> Self {
        Self {
            enforce_class_count: true,
            trim_output: false,
            collapse_whitespace: false,
        }
    }
}

/// Result of decoding one logit matrix
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decoded {
    pub text: DecodedText,
    /// Timesteps whose best class had no vocabulary symbol
    pub skipped: usize,
}

/// Collapse a best-path class sequence into text
///
/// Out-of-vocabulary classes emit nothing and are counted in
/// [`Decoded::skipped`]; they still update the repeat tracker.
pub fn collapse_best_path(path: &[usize], vocabulary: &Vocabulary) -> Decoded {
    let mut text = String::new();
    let mut skipped = 0usize;
    let mut previous: Option<usize> = None;

    for &index in path {
        if index != BLANK_INDEX && Some(index) != previous {
            match vocabulary.symbol(index) {
                Some(symbol) => text.push_str(symbol),
                None => skipped += 1,
            }
        }
        previous = Some(index);
    }

    Decoded {
        text: DecodedText(text),
        skipped,
    }
}

/// Greedy CTC decoder bound to a set of [`DecodeOptions`]
#[derive(Debug, Clone, Copy, Default)]
pub struct CtcGreedyDecoder {
    options: DecodeOptions,
}

impl CtcGreedyDecoder {
    pub fn new(options: DecodeOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> DecodeOptions {
        self.options
    }

    /// Decode a logit matrix against a vocabulary
    ///
    /// Consumes the matrix; each inference result is decoded exactly once.
    pub fn decode(
        &self,
        logits: LogitMatrix,
        vocabulary: &Vocabulary,
    ) -> Result<Decoded, DecodeError> {
        if self.options.enforce_class_count && logits.num_classes() != vocabulary.num_classes() {
            return Err(DecodeError::ClassCountMismatch {
                num_classes: logits.num_classes(),
                vocabulary_len: vocabulary.len(),
            });
        }

        let path = logits.best_path();
        let mut decoded = collapse_best_path(&path, vocabulary);
        debug!(
            "Decoded {} timesteps into {} chars ({} skipped)",
            path.len(),
            decoded.text.0.chars().count(),
            decoded.skipped
        );

        if self.options.collapse_whitespace {
            decoded.text.0 = decoded
                .text
                .0
                .split_whitespace()
                .collect::<Vec<_>>()
                .join(" ");
        } else if self.options.trim_output {
            decoded.text.0 = decoded.text.0.trim().to_string();
        }

        Ok(decoded)
    }
}
