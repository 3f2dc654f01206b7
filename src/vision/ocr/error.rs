// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Recognition error types
//!
//! Every stage of the pipeline has its own error type. They all collapse into
//! [`OcrError`] at the pipeline boundary, so callers see exactly one of four
//! outcomes:
//!
//! - **InvalidImage**: the byte buffer could not be decoded into a pixel grid
//! - **ModelUnavailable**: the model or vocabulary failed to load (latched)
//! - **InferenceFailed**: the loaded engine faulted on this particular input
//! - **VocabularyMismatch**: the model's class count disagrees with the vocabulary
//!
//! Sentinel strings such as `[OCR unavailable]` are only meant for the
//! presentation layer; see [`OcrError::sentinel`].

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::vision::image_utils::ImageError;

/// Discriminant of an [`OcrError`], convenient for metrics and status mapping
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    InvalidImage,
    ModelUnavailable,
    InferenceFailed,
    VocabularyMismatch,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::InvalidImage => "invalid_image",
            ErrorKind::ModelUnavailable => "model_unavailable",
            ErrorKind::InferenceFailed => "inference_failed",
            ErrorKind::VocabularyMismatch => "vocabulary_mismatch",
        };
        f.write_str(name)
    }
}

/// Structured failure returned by [`RecognitionPipeline::recognize`]
///
/// [`RecognitionPipeline::recognize`]: crate::vision::ocr::RecognitionPipeline::recognize
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OcrError {
    #[error("Invalid image: {0}")]
    InvalidImage(String),

    #[error("OCR model unavailable: {0}")]
    ModelUnavailable(String),

    #[error("Inference failed: {0}")]
    InferenceFailed(String),

    #[error("Vocabulary mismatch: {0}")]
    VocabularyMismatch(String),
}

impl OcrError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            OcrError::InvalidImage(_) => ErrorKind::InvalidImage,
            OcrError::ModelUnavailable(_) => ErrorKind::ModelUnavailable,
            OcrError::InferenceFailed(_) => ErrorKind::InferenceFailed,
            OcrError::VocabularyMismatch(_) => ErrorKind::VocabularyMismatch,
        }
    }

    /// User-facing rendering of the failure
    ///
    /// Never mixed with decoded text: a caller either shows the decoded string
    /// or one of these sentinels.
    pub fn sentinel(&self) -> &'static str {
        match self {
            OcrError::InvalidImage(_) => "[Invalid image]",
            OcrError::ModelUnavailable(_) => "[OCR unavailable]",
            OcrError::InferenceFailed(_) => "[OCR failed]",
            OcrError::VocabularyMismatch(_) => "[OCR vocabulary mismatch]",
        }
    }

    /// Whether retrying the same request against the same process can succeed
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, OcrError::ModelUnavailable(_))
    }
}

/// Runtime fault raised by an inference engine for a single input
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    #[error("Invalid input shape: {actual:?}, expected {expected:?}")]
    InvalidInputShape {
        expected: [usize; 4],
        actual: Vec<usize>,
    },

    #[error("Unexpected output shape: {0:?}")]
    UnexpectedOutputShape(Vec<usize>),

    #[error("Engine runtime error: {0}")]
    Runtime(String),
}

/// Decoder failure
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error(
        "model produced {num_classes} classes but vocabulary holds {vocabulary_len} symbols (+1 blank)"
    )]
    ClassCountMismatch {
        num_classes: usize,
        vocabulary_len: usize,
    },
}

impl From<ImageError> for OcrError {
    fn from(err: ImageError) -> Self {
        OcrError::InvalidImage(err.to_string())
    }
}

impl From<EngineError> for OcrError {
    fn from(err: EngineError) -> Self {
        OcrError::InferenceFailed(err.to_string())
    }
}

impl From<DecodeError> for OcrError {
    fn from(err: DecodeError) -> Self {
        OcrError::VocabularyMismatch(err.to_string())
    }
}
