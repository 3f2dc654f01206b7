// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Single-line text recognition
//!
//! Components:
//! - `preprocessing` - Image normalization to the model's input tensor
//! - `engine` - Inference engine seam and the ONNX Runtime adapter
//! - `vocabulary` - Symbol table loaded from the bundled artifact
//! - `decoder` - CTC greedy decoding
//! - `recognition` - The end-to-end pipeline with lazy model loading

pub mod decoder;
pub mod engine;
pub mod error;
pub mod metrics;
pub mod preprocessing;
pub mod recognition;
pub mod vocabulary;

pub use decoder::{
    argmax, collapse_best_path, CtcGreedyDecoder, DecodeOptions, Decoded, DecodedText, LogitMatrix,
};
pub use engine::{lock_session, logits_from_output, InferenceEngine, OnnxRecognitionEngine};
pub use error::{DecodeError, EngineError, ErrorKind, OcrError};
pub use metrics::{MetricsSnapshot, RecognitionMetrics};
pub use preprocessing::{
    to_luma_bt601, ImageNormalizer, InputGeometry, NormalizedTensor, REC_INPUT_HEIGHT,
    REC_INPUT_WIDTH,
};
pub use recognition::{LoadedModel, ModelLoader, OnnxModelLoader, RecognitionPipeline};
pub use vocabulary::{Vocabulary, VocabularyError, BLANK_INDEX};
