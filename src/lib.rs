// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
pub mod cli;
pub mod config;
pub mod vision;

// Re-export main types
pub use config::OcrConfig;
pub use vision::image_utils::{decode_image_bytes, ImageError};
pub use vision::ocr::{
    CtcGreedyDecoder, DecodeOptions, DecodedText, ErrorKind, ImageNormalizer, InferenceEngine,
    LoadedModel, LogitMatrix, ModelLoader, NormalizedTensor, OcrError, OnnxModelLoader,
    OnnxRecognitionEngine, RecognitionPipeline, Vocabulary,
};
