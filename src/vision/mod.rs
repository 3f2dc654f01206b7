// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Vision processing module for CPU-based text recognition
//!
//! Runs on CPU only; the recognition model is small and single-line.

pub mod image_utils;
pub mod ocr;

pub use image_utils::{decode_image_bytes, detect_format, ImageError, ImageInfo};
pub use ocr::{DecodedText, ErrorKind, OcrError, RecognitionPipeline};
