// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
pub mod ocr;

pub use ocr::{OcrConfig, ENV_PREFIX};
