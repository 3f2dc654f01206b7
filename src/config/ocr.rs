// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Recognition pipeline configuration
//!
//! Resolution order: defaults, then an optional TOML file, then `TEXANT_OCR_*`
//! environment variables. Call [`OcrConfig::validate`] once everything is
//! applied.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::vision::image_utils::DEFAULT_MAX_IMAGE_SIZE;
use crate::vision::ocr::{DecodeOptions, InputGeometry, REC_INPUT_HEIGHT, REC_INPUT_WIDTH};

/// Environment variable prefix for overrides
pub const ENV_PREFIX: &str = "TEXANT_OCR_";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct OcrConfig {
    /// Recognition model (ONNX)
    pub model_path: PathBuf,
    /// Vocabulary artifact (.txt, .json or .yaml)
    pub vocabulary_path: PathBuf,
    pub input_width: u32,
    pub input_height: u32,
    /// ONNX Runtime intra-op threads
    pub intra_threads: usize,
    /// Upload size limit in bytes
    pub max_image_bytes: usize,
    /// Append a space symbol to the vocabulary when missing
    pub use_space_char: bool,
    /// Reject logits whose class count disagrees with the vocabulary
    pub enforce_class_count: bool,
    pub trim_output: bool,
    pub collapse_whitespace: bool,
}

impl Default for OcrConfig {
    fn default() -> Self {
        Self {
            model_path: PathBuf::from("./models/texant/model.onnx"),
            vocabulary_path: PathBuf::from("./models/texant/ocr_metadata.json"),
            input_width: REC_INPUT_WIDTH,
            input_height: REC_INPUT_HEIGHT,
            intra_threads: 4,
            max_image_bytes: DEFAULT_MAX_IMAGE_SIZE,
            use_space_char: false,
            enforce_class_count: true,
            trim_output: false,
            collapse_whitespace: false,
        }
    }
}

impl OcrConfig {
    /// Load configuration from a TOML file
    ///
    /// Settings may sit in an `[ocr]` table or at the top level. Missing keys
    /// keep their defaults; unknown keys are rejected.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;

        let toml_value: toml::Value = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;

        let table = toml_value.get("ocr").cloned().unwrap_or(toml_value);
        let config: OcrConfig = table
            .try_into()
            .with_context(|| format!("Invalid OCR settings in {}", path.display()))?;

        Ok(config)
    }

    /// Defaults with environment overrides applied
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        config.apply_env()?;
        Ok(config)
    }

    /// Apply `TEXANT_OCR_*` overrides from the process environment
    pub fn apply_env(&mut self) -> Result<()> {
        self.apply_overrides(|key| std::env::var(format!("{}{}", ENV_PREFIX, key)).ok())
    }

    /// Apply overrides from an arbitrary key lookup (keys without prefix)
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(val) = lookup("MODEL_PATH") {
            self.model_path = PathBuf::from(val);
        }
        if let Some(val) = lookup("VOCABULARY_PATH") {
            self.vocabulary_path = PathBuf::from(val);
        }
        if let Some(val) = lookup("INPUT_WIDTH") {
            self.input_width = parse_value("INPUT_WIDTH", &val)?;
        }
        if let Some(val) = lookup("INPUT_HEIGHT") {
            self.input_height = parse_value("INPUT_HEIGHT", &val)?;
        }
        if let Some(val) = lookup("INTRA_THREADS") {
            self.intra_threads = parse_value("INTRA_THREADS", &val)?;
        }
        if let Some(val) = lookup("MAX_IMAGE_BYTES") {
            self.max_image_bytes = parse_value("MAX_IMAGE_BYTES", &val)?;
        }
        if let Some(val) = lookup("USE_SPACE_CHAR") {
            self.use_space_char = parse_flag("USE_SPACE_CHAR", &val)?;
        }
        if let Some(val) = lookup("ENFORCE_CLASS_COUNT") {
            self.enforce_class_count = parse_flag("ENFORCE_CLASS_COUNT", &val)?;
        }
        if let Some(val) = lookup("TRIM_OUTPUT") {
            self.trim_output = parse_flag("TRIM_OUTPUT", &val)?;
        }
        if let Some(val) = lookup("COLLAPSE_WHITESPACE") {
            self.collapse_whitespace = parse_flag("COLLAPSE_WHITESPACE", &val)?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.input_width == 0 || self.input_height == 0 {
            anyhow::bail!(
                "Input geometry must be non-zero, got {}x{}",
                self.input_width,
                self.input_height
            );
        }
        if self.intra_threads == 0 {
            anyhow::bail!("intra_threads must be at least 1");
        }
        if self.max_image_bytes == 0 {
            anyhow::bail!("max_image_bytes must be greater than 0");
        }
        Ok(())
    }

    pub fn geometry(&self) -> InputGeometry {
        InputGeometry::new(self.input_width, self.input_height)
    }

    pub fn decode_options(&self) -> DecodeOptions {
        DecodeOptions {
            enforce_class_count: self.enforce_class_count,
            trim_output: self.trim_output,
            collapse_whitespace: self.collapse_whitespace,
        }
    }
}

fn parse_value<T>(key: &str, val: &str) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    val.trim()
        .parse::<T>()
        .map_err(|e| anyhow::anyhow!("Invalid {}{}={:?}: {}", ENV_PREFIX, key, val, e))
}

fn parse_flag(key: &str, val: &str) -> Result<bool> {
    match val.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => anyhow::bail!("Invalid {}{}={:?}: expected a boolean", ENV_PREFIX, key, val),
    }
}
