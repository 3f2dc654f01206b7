// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
use anyhow::{anyhow, Result};
use clap::Args;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info};

use crate::config::OcrConfig;
use crate::vision::ocr::{ErrorKind, OcrError, RecognitionPipeline};

/// Arguments for the recognize command
#[derive(Args, Debug)]
pub struct RecognizeArgs {
    /// Image files to recognize
    #[arg(required = true)]
    pub images: Vec<PathBuf>,

    /// TOML configuration file
    #[arg(long, env = "TEXANT_OCR_CONFIG")]
    pub config: Option<PathBuf>,

    /// Print one JSON object per image
    #[arg(long)]
    pub json: bool,
}

/// Arguments for the check command
#[derive(Args, Debug)]
pub struct CheckArgs {
    /// TOML configuration file
    #[arg(long, env = "TEXANT_OCR_CONFIG")]
    pub config: Option<PathBuf>,
}

/// One line of `recognize --json` output
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecognitionOutput {
    pub path: String,
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl RecognitionOutput {
    /// Build an output line; failures carry their sentinel as `text`
    pub fn from_result(path: &Path, result: &Result<String, OcrError>) -> Self {
        let path = path.display().to_string();
        match result {
            Ok(text) => Self {
                path,
                text: text.clone(),
                error: None,
                detail: None,
            },
            Err(e) => Self {
                path,
                text: e.sentinel().to_string(),
                error: Some(e.kind()),
                detail: Some(e.to_string()),
            },
        }
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// Defaults, then the config file, then `TEXANT_OCR_*` overrides
pub fn load_config(path: Option<&Path>) -> Result<OcrConfig> {
    let mut config = match path {
        Some(path) => OcrConfig::from_file(path)?,
        None => OcrConfig::default(),
    };
    config.apply_env()?;
    config.validate()?;
    Ok(config)
}

/// Recognize every image given on the command line
pub async fn recognize_images(args: RecognizeArgs) -> Result<()> {
    let config = load_config(args.config.as_deref())?;
    let pipeline = Arc::new(RecognitionPipeline::from_config(&config));

    let mut handles = Vec::with_capacity(args.images.len());
    for path in args.images {
        let pipeline = Arc::clone(&pipeline);
        handles.push(tokio::spawn(async move {
            let result = match tokio::fs::read(&path).await {
                Ok(bytes) => pipeline
                    .recognize_async(bytes)
                    .await
                    .map(String::from),
                Err(e) => Err(OcrError::InvalidImage(format!(
                    "Failed to read {}: {}",
                    path.display(),
                    e
                ))),
            };
            RecognitionOutput::from_result(&path, &result)
        }));
    }

    let mut failures = 0usize;
    for handle in handles {
        let output = handle
            .await
            .map_err(|e| anyhow!("Recognition task failed: {}", e))?;

        if !output.is_success() {
            failures += 1;
            if let Some(detail) = &output.detail {
                error!("{}: {}", output.path, detail);
            }
        }

        if args.json {
            println!("{}", serde_json::to_string(&output)?);
        } else {
            println!("{}: {}", output.path, output.text);
        }
    }

    let metrics = pipeline.metrics();
    info!(
        "Processed {} images ({} failed, avg {:.1}ms)",
        metrics.requests_total,
        metrics.requests_failed(),
        metrics.avg_duration_ms()
    );

    if failures > 0 {
        return Err(anyhow!("{} image(s) could not be recognized", failures));
    }
    Ok(())
}

/// Load the model once and report what was found
pub async fn check_model(args: CheckArgs) -> Result<()> {
    let config = load_config(args.config.as_deref())?;
    println!("🔍 Model:      {}", config.model_path.display());
    println!("🔍 Vocabulary: {}", config.vocabulary_path.display());

    let pipeline = Arc::new(RecognitionPipeline::from_config(&config));
    let loader = Arc::clone(&pipeline);
    let model = tokio::task::spawn_blocking(move || loader.preload())
        .await
        .map_err(|e| anyhow!("Model load task failed: {}", e))??;

    println!("✅ Vocabulary symbols: {}", model.vocabulary().len());
    match model.engine().num_classes() {
        Some(num_classes) => println!("✅ Model classes:      {}", num_classes),
        None => println!("✅ Model classes:      unknown"),
    }
    println!(
        "✅ Input geometry:     {}x{}",
        config.input_width, config.input_height
    );
    Ok(())
}
