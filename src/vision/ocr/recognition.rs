// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Single-line recognition pipeline
//!
//! `bytes -> NormalizedTensor -> LogitMatrix -> DecodedText`
//!
//! The model and vocabulary are loaded once, on first use, and shared
//! read-only by every later request. A failed load is latched: the pipeline
//! keeps answering `ModelUnavailable` without touching the loader again.

use anyhow::{Context, Result};
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::path::PathBuf;
use std::sync::{Arc, OnceLock};
use std::time::Instant;
use tracing::{debug, info, warn};

use super::decoder::{CtcGreedyDecoder, DecodedText};
use super::engine::{InferenceEngine, OnnxRecognitionEngine};
use super::error::OcrError;
use super::metrics::{MetricsSnapshot, RecognitionMetrics};
use super::preprocessing::{ImageNormalizer, InputGeometry};
use super::vocabulary::Vocabulary;
use crate::config::OcrConfig;

/// Engine and vocabulary, validated against each other
pub struct LoadedModel {
    engine: Arc<dyn InferenceEngine>,
    vocabulary: Arc<Vocabulary>,
}

impl std::fmt::Debug for LoadedModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoadedModel")
            .field("engine", &self.engine.name())
            .field("num_classes", &self.engine.num_classes())
            .field("vocabulary_len", &self.vocabulary.len())
            .finish()
    }
}

impl LoadedModel {
    /// Pair an engine with a vocabulary
    ///
    /// Fails if the engine reports a class count other than
    /// `vocabulary.len() + 1`.
    pub fn new(engine: Arc<dyn InferenceEngine>, vocabulary: Vocabulary) -> Result<Self> {
        if let Some(num_classes) = engine.num_classes() {
            if num_classes != vocabulary.num_classes() {
                anyhow::bail!(
                    "Model {} produces {} classes but vocabulary has {} symbols (expected {} classes)",
                    engine.name(),
                    num_classes,
                    vocabulary.len(),
                    vocabulary.num_classes()
                );
            }
        }

        Ok(Self {
            engine,
            vocabulary: Arc::new(vocabulary),
        })
    }

    pub fn engine(&self) -> &Arc<dyn InferenceEngine> {
        &self.engine
    }

    pub fn vocabulary(&self) -> &Vocabulary {
        &self.vocabulary
    }
}

/// Produces the model/vocabulary pair on first use
pub trait ModelLoader: Send + Sync {
    fn load(&self) -> Result<LoadedModel>;
}

impl<F> ModelLoader for F
where
    F: Fn() -> Result<LoadedModel> + Send + Sync,
{
    fn load(&self) -> Result<LoadedModel> {
        self()
    }
}

/// Loads an ONNX recognition model and its vocabulary artifact from disk
#[derive(Debug, Clone)]
pub struct OnnxModelLoader {
    pub model_path: PathBuf,
    pub vocabulary_path: PathBuf,
    pub geometry: InputGeometry,
    pub intra_threads: usize,
    pub use_space_char: bool,
}

impl OnnxModelLoader {
    pub fn from_config(config: &OcrConfig) -> Self {
        Self {
            model_path: config.model_path.clone(),
            vocabulary_path: config.vocabulary_path.clone(),
            geometry: config.geometry(),
            intra_threads: config.intra_threads,
            use_space_char: config.use_space_char,
        }
    }
}

impl ModelLoader for OnnxModelLoader {
    fn load(&self) -> Result<LoadedModel> {
        let mut vocabulary = Vocabulary::from_file(&self.vocabulary_path)
            .context("Failed to load OCR vocabulary")?;
        if self.use_space_char {
            vocabulary = vocabulary.with_space_char();
        }

        let engine =
            OnnxRecognitionEngine::load(&self.model_path, self.geometry, self.intra_threads)?;

        LoadedModel::new(Arc::new(engine), vocabulary)
    }
}

/// Orchestrates normalization, inference and decoding for one image at a time
///
/// Safe to share behind an `Arc` across threads and tasks.
pub struct RecognitionPipeline {
    normalizer: ImageNormalizer,
    decoder: CtcGreedyDecoder,
    loader: Box<dyn ModelLoader>,
    model: OnceLock<Result<Arc<LoadedModel>, String>>,
    metrics: RecognitionMetrics,
}

impl std::fmt::Debug for RecognitionPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecognitionPipeline")
            .field("normalizer", &self.normalizer)
            .field("decoder", &self.decoder)
            .field("model", &self.model.get())
            .finish_non_exhaustive()
    }
}

impl RecognitionPipeline {
    pub fn new(
        normalizer: ImageNormalizer,
        decoder: CtcGreedyDecoder,
        loader: impl ModelLoader + 'static,
    ) -> Self {
        Self {
            normalizer,
            decoder,
            loader: Box::new(loader),
            model: OnceLock::new(),
            metrics: RecognitionMetrics::new(),
        }
    }

    /// Pipeline backed by the ONNX model and vocabulary named in `config`
    ///
    /// Nothing is loaded until the first request (or [`Self::preload`]).
    pub fn from_config(config: &OcrConfig) -> Self {
        let normalizer =
            ImageNormalizer::new(config.geometry()).with_max_image_bytes(config.max_image_bytes);
        let decoder = CtcGreedyDecoder::new(config.decode_options());
        Self::new(normalizer, decoder, OnnxModelLoader::from_config(config))
    }

    /// Recognize the text line in an encoded image
    pub fn recognize(&self, bytes: &[u8]) -> Result<DecodedText, OcrError> {
        let started = Instant::now();
        let result = self.run(bytes);
        let duration_ms = started.elapsed().as_millis() as u64;

        match &result {
            Ok(text) => {
                debug!("Recognized {} chars in {}ms", text.as_str().chars().count(), duration_ms);
                self.metrics.record_success(duration_ms);
            }
            Err(e) => {
                warn!("OCR request failed ({}): {}", e.kind(), e);
                self.metrics.record_failure(e.kind(), duration_ms);
            }
        }

        result
    }

    /// [`Self::recognize`] on tokio's blocking pool
    pub async fn recognize_async(self: Arc<Self>, bytes: Vec<u8>) -> Result<DecodedText, OcrError> {
        tokio::task::spawn_blocking(move || self.recognize(&bytes))
            .await
            .unwrap_or_else(|e| {
                Err(OcrError::InferenceFailed(format!(
                    "Recognition task failed: {}",
                    e
                )))
            })
    }

    /// Force the one-time model load and report its outcome
    pub fn preload(&self) -> Result<Arc<LoadedModel>, OcrError> {
        self.model()
    }

    /// Whether a load has been attempted and succeeded
    pub fn is_loaded(&self) -> bool {
        matches!(self.model.get(), Some(Ok(_)))
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    fn run(&self, bytes: &[u8]) -> Result<DecodedText, OcrError> {
        let tensor = self.normalizer.normalize(bytes)?;
        let model = self.model()?;

        let logits = panic::catch_unwind(AssertUnwindSafe(|| model.engine.infer(&tensor)))
            .map_err(|payload| {
                OcrError::InferenceFailed(format!(
                    "Engine {} panicked: {}",
                    model.engine.name(),
                    panic_message(payload.as_ref())
                ))
            })??;
        debug!(
            "Engine {} returned {} timesteps x {} classes",
            model.engine.name(),
            logits.time_steps(),
            logits.num_classes()
        );

        let decoded = self.decoder.decode(logits, &model.vocabulary)?;
        if decoded.skipped > 0 {
            warn!(
                "Skipped {} out-of-vocabulary timesteps; model and vocabulary may be out of sync",
                decoded.skipped
            );
            self.metrics.record_skipped_symbols(decoded.skipped);
        }

        Ok(decoded.text)
    }

    fn model(&self) -> Result<Arc<LoadedModel>, OcrError> {
        let slot = self.model.get_or_init(|| {
            self.metrics.record_model_load();
            match panic::catch_unwind(AssertUnwindSafe(|| self.loader.load())) {
                Ok(Ok(model)) => {
                    info!("OCR model ready: {:?}", model);
                    Ok(Arc::new(model))
                }
                Ok(Err(e)) => {
                    warn!("⚠️ OCR model unavailable for this process: {:#}", e);
                    Err(format!("{:#}", e))
                }
                Err(payload) => {
                    let message = format!("Model loader panicked: {}", panic_message(payload.as_ref()));
                    warn!("⚠️ OCR model unavailable for this process: {}", message);
                    Err(message)
                }
            }
        });

        match slot {
            Ok(model) => Ok(Arc::clone(model)),
            Err(message) => Err(OcrError::ModelUnavailable(message.clone())),
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
