// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Inference engine seam and the ONNX Runtime adapter
//!
//! The pipeline treats the recognition model as an opaque function from a
//! [`NormalizedTensor`] to a [`LogitMatrix`]. [`OnnxRecognitionEngine`] is the
//! production implementation; tests substitute their own engines.

use anyhow::{Context, Result};
use ndarray::ArrayViewD;
use ort::execution_providers::CPU as CPUExecutionProvider;
use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;
use ort::value::Value;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info, warn};

use super::decoder::LogitMatrix;
use super::error::EngineError;
use super::preprocessing::{InputGeometry, NormalizedTensor};

/// Fixed-contract recognition model
///
/// Implementations must be deterministic for identical input and safe to
/// share across threads.
pub trait InferenceEngine: Send + Sync {
    /// Run the model on one normalized tensor
    fn infer(&self, input: &NormalizedTensor) -> Result<LogitMatrix, EngineError>;

    /// Class count per timestep, if known ahead of inference
    fn num_classes(&self) -> Option<usize>;

    /// Human-readable engine name for logs
    fn name(&self) -> &str;
}

/// Convert a raw model output into a logit matrix
///
/// Accepts `[1, time_steps, num_classes]` or `[time_steps, num_classes]`.
pub fn logits_from_output(output: ArrayViewD<'_, f32>) -> Result<LogitMatrix, EngineError> {
    let shape = output.shape().to_vec();

    let (time_steps, num_classes) = match shape.as_slice() {
        [1, t, c] => (*t, *c),
        [t, c] => (*t, *c),
        _ => return Err(EngineError::UnexpectedOutputShape(shape)),
    };

    let data: Vec<f32> = output.iter().copied().collect();
    LogitMatrix::from_shape_vec(time_steps, num_classes, data)
        .map_err(|_| EngineError::UnexpectedOutputShape(shape))
}

/// Lock a shared engine resource, recovering it if a previous request panicked
///
/// The pipeline turns engine panics into per-request failures, so a panic
/// while the guard is held must not disable the engine for later requests.
pub fn lock_session<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| {
        warn!("Recovering engine session after a panicked request");
        mutex.clear_poison();
        poisoned.into_inner()
    })
}

/// CRNN-style recognition model running on ONNX Runtime (CPU only)
#[derive(Clone)]
pub struct OnnxRecognitionEngine {
    /// ONNX Runtime session; `run` needs exclusive access
    session: Arc<Mutex<Session>>,
    /// Model input name
    input_name: String,
    /// Expected input geometry
    geometry: InputGeometry,
    /// Class count observed by the load-time probe
    num_classes: usize,
    model_name: String,
}

impl std::fmt::Debug for OnnxRecognitionEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OnnxRecognitionEngine")
            .field("model_name", &self.model_name)
            .field("input_name", &self.input_name)
            .field("geometry", &self.geometry)
            .field("num_classes", &self.num_classes)
            .finish_non_exhaustive()
    }
}

impl OnnxRecognitionEngine {
    /// Load a recognition model from disk
    ///
    /// # Errors
    /// Returns error if:
    /// - Model file not found
    /// - ONNX Runtime initialization fails
    /// - The probe inference fails or yields an unusable output shape
    pub fn load<P: AsRef<Path>>(
        model_path: P,
        geometry: InputGeometry,
        intra_threads: usize,
    ) -> Result<Self> {
        let model_path = model_path.as_ref();

        if !model_path.exists() {
            anyhow::bail!("OCR recognition model not found: {}", model_path.display());
        }

        info!(
            "Loading OCR recognition model from {}",
            model_path.display()
        );

        let session = Session::builder()
            .context("Failed to create session builder")?
            .with_execution_providers([CPUExecutionProvider::default().build()])
            .map_err(ort::Error::<()>::from)
            .context("Failed to set CPU execution provider")?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(ort::Error::<()>::from)
            .context("Failed to set optimization level")?
            .with_intra_threads(intra_threads)
            .map_err(ort::Error::<()>::from)
            .context("Failed to set intra threads")?
            .commit_from_file(model_path)
            .map_err(ort::Error::<()>::from)
            .context(format!(
                "Failed to load OCR recognition model from {}",
                model_path.display()
            ))?;

        let input_name = session
            .inputs()
            .first()
            .map(|input| input.name().to_string())
            .unwrap_or_else(|| "input".to_string());

        let model_name = model_path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("model")
            .to_string();

        let mut engine = Self {
            session: Arc::new(Mutex::new(session)),
            input_name,
            geometry,
            num_classes: 0,
            model_name,
        };

        // Probe with a blank input to learn the class count
        let probe = engine
            .run(&NormalizedTensor::zeros(geometry))
            .context("Probe inference failed")?;
        if probe.num_classes() < 2 {
            anyhow::bail!(
                "Model produced {} classes; need the blank plus at least one symbol",
                probe.num_classes()
            );
        }
        engine.num_classes = probe.num_classes();

        info!(
            "✅ OCR recognition model loaded (CPU-only): input {} {:?}, {} timesteps x {} classes",
            engine.input_name,
            geometry.tensor_shape(),
            probe.time_steps(),
            engine.num_classes
        );

        Ok(engine)
    }

    fn run(&self, input: &NormalizedTensor) -> Result<LogitMatrix, EngineError> {
        let expected = self.geometry.tensor_shape();
        if input.shape() != expected {
            return Err(EngineError::InvalidInputShape {
                expected,
                actual: input.shape().to_vec(),
            });
        }

        let input_value = Value::from_array(input.as_array().to_owned())
            .map_err(|e| EngineError::Runtime(format!("Failed to create input tensor: {}", e)))?;

        let mut session = lock_session(&self.session);

        let outputs = session
            .run(ort::inputs![&self.input_name => input_value])
            .map_err(|e| EngineError::Runtime(format!("Recognition inference failed: {}", e)))?;

        let output_tensor = outputs[0]
            .try_extract_array::<f32>()
            .map_err(|e| EngineError::Runtime(format!("Failed to extract output tensor: {}", e)))?;

        debug!("Recognition output shape: {:?}", output_tensor.shape());

        logits_from_output(output_tensor)
    }
}

impl InferenceEngine for OnnxRecognitionEngine {
    fn infer(&self, input: &NormalizedTensor) -> Result<LogitMatrix, EngineError> {
        self.run(input)
    }

    fn num_classes(&self) -> Option<usize> {
        Some(self.num_classes)
    }

    fn name(&self) -> &str {
        &self.model_name
    }
}
