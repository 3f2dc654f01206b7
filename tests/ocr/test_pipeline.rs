// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1

//! Recognition pipeline tests
//!
//! The ONNX model is replaced by scripted engines so the pipeline's ordering,
//! error mapping and one-time loading can be checked without model files.

use anyhow::Result;
use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use std::io::{Cursor, Write};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;
use texant_ocr::vision::ocr::{
    CtcGreedyDecoder, DecodeOptions, EngineError, ErrorKind, ImageNormalizer, InferenceEngine,
    LoadedModel, LogitMatrix, NormalizedTensor, OnnxModelLoader, RecognitionPipeline, Vocabulary,
};
use texant_ocr::OcrConfig;

/// Replays a fixed best path for every input
struct ScriptedEngine {
    path: Vec<usize>,
    num_classes: usize,
    calls: AtomicUsize,
}

impl ScriptedEngine {
    fn new(path: Vec<usize>, num_classes: usize) -> Self {
        Self {
            path,
            num_classes,
            calls: AtomicUsize::new(0),
        }
    }
}

impl InferenceEngine for ScriptedEngine {
    fn infer(&self, input: &NormalizedTensor) -> Result<LogitMatrix, EngineError> {
        assert_eq!(input.shape(), &[1, 64, 256, 1]);
        self.calls.fetch_add(1, Ordering::SeqCst);

        let mut data = vec![0.0f32; self.path.len() * self.num_classes];
        for (t, &c) in self.path.iter().enumerate() {
            data[t * self.num_classes + c] = 1.0;
        }
        LogitMatrix::from_shape_vec(self.path.len(), self.num_classes, data)
            .map_err(|e| EngineError::Runtime(e.to_string()))
    }

    fn num_classes(&self) -> Option<usize> {
        Some(self.num_classes)
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

/// Fails every call with a runtime error
struct FailingEngine;

impl InferenceEngine for FailingEngine {
    fn infer(&self, _input: &NormalizedTensor) -> Result<LogitMatrix, EngineError> {
        Err(EngineError::Runtime("out of memory".to_string()))
    }

    fn num_classes(&self) -> Option<usize> {
        None
    }

    fn name(&self) -> &str {
        "failing"
    }
}

fn line_image() -> Vec<u8> {
    let image = RgbImage::from_fn(300, 40, |x, _| {
        if x % 30 < 15 {
            Rgb([0, 0, 0])
        } else {
            Rgb([255, 255, 255])
        }
    });
    let mut buf = Cursor::new(Vec::new());
    DynamicImage::ImageRgb8(image)
        .write_to(&mut buf, ImageFormat::Png)
        .unwrap();
    buf.into_inner()
}

fn ab() -> Vocabulary {
    Vocabulary::from_chars("ab").unwrap()
}

fn scripted_pipeline(path: Vec<usize>) -> RecognitionPipeline {
    RecognitionPipeline::new(
        ImageNormalizer::default(),
        CtcGreedyDecoder::default(),
        move || LoadedModel::new(Arc::new(ScriptedEngine::new(path.clone(), 3)), ab()),
    )
}

// =============================================================================
// Decoding through the pipeline
// =============================================================================

/// Test 1: Repeats collapse and blanks separate
#[test]
fn test_recognize_aba() {
    let pipeline = scripted_pipeline(vec![1, 1, 0, 2, 2, 1]);
    let text = pipeline.recognize(&line_image()).unwrap();
    assert_eq!(text.as_str(), "aba");
}

/// Test 2: All-blank predictions yield an empty string, not an error
#[test]
fn test_recognize_all_blank() {
    let pipeline = scripted_pipeline(vec![0; 64]);
    let text = pipeline.recognize(&line_image()).unwrap();
    assert!(text.is_empty());
    assert_eq!(pipeline.metrics().requests_succeeded, 1);
}

/// Test 3: Identical input gives identical output
#[test]
fn test_recognize_is_deterministic() {
    let pipeline = scripted_pipeline(vec![2, 0, 2, 1]);
    let image = line_image();
    let first = pipeline.recognize(&image).unwrap();
    let second = pipeline.recognize(&image).unwrap();
    assert_eq!(first, second);
    assert_eq!(first.as_str(), "bba");
}

/// Test 4: Decode options flow through the pipeline
#[test]
fn test_decode_options_applied() {
    let pipeline = RecognitionPipeline::new(
        ImageNormalizer::default(),
        CtcGreedyDecoder::new(DecodeOptions {
            trim_output: true,
            ..DecodeOptions::default()
        }),
        || {
            LoadedModel::new(
                Arc::new(ScriptedEngine::new(vec![1, 2, 1], 3)),
                Vocabulary::from_chars(" a").unwrap(),
            )
        },
    );
    assert_eq!(pipeline.recognize(&line_image()).unwrap().as_str(), "a");
}

// =============================================================================
// Error mapping
// =============================================================================

/// Test 5: Corrupt input is an invalid image and never reaches the engine
#[test]
fn test_corrupt_input() {
    let engine = Arc::new(ScriptedEngine::new(vec![1], 3));
    let shared = Arc::clone(&engine);
    let pipeline = RecognitionPipeline::new(
        ImageNormalizer::default(),
        CtcGreedyDecoder::default(),
        move || LoadedModel::new(shared.clone(), ab()),
    );

    for bytes in [&b""[..], &b"\x89PNG but not really"[..], &[0u8; 512][..]] {
        let err = pipeline.recognize(bytes).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidImage);
        assert_eq!(err.sentinel(), "[Invalid image]");
    }
    assert_eq!(engine.calls.load(Ordering::SeqCst), 0);
    assert_eq!(pipeline.metrics().invalid_image, 3);
}

/// Test 6: Engine failures surface as inference failures
#[test]
fn test_engine_failure() {
    let pipeline = RecognitionPipeline::new(
        ImageNormalizer::default(),
        CtcGreedyDecoder::default(),
        || LoadedModel::new(Arc::new(FailingEngine), ab()),
    );

    let err = pipeline.recognize(&line_image()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InferenceFailed);
    assert!(err.to_string().contains("out of memory"));
    assert!(err.is_recoverable());
}

/// Test 7: A missing model file latches the unavailable state
#[test]
fn test_missing_model_files() {
    let config = OcrConfig {
        model_path: "/nonexistent/rec.onnx".into(),
        vocabulary_path: "/nonexistent/ocr_metadata.json".into(),
        ..OcrConfig::default()
    };
    let pipeline = RecognitionPipeline::from_config(&config);

    let err = pipeline.recognize(&line_image()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ModelUnavailable);
    assert_eq!(err.sentinel(), "[OCR unavailable]");
    assert!(!err.is_recoverable());
    assert!(!pipeline.is_loaded());
}

/// Test 8: The ONNX loader reports a missing model after reading the vocabulary
#[test]
fn test_onnx_loader_missing_model() {
    let mut vocab = tempfile::Builder::new().suffix(".txt").tempfile().unwrap();
    writeln!(vocab, "a\nb").unwrap();

    let config = OcrConfig {
        model_path: "/nonexistent/rec.onnx".into(),
        vocabulary_path: vocab.path().to_path_buf(),
        ..OcrConfig::default()
    };
    let pipeline = RecognitionPipeline::from_config(&config);
    let err = pipeline.preload().unwrap_err();
    assert!(err.to_string().contains("not found"));

    let loader = OnnxModelLoader::from_config(&config);
    assert_eq!(loader.vocabulary_path, vocab.path());
}

// =============================================================================
// One-time model loading
// =============================================================================

/// Test 9: Concurrent first calls load the model exactly once and share it
#[test]
fn test_concurrent_first_calls_load_once() {
    const THREADS: usize = 8;

    let loads = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&loads);
    let pipeline = Arc::new(RecognitionPipeline::new(
        ImageNormalizer::default(),
        CtcGreedyDecoder::default(),
        move || {
            counter.fetch_add(1, Ordering::SeqCst);
            thread::sleep(Duration::from_millis(50));
            LoadedModel::new(Arc::new(ScriptedEngine::new(vec![1, 0, 2], 3)), ab())
        },
    ));

    let image = Arc::new(line_image());
    let barrier = Arc::new(Barrier::new(THREADS));
    let handles: Vec<_> = (0..THREADS)
        .map(|_| {
            let pipeline = Arc::clone(&pipeline);
            let image = Arc::clone(&image);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                let text = pipeline.recognize(&image);
                (text, pipeline.preload())
            })
        })
        .collect();

    let mut models = Vec::with_capacity(THREADS);
    for handle in handles {
        let (text, model) = handle.join().unwrap();
        assert_eq!(text.unwrap().as_str(), "ab");
        models.push(model.unwrap());
    }
    assert!(models.iter().all(|m| Arc::ptr_eq(m, &models[0])));
    assert_eq!(loads.load(Ordering::SeqCst), 1);
    assert_eq!(pipeline.metrics().model_load_attempts, 1);
    assert_eq!(pipeline.metrics().requests_succeeded, THREADS as u64);
}

/// Test 10: A failed load is never retried
#[test]
fn test_failed_load_is_latched() {
    let loads = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&loads);
    let pipeline = RecognitionPipeline::new(
        ImageNormalizer::default(),
        CtcGreedyDecoder::default(),
        move || -> Result<LoadedModel> {
            counter.fetch_add(1, Ordering::SeqCst);
            anyhow::bail!("weights checksum mismatch")
        },
    );

    let image = line_image();
    for _ in 0..5 {
        let err = pipeline.recognize(&image).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ModelUnavailable);
        assert!(err.to_string().contains("weights checksum mismatch"));
    }
    assert_eq!(loads.load(Ordering::SeqCst), 1);
    assert_eq!(pipeline.metrics().model_unavailable, 5);
}

/// Test 11: The loaded model is shared by later requests
#[test]
fn test_preload_then_recognize() {
    let pipeline = scripted_pipeline(vec![2]);
    let model = pipeline.preload().unwrap();
    assert_eq!(model.vocabulary().len(), 2);
    assert!(pipeline.is_loaded());

    pipeline.recognize(&line_image()).unwrap();
    let again = pipeline.preload().unwrap();
    assert!(Arc::ptr_eq(&model, &again));
    assert_eq!(pipeline.metrics().model_load_attempts, 1);
}

// =============================================================================
// Async entry point
// =============================================================================

/// Test 12: Requests can be issued from async tasks
#[tokio::test]
async fn test_recognize_async() {
    let pipeline = Arc::new(scripted_pipeline(vec![1, 2]));
    let image = line_image();

    let tasks: Vec<_> = (0..4)
        .map(|_| tokio::spawn(Arc::clone(&pipeline).recognize_async(image.clone())))
        .collect();

    for task in tasks {
        assert_eq!(task.await.unwrap().unwrap().as_str(), "ab");
    }

    let err = Arc::clone(&pipeline)
        .recognize_async(Vec::new())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidImage);
}
