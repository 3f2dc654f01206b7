// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Counters for recognition requests

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use super::error::ErrorKind;

/// Lock-free recognition counters, cheap to clone and share
#[derive(Debug, Clone, Default)]
pub struct RecognitionMetrics {
    requests_total: Arc<AtomicU64>,
    requests_succeeded: Arc<AtomicU64>,
    invalid_image: Arc<AtomicU64>,
    model_unavailable: Arc<AtomicU64>,
    inference_failed: Arc<AtomicU64>,
    vocabulary_mismatch: Arc<AtomicU64>,
    skipped_symbols: Arc<AtomicU64>,
    model_load_attempts: Arc<AtomicU64>,
    duration_ms_total: Arc<AtomicU64>,
}

/// Point-in-time copy of [`RecognitionMetrics`]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub requests_total: u64,
    pub requests_succeeded: u64,
    pub invalid_image: u64,
    pub model_unavailable: u64,
    pub inference_failed: u64,
    pub vocabulary_mismatch: u64,
    pub skipped_symbols: u64,
    pub model_load_attempts: u64,
    pub duration_ms_total: u64,
}

impl MetricsSnapshot {
    pub fn requests_failed(&self) -> u64 {
        self.invalid_image + self.model_unavailable + self.inference_failed + self.vocabulary_mismatch
    }

    pub fn avg_duration_ms(&self) -> f64 {
        if self.requests_total == 0 {
            0.0
        } else {
            self.duration_ms_total as f64 / self.requests_total as f64
        }
    }
}

impl RecognitionMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_success(&self, duration_ms: u64) {
        self.requests_total.fetch_add(1, Ordering::Relaxed);
        self.requests_succeeded.fetch_add(1, Ordering::Relaxed);
        self.duration_ms_total.fetch_add(duration_ms, Ordering::Relaxed);
    }

    pub fn record_failure(&self, kind: ErrorKind, duration_ms: u64) {
        self.requests_total.fetch_add(1, Ordering::Relaxed);
        self.duration_ms_total.fetch_add(duration_ms, Ordering::Relaxed);
        let counter = match kind {
            ErrorKind::InvalidImage => &self.invalid_image,
            ErrorKind::ModelUnavailable => &self.model_unavailable,
            ErrorKind::InferenceFailed => &self.inference_failed,
            ErrorKind::VocabularyMismatch => &self.vocabulary_mismatch,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_skipped_symbols(&self, count: usize) {
        self.skipped_symbols
            .fetch_add(count as u64, Ordering::Relaxed);
    }

    pub fn record_model_load(&self) {
        self.model_load_attempts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn model_load_attempts(&self) -> u64 {
        self.model_load_attempts.load(Ordering::Relaxed)
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            requests_total: self.requests_total.load(Ordering::Relaxed),
            requests_succeeded: self.requests_succeeded.load(Ordering::Relaxed),
            invalid_image: self.invalid_image.load(Ordering::Relaxed),
            model_unavailable: self.model_unavailable.load(Ordering::Relaxed),
            inference_failed: self.inference_failed.load(Ordering::Relaxed),
            vocabulary_mismatch: self.vocabulary_mismatch.load(Ordering::Relaxed),
            skipped_symbols: self.skipped_symbols.load(Ordering::Relaxed),
            model_load_attempts: self.model_load_attempts.load(Ordering::Relaxed),
            duration_ms_total: self.duration_ms_total.load(Ordering::Relaxed),
        }
    }
}
