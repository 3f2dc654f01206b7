// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1

//! CTC greedy decoder tests

use texant_ocr::vision::ocr::{
    CtcGreedyDecoder, DecodeError, DecodeOptions, LogitMatrix, Vocabulary, BLANK_INDEX,
};

/// Logits whose best path is exactly `path`
fn logits_for(path: &[usize], num_classes: usize) -> LogitMatrix {
    let mut data = vec![-1.0f32; path.len() * num_classes];
    for (t, &c) in path.iter().enumerate() {
        data[t * num_classes + c] = 2.5;
    }
    LogitMatrix::from_shape_vec(path.len(), num_classes, data).unwrap()
}

fn abc() -> Vocabulary {
    Vocabulary::from_chars("abc").unwrap()
}

// =============================================================================
// Collapse rules
// =============================================================================

/// Test 1: Repeats collapse, blanks separate genuine repeats
#[test]
fn test_repeat_and_blank_rules() {
    let decoder = CtcGreedyDecoder::default();
    let decoded = decoder
        .decode(logits_for(&[1, 1, 0, 1, 2, 2, 0, 0, 3], 4), &abc())
        .unwrap();
    assert_eq!(decoded.text.as_str(), "aabc");
    assert_eq!(decoded.skipped, 0);
}

/// Test 2: All-blank output decodes to the empty string
#[test]
fn test_all_blank() {
    let decoder = CtcGreedyDecoder::default();
    let decoded = decoder
        .decode(logits_for(&[BLANK_INDEX; 32], 4), &abc())
        .unwrap();
    assert!(decoded.text.is_empty());
}

/// Test 3: Zero timesteps is not an error
#[test]
fn test_zero_timesteps() {
    let decoder = CtcGreedyDecoder::default();
    let logits = LogitMatrix::from_shape_vec(0, 4, vec![]).unwrap();
    let decoded = decoder.decode(logits, &abc()).unwrap();
    assert!(decoded.text.is_empty());
}

/// Test 4: Raw scores work without a softmax
#[test]
fn test_unnormalized_scores() {
    let logits =
        LogitMatrix::from_shape_vec(2, 4, vec![-9.0, -3.0, -1.0, -7.0, 40.0, 41.0, 0.0, 0.0])
            .unwrap();
    let decoded = CtcGreedyDecoder::default().decode(logits, &abc()).unwrap();
    assert_eq!(decoded.text.as_str(), "ba");
}

// =============================================================================
// Class count handling
// =============================================================================

/// Test 5: A model wider than the vocabulary is rejected by default
#[test]
fn test_class_count_mismatch() {
    let err = CtcGreedyDecoder::default()
        .decode(logits_for(&[1, 5], 6), &abc())
        .unwrap_err();

    match err {
        DecodeError::ClassCountMismatch {
            num_classes,
            vocabulary_len,
        } => {
            assert_eq!(num_classes, 6);
            assert_eq!(vocabulary_len, 3);
        }
    }
}

/// Test 6: The lenient decoder skips and counts unknown classes
#[test]
fn test_lenient_decoding_skips_unknown_classes() {
    let decoder = CtcGreedyDecoder::new(DecodeOptions {
        enforce_class_count: false,
        ..DecodeOptions::default()
    });
    let decoded = decoder
        .decode(logits_for(&[1, 5, 5, 0, 5, 2], 6), &abc())
        .unwrap();
    assert_eq!(decoded.text.as_str(), "ab");
    assert_eq!(decoded.skipped, 2);
}

// =============================================================================
// Post-processing
// =============================================================================

/// Test 7: Trimming and whitespace collapsing are opt-in
#[test]
fn test_post_processing_options() {
    let vocabulary = Vocabulary::from_chars(" xy").unwrap();
    let path = [1, 2, 0, 1, 0, 1, 3, 1];

    let raw = CtcGreedyDecoder::default()
        .decode(logits_for(&path, 4), &vocabulary)
        .unwrap();
    assert_eq!(raw.text.as_str(), " x  y ");

    let trimmed = CtcGreedyDecoder::new(DecodeOptions {
        trim_output: true,
        ..DecodeOptions::default()
    })
    .decode(logits_for(&path, 4), &vocabulary)
    .unwrap();
    assert_eq!(trimmed.text.as_str(), "x  y");

    let collapsed = CtcGreedyDecoder::new(DecodeOptions {
        collapse_whitespace: true,
        ..DecodeOptions::default()
    })
    .decode(logits_for(&path, 4), &vocabulary)
    .unwrap();
    assert_eq!(collapsed.text.as_str(), "x y");
}

/// Test 8: Decoded text serializes as a plain string
#[test]
fn test_decoded_text_serialization() {
    let decoded = CtcGreedyDecoder::default()
        .decode(logits_for(&[3, 2, 1], 4), &abc())
        .unwrap();
    assert_eq!(serde_json::to_string(&decoded.text).unwrap(), "\"cba\"");
    assert_eq!(String::from(decoded.text), "cba");
}
