// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Recognition vocabulary
//!
//! Class index 0 is always the CTC blank and is never stored here. Class
//! index `i >= 1` maps to `symbols[i - 1]`, so a model paired with this
//! vocabulary must produce `len() + 1` classes.
//!
//! Supported artifacts (picked by file extension):
//! - `.txt`: one symbol per line, blank implicit (PaddleOCR-style dictionary)
//! - `.json`: `{"charlist": ["", "a", ...]}`, entry 0 is the blank slot and its
//!   content is ignored
//! - `.yaml` / `.yml`: `vocab: "abc..."`, one symbol per character, blank implicit
//!
//! All formats assume the blank sits at class 0. Training configs written by
//! trainers that put the blank *last* (class `len(vocab)`, as mltu's CTC
//! decoder does) pass the class-count check but decode every symbol shifted by
//! one; such models must be exported with a leading blank or paired with a
//! `.txt`/`.json` artifact that matches their class order.

use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};

/// Index reserved for the CTC blank
pub const BLANK_INDEX: usize = 0;

#[derive(Debug, Error)]
pub enum VocabularyError {
    #[error("Failed to read vocabulary {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed vocabulary {path}: {message}")]
    Malformed { path: PathBuf, message: String },

    #[error("Unsupported vocabulary file extension: {0}")]
    UnsupportedFormat(String),

    #[error("Vocabulary symbol {0} is empty")]
    EmptySymbol(usize),

    #[error("Vocabulary contains no symbols")]
    Empty,
}

#[derive(Deserialize)]
struct CharlistMetadata {
    charlist: Vec<String>,
}

#[derive(Deserialize)]
struct TrainingConfigs {
    vocab: String,
}

/// Ordered symbol list, immutable once loaded
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Vocabulary {
    symbols: Vec<String>,
}

impl Vocabulary {
    /// Build from printable symbols only (blank not included)
    pub fn new<I, S>(symbols: I) -> Result<Self, VocabularyError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let symbols: Vec<String> = symbols.into_iter().map(Into::into).collect();
        if symbols.is_empty() {
            return Err(VocabularyError::Empty);
        }
        if let Some(pos) = symbols.iter().position(|s| s.is_empty()) {
            // Report as a class index
            return Err(VocabularyError::EmptySymbol(pos + 1));
        }
        Ok(Self { symbols })
    }

    /// Build from a charlist that reserves position 0 for the blank
    ///
    /// `["", "a", "b"]` yields a two-symbol vocabulary where class 1 is `a`
    /// and class 2 is `b`. Entry 0 is dropped whatever it holds (`""`,
    /// `"<blank>"`, `"-"`, ...); it is never emitted.
    pub fn from_charlist<S: AsRef<str>>(charlist: &[S]) -> Result<Self, VocabularyError> {
        let (blank, rest) = charlist.split_first().ok_or(VocabularyError::Empty)?;
        debug!("Charlist blank placeholder: {:?}", blank.as_ref());
        Self::new(rest.iter().map(|s| s.as_ref().to_string()))
    }

    /// Build from a string where every character is one symbol
    pub fn from_chars(vocab: &str) -> Result<Self, VocabularyError> {
        Self::new(vocab.chars().map(String::from))
    }

    /// Load a vocabulary artifact, dispatching on its extension
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, VocabularyError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| VocabularyError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();

        let vocabulary = match extension.as_str() {
            "txt" => Self::parse_dictionary(&content),
            "json" => {
                let metadata: CharlistMetadata =
                    serde_json::from_str(&content).map_err(|e| VocabularyError::Malformed {
                        path: path.to_path_buf(),
                        message: e.to_string(),
                    })?;
                Self::from_charlist(&metadata.charlist)
            }
            "yaml" | "yml" => {
                let configs: TrainingConfigs =
                    serde_yaml::from_str(&content).map_err(|e| VocabularyError::Malformed {
                        path: path.to_path_buf(),
                        message: e.to_string(),
                    })?;
                Self::from_chars(&configs.vocab)
            }
            other => Err(VocabularyError::UnsupportedFormat(other.to_string())),
        }?;

        info!(
            "Loaded vocabulary with {} symbols from {}",
            vocabulary.len(),
            path.display()
        );
        Ok(vocabulary)
    }

    /// One symbol per line; only line terminators are stripped
    fn parse_dictionary(content: &str) -> Result<Self, VocabularyError> {
        let symbols = content
            .split('\n')
            .map(|line| line.strip_suffix('\r').unwrap_or(line))
            .filter(|line| !line.is_empty());
        Self::new(symbols)
    }

    /// Append a space symbol if the vocabulary lacks one
    pub fn with_space_char(mut self) -> Self {
        if !self.symbols.iter().any(|s| s == " ") {
            debug!("Appending space symbol at class {}", self.symbols.len() + 1);
            self.symbols.push(" ".to_string());
        }
        self
    }

    /// Number of printable symbols (blank excluded)
    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }

    /// Class count a paired model must produce
    pub fn num_classes(&self) -> usize {
        self.symbols.len() + 1
    }

    /// Symbol for a class index; `None` for the blank and out-of-range indices
    pub fn symbol(&self, class_index: usize) -> Option<&str> {
        if class_index == BLANK_INDEX {
            return None;
        }
        self.symbols.get(class_index - 1).map(String::as_str)
    }

    pub fn symbols(&self) -> &[String] {
        &self.symbols
    }
}
