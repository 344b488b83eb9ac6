//! # Pipeline Configuration
//!
//! Paths, split ratio and widths shared by every pipeline stage. Replaces any
//! notion of a process-wide "current session": a [`PipelineConfig`] is built
//! once and handed to [`crate::pipeline::Pipeline`].

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{NerFeedError, Result};

/// Sentences longer than this are dropped at read time.
pub const LIMIT_LENGTH_OF_SENTENCES: usize = 300;

/// Default character width for the character encoder.
pub const DEFAULT_MAX_WORD_LEN: usize = 30;

/// Default share of samples assigned to the training split.
pub const DEFAULT_TRAIN_RATIO: f64 = 0.8;

/// Token appended to sentences up to `max_doc_len`.
pub const PAD_TOKEN: &str = "";

/// Tag appended to label sequences up to `max_doc_len`.
pub const PAD_TAG: &str = "PAD";

/// File name of the metadata store inside the data directory.
pub const METADATA_STORE: &str = "metadata.sqlite";

/// Configuration for a pipeline run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Directory of tab-separated corpus files.
    pub corpus_dir: PathBuf,
    /// Directory holding the metadata and per-configuration stores.
    pub data_dir: PathBuf,
    /// Directory holding the pretrained vector files.
    pub embeddings_dir: PathBuf,
    /// Share of samples in the training split, in `[0, 1]`.
    pub train_ratio: f64,
    /// Character width used by the character encoder.
    pub max_word_len: usize,
    /// Seed for split sampling, shuffling and OOV rows. `None` seeds from the clock.
    pub seed: Option<u64>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            corpus_dir: PathBuf::from("train_tsv"),
            data_dir: PathBuf::from("data_feed_model"),
            embeddings_dir: PathBuf::from("embeddings"),
            train_ratio: DEFAULT_TRAIN_RATIO,
            max_word_len: DEFAULT_MAX_WORD_LEN,
            seed: None,
        }
    }
}

impl PipelineConfig {
    /// Create a configuration with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a configuration from a JSON file. Missing fields keep their defaults.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: PipelineConfig = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn with_corpus_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.corpus_dir = dir.into();
        self
    }

    pub fn with_data_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.data_dir = dir.into();
        self
    }

    pub fn with_embeddings_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.embeddings_dir = dir.into();
        self
    }

    pub fn with_train_ratio(mut self, ratio: f64) -> Self {
        self.train_ratio = ratio;
        self
    }

    pub fn with_max_word_len(mut self, width: usize) -> Self {
        self.max_word_len = width;
        self
    }

    pub fn with_seed(mut self, seed: Option<u64>) -> Self {
        self.seed = seed;
        self
    }

    /// Check value ranges.
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.train_ratio) {
            return Err(NerFeedError::InvalidConfig(format!(
                "train_ratio must be within [0, 1], got {}",
                self.train_ratio
            )));
        }
        if self.max_word_len == 0 {
            return Err(NerFeedError::InvalidConfig(
                "max_word_len must be positive".into(),
            ));
        }
        Ok(())
    }

    /// Path of the metadata store.
    pub fn metadata_path(&self) -> PathBuf {
        self.data_dir.join(METADATA_STORE)
    }

    /// Path of the store for one `(embedding source, tag scheme)` pair.
    pub fn feed_path(&self, source_key: &str, scheme_name: &str) -> PathBuf {
        self.data_dir
            .join(format!("{source_key}_{scheme_name}.sqlite"))
    }
}

/// Build the pipeline RNG. An absent seed falls back to the system clock.
pub fn rng_from_seed(seed: Option<u64>) -> oorandom::Rand64 {
    let seed = seed.unwrap_or_else(|| {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or(0x5eed)
    });
    oorandom::Rand64::new(u128::from(seed))
}
