//! Training loop over a preprocessed feed.

use std::io::Write;

use anyhow::{Result, ensure};
use nerfeed_core::{FeedData, Vocabulary, batch_iter, rng_from_seed, write_predictions};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::model::{BatchStats, SequenceTagger};

/// Dev predictions file written next to the saved model.
pub const PREDICTIONS_FILE: &str = "predict_file.tsv";

/// Saved model file name.
pub const MODEL_FILE: &str = "model.json";

/// Inverse-time learning-rate decay: `lr / (1 + p·t)`.
pub fn next_lr(lr: f32, p: f32, t: usize) -> f32 {
    lr / (1.0 + p * t as f32)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainConfig {
    pub epochs: usize,
    pub batch_size: usize,
    pub learning_rate: f32,
    /// `p` in [`next_lr`], applied once per epoch.
    pub lr_decay: f32,
    /// Steps between progress log lines.
    pub log_every: usize,
    pub seed: Option<u64>,
}

impl Default for TrainConfig {
    fn default() -> Self {
        Self {
            epochs: 10,
            batch_size: 32,
            learning_rate: 0.01,
            lr_decay: 0.05,
            log_every: 100,
            seed: None,
        }
    }
}

impl TrainConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_epochs(mut self, epochs: usize) -> Self {
        self.epochs = epochs;
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn with_learning_rate(mut self, lr: f32) -> Self {
        self.learning_rate = lr;
        self
    }

    pub fn with_lr_decay(mut self, p: f32) -> Self {
        self.lr_decay = p;
        self
    }

    pub fn with_log_every(mut self, steps: usize) -> Self {
        self.log_every = steps;
        self
    }

    pub fn with_seed(mut self, seed: Option<u64>) -> Self {
        self.seed = seed;
        self
    }

    pub fn validate(&self) -> Result<()> {
        ensure!(self.batch_size > 0, "batch size must be positive");
        ensure!(self.log_every > 0, "log interval must be positive");
        ensure!(
            self.learning_rate.is_finite() && self.learning_rate > 0.0,
            "learning rate must be positive, got {}",
            self.learning_rate
        );
        ensure!(
            self.lr_decay.is_finite() && self.lr_decay >= 0.0,
            "learning-rate decay must be non-negative, got {}",
            self.lr_decay
        );
        Ok(())
    }
}

/// Outcome of [`Trainer::train`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrainReport {
    pub steps: usize,
    /// Totals over the final epoch.
    pub last_epoch: BatchStats,
    pub final_lr: f32,
}

pub struct Trainer<M> {
    model: M,
    config: TrainConfig,
}

impl<M: SequenceTagger> Trainer<M> {
    pub fn new(model: M, config: TrainConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { model, config })
    }

    pub fn model(&self) -> &M {
        &self.model
    }

    pub fn into_model(self) -> M {
        self.model
    }

    /// Run every epoch over the shuffled training split.
    pub fn train(&mut self, feed: &FeedData) -> Result<TrainReport> {
        let batches = batch_iter(
            &feed.train_sentences,
            &feed.train_labels,
            &feed.train_sequence_lengths,
            self.config.batch_size,
            self.config.epochs,
            true,
            rng_from_seed(self.config.seed),
        )?;
        let total_steps = batches.batches_per_epoch() * self.config.epochs;
        info!(
            samples = feed.train_sentences.len(),
            epochs = self.config.epochs,
            total_steps,
            "training: start"
        );

        let mut step = 0usize;
        let mut epoch = 0usize;
        let mut lr = self.config.learning_rate;
        let mut window = BatchStats::default();
        let mut epoch_stats = BatchStats::default();

        for batch in batches {
            if batch.epoch != epoch {
                info!(
                    epoch = epoch + 1,
                    loss = epoch_stats.loss,
                    accuracy = epoch_stats.accuracy(),
                    "epoch complete"
                );
                epoch = batch.epoch;
                epoch_stats = BatchStats::default();
                lr = next_lr(self.config.learning_rate, self.config.lr_decay, epoch);
                debug!(epoch = epoch + 1, lr, "learning rate decayed");
            }

            let stats = self.model.train_batch(&batch, lr)?;
            window.merge(stats);
            epoch_stats.merge(stats);
            step += 1;

            if step % self.config.log_every == 0 {
                info!(
                    step,
                    total_steps,
                    loss = window.loss,
                    accuracy = window.accuracy(),
                    "training step"
                );
                window = BatchStats::default();
            }
        }

        if step > 0 {
            info!(
                epoch = epoch + 1,
                loss = epoch_stats.loss,
                accuracy = epoch_stats.accuracy(),
                "epoch complete"
            );
        }
        info!(steps = step, "training: done");
        Ok(TrainReport {
            steps: step,
            last_epoch: epoch_stats,
            final_lr: lr,
        })
    }

    /// Tag the dev split, write `token\tgold\tpredicted` rows to `out` and
    /// return token accuracy.
    pub fn evaluate<W: Write>(&self, feed: &FeedData, vocab: &Vocabulary, out: &mut W) -> Result<f32> {
        let mut predicted = Vec::with_capacity(feed.dev_sentences.len());
        for (sentences, lengths) in feed
            .dev_sentences
            .chunks(self.config.batch_size)
            .zip(feed.dev_sequence_lengths.chunks(self.config.batch_size))
        {
            predicted.extend(self.model.predict_batch(sentences, lengths)?);
        }

        write_predictions(
            out,
            &feed.dev_sentences,
            &feed.dev_labels,
            &predicted,
            &feed.dev_sequence_lengths,
            vocab,
            &feed.labels_template,
        )?;

        let mut stats = BatchStats::default();
        for ((gold, pred), &length) in feed.dev_labels.iter().zip(&predicted).zip(&feed.dev_sequence_lengths) {
            stats.total += length;
            stats.correct += gold[..length].iter().zip(pred).filter(|(g, p)| g == p).count();
        }
        info!(
            sentences = feed.dev_sentences.len(),
            tokens = stats.total,
            accuracy = stats.accuracy(),
            "dev evaluation"
        );
        Ok(stats.accuracy())
    }
}
