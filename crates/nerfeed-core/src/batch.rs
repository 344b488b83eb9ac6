//! # Batch Iterator
//!
//! Lazy, pull-based iteration over encoded samples in fixed-size batches for
//! a number of epochs. With shuffling on, one permutation per epoch reorders
//! sentences, labels and lengths together.

use candle_core::{Device, Tensor};
use tracing::debug;

use crate::error::{NerFeedError, Result};

/// One gradient-update unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Batch {
    /// Zero-based epoch this batch belongs to.
    pub epoch: usize,
    /// Sample indices (into the arrays given to [`batch_iter`]) in batch order.
    pub indices: Vec<usize>,
    pub sentences: Vec<Vec<u32>>,
    pub labels: Vec<Vec<u32>>,
    pub lengths: Vec<usize>,
}

impl Batch {
    pub fn len(&self) -> usize {
        self.indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    /// `u32` tensors: sentences `[b, max_doc_len]`, labels `[b, max_doc_len]`, lengths `[b]`.
    pub fn to_tensors(&self, device: &Device) -> Result<(Tensor, Tensor, Tensor)> {
        let rows = self.len();
        let width = self.sentences.first().map_or(0, Vec::len);
        let flat = |rows_data: &[Vec<u32>]| -> Result<Vec<u32>> {
            if rows_data.iter().any(|row| row.len() != width) {
                return Err(NerFeedError::ShapeMismatch(
                    "batch rows differ in width".into(),
                ));
            }
            Ok(rows_data.concat())
        };

        let sentences = Tensor::from_vec(flat(&self.sentences)?, (rows, width), device)?;
        let labels = Tensor::from_vec(flat(&self.labels)?, (rows, width), device)?;
        let lengths: Vec<u32> = self.lengths.iter().map(|&l| l as u32).collect();
        let lengths = Tensor::from_vec(lengths, rows, device)?;
        Ok((sentences, labels, lengths))
    }
}

/// Iterator returned by [`batch_iter`].
pub struct BatchIter<'a> {
    sentences: &'a [Vec<u32>],
    labels: &'a [Vec<u32>],
    lengths: &'a [usize],
    batch_size: usize,
    num_epochs: usize,
    shuffle: bool,
    rng: oorandom::Rand64,
    order: Vec<usize>,
    epoch: usize,
    cursor: usize,
    epoch_started: bool,
}

/// Build a batch iterator over parallel encoded arrays.
pub fn batch_iter<'a>(
    sentences: &'a [Vec<u32>],
    labels: &'a [Vec<u32>],
    lengths: &'a [usize],
    batch_size: usize,
    num_epochs: usize,
    shuffle: bool,
    rng: oorandom::Rand64,
) -> Result<BatchIter<'a>> {
    if batch_size == 0 {
        return Err(NerFeedError::InvalidConfig(
            "batch_size must be positive".into(),
        ));
    }
    if sentences.len() != labels.len() || sentences.len() != lengths.len() {
        return Err(NerFeedError::ShapeMismatch(format!(
            "{} sentences, {} label rows, {} lengths",
            sentences.len(),
            labels.len(),
            lengths.len()
        )));
    }

    Ok(BatchIter {
        sentences,
        labels,
        lengths,
        batch_size,
        num_epochs,
        shuffle,
        rng,
        order: (0..sentences.len()).collect(),
        epoch: 0,
        cursor: 0,
        epoch_started: false,
    })
}

impl BatchIter<'_> {
    /// Batches per epoch: `ceil(n_samples / batch_size)`.
    pub fn batches_per_epoch(&self) -> usize {
        self.order.len().div_ceil(self.batch_size)
    }

    fn permute(&mut self) {
        // Fisher-Yates over the previous epoch's order.
        for i in (1..self.order.len()).rev() {
            let j = self.rng.rand_range(0..(i as u64 + 1)) as usize;
            self.order.swap(i, j);
        }
    }
}

impl Iterator for BatchIter<'_> {
    type Item = Batch;

    fn next(&mut self) -> Option<Batch> {
        let n_samples = self.order.len();
        if n_samples == 0 {
            return None;
        }

        while self.epoch < self.num_epochs {
            if !self.epoch_started {
                if self.shuffle {
                    self.permute();
                }
                self.epoch_started = true;
                self.cursor = 0;
                debug!(epoch = self.epoch, "starting epoch");
            }

            if self.cursor < n_samples {
                let end = (self.cursor + self.batch_size).min(n_samples);
                let indices = self.order[self.cursor..end].to_vec();
                self.cursor = end;
                return Some(Batch {
                    epoch: self.epoch,
                    sentences: indices.iter().map(|&i| self.sentences[i].clone()).collect(),
                    labels: indices.iter().map(|&i| self.labels[i].clone()).collect(),
                    lengths: indices.iter().map(|&i| self.lengths[i]).collect(),
                    indices,
                });
            }

            self.epoch += 1;
            self.epoch_started = false;
        }
        None
    }
}
