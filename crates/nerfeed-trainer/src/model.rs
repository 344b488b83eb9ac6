//! Linear-chain CRF tagger over frozen word embeddings, trained with the
//! structured perceptron rule.
//!
//! Emission score of tag `y` at a position holding word `w`:
//! `projection[y] · embedding[w] + bias[y] + lexical[w][y]`. The embedding
//! rows come from the feed's lookup table and are never updated.

use std::path::Path;

use anyhow::{Context, Result, bail, ensure};
use candle_core::{Device, Tensor};
use nerfeed_core::{Batch, EmbeddingTable};
use serde::{Deserialize, Serialize};

/// Running totals for one or more trained batches.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct BatchStats {
    /// Summed structured hinge loss: `score(predicted) - score(gold)`.
    pub loss: f32,
    pub correct: usize,
    pub total: usize,
}

impl BatchStats {
    pub fn accuracy(&self) -> f32 {
        if self.total == 0 {
            0.0
        } else {
            self.correct as f32 / self.total as f32
        }
    }

    pub fn merge(&mut self, other: BatchStats) {
        self.loss += other.loss;
        self.correct += other.correct;
        self.total += other.total;
    }
}

/// A model that learns from and labels padded, encoded batches.
pub trait SequenceTagger {
    fn num_tags(&self) -> usize;

    /// One update from `batch` at learning rate `lr`.
    fn train_batch(&mut self, batch: &Batch, lr: f32) -> Result<BatchStats>;

    /// Best tag sequence for each row. Output row `i` has `lengths[i]` entries.
    fn predict_batch(&self, sentences: &[Vec<u32>], lengths: &[usize]) -> Result<Vec<Vec<u32>>>;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Weights {
    num_tags: usize,
    dim: usize,
    vocab_size: usize,
    /// `[num_tags, dim]`
    projection: Vec<f32>,
    bias: Vec<f32>,
    /// `[vocab_size, num_tags]`
    lexical: Vec<f32>,
    /// `transitions[to * num_tags + from]`
    transitions: Vec<f32>,
}

impl Weights {
    fn zeros(num_tags: usize, dim: usize, vocab_size: usize) -> Self {
        Self {
            num_tags,
            dim,
            vocab_size,
            projection: vec![0.0; num_tags * dim],
            bias: vec![0.0; num_tags],
            lexical: vec![0.0; vocab_size * num_tags],
            transitions: vec![0.0; num_tags * num_tags],
        }
    }

    fn transition(&self, from: usize, to: usize) -> f32 {
        self.transitions[to * self.num_tags + from]
    }
}

pub struct CrfTagger {
    weights: Weights,
    table: EmbeddingTable,
    embeddings: Tensor,
    device: Device,
}

impl CrfTagger {
    /// Zero-initialized tagger over `table` with `num_tags` output tags.
    pub fn new(table: &EmbeddingTable, num_tags: usize, device: &Device) -> Result<Self> {
        ensure!(num_tags > 0, "a tagger needs at least one tag");
        let weights = Weights::zeros(num_tags, table.dim(), table.n_rows());
        Self::with_weights(weights, table, device)
    }

    fn with_weights(weights: Weights, table: &EmbeddingTable, device: &Device) -> Result<Self> {
        let embeddings = table
            .to_tensor(device)
            .context("failed to move the lookup table to the device")?;
        Ok(Self {
            weights,
            table: table.clone(),
            embeddings,
            device: device.clone(),
        })
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string(&self.weights)?;
        std::fs::write(path, json).with_context(|| format!("failed to write {}", path.display()))?;
        Ok(())
    }

    /// Load weights saved by [`CrfTagger::save`]; `table` must be the one trained with.
    pub fn load(path: &Path, table: &EmbeddingTable, device: &Device) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        let weights: Weights = serde_json::from_str(&content)
            .with_context(|| format!("{} is not a saved tagger", path.display()))?;
        ensure!(
            weights.dim == table.dim() && weights.vocab_size == table.n_rows(),
            "saved tagger expects a {}x{} lookup table, got {}x{}",
            weights.vocab_size,
            weights.dim,
            table.n_rows(),
            table.dim()
        );
        Self::with_weights(weights, table, device)
    }

    /// Emission scores `[row][position][tag]` for equally wide rows.
    fn emissions(&self, sentences: &[Vec<u32>]) -> Result<Vec<Vec<Vec<f32>>>> {
        let width = sentences.first().map_or(0, Vec::len);
        ensure!(
            sentences.iter().all(|row| row.len() == width),
            "sentence rows differ in width"
        );
        if sentences.is_empty() || width == 0 {
            return Ok(vec![Vec::new(); sentences.len()]);
        }

        let num_tags = self.weights.num_tags;
        let dim = self.weights.dim;
        let ids = Tensor::from_vec(sentences.concat(), sentences.len() * width, &self.device)?;
        let rows = self.embeddings.index_select(&ids, 0)?;
        let projection = Tensor::from_slice(&self.weights.projection, (num_tags, dim), &self.device)?;
        let bias = Tensor::from_slice(&self.weights.bias, num_tags, &self.device)?;
        let scores = rows.matmul(&projection.t()?)?.broadcast_add(&bias)?;
        let scores: Vec<Vec<f32>> = scores.to_vec2()?;

        let mut out = Vec::with_capacity(sentences.len());
        for (sentence, chunk) in sentences.iter().zip(scores.chunks(width)) {
            let mut positions = chunk.to_vec();
            for (row, &word) in positions.iter_mut().zip(sentence) {
                let start = word as usize * num_tags;
                for (score, lex) in row.iter_mut().zip(&self.weights.lexical[start..start + num_tags]) {
                    *score += lex;
                }
            }
            out.push(positions);
        }
        Ok(out)
    }

    fn decode(&self, emissions: &[Vec<f32>]) -> Vec<usize> {
        let flat: Vec<f32> = emissions.concat();
        viterbi_decode(&flat, &self.weights.transitions, self.weights.num_tags)
    }

    fn path_score(&self, emissions: &[Vec<f32>], path: &[usize]) -> f32 {
        let emitted: f32 = emissions.iter().zip(path).map(|(row, &tag)| row[tag]).sum();
        let moved: f32 = path
            .windows(2)
            .map(|pair| self.weights.transition(pair[0], pair[1]))
            .sum();
        emitted + moved
    }

    fn update(&mut self, sentence: &[u32], gold: &[usize], predicted: &[usize], lr: f32) {
        let num_tags = self.weights.num_tags;
        let dim = self.weights.dim;

        for ((&word, &g), &p) in sentence.iter().zip(gold).zip(predicted) {
            if g == p {
                continue;
            }
            if let Some(row) = self.table.row(word) {
                for (k, &x) in row.iter().enumerate() {
                    self.weights.projection[g * dim + k] += lr * x;
                    self.weights.projection[p * dim + k] -= lr * x;
                }
            }
            self.weights.bias[g] += lr;
            self.weights.bias[p] -= lr;
            let base = word as usize * num_tags;
            self.weights.lexical[base + g] += lr;
            self.weights.lexical[base + p] -= lr;
        }

        for t in 1..gold.len() {
            let gold_pair = (gold[t - 1], gold[t]);
            let pred_pair = (predicted[t - 1], predicted[t]);
            if gold_pair != pred_pair {
                self.weights.transitions[gold_pair.1 * num_tags + gold_pair.0] += lr;
                self.weights.transitions[pred_pair.1 * num_tags + pred_pair.0] -= lr;
            }
        }
    }

    fn check_word_ids(&self, sentences: &[Vec<u32>]) -> Result<()> {
        let vocab_size = self.weights.vocab_size;
        if let Some(&word) = sentences.iter().flatten().find(|&&w| w as usize >= vocab_size) {
            bail!("word id {word} is outside the {vocab_size}-row lookup table");
        }
        Ok(())
    }
}

impl SequenceTagger for CrfTagger {
    fn num_tags(&self) -> usize {
        self.weights.num_tags
    }

    fn train_batch(&mut self, batch: &Batch, lr: f32) -> Result<BatchStats> {
        self.check_word_ids(&batch.sentences)?;
        let emissions = self.emissions(&batch.sentences)?;
        let mut stats = BatchStats::default();

        for i in 0..batch.len() {
            let length = batch.lengths[i];
            let gold: Vec<usize> = batch.labels[i][..length].iter().map(|&t| t as usize).collect();
            if let Some(&tag) = gold.iter().find(|&&t| t >= self.weights.num_tags) {
                bail!("tag index {tag} is outside the {}-tag model", self.weights.num_tags);
            }

            let rows = &emissions[i][..length];
            let predicted = self.decode(rows);
            stats.loss += self.path_score(rows, &predicted) - self.path_score(rows, &gold);
            stats.correct += gold.iter().zip(&predicted).filter(|(g, p)| g == p).count();
            stats.total += length;

            if predicted != gold {
                self.update(&batch.sentences[i][..length], &gold, &predicted, lr);
            }
        }
        Ok(stats)
    }

    fn predict_batch(&self, sentences: &[Vec<u32>], lengths: &[usize]) -> Result<Vec<Vec<u32>>> {
        ensure!(
            sentences.len() == lengths.len(),
            "{} sentences but {} lengths",
            sentences.len(),
            lengths.len()
        );
        self.check_word_ids(sentences)?;
        let emissions = self.emissions(sentences)?;
        Ok(emissions
            .iter()
            .zip(lengths)
            .map(|(rows, &length)| {
                self.decode(&rows[..length.min(rows.len())])
                    .into_iter()
                    .map(|tag| tag as u32)
                    .collect()
            })
            .collect())
    }
}

/// Highest-scoring tag path.
///
/// `emissions` is row-major `[seq_len, num_labels]`; `transitions[j * num_labels + i]`
/// scores moving from tag `i` to tag `j`. Ties go to the lower tag index.
pub fn viterbi_decode(emissions: &[f32], transitions: &[f32], num_labels: usize) -> Vec<usize> {
    if num_labels == 0 || emissions.len() < num_labels {
        return vec![];
    }
    let seq_len = emissions.len() / num_labels;

    let mut scores = emissions[..num_labels].to_vec();
    let mut backpointers = vec![vec![0usize; num_labels]; seq_len];

    for t in 1..seq_len {
        let mut next = vec![f32::NEG_INFINITY; num_labels];
        for j in 0..num_labels {
            let mut best_score = f32::NEG_INFINITY;
            let mut best_prev = 0;
            for (i, &prev) in scores.iter().enumerate() {
                let score = prev + transitions[j * num_labels + i];
                if score > best_score {
                    best_score = score;
                    best_prev = i;
                }
            }
            next[j] = best_score + emissions[t * num_labels + j];
            backpointers[t][j] = best_prev;
        }
        scores = next;
    }

    let mut best_last = 0;
    for (j, &score) in scores.iter().enumerate() {
        if score > scores[best_last] {
            best_last = j;
        }
    }

    let mut path = vec![0usize; seq_len];
    path[seq_len - 1] = best_last;
    for t in (1..seq_len).rev() {
        path[t - 1] = backpointers[t][path[t]];
    }
    path
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> EmbeddingTable {
        EmbeddingTable::from_values(2, vec![1.0, 0.0, 0.0, 1.0, 0.0, 0.0]).unwrap()
    }

    fn batch() -> Batch {
        Batch {
            epoch: 0,
            indices: vec![0],
            sentences: vec![vec![0, 1, 2]],
            labels: vec![vec![0, 1, 2]],
            lengths: vec![2],
        }
    }

    #[test]
    fn test_viterbi_follows_emissions() {
        let emissions = vec![0.1, 0.8, 0.1, 0.8, 0.1, 0.1];
        let transitions = vec![0.0; 9];
        assert_eq!(viterbi_decode(&emissions, &transitions, 3), vec![1, 0]);
    }

    #[test]
    fn test_viterbi_transitions_override_emissions() {
        // Tag 1 -> tag 0 is heavily penalized.
        let emissions = vec![0.0, 1.0, 1.0, 0.9];
        let transitions = vec![0.0, -5.0, 0.0, 0.0];
        assert_eq!(viterbi_decode(&emissions, &transitions, 2), vec![1, 1]);
    }

    #[test]
    fn test_viterbi_empty() {
        assert!(viterbi_decode(&[], &[], 3).is_empty());
        assert!(viterbi_decode(&[1.0], &[0.0], 0).is_empty());
    }

    #[test]
    fn test_perceptron_learns_separable_batch() {
        let mut model = CrfTagger::new(&table(), 3, &Device::Cpu).unwrap();
        let batch = batch();

        let first = model.train_batch(&batch, 0.5).unwrap();
        assert_eq!(first.total, 2);
        assert!(first.correct < 2);

        for _ in 0..5 {
            model.train_batch(&batch, 0.5).unwrap();
        }
        let last = model.train_batch(&batch, 0.5).unwrap();
        assert_eq!(last.correct, 2);
        assert_eq!(last.loss, 0.0);

        let predicted = model.predict_batch(&batch.sentences, &batch.lengths).unwrap();
        assert_eq!(predicted, vec![vec![0, 1]]);
    }

    #[test]
    fn test_out_of_range_inputs_are_rejected() {
        let mut model = CrfTagger::new(&table(), 3, &Device::Cpu).unwrap();
        let mut bad_word = batch();
        bad_word.sentences[0][0] = 9;
        assert!(model.train_batch(&bad_word, 0.1).is_err());

        let mut bad_tag = batch();
        bad_tag.labels[0][1] = 7;
        assert!(model.train_batch(&bad_tag, 0.1).is_err());

        assert!(model.predict_batch(&[vec![0]], &[]).is_err());
    }

    #[test]
    fn test_save_and_load() {
        let mut model = CrfTagger::new(&table(), 3, &Device::Cpu).unwrap();
        for _ in 0..3 {
            model.train_batch(&batch(), 0.5).unwrap();
        }
        let path = std::env::temp_dir().join(format!("nerfeed-model-{}.json", std::process::id()));
        model.save(&path).unwrap();

        let loaded = CrfTagger::load(&path, &table(), &Device::Cpu).unwrap();
        assert_eq!(loaded.weights, model.weights);

        let other = EmbeddingTable::from_values(3, vec![0.0; 6]).unwrap();
        assert!(CrfTagger::load(&path, &other, &Device::Cpu).is_err());
        let _ = std::fs::remove_file(path);
    }

    #[test]
    fn test_batch_stats() {
        let mut stats = BatchStats::default();
        assert_eq!(stats.accuracy(), 0.0);
        stats.merge(BatchStats { loss: 1.5, correct: 3, total: 4 });
        stats.merge(BatchStats { loss: 0.5, correct: 1, total: 4 });
        assert_eq!(stats.loss, 2.0);
        assert_eq!(stats.accuracy(), 0.5);
    }
}
