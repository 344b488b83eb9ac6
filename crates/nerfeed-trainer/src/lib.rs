//! # nerfeed Trainer
//!
//! Reference consumer of preprocessed feeds: a perceptron-trained CRF
//! tagger, the epoch/batch training loop with learning-rate decay, dev-set
//! evaluation and the `nerfeed` command-line tool.
pub mod cli;
pub mod model;
pub mod trainer;

pub use cli::{Cli, Commands, run};
pub use model::{BatchStats, CrfTagger, SequenceTagger, viterbi_decode};
pub use trainer::{TrainConfig, TrainReport, Trainer, next_lr};
