//! # nerfeed Core
//!
//! Turns a directory of tab-separated, BIO-tagged sentences into the dense
//! integer arrays a BiLSTM-CRF tagger trains on: vocabulary and label ids,
//! BIOES conversion, padding, train/dev split, pretrained embedding lookup
//! table and shuffled batches.
//!
//! ## Quick Start
//!
//! ```rust
//! use nerfeed_core::tagging::{iob2, iob_iobes};
//!
//! let mut tags = vec!["I-PER".to_string(), "I-PER".to_string(), "O".to_string()];
//! assert!(iob2(&mut tags));
//! assert_eq!(tags, ["B-PER", "I-PER", "O"]);
//! assert_eq!(iob_iobes(&tags).unwrap(), ["B-PER", "E-PER", "O"]);
//! ```
pub mod batch;
pub mod chars;
pub mod config;
pub mod corpus;
pub mod embedding;
pub mod encode;
pub mod error;
pub mod eval;
pub mod pipeline;
pub mod split;
pub mod store;
pub mod tagging;
pub mod vocab;

// Re-export primary API
pub use batch::{Batch, BatchIter, batch_iter};
pub use chars::{CharDictionary, encode_char_batch, word_to_char_ids};
pub use config::{PipelineConfig, rng_from_seed};
pub use corpus::{Corpus, read_corpus_dir};
pub use embedding::{
    EmbeddingSource, EmbeddingTable, VectorFormat, VectorLookup, VectorProvider,
    build_lookup_table,
};
pub use encode::{add_padding, decode_labels, encode_labels, encode_sentences, max_doc_len};
pub use error::{NerFeedError, Result};
pub use eval::write_predictions;
pub use pipeline::{LoadedFeed, Pipeline};
pub use split::{SplitIndices, split_train_dev};
pub use store::{FeedData, KvStore, Metadata};
pub use tagging::{TagScheme, iob2, iob_iobes, update_tag_scheme};
pub use vocab::{LabelTemplate, Vocabulary};
