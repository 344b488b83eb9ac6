//! # nerfeed
//!
//! Umbrella crate: the preprocessing pipeline, pretrained vector readers and
//! the reference tagger under one name.
pub use nerfeed_core;
pub use nerfeed_trainer;
pub use nerfeed_vectors;

pub use nerfeed_core::{
    EmbeddingSource, FeedData, LoadedFeed, Metadata, NerFeedError, Pipeline, PipelineConfig,
    Result, TagScheme,
};
pub use nerfeed_vectors::VectorDirectory;
