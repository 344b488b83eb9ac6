use thiserror::Error;

/// Errors that can occur while preparing NER feed data.
#[derive(Debug, Error)]
pub enum NerFeedError {
    /// A label sequence is not valid IOB1/IOB2.
    #[error("sentence {sentence} is not in BIO format: {tags:?}")]
    InvalidIob {
        /// Index of the offending sentence in the corpus.
        sentence: usize,
        /// The tags of that sentence, up to its real length.
        tags: Vec<String>,
    },

    /// A tag other than `O`, `B-*` or `I-*` reached the BIOES conversion.
    #[error("invalid IOB format: cannot convert tag {tag:?} to BIOES")]
    InvalidIobes { tag: String },

    /// The requested tag scheme cannot be produced.
    #[error("unsupported tagging scheme: {0:?}")]
    UnsupportedScheme(String),

    /// A token is missing from the vocabulary (padding ran after vocabulary construction?).
    #[error("token {0:?} is not in the vocabulary")]
    UnknownToken(String),

    /// A tag is missing from the label template.
    #[error("tag {0:?} is not in the label template")]
    UnknownTag(String),

    /// A tag index points outside the label template.
    #[error("tag index {0} is outside the label template")]
    UnknownTagIndex(u32),

    /// A token id points outside the vocabulary.
    #[error("token id {0} is outside the vocabulary")]
    UnknownTokenId(u32),

    /// Arrays that must share a shape do not.
    #[error("shape mismatch: {0}")]
    ShapeMismatch(String),

    /// Invalid pipeline configuration.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// The embedding source key is not one of the known sources.
    #[error("unknown embedding source: {0:?}")]
    UnknownEmbeddingSource(String),

    /// A key expected in a persisted store is absent.
    #[error("key {0:?} not found in store")]
    MissingKey(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("store error: {0}")]
    Store(#[from] rusqlite::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Pretrained vector provider failure.
    #[error("pretrained vectors: {0}")]
    Vectors(String),

    /// Candle tensor construction failure.
    #[error("tensor error: {0}")]
    Tensor(String),
}

impl From<candle_core::Error> for NerFeedError {
    fn from(err: candle_core::Error) -> Self {
        NerFeedError::Tensor(err.to_string())
    }
}

/// Result type alias for nerfeed operations.
pub type Result<T> = std::result::Result<T, NerFeedError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_messages() {
        let err = NerFeedError::UnsupportedScheme("BILOU".into());
        assert_eq!(err.to_string(), "unsupported tagging scheme: \"BILOU\"");

        let err = NerFeedError::InvalidIob {
            sentence: 3,
            tags: vec!["X-PER".into()],
        };
        assert!(err.to_string().contains("sentence 3"));
        assert!(err.to_string().contains("X-PER"));
    }

    #[test]
    fn error_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<NerFeedError>();
    }
}
