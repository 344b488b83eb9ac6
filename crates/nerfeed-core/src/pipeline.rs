//! # Preprocessing Pipeline
//!
//! Runs the stages end to end against an explicit [`PipelineConfig`]:
//!
//! 1. [`Pipeline::init_metadata`]: read the corpus, pad it, build the
//!    vocabulary, draw the train/dev split and persist the metadata store.
//! 2. [`Pipeline::preprocess`]: for one embedding source and tag scheme,
//!    convert labels, build the label template and lookup table, encode and
//!    split, then persist the configuration store.
//! 3. [`Pipeline::load_feed`]: read both stores back for a consumer.

use tracing::info;

use crate::chars::CharDictionary;
use crate::config::PipelineConfig;
use crate::corpus::read_corpus_dir;
use crate::embedding::{EmbeddingSource, EmbeddingTable, VectorProvider, build_lookup_table};
use crate::encode::{add_padding, encode_labels, encode_sentences, max_doc_len};
use crate::error::{NerFeedError, Result};
use crate::split::split_train_dev;
use crate::store::{FeedData, KvStore, Metadata};
use crate::tagging::{TagScheme, update_tag_scheme};
use crate::vocab::{LabelTemplate, Vocabulary};

/// Metadata and one configuration's feed data, loaded together.
#[derive(Debug, Clone, PartialEq)]
pub struct LoadedFeed {
    pub metadata: Metadata,
    pub feed: FeedData,
}

/// Pipeline context. Holds the configuration; owns no global state.
#[derive(Debug, Clone)]
pub struct Pipeline {
    config: PipelineConfig,
}

impl Pipeline {
    pub fn new(config: PipelineConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    fn rng(&self, stream: u64) -> oorandom::Rand64 {
        // Distinct stages draw from distinct streams of the same seed.
        crate::config::rng_from_seed(self.config.seed.map(|s| s.wrapping_add(stream)))
    }

    /// Build metadata from the corpus directory without persisting it.
    pub fn build_metadata(&self) -> Result<Metadata> {
        let mut corpus = read_corpus_dir(&self.config.corpus_dir)?;
        let max_doc_len = max_doc_len(&corpus.sequence_lengths);
        add_padding(&mut corpus, max_doc_len);
        let vocab = Vocabulary::build(&corpus.sentences, &corpus.sequence_lengths, max_doc_len);
        let split = split_train_dev(corpus.len(), self.config.train_ratio, &mut self.rng(0))?;

        Ok(Metadata {
            corpus,
            max_doc_len,
            vocab,
            split,
            char_dict: CharDictionary::standard(),
            max_word_len: self.config.max_word_len,
        })
    }

    /// Build and persist the metadata store.
    pub fn init_metadata(&self) -> Result<Metadata> {
        let metadata = self.build_metadata()?;
        let path = self.config.metadata_path();
        let mut store = KvStore::open(&path)?;
        metadata.save(&mut store)?;
        info!(
            path = %path.display(),
            sentences = metadata.corpus.len(),
            max_doc_len = metadata.max_doc_len,
            vocab = metadata.vocab.len(),
            "metadata saved"
        );
        Ok(metadata)
    }

    pub fn load_metadata(&self) -> Result<Metadata> {
        let path = self.config.metadata_path();
        if !path.exists() {
            return Err(NerFeedError::InvalidConfig(format!(
                "no metadata at {}; run init first",
                path.display()
            )));
        }
        Metadata::load(&KvStore::open(&path)?)
    }

    /// Produce feed data for `(source, scheme)` from loaded metadata.
    ///
    /// A BIOES run reuses the lookup table of the persisted BIO store for the
    /// same source when there is one, so both schemes share OOV rows.
    pub fn build_feed<P: VectorProvider + ?Sized>(
        &self,
        metadata: &Metadata,
        provider: &P,
        source: EmbeddingSource,
        scheme: TagScheme,
    ) -> Result<FeedData> {
        let corpus = &metadata.corpus;
        let mut labels = corpus.labels.clone();

        let lookup_table = match scheme {
            TagScheme::Bio => self.build_table(metadata, provider, source)?,
            TagScheme::Bioes => {
                update_tag_scheme(&mut labels, &corpus.sequence_lengths, scheme)?;
                match self.reuse_bio_table(source)? {
                    Some(table) => table,
                    None => self.build_table(metadata, provider, source)?,
                }
            }
        };
        if lookup_table.n_rows() != metadata.vocab.len() {
            return Err(NerFeedError::ShapeMismatch(format!(
                "lookup table has {} rows, vocabulary has {} words",
                lookup_table.n_rows(),
                metadata.vocab.len()
            )));
        }

        let labels_template = LabelTemplate::from_labels(&labels);
        let encoded_labels = encode_labels(&labels, metadata.max_doc_len, &labels_template)?;
        let encoded_sentences =
            encode_sentences(&corpus.sentences, metadata.max_doc_len, &metadata.vocab)?;

        let pick = |rows: &[Vec<u32>], idx: &[usize]| -> Vec<Vec<u32>> {
            idx.iter().map(|&i| rows[i].clone()).collect()
        };
        let lengths_at =
            |idx: &[usize]| -> Vec<usize> { idx.iter().map(|&i| corpus.sequence_lengths[i]).collect() };
        let split = &metadata.split;
        if let Some(&bad) = split.train.iter().chain(&split.dev).find(|&&i| i >= corpus.len()) {
            return Err(NerFeedError::ShapeMismatch(format!(
                "split index {bad} is outside a corpus of {} samples",
                corpus.len()
            )));
        }

        info!(
            %source,
            %scheme,
            tags = labels_template.len(),
            train = split.train.len(),
            dev = split.dev.len(),
            "feed data encoded"
        );
        Ok(FeedData {
            train_sentences: pick(&encoded_sentences, &split.train),
            dev_sentences: pick(&encoded_sentences, &split.dev),
            train_labels: pick(&encoded_labels, &split.train),
            dev_labels: pick(&encoded_labels, &split.dev),
            train_sequence_lengths: lengths_at(&split.train),
            dev_sequence_lengths: lengths_at(&split.dev),
            labels_template,
            lookup_table,
        })
    }

    fn build_table<P: VectorProvider + ?Sized>(
        &self,
        metadata: &Metadata,
        provider: &P,
        source: EmbeddingSource,
    ) -> Result<EmbeddingTable> {
        let vectors = provider.load(source, &metadata.vocab)?;
        build_lookup_table(&metadata.vocab, vectors.as_ref(), &mut self.rng(1))
    }

    fn reuse_bio_table(&self, source: EmbeddingSource) -> Result<Option<EmbeddingTable>> {
        let path = self.config.feed_path(source.key(), TagScheme::Bio.as_str());
        if !path.exists() {
            return Ok(None);
        }
        let table = KvStore::open(&path)?.get_opt("lookup_table")?;
        if table.is_some() {
            info!(path = %path.display(), "reusing BIO lookup table");
        }
        Ok(table)
    }

    /// Load the metadata store, build feed data and persist it.
    pub fn preprocess<P: VectorProvider + ?Sized>(
        &self,
        provider: &P,
        source: EmbeddingSource,
        scheme: TagScheme,
    ) -> Result<FeedData> {
        let metadata = self.load_metadata()?;
        let feed = self.build_feed(&metadata, provider, source, scheme)?;
        let path = self.config.feed_path(source.key(), scheme.as_str());
        let mut store = KvStore::open(&path)?;
        feed.save(&mut store)?;
        info!(path = %path.display(), "feed data saved");
        Ok(feed)
    }

    /// Load one configuration store merged with the metadata store.
    pub fn load_feed(&self, source: EmbeddingSource, scheme: TagScheme) -> Result<LoadedFeed> {
        let path = self.config.feed_path(source.key(), scheme.as_str());
        if !path.exists() {
            return Err(NerFeedError::InvalidConfig(format!(
                "no preprocessed data at {}; run preprocess for {source} {scheme} first",
                path.display()
            )));
        }
        let feed = FeedData::load(&KvStore::open(&path)?)?;
        let metadata = self.load_metadata()?;
        Ok(LoadedFeed { metadata, feed })
    }
}
