//! # Embedding Lookup Table
//!
//! Aligns vocabulary ids with pretrained word vectors. Tokens missing from the
//! pretrained source get a row drawn from `U[-sqrt(3/dim), sqrt(3/dim)]`,
//! which matches the variance of a unit-variance initializer.

use std::fmt;
use std::str::FromStr;

use candle_core::{Device, Tensor};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{NerFeedError, Result};
use crate::vocab::Vocabulary;

/// Lookup of pretrained vectors by token.
pub trait VectorLookup {
    /// Dimensionality of every vector.
    fn dim(&self) -> usize;

    /// The vector of `token`, if the source has one.
    fn vector(&self, token: &str) -> Option<&[f32]>;
}

/// Loads the vectors of a named source.
pub trait VectorProvider {
    /// Load `source`. Implementations may drop words absent from `vocab`.
    fn load(&self, source: EmbeddingSource, vocab: &Vocabulary) -> Result<Box<dyn VectorLookup>>;
}

/// On-disk layout of a pretrained vector file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VectorFormat {
    /// `count dim` header, then `word<space>` + `dim` little-endian f32 per entry.
    Word2VecBinary,
    /// `count dim` header, then one `word v1 .. vdim` line per entry.
    Word2VecText,
    /// One `word v1 .. vdim` line per entry, no header.
    GloveText,
}

/// The named pretrained vector sources.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EmbeddingSource {
    /// Wikipedia + PubMed + PMC word2vec.
    #[serde(rename = "bio-word2vec")]
    BioWord2Vec,
    /// PubMed word2vec, window 2.
    #[serde(rename = "bio-word2vec-old")]
    BioWord2VecOld,
    /// GoogleNews word2vec.
    #[serde(rename = "word2vec")]
    Word2Vec,
    /// Common Crawl fastText subword vectors.
    #[serde(rename = "fasttext")]
    FastText,
    /// GloVe 6B, 100 dimensions.
    #[serde(rename = "glove")]
    Glove,
}

impl EmbeddingSource {
    pub const ALL: [EmbeddingSource; 5] = [
        EmbeddingSource::BioWord2Vec,
        EmbeddingSource::BioWord2VecOld,
        EmbeddingSource::Word2Vec,
        EmbeddingSource::FastText,
        EmbeddingSource::Glove,
    ];

    /// Key used on the command line and in store names.
    pub fn key(&self) -> &'static str {
        match self {
            EmbeddingSource::BioWord2Vec => "bio-word2vec",
            EmbeddingSource::BioWord2VecOld => "bio-word2vec-old",
            EmbeddingSource::Word2Vec => "word2vec",
            EmbeddingSource::FastText => "fasttext",
            EmbeddingSource::Glove => "glove",
        }
    }

    /// File name inside the embeddings directory.
    pub fn file_name(&self) -> &'static str {
        match self {
            EmbeddingSource::BioWord2Vec => "wikipedia-pubmed-and-PMC-w2v.bin",
            EmbeddingSource::BioWord2VecOld => "PubMed-shuffle-win-2.bin",
            EmbeddingSource::Word2Vec => "GoogleNews-vectors-negative300.bin",
            EmbeddingSource::FastText => "crawl-300d-2M-subword.vec",
            EmbeddingSource::Glove => "glove.6B.100d.txt",
        }
    }

    pub fn format(&self) -> VectorFormat {
        match self {
            EmbeddingSource::BioWord2Vec
            | EmbeddingSource::BioWord2VecOld
            | EmbeddingSource::Word2Vec => VectorFormat::Word2VecBinary,
            EmbeddingSource::FastText => VectorFormat::Word2VecText,
            EmbeddingSource::Glove => VectorFormat::GloveText,
        }
    }
}

impl fmt::Display for EmbeddingSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

impl FromStr for EmbeddingSource {
    type Err = NerFeedError;

    fn from_str(s: &str) -> Result<Self> {
        EmbeddingSource::ALL
            .into_iter()
            .find(|source| source.key() == s)
            .ok_or_else(|| NerFeedError::UnknownEmbeddingSource(s.to_string()))
    }
}

/// Dense `vocab_size × dim` matrix, row `i` for vocabulary id `i`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawTable")]
pub struct EmbeddingTable {
    dim: usize,
    /// Row-major values.
    values: Vec<f32>,
    /// Rows synthesized because the token was missing from the source.
    #[serde(default)]
    oov_count: usize,
}

impl EmbeddingTable {
    /// Wrap row-major `values`; their length must be a multiple of `dim`.
    pub fn from_values(dim: usize, values: Vec<f32>) -> Result<Self> {
        if dim == 0 || values.len() % dim != 0 {
            return Err(NerFeedError::ShapeMismatch(format!(
                "{} values do not form rows of width {dim}",
                values.len()
            )));
        }
        Ok(Self {
            dim,
            values,
            oov_count: 0,
        })
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    pub fn n_rows(&self) -> usize {
        self.values.len() / self.dim
    }

    pub fn oov_count(&self) -> usize {
        self.oov_count
    }

    pub fn row(&self, id: u32) -> Option<&[f32]> {
        let start = id as usize * self.dim;
        self.values.get(start..start + self.dim)
    }

    pub fn values(&self) -> &[f32] {
        &self.values
    }

    /// `[n_rows, dim]` f32 tensor for model initialization.
    pub fn to_tensor(&self, device: &Device) -> Result<Tensor> {
        Ok(Tensor::from_slice(
            &self.values,
            (self.n_rows(), self.dim),
            device,
        )?)
    }
}

/// Stored form of [`EmbeddingTable`], checked on the way in.
#[derive(Deserialize)]
struct RawTable {
    dim: usize,
    values: Vec<f32>,
    #[serde(default)]
    oov_count: usize,
}

impl TryFrom<RawTable> for EmbeddingTable {
    type Error = NerFeedError;

    fn try_from(raw: RawTable) -> Result<Self> {
        let mut table = Self::from_values(raw.dim, raw.values)?;
        table.oov_count = raw.oov_count;
        Ok(table)
    }
}

/// Build the lookup table for `vocab` from `vectors`.
pub fn build_lookup_table(
    vocab: &Vocabulary,
    vectors: &dyn VectorLookup,
    rng: &mut oorandom::Rand64,
) -> Result<EmbeddingTable> {
    let dim = vectors.dim();
    if dim == 0 {
        return Err(NerFeedError::Vectors(
            "pretrained vectors report dimension 0".into(),
        ));
    }
    let bound = (3.0 / dim as f64).sqrt();

    let mut values = Vec::with_capacity(vocab.len() * dim);
    let mut oov_count = 0;
    for word in vocab.words() {
        match vectors.vector(word) {
            Some(vector) if vector.len() == dim => values.extend_from_slice(vector),
            _ => {
                oov_count += 1;
                values.extend((0..dim).map(|_| ((rng.rand_float() * 2.0 - 1.0) * bound) as f32));
            }
        }
    }

    info!(
        rows = vocab.len(),
        dim,
        oov = oov_count,
        "embedding lookup table built"
    );
    Ok(EmbeddingTable {
        dim,
        values,
        oov_count,
    })
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    struct MapVectors {
        dim: usize,
        map: HashMap<String, Vec<f32>>,
    }

    impl VectorLookup for MapVectors {
        fn dim(&self) -> usize {
            self.dim
        }

        fn vector(&self, token: &str) -> Option<&[f32]> {
            self.map.get(token).map(Vec::as_slice)
        }
    }

    fn vectors() -> MapVectors {
        let mut map = HashMap::new();
        map.insert("cell".to_string(), vec![0.5, -0.5, 1.0, 2.0]);
        map.insert("gene".to_string(), vec![1.0, 1.0, 1.0, 1.0]);
        MapVectors { dim: 4, map }
    }

    #[test]
    fn test_rows_copied_and_oov_bounded() {
        let vocab =
            Vocabulary::from_words(vec!["cell".into(), "unk".into(), "gene".into(), "".into()])
                .unwrap();
        let mut rng = oorandom::Rand64::new(7);
        let table = build_lookup_table(&vocab, &vectors(), &mut rng).unwrap();

        assert_eq!(table.n_rows(), vocab.len());
        assert_eq!(table.row(0).unwrap(), &[0.5, -0.5, 1.0, 2.0]);
        assert_eq!(table.row(2).unwrap(), &[1.0, 1.0, 1.0, 1.0]);
        assert_eq!(table.oov_count(), 2);

        let bound = (3.0f32 / 4.0).sqrt();
        for id in [1, 3] {
            assert!(table.row(id).unwrap().iter().all(|v| v.abs() <= bound + 1e-6));
        }
    }

    #[test]
    fn test_seeded_build_is_reproducible() {
        let vocab = Vocabulary::from_words(vec!["x".into(), "".into()]).unwrap();
        let a = build_lookup_table(&vocab, &vectors(), &mut oorandom::Rand64::new(1)).unwrap();
        let b = build_lookup_table(&vocab, &vectors(), &mut oorandom::Rand64::new(1)).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_source_keys_roundtrip() {
        for source in EmbeddingSource::ALL {
            assert_eq!(source.key().parse::<EmbeddingSource>().unwrap(), source);
        }
        assert!("elmo".parse::<EmbeddingSource>().is_err());
        assert_eq!(EmbeddingSource::Glove.format(), VectorFormat::GloveText);
        assert_eq!(
            EmbeddingSource::FastText.file_name(),
            "crawl-300d-2M-subword.vec"
        );
    }

    #[test]
    fn test_to_tensor_shape() {
        let table = EmbeddingTable::from_values(2, vec![0.0, 1.0, 2.0, 3.0, 4.0, 5.0]).unwrap();
        let tensor = table.to_tensor(&Device::Cpu).unwrap();
        assert_eq!(tensor.dims(), &[3, 2]);
    }

    #[test]
    fn test_from_values_rejects_ragged() {
        assert!(EmbeddingTable::from_values(4, vec![0.0; 6]).is_err());
    }

    #[test]
    fn test_deserialize_checks_shape() {
        assert!(serde_json::from_str::<EmbeddingTable>(r#"{"dim":0,"values":[]}"#).is_err());
        assert!(serde_json::from_str::<EmbeddingTable>(r#"{"dim":2,"values":[1,2,3]}"#).is_err());

        let table: EmbeddingTable =
            serde_json::from_str(r#"{"dim":2,"values":[1,2,3,4],"oov_count":1}"#).unwrap();
        assert_eq!(table.n_rows(), 2);
        assert_eq!(table.oov_count(), 1);
        let json = serde_json::to_string(&table).unwrap();
        assert_eq!(serde_json::from_str::<EmbeddingTable>(&json).unwrap(), table);
    }
}
