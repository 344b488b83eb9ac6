//! # Persisted Key-Value Store
//!
//! A SQLite file with one `entries` table mapping a key to a JSON document.
//! Metadata and per-configuration data are each written by one producer run
//! and read later; there is no locking beyond what SQLite does itself.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use rusqlite::{Connection, OptionalExtension, params};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::chars::CharDictionary;
use crate::corpus::Corpus;
use crate::embedding::EmbeddingTable;
use crate::error::{NerFeedError, Result};
use crate::split::SplitIndices;
use crate::vocab::{LabelTemplate, Vocabulary};

const SCHEMA: &str = "CREATE TABLE IF NOT EXISTS entries (
    key   TEXT PRIMARY KEY,
    value TEXT NOT NULL
)";

/// JSON-valued key-value store over SQLite.
pub struct KvStore {
    conn: Connection,
}

impl KvStore {
    /// Open (or create) the store at `path`, creating parent directories.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        conn.execute(SCHEMA, [])?;
        debug!(path = %path.display(), "opened store");
        Ok(Self { conn })
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute(SCHEMA, [])?;
        Ok(Self { conn })
    }

    pub fn put<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> Result<()> {
        let json = serde_json::to_string(value)?;
        self.conn.execute(
            "INSERT OR REPLACE INTO entries (key, value) VALUES (?1, ?2)",
            params![key, json],
        )?;
        Ok(())
    }

    /// Write several entries in one transaction.
    pub fn put_all(&mut self, entries: &[(&str, serde_json::Value)]) -> Result<()> {
        let tx = self.conn.transaction()?;
        {
            let mut stmt =
                tx.prepare("INSERT OR REPLACE INTO entries (key, value) VALUES (?1, ?2)")?;
            for (key, value) in entries {
                stmt.execute(params![key, serde_json::to_string(value)?])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    pub fn get_opt<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        let raw: Option<String> = self
            .conn
            .query_row(
                "SELECT value FROM entries WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()?;
        raw.map(|json| serde_json::from_str(&json).map_err(NerFeedError::from))
            .transpose()
    }

    /// Read `key`, failing with [`NerFeedError::MissingKey`] when absent.
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Result<T> {
        self.get_opt(key)?
            .ok_or_else(|| NerFeedError::MissingKey(key.to_string()))
    }

    pub fn contains(&self, key: &str) -> Result<bool> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM entries WHERE key = ?1",
            params![key],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    /// Keys with the byte size of their JSON value, in key order.
    pub fn entries_summary(&self) -> Result<Vec<(String, usize)>> {
        let mut stmt = self
            .conn
            .prepare("SELECT key, LENGTH(value) FROM entries ORDER BY key")?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)? as usize))
        })?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(NerFeedError::from)
    }
}

fn to_value<T: Serialize + ?Sized>(value: &T) -> Result<serde_json::Value> {
    Ok(serde_json::to_value(value)?)
}

/// Corpus-level data built once and shared by every configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct Metadata {
    /// Padded corpus with labels as read.
    pub corpus: Corpus,
    pub max_doc_len: usize,
    pub vocab: Vocabulary,
    pub split: SplitIndices,
    pub char_dict: CharDictionary,
    pub max_word_len: usize,
}

impl Metadata {
    pub fn save(&self, store: &mut KvStore) -> Result<()> {
        let entries = [
            ("sentences", to_value(&self.corpus.sentences)?),
            ("labels", to_value(&self.corpus.labels)?),
            ("sequence_lengths", to_value(&self.corpus.sequence_lengths)?),
            ("max_doc_len", to_value(&self.max_doc_len)?),
            ("vocabs", to_value(&self.vocab)?),
            ("map_word_id", to_value(&self.vocab.map_word_id())?),
            ("map_id_word", to_value(&self.vocab.map_id_word())?),
            ("train_idx", to_value(&self.split.train)?),
            ("dev_idx", to_value(&self.split.dev)?),
            ("char_dict", to_value(&self.char_dict)?),
            ("max_word_len", to_value(&self.max_word_len)?),
        ];
        store.put_all(&entries)
    }

    pub fn load(store: &KvStore) -> Result<Self> {
        let vocab: Vocabulary = store.get("vocabs")?;
        let map_word_id: HashMap<String, u32> = store.get("map_word_id")?;
        let map_id_word: BTreeMap<u32, String> = store.get("map_id_word")?;
        if map_word_id.len() != vocab.len() || map_id_word.len() != vocab.len() {
            return Err(NerFeedError::ShapeMismatch(
                "persisted id maps disagree with the vocabulary".into(),
            ));
        }

        Ok(Self {
            corpus: Corpus {
                sentences: store.get("sentences")?,
                labels: store.get("labels")?,
                sequence_lengths: store.get("sequence_lengths")?,
            },
            max_doc_len: store.get("max_doc_len")?,
            vocab,
            split: SplitIndices {
                train: store.get("train_idx")?,
                dev: store.get("dev_idx")?,
            },
            char_dict: store.get("char_dict")?,
            max_word_len: store.get("max_word_len")?,
        })
    }
}

/// Encoded train/dev data for one `(embedding source, tag scheme)` pair.
#[derive(Debug, Clone, PartialEq)]
pub struct FeedData {
    pub train_sentences: Vec<Vec<u32>>,
    pub dev_sentences: Vec<Vec<u32>>,
    pub train_labels: Vec<Vec<u32>>,
    pub dev_labels: Vec<Vec<u32>>,
    pub train_sequence_lengths: Vec<usize>,
    pub dev_sequence_lengths: Vec<usize>,
    pub labels_template: LabelTemplate,
    pub lookup_table: EmbeddingTable,
}

impl FeedData {
    pub fn save(&self, store: &mut KvStore) -> Result<()> {
        let entries = [
            ("train_sentences", to_value(&self.train_sentences)?),
            ("dev_sentences", to_value(&self.dev_sentences)?),
            ("train_labels", to_value(&self.train_labels)?),
            ("dev_labels", to_value(&self.dev_labels)?),
            ("train_sequence_lengths", to_value(&self.train_sequence_lengths)?),
            ("dev_sequence_lengths", to_value(&self.dev_sequence_lengths)?),
            ("labels_template", to_value(&self.labels_template)?),
            ("lookup_table", to_value(&self.lookup_table)?),
        ];
        store.put_all(&entries)
    }

    pub fn load(store: &KvStore) -> Result<Self> {
        Ok(Self {
            train_sentences: store.get("train_sentences")?,
            dev_sentences: store.get("dev_sentences")?,
            train_labels: store.get("train_labels")?,
            dev_labels: store.get("dev_labels")?,
            train_sequence_lengths: store.get("train_sequence_lengths")?,
            dev_sequence_lengths: store.get("dev_sequence_lengths")?,
            labels_template: store.get("labels_template")?,
            lookup_table: store.get("lookup_table")?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_put_get_and_missing_key() {
        let store = KvStore::open_in_memory().unwrap();
        store.put("max_doc_len", &42usize).unwrap();
        store.put("max_doc_len", &43usize).unwrap();

        assert_eq!(store.get::<usize>("max_doc_len").unwrap(), 43);
        assert!(store.contains("max_doc_len").unwrap());
        assert!(matches!(
            store.get::<usize>("vocabs"),
            Err(NerFeedError::MissingKey(_))
        ));
        assert_eq!(store.get_opt::<usize>("vocabs").unwrap(), None);
    }

    #[test]
    fn test_integer_keyed_map_survives() {
        let store = KvStore::open_in_memory().unwrap();
        let mut map = BTreeMap::new();
        map.insert(0u32, "a".to_string());
        map.insert(1u32, String::new());
        store.put("map_id_word", &map).unwrap();
        let back: BTreeMap<u32, String> = store.get("map_id_word").unwrap();
        assert_eq!(back, map);
    }

    #[test]
    fn test_malformed_lookup_table_rejected() {
        let store = KvStore::open_in_memory().unwrap();
        store
            .put("lookup_table", &serde_json::json!({"dim": 0, "values": []}))
            .unwrap();
        assert!(store.get::<EmbeddingTable>("lookup_table").is_err());

        store
            .put("lookup_table", &serde_json::json!({"dim": 2, "values": [1.0, 2.0, 3.0]}))
            .unwrap();
        assert!(store.get_opt::<EmbeddingTable>("lookup_table").is_err());
    }

    #[test]
    fn test_metadata_roundtrip() {
        let mut corpus = Corpus::new();
        corpus.push(vec!["a".into()], vec!["O".into()]);
        corpus.push(vec!["b".into()], vec!["B-X".into()]);
        let vocab = Vocabulary::build(&corpus.sentences, &corpus.sequence_lengths, 1);
        let metadata = Metadata {
            corpus,
            max_doc_len: 1,
            vocab,
            split: SplitIndices {
                train: vec![1],
                dev: vec![0],
            },
            char_dict: CharDictionary::standard(),
            max_word_len: 30,
        };

        let mut store = KvStore::open_in_memory().unwrap();
        metadata.save(&mut store).unwrap();
        assert_eq!(Metadata::load(&store).unwrap(), metadata);

        let summary = store.entries_summary().unwrap();
        assert_eq!(summary.len(), 11);
        assert_eq!(summary[0].0, "char_dict");
    }

    #[test]
    fn test_feed_roundtrip() {
        let feed = FeedData {
            train_sentences: vec![vec![0, 1]],
            dev_sentences: vec![vec![1, 1]],
            train_labels: vec![vec![0, 1]],
            dev_labels: vec![vec![1, 1]],
            train_sequence_lengths: vec![1],
            dev_sequence_lengths: vec![0],
            labels_template: LabelTemplate::from(vec!["O".to_string(), "PAD".to_string()]),
            lookup_table: EmbeddingTable::from_values(2, vec![0.5, 0.25, -0.5, 1.0]).unwrap(),
        };

        let mut store = KvStore::open_in_memory().unwrap();
        feed.save(&mut store).unwrap();
        assert_eq!(FeedData::load(&store).unwrap(), feed);
    }
}
