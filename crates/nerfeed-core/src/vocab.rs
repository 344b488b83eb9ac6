//! # Vocabulary and Label Template
//!
//! Both are insertion-ordered string sets: ids follow first-occurrence order
//! and the word→id / id→word maps are exact inverses.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::config::PAD_TOKEN;
use crate::error::{NerFeedError, Result};

/// Insertion-ordered set of strings with dense `u32` ids.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct OrderedStrings {
    items: Vec<String>,
    index: HashMap<String, u32>,
}

impl OrderedStrings {
    /// Insert `item` if unseen. Returns its id.
    fn insert(&mut self, item: &str) -> u32 {
        if let Some(&id) = self.index.get(item) {
            return id;
        }
        let id = self.items.len() as u32;
        self.items.push(item.to_string());
        self.index.insert(item.to_string(), id);
        id
    }

    fn id(&self, item: &str) -> Option<u32> {
        self.index.get(item).copied()
    }

    fn get(&self, id: u32) -> Option<&str> {
        self.items.get(id as usize).map(String::as_str)
    }
}

/// Token vocabulary. The padding token is always the last entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<String>", into = "Vec<String>")]
pub struct Vocabulary {
    words: OrderedStrings,
}

impl Vocabulary {
    /// Collect the tokens of every sentence up to `min(max_doc_len, length)`
    /// in encounter order, then append the padding token.
    pub fn build(sentences: &[Vec<String>], lengths: &[usize], max_doc_len: usize) -> Self {
        let mut words = OrderedStrings::default();
        for (sentence, &length) in sentences.iter().zip(lengths) {
            let end = max_doc_len.min(length).min(sentence.len());
            for token in &sentence[..end] {
                // The padding token is reserved for the last id.
                if token != PAD_TOKEN {
                    words.insert(token);
                }
            }
        }
        words.insert(PAD_TOKEN);

        info!(size = words.items.len(), "vocabulary built");
        Self { words }
    }

    /// Rebuild a vocabulary from a persisted ordered word list.
    ///
    /// The list must hold unique words and end with the padding token.
    pub fn from_words(words: Vec<String>) -> Result<Self> {
        if words.last().map(String::as_str) != Some(PAD_TOKEN) {
            return Err(NerFeedError::InvalidConfig(
                "vocabulary must end with the padding token".into(),
            ));
        }
        let mut set = OrderedStrings::default();
        for word in &words {
            set.insert(word);
        }
        if set.items.len() != words.len() {
            return Err(NerFeedError::InvalidConfig(
                "vocabulary contains duplicate words".into(),
            ));
        }
        Ok(Self { words: set })
    }

    pub fn id(&self, word: &str) -> Option<u32> {
        self.words.id(word)
    }

    pub fn word(&self, id: u32) -> Option<&str> {
        self.words.get(id)
    }

    pub fn contains(&self, word: &str) -> bool {
        self.words.index.contains_key(word)
    }

    pub fn len(&self) -> usize {
        self.words.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.words.items.is_empty()
    }

    /// Words in id order.
    pub fn words(&self) -> &[String] {
        &self.words.items
    }

    /// Id of the padding token (the highest id).
    pub fn padding_id(&self) -> u32 {
        (self.len() - 1) as u32
    }

    pub fn map_word_id(&self) -> HashMap<String, u32> {
        self.words.index.clone()
    }

    pub fn map_id_word(&self) -> BTreeMap<u32, String> {
        self.words
            .items
            .iter()
            .enumerate()
            .map(|(id, word)| (id as u32, word.clone()))
            .collect()
    }
}

impl TryFrom<Vec<String>> for Vocabulary {
    type Error = NerFeedError;

    fn try_from(words: Vec<String>) -> Result<Self> {
        Self::from_words(words)
    }
}

impl From<Vocabulary> for Vec<String> {
    fn from(vocab: Vocabulary) -> Self {
        vocab.words.items
    }
}

/// Ordered distinct tags of a corpus; defines the label id space.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<String>", into = "Vec<String>")]
pub struct LabelTemplate {
    tags: OrderedStrings,
}

impl LabelTemplate {
    /// Collect every tag of every sequence (padding included) by first occurrence.
    pub fn from_labels(labels: &[Vec<String>]) -> Self {
        let mut tags = OrderedStrings::default();
        for tag in labels.iter().flatten() {
            tags.insert(tag);
        }
        Self { tags }
    }

    pub fn index(&self, tag: &str) -> Option<u32> {
        self.tags.id(tag)
    }

    pub fn tag(&self, index: u32) -> Option<&str> {
        self.tags.get(index)
    }

    pub fn len(&self) -> usize {
        self.tags.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tags.items.is_empty()
    }

    /// Tags in id order.
    pub fn tags(&self) -> &[String] {
        &self.tags.items
    }
}

impl From<Vec<String>> for LabelTemplate {
    fn from(tags: Vec<String>) -> Self {
        let mut set = OrderedStrings::default();
        for tag in &tags {
            set.insert(tag);
        }
        Self { tags: set }
    }
}

impl From<LabelTemplate> for Vec<String> {
    fn from(template: LabelTemplate) -> Self {
        template.tags.items
    }
}
