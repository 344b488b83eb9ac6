//! # Character Encoder
//!
//! Maps words to fixed-width, centered vectors of character ids for
//! character-level features.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{NerFeedError, Result};
use crate::vocab::Vocabulary;

/// The closed alphabet. A character's id is its position, so space is 0.
pub const ALPHABET: &str = " abcdefghijklmnopqrstuvwxyz0123456789-,;.!?:’\"/|_#$%ˆ&*˜‘+=<>()[]{}";

/// Character → id map over [`ALPHABET`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CharDictionary {
    ids: BTreeMap<char, u32>,
}

impl CharDictionary {
    /// Id written for characters outside the alphabet and for padding slots.
    ///
    /// Shared with the space character.
    pub const UNKNOWN_ID: u32 = 0;

    /// Dictionary over the standard alphabet.
    pub fn standard() -> Self {
        let ids = ALPHABET
            .chars()
            .enumerate()
            .map(|(i, c)| (c, i as u32))
            .collect();
        Self { ids }
    }

    pub fn id(&self, c: char) -> u32 {
        self.ids.get(&c).copied().unwrap_or(Self::UNKNOWN_ID)
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

impl Default for CharDictionary {
    fn default() -> Self {
        Self::standard()
    }
}

/// Encode `word` into `width` character ids, centered.
///
/// The first character lands at `(width - len) / 2`; words longer than
/// `width` start at 0 and lose their trailing characters.
pub fn word_to_char_ids(word: &str, width: usize, dict: &CharDictionary) -> Vec<u32> {
    let mut data = vec![CharDictionary::UNKNOWN_ID; width];
    let offset = width.saturating_sub(word.chars().count()) / 2;
    for (i, c) in word.chars().enumerate() {
        let pos = offset + i;
        if pos >= width {
            break;
        }
        data[pos] = dict.id(c);
    }
    data
}

/// Expand rows of word ids into character ids.
///
/// Output is a flat `[batch, max_doc_len, width]` array; positions at or past
/// each row's length stay zero.
pub fn encode_char_batch(
    sentences: &[Vec<u32>],
    lengths: &[usize],
    max_doc_len: usize,
    width: usize,
    dict: &CharDictionary,
    vocab: &Vocabulary,
) -> Result<Vec<u32>> {
    if sentences.len() != lengths.len() {
        return Err(NerFeedError::ShapeMismatch(format!(
            "{} sentences but {} lengths",
            sentences.len(),
            lengths.len()
        )));
    }

    let mut out = vec![0u32; sentences.len() * max_doc_len * width];
    for (row, (sentence, &length)) in sentences.iter().zip(lengths).enumerate() {
        for (pos, &word_id) in sentence.iter().take(length.min(max_doc_len)).enumerate() {
            let word = vocab
                .word(word_id)
                .ok_or(NerFeedError::UnknownTokenId(word_id))?;
            let start = (row * max_doc_len + pos) * width;
            out[start..start + width].copy_from_slice(&word_to_char_ids(word, width, dict));
        }
    }
    Ok(out)
}
