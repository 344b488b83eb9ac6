//! # Tag Schemes for Named Entity Recognition
//!
//! Validates IOB label sequences, repairs IOB1 into IOB2 and rewrites IOB2
//! into IOBES (Begin, Inside, Outside, End, Single).
//!
//! Both passes scan left to right; validation looks one tag back and the IOBES
//! rewrite looks one tag ahead.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{NerFeedError, Result};

/// The outside tag.
pub const OUTSIDE: &str = "O";

/// Target tagging scheme of a preprocessing run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TagScheme {
    /// Labels kept as read from the corpus.
    #[serde(rename = "BIO")]
    Bio,
    /// Labels validated and rewritten to BIOES.
    #[serde(rename = "BIOES")]
    Bioes,
}

impl TagScheme {
    pub fn as_str(&self) -> &'static str {
        match self {
            TagScheme::Bio => "BIO",
            TagScheme::Bioes => "BIOES",
        }
    }
}

impl fmt::Display for TagScheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TagScheme {
    type Err = NerFeedError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "BIO" => Ok(TagScheme::Bio),
            "BIOES" => Ok(TagScheme::Bioes),
            other => Err(NerFeedError::UnsupportedScheme(other.to_string())),
        }
    }
}

/// Prefix of a tag before the first `-`.
fn prefix(tag: &str) -> &str {
    tag.split('-').next().unwrap_or(tag)
}

/// Everything after the first character (`-TYPE` for well-formed tags).
fn suffix(tag: &str) -> &str {
    tag.char_indices()
        .nth(1)
        .map_or("", |(idx, _)| &tag[idx..])
}

/// Check that `tags` is valid IOB and repair IOB1 into IOB2 in place.
///
/// An `I-TYPE` that opens a chunk (first position, after `O`, or after a tag
/// of another type) becomes `B-TYPE`. Returns `false` on the first tag that is
/// neither `O` nor `B-TYPE`/`I-TYPE`; rewrites made before it stay in place.
pub fn iob2(tags: &mut [String]) -> bool {
    for i in 0..tags.len() {
        if tags[i] == OUTSIDE {
            continue;
        }
        let parts: Vec<&str> = tags[i].split('-').collect();
        if parts.len() != 2 || !matches!(parts[0], "B" | "I") {
            return false;
        }
        if parts[0] == "B" {
            continue;
        }
        let opens_chunk =
            i == 0 || tags[i - 1] == OUTSIDE || suffix(&tags[i - 1]) != suffix(&tags[i]);
        if opens_chunk {
            tags[i] = format!("B{}", suffix(&tags[i]));
        }
    }
    true
}

/// Rewrite a valid IOB2 sequence into IOBES.
///
/// `B-T` stays when the next tag is an `I-`, else becomes `S-T`; `I-T` stays
/// when the next tag is an `I-`, else becomes `E-T`.
pub fn iob_iobes(tags: &[String]) -> Result<Vec<String>> {
    let mut new_tags = Vec::with_capacity(tags.len());
    for (i, tag) in tags.iter().enumerate() {
        let next_is_inside = tags.get(i + 1).is_some_and(|next| prefix(next) == "I");
        let new_tag = match prefix(tag) {
            _ if tag == OUTSIDE => tag.clone(),
            "B" if next_is_inside => tag.clone(),
            "B" => format!("S{}", suffix(tag)),
            "I" if next_is_inside => tag.clone(),
            "I" => format!("E{}", suffix(tag)),
            _ => return Err(NerFeedError::InvalidIobes { tag: tag.clone() }),
        };
        new_tags.push(new_tag);
    }
    Ok(new_tags)
}

/// Validate and convert every label sequence of a corpus in place.
///
/// Only the first `lengths[i]` tags of `labels[i]` are touched, so padding
/// tags survive. Only [`TagScheme::Bioes`] is a supported target; any other
/// target fails before anything is mutated. The first invalid sequence aborts
/// the update; sequences before it are already converted.
pub fn update_tag_scheme(
    labels: &mut [Vec<String>],
    lengths: &[usize],
    scheme: TagScheme,
) -> Result<()> {
    if scheme != TagScheme::Bioes {
        return Err(NerFeedError::UnsupportedScheme(scheme.to_string()));
    }
    if labels.len() != lengths.len() {
        return Err(NerFeedError::ShapeMismatch(format!(
            "{} label sequences but {} lengths",
            labels.len(),
            lengths.len()
        )));
    }

    for (i, (label, &length)) in labels.iter_mut().zip(lengths).enumerate() {
        let length = length.min(label.len());
        let mut tags = label[..length].to_vec();
        if !iob2(&mut tags) {
            return Err(NerFeedError::InvalidIob { sentence: i, tags });
        }
        let new_tags = iob_iobes(&tags)?;
        label[..length].clone_from_slice(&new_tags);
    }
    Ok(())
}
