//! # Sentence and Label Encoding
//!
//! Converts padded sentences and label sequences to fixed-length id rows and
//! back. Padding must run before the vocabulary and the label template are
//! built, so that `""` and `PAD` are members of both.

use crate::config::{PAD_TAG, PAD_TOKEN};
use crate::corpus::Corpus;
use crate::error::{NerFeedError, Result};
use crate::vocab::{LabelTemplate, Vocabulary};

/// Longest sequence length, 0 for an empty corpus.
pub fn max_doc_len(lengths: &[usize]) -> usize {
    lengths.iter().copied().max().unwrap_or(0)
}

/// Extend every sentence with `""` and every label sequence with `PAD` up to
/// `max_doc_len`, in place.
///
/// Sequences already at or past `max_doc_len` are left as they are.
pub fn add_padding(corpus: &mut Corpus, max_doc_len: usize) {
    for ((sentence, labels), &length) in corpus
        .sentences
        .iter_mut()
        .zip(corpus.labels.iter_mut())
        .zip(&corpus.sequence_lengths)
    {
        let gap = max_doc_len.saturating_sub(length);
        sentence.extend(std::iter::repeat_n(PAD_TOKEN.to_string(), gap));
        labels.extend(std::iter::repeat_n(PAD_TAG.to_string(), gap));
    }
}

fn check_width<T>(row: usize, seq: &[T], max_doc_len: usize) -> Result<()> {
    if seq.len() < max_doc_len {
        return Err(NerFeedError::ShapeMismatch(format!(
            "row {row} has {} positions, expected {max_doc_len}",
            seq.len()
        )));
    }
    Ok(())
}

/// Map the first `max_doc_len` tokens of each sentence to vocabulary ids.
pub fn encode_sentences(
    sentences: &[Vec<String>],
    max_doc_len: usize,
    vocab: &Vocabulary,
) -> Result<Vec<Vec<u32>>> {
    sentences
        .iter()
        .enumerate()
        .map(|(row, sentence)| {
            check_width(row, sentence, max_doc_len)?;
            sentence[..max_doc_len]
                .iter()
                .map(|word| {
                    vocab
                        .id(word)
                        .ok_or_else(|| NerFeedError::UnknownToken(word.clone()))
                })
                .collect()
        })
        .collect()
}

/// Map the first `max_doc_len` tags of each sequence to template indices.
pub fn encode_labels(
    labels: &[Vec<String>],
    max_doc_len: usize,
    template: &LabelTemplate,
) -> Result<Vec<Vec<u32>>> {
    labels
        .iter()
        .enumerate()
        .map(|(row, label)| {
            check_width(row, label, max_doc_len)?;
            label[..max_doc_len]
                .iter()
                .map(|tag| {
                    template
                        .index(tag)
                        .ok_or_else(|| NerFeedError::UnknownTag(tag.clone()))
                })
                .collect()
        })
        .collect()
}

/// Map template indices back to tags.
pub fn decode_labels(encoded: &[Vec<u32>], template: &LabelTemplate) -> Result<Vec<Vec<String>>> {
    encoded
        .iter()
        .map(|row| {
            row.iter()
                .map(|&idx| {
                    template
                        .tag(idx)
                        .map(str::to_string)
                        .ok_or(NerFeedError::UnknownTagIndex(idx))
                })
                .collect()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn corpus() -> Corpus {
        let mut corpus = Corpus::new();
        corpus.push(
            vec!["the".into(), "cell".into(), "died".into()],
            vec!["O".into(), "B-C".into(), "O".into()],
        );
        corpus.push(vec!["gene".into()], vec!["S-G".into()]);
        corpus
    }

    #[test]
    fn test_padding_to_max_doc_len() {
        let mut corpus = corpus();
        let max_len = max_doc_len(&corpus.sequence_lengths);
        add_padding(&mut corpus, max_len);

        assert_eq!(max_len, 3);
        assert!(corpus.sentences.iter().all(|s| s.len() == 3));
        assert!(corpus.labels.iter().all(|l| l.len() == 3));
        assert_eq!(corpus.sentences[1], vec!["gene", "", ""]);
        assert_eq!(corpus.labels[1], vec!["S-G", "PAD", "PAD"]);
        assert_eq!(corpus.sequence_lengths, vec![3, 1]);
    }

    #[test]
    fn test_encode_sentences_uses_vocab_ids() {
        let mut corpus = corpus();
        add_padding(&mut corpus, 3);
        let vocab = Vocabulary::build(&corpus.sentences, &corpus.sequence_lengths, 3);
        let encoded = encode_sentences(&corpus.sentences, 3, &vocab).unwrap();

        assert_eq!(encoded, vec![vec![0, 1, 2], vec![3, 4, 4]]);
    }

    #[test]
    fn test_encode_unknown_token_fails() {
        let vocab = Vocabulary::from_words(vec!["a".into(), "".into()]).unwrap();
        let err = encode_sentences(&[vec!["b".into()]], 1, &vocab).unwrap_err();
        assert!(matches!(err, NerFeedError::UnknownToken(ref w) if w == "b"));
    }

    #[test]
    fn test_encode_short_row_fails() {
        let vocab = Vocabulary::from_words(vec!["a".into(), "".into()]).unwrap();
        let err = encode_sentences(&[vec!["a".into()]], 2, &vocab).unwrap_err();
        assert!(matches!(err, NerFeedError::ShapeMismatch(_)));
    }

    #[test]
    fn test_label_roundtrip() {
        let mut corpus = corpus();
        add_padding(&mut corpus, 3);
        let template = LabelTemplate::from_labels(&corpus.labels);
        let encoded = encode_labels(&corpus.labels, 3, &template).unwrap();
        let decoded = decode_labels(&encoded, &template).unwrap();
        assert_eq!(decoded, corpus.labels);
    }

    #[test]
    fn test_encode_unknown_tag_fails() {
        let template = LabelTemplate::from(vec!["O".to_string(), "PAD".to_string()]);
        let labels = vec![vec!["O".to_string(), "B-CHEM".to_string()]];
        let err = encode_labels(&labels, 2, &template).unwrap_err();
        assert!(matches!(err, NerFeedError::UnknownTag(ref t) if t == "B-CHEM"));
    }

    #[test]
    fn test_decode_out_of_range() {
        let template = LabelTemplate::from(vec!["O".to_string()]);
        let err = decode_labels(&[vec![0, 9]], &template).unwrap_err();
        assert!(matches!(err, NerFeedError::UnknownTagIndex(9)));
    }

    #[test]
    fn test_empty_corpus_max_len() {
        assert_eq!(max_doc_len(&[]), 0);
    }
}
