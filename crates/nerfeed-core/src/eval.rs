//! Prediction output: one `token\tgold\tpredicted` row per real token and a
//! `-\tX\t-` sentinel row after each sentence.

use std::io::Write;

use crate::error::{NerFeedError, Result};
use crate::vocab::{LabelTemplate, Vocabulary};

/// Row written after every non-empty sentence.
pub const SENTENCE_SENTINEL: &str = "-\tX\t-";

/// Write gold and predicted tags for the first `lengths[i]` positions of each row.
///
/// Rows with length 0 produce nothing, not even a sentinel.
pub fn write_predictions<W: Write>(
    out: &mut W,
    sentences: &[Vec<u32>],
    gold: &[Vec<u32>],
    predicted: &[Vec<u32>],
    lengths: &[usize],
    vocab: &Vocabulary,
    template: &LabelTemplate,
) -> Result<()> {
    let n = sentences.len();
    if gold.len() != n || predicted.len() != n || lengths.len() != n {
        return Err(NerFeedError::ShapeMismatch(format!(
            "{n} sentences, {} gold rows, {} predicted rows, {} lengths",
            gold.len(),
            predicted.len(),
            lengths.len()
        )));
    }

    let tag = |idx: u32| template.tag(idx).ok_or(NerFeedError::UnknownTagIndex(idx));
    for i in 0..n {
        let length = lengths[i];
        if length == 0 {
            continue;
        }
        if sentences[i].len() < length || gold[i].len() < length || predicted[i].len() < length {
            return Err(NerFeedError::ShapeMismatch(format!(
                "row {i} is shorter than its length {length}"
            )));
        }
        for pos in 0..length {
            let word_id = sentences[i][pos];
            let word = vocab
                .word(word_id)
                .ok_or(NerFeedError::UnknownTokenId(word_id))?;
            writeln!(
                out,
                "{word}\t{}\t{}",
                tag(gold[i][pos])?,
                tag(predicted[i][pos])?
            )?;
        }
        writeln!(out, "{SENTENCE_SENTINEL}")?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rows_and_sentinels() {
        let vocab = Vocabulary::from_words(vec!["aspirin".into(), "works".into(), "".into()]).unwrap();
        let template = LabelTemplate::from(vec!["O".to_string(), "S-CHEM".to_string(), "PAD".to_string()]);

        let mut out = Vec::new();
        write_predictions(
            &mut out,
            &[vec![0, 1, 2], vec![2, 2, 2], vec![1, 2, 2]],
            &[vec![1, 0, 2], vec![2, 2, 2], vec![0, 2, 2]],
            &[vec![1, 1, 2], vec![2, 2, 2], vec![0, 2, 2]],
            &[2, 0, 1],
            &vocab,
            &template,
        )
        .unwrap();

        let text = String::from_utf8(out).unwrap();
        assert_eq!(
            text,
            "aspirin\tS-CHEM\tS-CHEM\nworks\tO\tS-CHEM\n-\tX\t-\nworks\tO\tO\n-\tX\t-\n"
        );
    }

    #[test]
    fn test_mismatched_rows_rejected() {
        let vocab = Vocabulary::from_words(vec!["".into()]).unwrap();
        let template = LabelTemplate::from(vec!["O".to_string()]);
        let mut out = Vec::new();
        let err = write_predictions(&mut out, &[vec![0]], &[], &[], &[1], &vocab, &template)
            .unwrap_err();
        assert!(matches!(err, NerFeedError::ShapeMismatch(_)));
    }
}
