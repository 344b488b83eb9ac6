//! # Corpus Reader
//!
//! Reads a directory of tab-separated `token\ttag\textra` files into parallel
//! sentence, label and length arrays. Blank (single-field) lines separate
//! sentences. Malformed lines and sentences outside `1..=300` tokens are
//! silently dropped.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::LIMIT_LENGTH_OF_SENTENCES;
use crate::error::Result;

/// Parallel arrays of sentences, label sequences and real lengths.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Corpus {
    pub sentences: Vec<Vec<String>>,
    pub labels: Vec<Vec<String>>,
    /// Lengths before padding.
    pub sequence_lengths: Vec<usize>,
}

impl Corpus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of samples.
    pub fn len(&self) -> usize {
        self.sentences.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sentences.is_empty()
    }

    /// Append one sample if its length is within `1..=LIMIT_LENGTH_OF_SENTENCES`.
    ///
    /// Returns whether the sample was kept.
    pub fn push(&mut self, sentence: Vec<String>, labels: Vec<String>) -> bool {
        let len = sentence.len();
        if len == 0 || len > LIMIT_LENGTH_OF_SENTENCES || labels.len() != len {
            return false;
        }
        self.sentences.push(sentence);
        self.labels.push(labels);
        self.sequence_lengths.push(len);
        true
    }
}

/// One parsed line of a corpus file.
#[derive(Debug, PartialEq, Eq)]
enum Record<'a> {
    Boundary,
    Token { token: String, tag: &'a str },
    Malformed,
}

fn parse_line(line: &str) -> Record<'_> {
    let row = line.trim();
    let fields: Vec<&str> = row.split('\t').collect();
    match fields.len() {
        1 => Record::Boundary,
        3 => Record::Token {
            token: fields[0].trim().to_lowercase(),
            tag: fields[1],
        },
        _ => Record::Malformed,
    }
}

/// Parse the content of one corpus file, appending its sentences to `corpus`.
///
/// Returns `(kept, dropped)` sentence counts.
pub fn read_document(content: &str, corpus: &mut Corpus) -> (usize, usize) {
    let mut sentence = Vec::new();
    let mut labels = Vec::new();
    let mut kept = 0;
    let mut dropped = 0;

    let mut flush = |sentence: &mut Vec<String>, labels: &mut Vec<String>| {
        let had_tokens = !sentence.is_empty();
        if corpus.push(std::mem::take(sentence), std::mem::take(labels)) {
            kept += 1;
        } else if had_tokens {
            dropped += 1;
        }
    };

    for line in content.lines() {
        match parse_line(line) {
            Record::Boundary => flush(&mut sentence, &mut labels),
            Record::Token { token, tag } => {
                sentence.push(token);
                labels.push(tag.to_string());
            }
            Record::Malformed => {}
        }
    }
    flush(&mut sentence, &mut labels);

    (kept, dropped)
}

/// Read every file of `dir` (sorted by name) into one corpus.
///
/// A missing directory yields an empty corpus.
pub fn read_corpus_dir(dir: impl AsRef<Path>) -> Result<Corpus> {
    let dir = dir.as_ref();
    let mut corpus = Corpus::new();

    if !dir.is_dir() {
        warn!(dir = %dir.display(), "corpus directory not found, corpus is empty");
        return Ok(corpus);
    }

    let mut files: Vec<PathBuf> = fs::read_dir(dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| path.is_file())
        .collect();
    files.sort();

    let mut total_dropped = 0;
    for path in &files {
        let content = fs::read_to_string(path)?;
        let (kept, dropped) = read_document(&content, &mut corpus);
        total_dropped += dropped;
        debug!(file = %path.display(), kept, dropped, "read corpus file");
    }

    info!(
        files = files.len(),
        sentences = corpus.len(),
        dropped = total_dropped,
        "corpus loaded"
    );
    Ok(corpus)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::NerFeedError;

    fn temp_corpus_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("nerfeed-corpus-{name}-{}", std::process::id()));
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn sentence_of(len: usize) -> String {
        let mut doc = String::new();
        for i in 0..len {
            doc.push_str(&format!("tok{i}\tO\tx\n"));
        }
        doc.push('\n');
        doc
    }

    #[test]
    fn test_parse_line_variants() {
        assert_eq!(parse_line(""), Record::Boundary);
        assert_eq!(parse_line("   "), Record::Boundary);
        assert_eq!(
            parse_line("  Aspirin\tB-CHEM\t12 \n"),
            Record::Token {
                token: "aspirin".into(),
                tag: "B-CHEM"
            }
        );
        assert_eq!(parse_line("a\tb"), Record::Malformed);
        assert_eq!(parse_line("a\tb\tc\td"), Record::Malformed);
    }

    #[test]
    fn test_read_document_splits_sentences() {
        let doc = "The\tO\t0\nCell\tB-X\t1\n\nIt\tO\t2\n";
        let mut corpus = Corpus::new();
        let (kept, dropped) = read_document(doc, &mut corpus);

        assert_eq!((kept, dropped), (2, 0));
        assert_eq!(corpus.sentences, vec![vec!["the", "cell"], vec!["it"]]);
        assert_eq!(corpus.labels, vec![vec!["O", "B-X"], vec!["O"]]);
        assert_eq!(corpus.sequence_lengths, vec![2, 1]);
    }

    #[test]
    fn test_consecutive_blank_lines_yield_no_empty_sentence() {
        let doc = "a\tO\tx\n\n\n\nb\tO\tx\n\n";
        let mut corpus = Corpus::new();
        read_document(doc, &mut corpus);
        assert_eq!(corpus.len(), 2);
    }

    #[test]
    fn test_malformed_lines_are_skipped() {
        let doc = "a\tO\tx\nbroken\tline\nb\tI-X\tx\n\n";
        let mut corpus = Corpus::new();
        read_document(doc, &mut corpus);
        assert_eq!(corpus.sentences, vec![vec!["a", "b"]]);
        assert_eq!(corpus.sequence_lengths, vec![2]);
    }

    #[test]
    fn test_length_limit() {
        let mut corpus = Corpus::new();
        let (kept, dropped) = read_document(&sentence_of(300), &mut corpus);
        assert_eq!((kept, dropped), (1, 0));

        let (kept, dropped) = read_document(&sentence_of(301), &mut corpus);
        assert_eq!((kept, dropped), (0, 1));
        assert_eq!(corpus.sequence_lengths, vec![300]);
    }

    #[test]
    fn test_lengths_match_arrays() {
        let doc = "a\tO\tx\nb\tO\tx\nc\tO\tx\n\nd\tB-Y\tx\n\n";
        let mut corpus = Corpus::new();
        read_document(doc, &mut corpus);
        for i in 0..corpus.len() {
            assert_eq!(corpus.sentences[i].len(), corpus.sequence_lengths[i]);
            assert_eq!(corpus.labels[i].len(), corpus.sequence_lengths[i]);
        }
    }

    #[test]
    fn test_missing_dir_is_empty() {
        let corpus = read_corpus_dir("/definitely/not/a/corpus/dir").unwrap();
        assert!(corpus.is_empty());
    }

    #[test]
    fn test_subdirectories_are_skipped() {
        let dir = temp_corpus_dir("nested");
        fs::write(dir.join("b.tsv"), "second\tO\tx\n\n").unwrap();
        fs::write(dir.join("a.tsv"), "first\tO\tx\n\n").unwrap();
        fs::create_dir_all(dir.join("nested")).unwrap();
        fs::write(dir.join("nested").join("c.tsv"), "hidden\tO\tx\n\n").unwrap();

        let corpus = read_corpus_dir(&dir).unwrap();
        assert_eq!(corpus.sentences, vec![vec!["first"], vec!["second"]]);
        let _ = fs::remove_dir_all(dir);
    }

    #[test]
    fn test_unreadable_file_is_an_error() {
        let dir = temp_corpus_dir("binary");
        fs::write(dir.join("a.tsv"), "ok\tO\tx\n\n").unwrap();
        fs::write(dir.join("b.tsv"), b"\xff\xfe\tO\tx\n").unwrap();

        let result = read_corpus_dir(&dir);
        assert!(matches!(result, Err(NerFeedError::Io(_))));
        let _ = fs::remove_dir_all(dir);
    }
}
