//! # Keyed Vectors
//!
//! In-memory word → vector table read from word2vec binary, word2vec text
//! (fastText `.vec`) or GloVe text files. Files ending in `.gz` are
//! decompressed on the fly. A `keep` predicate drops unneeded words while
//! reading, so a multi-gigabyte dump only costs the vocabulary's share of
//! memory.

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader, ErrorKind, Read};
use std::path::Path;

use flate2::read::GzDecoder;
use nerfeed_core::{VectorFormat, VectorLookup};
use tracing::{debug, info, warn};

use crate::error::{Result, VectorError};

/// Largest dimension accepted from a file header.
pub const MAX_DIM: usize = 1 << 16;

/// Dense word vectors of one dimensionality.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct KeyedVectors {
    dim: usize,
    index: HashMap<String, usize>,
    values: Vec<f32>,
}

impl KeyedVectors {
    pub fn new(dim: usize) -> Self {
        Self {
            dim,
            ..Self::default()
        }
    }

    /// Add `word` unless already present. Returns whether it was added.
    pub fn insert(&mut self, word: &str, vector: &[f32]) -> Result<bool> {
        if vector.len() != self.dim {
            return Err(VectorError::DimensionMismatch {
                word: word.to_string(),
                expected: self.dim,
                found: vector.len(),
            });
        }
        if self.index.contains_key(word) {
            return Ok(false);
        }
        self.index.insert(word.to_string(), self.index.len());
        self.values.extend_from_slice(vector);
        Ok(true)
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Read `path` in `format`, keeping the words accepted by `keep`.
    pub fn load(path: &Path, format: VectorFormat, keep: impl Fn(&str) -> bool) -> Result<Self> {
        if !path.is_file() {
            return Err(VectorError::NotFound(path.to_path_buf()));
        }
        let file = File::open(path)?;
        let is_gz = path.extension().is_some_and(|ext| ext == "gz");
        let reader: Box<dyn Read> = if is_gz {
            Box::new(GzDecoder::new(file))
        } else {
            Box::new(file)
        };
        let label = path.display().to_string();
        let vectors = Self::from_reader(BufReader::new(reader), format, keep, &label)?;
        info!(
            path = %label,
            words = vectors.len(),
            dim = vectors.dim,
            "pretrained vectors loaded"
        );
        Ok(vectors)
    }

    /// Read vectors from an already-open stream. `label` names it in errors.
    pub fn from_reader<R: BufRead>(
        reader: R,
        format: VectorFormat,
        keep: impl Fn(&str) -> bool,
        label: &str,
    ) -> Result<Self> {
        match format {
            VectorFormat::Word2VecBinary => read_binary(reader, &keep, label),
            VectorFormat::Word2VecText => read_text(reader, true, &keep, label),
            VectorFormat::GloveText => read_text(reader, false, &keep, label),
        }
    }
}

impl VectorLookup for KeyedVectors {
    fn dim(&self) -> usize {
        self.dim
    }

    fn vector(&self, token: &str) -> Option<&[f32]> {
        let row = *self.index.get(token)?;
        self.values.get(row * self.dim..(row + 1) * self.dim)
    }
}

fn parse_header(line: &str, label: &str) -> Result<(usize, usize)> {
    let bad = || VectorError::BadHeader {
        path: label.to_string(),
        line: line.trim_end().to_string(),
    };
    let mut fields = line.split_whitespace();
    let count = fields.next().and_then(|f| f.parse().ok()).ok_or_else(bad)?;
    let dim: usize = fields.next().and_then(|f| f.parse().ok()).ok_or_else(bad)?;
    if dim == 0 || dim > MAX_DIM {
        return Err(bad());
    }
    Ok((count, dim))
}

/// Read the next space-terminated word, skipping newlines. `None` at clean EOF.
fn read_word<R: BufRead>(reader: &mut R) -> Result<Option<Vec<u8>>> {
    let mut word = Vec::new();
    let mut byte = [0u8; 1];
    loop {
        match reader.read_exact(&mut byte) {
            Ok(()) => {}
            Err(err) if err.kind() == ErrorKind::UnexpectedEof => {
                return Ok(if word.is_empty() { None } else { Some(word) });
            }
            Err(err) => return Err(err.into()),
        }
        match byte[0] {
            b' ' => return Ok(Some(word)),
            b'\n' | b'\r' => {}
            b => word.push(b),
        }
    }
}

fn read_binary<R: BufRead>(
    mut reader: R,
    keep: &dyn Fn(&str) -> bool,
    label: &str,
) -> Result<KeyedVectors> {
    let mut header = String::new();
    reader.read_line(&mut header)?;
    let (count, dim) = parse_header(&header, label)?;

    let mut vectors = KeyedVectors::new(dim);
    let width = dim.checked_mul(4).ok_or_else(|| VectorError::BadHeader {
        path: label.to_string(),
        line: header.trim_end().to_string(),
    })?;
    let mut raw = vec![0u8; width];
    let mut vector = vec![0f32; dim];
    for _ in 0..count {
        let Some(word) = read_word(&mut reader)? else {
            break;
        };
        let word = String::from_utf8_lossy(&word).into_owned();
        reader.read_exact(&mut raw).map_err(|err| match err.kind() {
            ErrorKind::UnexpectedEof => VectorError::Truncated {
                path: label.to_string(),
                word: word.clone(),
            },
            _ => err.into(),
        })?;
        if !keep(&word) {
            continue;
        }
        for (value, bytes) in vector.iter_mut().zip(raw.chunks_exact(4)) {
            *value = f32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
        }
        vectors.insert(&word, &vector)?;
    }
    debug!(path = label, declared = count, kept = vectors.len(), "binary vectors read");
    Ok(vectors)
}

fn read_text<R: BufRead>(
    reader: R,
    has_header: bool,
    keep: &dyn Fn(&str) -> bool,
    label: &str,
) -> Result<KeyedVectors> {
    let mut lines = reader.lines();
    let mut vectors: Option<KeyedVectors> = None;

    if has_header {
        let header = lines.next().transpose()?.unwrap_or_default();
        let (_, dim) = parse_header(&header, label)?;
        vectors = Some(KeyedVectors::new(dim));
    }

    let mut skipped = 0usize;
    let mut vector = Vec::new();
    for line in lines {
        let line = line?;
        let mut fields = line.trim_end().split(' ');
        let Some(word) = fields.next().filter(|w| !w.is_empty()) else {
            continue;
        };

        vector.clear();
        let parsed: std::result::Result<(), _> = fields.try_for_each(|f| {
            f.parse::<f32>().map(|v| vector.push(v))
        });
        if parsed.is_err() || vector.is_empty() {
            skipped += 1;
            continue;
        }

        // GloVe has no header: the first line fixes the dimension.
        let table = vectors.get_or_insert_with(|| KeyedVectors::new(vector.len()));
        if vector.len() != table.dim {
            skipped += 1;
            continue;
        }
        if keep(word) {
            table.insert(word, &vector)?;
        }
    }

    if skipped > 0 {
        warn!(path = label, skipped, "skipped malformed vector lines");
    }
    vectors.ok_or_else(|| VectorError::Empty(label.to_string()))
}
