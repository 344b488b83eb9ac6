use std::path::PathBuf;

use nerfeed_core::{EmbeddingSource, VectorLookup, VectorProvider, Vocabulary};
use tracing::debug;

use crate::error::VectorError;
use crate::keyed::KeyedVectors;

/// Resolves each [`EmbeddingSource`] to a file under one directory.
///
/// `glove.6B.100d.txt.gz` is picked up when the plain file is absent.
#[derive(Debug, Clone)]
pub struct VectorDirectory {
    root: PathBuf,
}

impl VectorDirectory {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Path of the file backing `source`.
    pub fn resolve(&self, source: EmbeddingSource) -> Result<PathBuf, VectorError> {
        let plain = self.root.join(source.file_name());
        if plain.is_file() {
            return Ok(plain);
        }
        let gz = self.root.join(format!("{}.gz", source.file_name()));
        if gz.is_file() {
            return Ok(gz);
        }
        Err(VectorError::NotFound(plain))
    }
}

impl VectorProvider for VectorDirectory {
    fn load(
        &self,
        source: EmbeddingSource,
        vocab: &Vocabulary,
    ) -> nerfeed_core::Result<Box<dyn VectorLookup>> {
        let path = self.resolve(source)?;
        debug!(%source, path = %path.display(), "loading pretrained vectors");
        let vectors = KeyedVectors::load(&path, source.format(), |word| vocab.contains(word))?;
        Ok(Box::new(vectors))
    }
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::io::Write;

    use flate2::Compression;
    use flate2::write::GzEncoder;

    use super::*;

    fn scratch_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("nerfeed-vectors-{}-{name}", std::process::id()));
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn vocab() -> Vocabulary {
        Vocabulary::from_words(vec!["the".into(), "cell".into(), String::new()]).unwrap()
    }

    #[test]
    fn test_missing_file() {
        let dir = VectorDirectory::new(scratch_dir("missing"));
        let err = dir.resolve(EmbeddingSource::Glove).unwrap_err();
        assert!(matches!(err, VectorError::NotFound(_)));
        assert!(dir.load(EmbeddingSource::Glove, &vocab()).is_err());
    }

    #[test]
    fn test_loads_glove_filtered_to_vocabulary() {
        let root = scratch_dir("glove");
        fs::write(
            root.join(EmbeddingSource::Glove.file_name()),
            "the 1 2\nprotein 3 4\ncell 5 6\n",
        )
        .unwrap();

        let lookup = VectorDirectory::new(&root)
            .load(EmbeddingSource::Glove, &vocab())
            .unwrap();
        assert_eq!(lookup.dim(), 2);
        assert_eq!(lookup.vector("cell").unwrap(), &[5.0, 6.0]);
        assert!(lookup.vector("protein").is_none());
    }

    #[test]
    fn test_falls_back_to_gzip() {
        let root = scratch_dir("gzip");
        let path = root.join(format!("{}.gz", EmbeddingSource::FastText.file_name()));
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(b"1 2\nthe 0.5 -0.5\n").unwrap();
        fs::write(&path, encoder.finish().unwrap()).unwrap();

        let dir = VectorDirectory::new(&root);
        assert_eq!(dir.resolve(EmbeddingSource::FastText).unwrap(), path);
        let lookup = dir.load(EmbeddingSource::FastText, &vocab()).unwrap();
        assert_eq!(lookup.vector("the").unwrap(), &[0.5, -0.5]);
    }
}
