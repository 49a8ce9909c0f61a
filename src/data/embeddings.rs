// ============================================================
// Layer 4 — Embedding Loader
// ============================================================
// Parses a GloVe-style text file of `token v1 v2 ... vD` rows
// into a dense |V| x D matrix aligned to vocabulary ids.
//
//   token in file, in vocab   → row copied from the file
//   token in file, not vocab  → ignored
//   token in vocab, not file  → seeded uniform [-0.05, 0.05]
//   [PAD]                     → zero vector
//
// Random rows are drawn from one StdRng seeded once and filled
// in id order, so the same (seed, vocab, file) always gives the
// same matrix.

use std::{
    fs::{self, File},
    io::{BufRead, BufReader},
    path::Path,
};

use rand::{rngs::StdRng, Rng, SeedableRng};

use crate::data::vocabulary::Vocabulary;
use crate::domain::example::PAD_ID;
use crate::error::{AutoencoderError, Result};

const INIT_RANGE: f32 = 0.05;

/// Row-major `rows x dim` matrix of f32.
#[derive(Debug, Clone, PartialEq)]
pub struct EmbeddingMatrix {
    values: Vec<f32>,
    rows:   usize,
    dim:    usize,
}

impl EmbeddingMatrix {
    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    pub fn values(&self) -> &[f32] {
        &self.values
    }

    #[cfg(test)]
    pub fn row(&self, id: u32) -> &[f32] {
        let start = id as usize * self.dim;
        &self.values[start..start + self.dim]
    }
}

#[derive(Debug, Clone)]
pub struct EmbeddingLoader {
    dim:  usize,
    seed: u64,
}

impl EmbeddingLoader {
    pub fn new(dim: usize, seed: u64) -> Self {
        Self { dim, seed }
    }

    /// Matrix with every row random, used when no embedding file is given.
    pub fn random(&self, vocab: &Vocabulary) -> Result<EmbeddingMatrix> {
        self.assemble(vocab, |_| None)
    }

    pub fn load(&self, path: impl AsRef<Path>, vocab: &Vocabulary) -> Result<EmbeddingMatrix> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(AutoencoderError::Configuration(format!(
                "embedding file '{}' does not exist",
                path.display()
            )));
        }
        let content = fs::read_to_string(path).map_err(|e| AutoencoderError::io(e, path))?;

        let mut pretrained: Vec<Option<Vec<f32>>> = vec![None; vocab.len()];
        let mut found = 0usize;

        for (lineno, line) in content.lines().enumerate() {
            let mut fields = line.split_whitespace();
            let Some(token) = fields.next() else { continue };
            let vector: Vec<f32> = fields
                .map(|v| {
                    v.parse::<f32>().map_err(|_| {
                        AutoencoderError::data_format(
                            path,
                            lineno + 1,
                            format!("'{v}' is not a number"),
                        )
                    })
                })
                .collect::<Result<_>>()?;

            // Width is checked for every row, including ignored tokens.
            if vector.len() != self.dim {
                return Err(AutoencoderError::data_format(
                    path,
                    lineno + 1,
                    format!("expected {} values, found {}", self.dim, vector.len()),
                ));
            }

            if !vocab.contains(token) {
                continue;
            }
            let id = vocab.id(token) as usize;
            if pretrained[id].is_none() {
                found += 1;
                pretrained[id] = Some(vector);
            }
        }

        tracing::info!(
            "Embeddings: {} of {} vocabulary tokens found in '{}' (dim={})",
            found,
            vocab.len(),
            path.display(),
            self.dim
        );
        self.assemble(vocab, |id| pretrained[id].take())
    }

    fn assemble<F>(&self, vocab: &Vocabulary, mut pretrained: F) -> Result<EmbeddingMatrix>
    where
        F: FnMut(usize) -> Option<Vec<f32>>,
    {
        if self.dim == 0 {
            return Err(AutoencoderError::Configuration(
                "embedding dimension must be greater than zero".into(),
            ));
        }
        let mut rng = StdRng::seed_from_u64(self.seed);
        let mut values = Vec::with_capacity(vocab.len() * self.dim);

        for id in 0..vocab.len() {
            // Every row consumes `dim` draws, pretrained or not.
            let random: Vec<f32> = (0..self.dim)
                .map(|_| rng.gen_range(-INIT_RANGE..INIT_RANGE))
                .collect();
            let row = if id == PAD_ID as usize {
                vec![0.0; self.dim]
            } else {
                pretrained(id).unwrap_or(random)
            };
            values.extend(row);
        }

        Ok(EmbeddingMatrix { values, rows: vocab.len(), dim: self.dim })
    }
}

/// Width of the first non-blank row, without reading the rest of the file.
pub fn file_dim(path: impl AsRef<Path>) -> Result<Option<usize>> {
    let path = path.as_ref();
    let file = File::open(path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            AutoencoderError::Configuration(format!("embedding file '{}' does not exist", path.display()))
        } else {
            AutoencoderError::io(e, path)
        }
    })?;
    for line in BufReader::new(file).lines() {
        let line = line.map_err(|e| AutoencoderError::io(e, path))?;
        let fields = line.split_whitespace().count();
        if fields > 0 {
            return Ok(Some(fields - 1));
        }
    }
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::vocabulary::VocabularyBuilder;

    fn vocab() -> Vocabulary {
        VocabularyBuilder::new(10).build(["lei decreto lei"]).unwrap()
    }

    fn write(dir: &tempfile::TempDir, body: &str) -> std::path::PathBuf {
        let path = dir.path().join("emb.txt");
        fs::write(&path, body).unwrap();
        path
    }

    #[test]
    fn test_copies_known_rows_and_ignores_unknown_tokens() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(&dir, "lei 1 2 3\nforeign 9 9 9\n");
        let vocab = vocab();
        let m = EmbeddingLoader::new(3, 7).load(&path, &vocab).unwrap();
        assert_eq!(m.rows(), vocab.len());
        assert_eq!(m.dim(), 3);
        assert_eq!(m.row(vocab.id("lei")), &[1.0, 2.0, 3.0]);
    }

    #[test]
    fn test_pad_row_is_zero() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(&dir, "lei 1 2 3\n");
        let m = EmbeddingLoader::new(3, 7).load(&path, &vocab()).unwrap();
        assert_eq!(m.row(PAD_ID), &[0.0, 0.0, 0.0]);
    }

    #[test]
    fn test_missing_rows_are_seeded_and_reproducible() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(&dir, "lei 1 2 3\n");
        let vocab = vocab();
        let a = EmbeddingLoader::new(3, 42).load(&path, &vocab).unwrap();
        let b = EmbeddingLoader::new(3, 42).load(&path, &vocab).unwrap();
        let c = EmbeddingLoader::new(3, 43).load(&path, &vocab).unwrap();
        assert_eq!(a, b);
        assert_ne!(a.row(vocab.id("decreto")), c.row(vocab.id("decreto")));
        assert!(a.row(vocab.id("decreto")).iter().all(|v| v.abs() <= INIT_RANGE));
    }

    #[test]
    fn test_wrong_width_is_data_format_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(&dir, "lei 1 2 3\ndecreto 1 2\n");
        let err = EmbeddingLoader::new(3, 0).load(&path, &vocab()).unwrap_err();
        assert!(matches!(err, AutoencoderError::DataFormat { line: 2, .. }));
    }

    #[test]
    fn test_non_numeric_value_is_data_format_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(&dir, "lei 1 x 3\n");
        let err = EmbeddingLoader::new(3, 0).load(&path, &vocab()).unwrap_err();
        assert!(matches!(err, AutoencoderError::DataFormat { line: 1, .. }));
    }

    #[test]
    fn test_file_dim_reads_first_row() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(&dir, "\nlei 1 2 3 4\ndecreto 1\n");
        assert_eq!(file_dim(&path).unwrap(), Some(4));
        let empty = write(&dir, "\n\n");
        assert_eq!(file_dim(&empty).unwrap(), None);
    }

    #[test]
    fn test_missing_file_is_configuration_error() {
        let err = EmbeddingLoader::new(3, 0)
            .load("/nonexistent/emb.txt", &vocab())
            .unwrap_err();
        assert!(matches!(err, AutoencoderError::Configuration(_)));
    }
}
