// ============================================================
// Layer 6 — Example Cache
// ============================================================
// Per-split on-disk cache of tokenised Examples.
//
//   <cache_dir>/
//     train/<fingerprint>.json
//     test/<fingerprint>.json
//     evaluation/<fingerprint>.json
//
// The key is (split, fingerprint), and the fingerprint is chosen
// by the caller to describe the preprocessing configuration.
// Nothing is derived from file contents or timestamps: an entry
// stays valid until `clear` / `clear_all` removes it, even if the
// vocabulary behind it has changed.
//
// Entries are compact serde_json arrays written to a temporary
// file and renamed into place, so the same examples always give
// the same bytes and a crashed write never leaves a half entry
// under the real name. A corrupted entry is reported as a Cache
// error and left on disk for the caller to clear. Corrupted covers
// both unparsable JSON and examples no tokenizer of this run
// could have produced:
//
//   length outside 1..=token_ids.len()
//   token_ids.len() != the tokenizer's max_seq_len
//   an id outside the tokenizer's vocabulary

use std::{
    fs,
    path::{Path, PathBuf},
};

use crate::domain::{document::Split, example::Example};
use crate::error::{AutoencoderError, Result};
use crate::infra::tokenizer_store::TextTokenizer;

#[derive(Debug, Clone)]
pub struct ExampleCache {
    root: PathBuf,
}

/// Fingerprints become file names: non-empty, `[A-Za-z0-9._-]` only.
pub fn validate_fingerprint(fingerprint: &str) -> Result<()> {
    let valid = !fingerprint.is_empty()
        && fingerprint != "."
        && fingerprint != ".."
        && fingerprint
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'));
    if valid {
        Ok(())
    } else {
        Err(AutoencoderError::Configuration(format!(
            "invalid cache fingerprint '{fingerprint}': use letters, digits, '.', '_' or '-'"
        )))
    }
}

impl ExampleCache {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn split_dir(&self, split: Split) -> PathBuf {
        self.root.join(split.as_str())
    }

    pub fn entry_path(&self, split: Split, fingerprint: &str) -> Result<PathBuf> {
        validate_fingerprint(fingerprint)?;
        Ok(self.split_dir(split).join(format!("{fingerprint}.json")))
    }

    /// `Ok(None)` on a miss. A hit is checked against the shape
    /// `tokenizer` gives its examples.
    pub fn load(&self, split: Split, fingerprint: &str, tokenizer: &TextTokenizer) -> Result<Option<Vec<Example>>> {
        let path = self.entry_path(split, fingerprint)?;
        if !path.exists() {
            return Ok(None);
        }
        let corrupted = |detail: String| {
            cache_error(&path, format!("corrupted entry ({detail}); clear the '{split}' cache to rebuild it"))
        };
        let bytes = fs::read(&path).map_err(|e| cache_error(&path, format!("unreadable entry: {e}")))?;
        let examples: Vec<Example> = serde_json::from_slice(&bytes).map_err(|e| corrupted(e.to_string()))?;
        check_shape(&examples, tokenizer.max_seq_len(), tokenizer.vocab().len()).map_err(corrupted)?;
        Ok(Some(examples))
    }

    pub fn store(&self, split: Split, fingerprint: &str, examples: &[Example]) -> Result<PathBuf> {
        let path = self.entry_path(split, fingerprint)?;
        let dir = self.split_dir(split);
        fs::create_dir_all(&dir).map_err(|e| cache_error(&dir, format!("cannot create directory: {e}")))?;

        let bytes = serde_json::to_vec(examples)?;
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, &bytes).map_err(|e| cache_error(&tmp, format!("cannot write entry: {e}")))?;
        fs::rename(&tmp, &path).map_err(|e| cache_error(&path, format!("cannot commit entry: {e}")))?;

        tracing::debug!("Cached {} {} examples at '{}'", examples.len(), split, path.display());
        Ok(path)
    }

    /// Return the cached examples for (split, fingerprint), tokenising
    /// `texts` and writing the entry on a miss.
    pub fn load_or_build(
        &self,
        split:       Split,
        fingerprint: &str,
        texts:       &[&str],
        tokenizer:   &TextTokenizer,
    ) -> Result<Vec<Example>> {
        if let Some(examples) = self.load(split, fingerprint, tokenizer)? {
            tracing::info!("Cache hit: {} {} examples ({})", examples.len(), split, fingerprint);
            return Ok(examples);
        }
        tracing::info!("Cache miss: tokenising {} {} texts ({})", texts.len(), split, fingerprint);
        let examples = tokenizer.encode_batch(texts)?;
        self.store(split, fingerprint, &examples)?;
        Ok(examples)
    }

    /// Remove every entry of one split.
    pub fn clear(&self, split: Split) -> Result<()> {
        let dir = self.split_dir(split);
        if dir.exists() {
            fs::remove_dir_all(&dir).map_err(|e| cache_error(&dir, format!("cannot clear: {e}")))?;
            tracing::info!("Cleared {} cache at '{}'", split, dir.display());
        }
        Ok(())
    }

    pub fn clear_all(&self) -> Result<()> {
        for split in Split::ALL {
            self.clear(split)?;
        }
        Ok(())
    }
}

fn check_shape(examples: &[Example], max_seq_len: usize, vocab_len: usize) -> std::result::Result<(), String> {
    for (i, ex) in examples.iter().enumerate() {
        if ex.max_len() != max_seq_len {
            return Err(format!("example {i} has {} ids, expected {max_seq_len}", ex.max_len()));
        }
        if ex.length == 0 || ex.length > ex.max_len() {
            return Err(format!("example {i} has length {} outside 1..={}", ex.length, ex.max_len()));
        }
        if let Some(id) = ex.token_ids.iter().find(|&&id| id as usize >= vocab_len) {
            return Err(format!("example {i} has id {id} outside a vocabulary of {vocab_len}"));
        }
    }
    Ok(())
}

fn cache_error(path: &Path, message: String) -> AutoencoderError {
    AutoencoderError::Cache { path: path.to_path_buf(), message }
}
