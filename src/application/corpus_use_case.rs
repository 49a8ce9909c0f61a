// ============================================================
// Layer 2 — Corpus Use Cases
// ============================================================
// The small workflows that prepare inputs for training:
//
//   build_vocabulary    corpus (dir or file) → vocabulary file
//   clear_cache         drop one split's cached Examples, or all
//   preprocess_gazettes gazette tree → one sentence per line

use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use chrono::NaiveDate;

use crate::data::{
    loader::{write_corpus, CorpusLoader, GazetteLoader},
    vocabulary::{Vocabulary, VocabularyBuilder},
};
use crate::domain::{
    document::{texts, Document, Split},
    traits::DocumentSource,
};
use crate::infra::cache::ExampleCache;

#[derive(Debug, Clone)]
pub struct BuildVocabConfig {
    /// A dataset directory (its train.txt is read) or a single text file
    pub corpus:     PathBuf,
    pub output:     PathBuf,
    pub vocab_size: usize,
    pub lowercase:  bool,
}

pub fn build_vocabulary(cfg: &BuildVocabConfig) -> Result<Vocabulary> {
    let docs = if cfg.corpus.is_dir() {
        CorpusLoader::new(&cfg.corpus, Split::Train).load_all()?
    } else {
        read_lines(&cfg.corpus)?
    };
    let vocab = VocabularyBuilder::new(cfg.vocab_size)
        .lowercase(cfg.lowercase)
        .build(texts(&docs))?;
    vocab
        .write(&cfg.output)
        .with_context(|| format!("cannot write vocabulary to '{}'", cfg.output.display()))?;
    tracing::info!("Wrote {} tokens to '{}'", vocab.len(), cfg.output.display());
    Ok(vocab)
}

fn read_lines(path: &Path) -> Result<Vec<Document>> {
    let content = fs::read_to_string(path).with_context(|| format!("cannot read corpus '{}'", path.display()))?;
    Ok(content
        .lines()
        .filter(|l| !l.trim().is_empty())
        .enumerate()
        .map(|(i, l)| Document::new(format!("{}:{}", path.display(), i + 1), l.trim()))
        .collect())
}

/// `None` clears every split.
pub fn clear_cache(cache_dir: &Path, split: Option<Split>) -> Result<()> {
    let cache = ExampleCache::new(cache_dir);
    match split {
        Some(split) => cache.clear(split)?,
        None        => cache.clear_all()?,
    }
    Ok(())
}

#[derive(Debug, Clone)]
pub struct PreprocessConfig {
    pub gazette_root: PathBuf,
    pub since:        Option<NaiveDate>,
    pub output:       PathBuf,
    pub normalise:    bool,
}

/// Returns the number of sentences written.
pub fn preprocess_gazettes(cfg: &PreprocessConfig) -> Result<usize> {
    let docs = GazetteLoader::new(&cfg.gazette_root)
        .since(cfg.since)
        .normalise(cfg.normalise)
        .load_all()?;
    write_corpus(&cfg.output, &docs)?;
    tracing::info!("Wrote {} sentences to '{}'", docs.len(), cfg.output.display());
    Ok(docs.len())
}
