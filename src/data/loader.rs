// ============================================================
// Layer 4 — Corpus Loaders
// ============================================================
// Two DocumentSource implementations:
//
//   CorpusLoader   <dataset_dir>/{train,test,evaluation}.txt
//                  one text unit per line, blank lines skipped
//
//   GazetteLoader  <root>/<city_id>/<YYYY-MM-DD>/*.txt
//                  raw extracted gazette text, cleaned by the
//                  Preprocessor and split into sentences
//
// Both return documents in a deterministic order (line order,
// then sorted file paths) so vocabulary ids and cache contents
// are reproducible run to run.

use std::{
    fs,
    path::{Path, PathBuf},
};

use chrono::NaiveDate;

use crate::data::preprocessor::{clean_sentence, remove_new_line_char, Preprocessor};
use crate::data::segmenter::SentenceSegmenter;
use crate::domain::document::{Document, Split};
use crate::domain::traits::DocumentSource;
use crate::error::{AutoencoderError, Result};

const DATE_FORMAT: &str = "%Y-%m-%d";

/// Reads one split file of a dataset directory.
pub struct CorpusLoader {
    dir:   PathBuf,
    split: Split,
}

impl CorpusLoader {
    pub fn new(dir: impl Into<PathBuf>, split: Split) -> Self {
        Self { dir: dir.into(), split }
    }

    pub fn path(&self) -> PathBuf {
        split_path(&self.dir, self.split)
    }
}

/// `<dir>/<split>.txt`
pub fn split_path(dir: &Path, split: Split) -> PathBuf {
    dir.join(format!("{}.txt", split.as_str()))
}

impl DocumentSource for CorpusLoader {
    fn load_all(&self) -> Result<Vec<Document>> {
        let path = self.path();
        if !path.exists() {
            // Only the training split is mandatory.
            if self.split == Split::Train {
                return Err(AutoencoderError::Configuration(format!(
                    "training split '{}' does not exist",
                    path.display()
                )));
            }
            tracing::warn!("Split file '{}' does not exist, using an empty split", path.display());
            return Ok(Vec::new());
        }

        let content = fs::read_to_string(&path).map_err(|e| AutoencoderError::io(e, &path))?;
        let docs: Vec<Document> = content
            .lines()
            .enumerate()
            .filter(|(_, line)| !line.trim().is_empty())
            .map(|(i, line)| Document::new(format!("{}:{}", path.display(), i + 1), line.trim()))
            .collect();

        tracing::info!("Loaded {} {} documents from '{}'", docs.len(), self.split, path.display());
        Ok(docs)
    }
}

/// True when the directory is named with a date on or after `since`.
pub fn is_directory_date(dir: &Path, since: NaiveDate) -> bool {
    dir.file_name()
        .and_then(|n| n.to_str())
        .and_then(|n| NaiveDate::parse_from_str(n, DATE_FORMAT).ok())
        .is_some_and(|date| date >= since)
}

/// Every `.txt` gazette file under `root`, sorted. With `since`, only
/// files whose parent directory is dated on or after it.
pub fn find_gazette_files(root: &Path, since: Option<NaiveDate>) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    let mut pending = vec![root.to_path_buf()];

    while let Some(dir) = pending.pop() {
        let entries = fs::read_dir(&dir).map_err(|e| AutoencoderError::io(e, &dir))?;
        for entry in entries {
            let path = entry.map_err(|e| AutoencoderError::io(e, &dir))?.path();
            if path.is_dir() {
                pending.push(path);
            } else if path.extension().is_some_and(|ext| ext == "txt") {
                let keep = match since {
                    Some(since) => path.parent().is_some_and(|p| is_directory_date(p, since)),
                    None => true,
                };
                if keep {
                    files.push(path);
                }
            }
        }
    }

    files.sort();
    Ok(files)
}

/// Parse a `--since` argument.
pub fn parse_since(value: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(value, DATE_FORMAT).map_err(|e| {
        AutoencoderError::Configuration(format!("'{value}' is not a YYYY-MM-DD date: {e}"))
    })
}

/// Loads gazette files as cleaned, segmented sentences.
pub struct GazetteLoader {
    root:         PathBuf,
    since:        Option<NaiveDate>,
    normalise:    bool,
    preprocessor: Preprocessor,
    segmenter:    SentenceSegmenter,
}

impl GazetteLoader {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root:         root.into(),
            since:        None,
            normalise:    true,
            preprocessor: Preprocessor::new(),
            segmenter:    SentenceSegmenter::default(),
        }
    }

    pub fn since(mut self, since: Option<NaiveDate>) -> Self {
        self.since = since;
        self
    }

    /// Apply `clean_sentence` (lowercase, drop dots and dashes) to each sentence.
    pub fn normalise(mut self, normalise: bool) -> Self {
        self.normalise = normalise;
        self
    }

    pub fn sentences(&self, raw: &str) -> Vec<String> {
        let text = self.preprocessor.clean(raw);
        let text = remove_new_line_char(&text);
        self.segmenter
            .segment(&text)
            .into_iter()
            .map(|s| if self.normalise { clean_sentence(&s).trim().to_string() } else { s })
            .filter(|s| s.chars().count() >= 3)
            .collect()
    }
}

impl DocumentSource for GazetteLoader {
    fn load_all(&self) -> Result<Vec<Document>> {
        if !self.root.exists() {
            return Err(AutoencoderError::Configuration(format!(
                "gazette root '{}' does not exist",
                self.root.display()
            )));
        }
        let files = find_gazette_files(&self.root, self.since)?;
        let mut docs = Vec::new();

        for file in &files {
            let raw = fs::read_to_string(file).map_err(|e| AutoencoderError::io(e, file))?;
            let sentences = self.sentences(&raw);
            if sentences.is_empty() {
                tracing::warn!("Could not get text from '{}'", file.display());
                continue;
            }
            let source = file.display().to_string();
            docs.extend(sentences.into_iter().map(|s| Document::new(source.clone(), s)));
        }

        tracing::info!("Loaded {} sentences from {} gazette files", docs.len(), files.len());
        Ok(docs)
    }
}

/// Write documents as a corpus split file, one per line.
pub fn write_corpus(path: &Path, docs: &[Document]) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| AutoencoderError::io(e, parent))?;
    }
    let mut body = String::new();
    for doc in docs {
        body.push_str(&doc.text.replace('\n', " "));
        body.push('\n');
    }
    fs::write(path, body).map_err(|e| AutoencoderError::io(e, path))
}
