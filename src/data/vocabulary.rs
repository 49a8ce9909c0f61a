// ============================================================
// Layer 4 — Vocabulary Builder
// ============================================================
// Maps tokens to contiguous ids 0..N-1.
//
//   id 0..=3   reserved: [PAD] [UNK] [BOS] [EOS]
//   id 4..     corpus tokens, most frequent first
//
// Ties in frequency are broken by first-seen order, so the
// same documents in the same order always give the same ids.
// A vocabulary is immutable once built, and every checkpoint
// ships a copy of the one it was trained with.
//
// Vocabulary file format: one token per line, line 0 → id 4.
// The reserved tokens are implicit and never written.

use std::{
    collections::HashMap,
    fs,
    path::Path,
};

use tokenizers::{
    pre_tokenizers::whitespace::Whitespace,
    OffsetReferential, OffsetType, PreTokenizedString, PreTokenizer,
};

use crate::domain::example::{RESERVED_COUNT, RESERVED_TOKENS, UNK_ID};
use crate::error::{AutoencoderError, Result};

/// Split text the same way the persisted tokenizer does:
/// optional lowercasing, then HF's `Whitespace` pre-tokenizer
/// (`\w+|[^\w\s]+`). Vocabulary counting and encoding both
/// go through here so they can never disagree.
pub fn pretokenize(text: &str, lowercase: bool) -> Result<Vec<String>> {
    let text = if lowercase { text.to_lowercase() } else { text.to_owned() };
    let mut pre = PreTokenizedString::from(text.as_str());
    Whitespace::default().pre_tokenize(&mut pre)?;
    Ok(pre
        .get_splits(OffsetReferential::Original, OffsetType::Byte)
        .into_iter()
        .map(|(s, _, _)| s.to_owned())
        .collect())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Vocabulary {
    tokens: Vec<String>,
    index:  HashMap<String, u32>,
}

impl Vocabulary {
    /// Build from corpus tokens in id order (reserved tokens are prepended).
    fn from_corpus_tokens(corpus_tokens: Vec<String>) -> Self {
        let tokens: Vec<String> = RESERVED_TOKENS
            .iter()
            .map(|t| t.to_string())
            .chain(corpus_tokens)
            .collect();
        let index = tokens
            .iter()
            .enumerate()
            .map(|(id, t)| (t.clone(), id as u32))
            .collect();
        Self { tokens, index }
    }

    /// Adopt a fixed external vocabulary file.
    ///
    /// `max_size` truncates to that many corpus tokens; it must be at
    /// least the reserved-id count.
    pub fn from_file(path: impl AsRef<Path>, max_size: Option<usize>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(size) = max_size {
            check_target_size(size)?;
        }
        let content = fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                AutoencoderError::Configuration(format!(
                    "vocabulary file '{}' does not exist",
                    path.display()
                ))
            } else {
                AutoencoderError::io(e, path)
            }
        })?;

        let lines: Vec<&str> = content.trim_end_matches(['\n', '\r']).lines().collect();
        if lines.iter().all(|l| l.trim().is_empty()) {
            return Err(AutoencoderError::Configuration(format!(
                "vocabulary file '{}' is empty",
                path.display()
            )));
        }

        let mut seen: HashMap<&str, usize> = RESERVED_TOKENS
            .iter()
            .enumerate()
            .map(|(i, t)| (*t, i))
            .collect();
        let mut corpus_tokens = Vec::with_capacity(lines.len());

        for (lineno, raw) in lines.iter().enumerate() {
            let token = raw.trim_end_matches('\r');
            if token.is_empty() {
                return Err(AutoencoderError::data_format(path, lineno + 1, "blank line"));
            }
            if token.chars().any(char::is_whitespace) {
                return Err(AutoencoderError::data_format(
                    path,
                    lineno + 1,
                    format!("token '{token}' contains whitespace"),
                ));
            }
            if seen.insert(token, lineno).is_some() {
                return Err(AutoencoderError::data_format(
                    path,
                    lineno + 1,
                    format!("duplicate token '{token}'"),
                ));
            }
            corpus_tokens.push(token.to_string());
        }

        if let Some(size) = max_size {
            corpus_tokens.truncate(size);
        }

        tracing::debug!(
            "Loaded vocabulary of {} tokens from '{}'",
            corpus_tokens.len() + RESERVED_COUNT,
            path.display()
        );
        Ok(Self::from_corpus_tokens(corpus_tokens))
    }

    /// Write the corpus tokens one per line (reserved ids stay implicit).
    pub fn write(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| AutoencoderError::io(e, parent))?;
        }
        let mut body = self.tokens[RESERVED_COUNT..].join("\n");
        body.push('\n');
        fs::write(path, body).map_err(|e| AutoencoderError::io(e, path))
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    /// Id of `token`, or `[UNK]` if it is not in the vocabulary.
    pub fn id(&self, token: &str) -> u32 {
        self.index.get(token).copied().unwrap_or(UNK_ID)
    }

    pub fn contains(&self, token: &str) -> bool {
        self.index.contains_key(token)
    }

    pub fn token(&self, id: u32) -> Option<&str> {
        self.tokens.get(id as usize).map(String::as_str)
    }

    pub fn encode_tokens<S: AsRef<str>>(&self, tokens: &[S]) -> Vec<u32> {
        tokens.iter().map(|t| self.id(t.as_ref())).collect()
    }

    /// Map ids back to tokens, dropping [PAD], [BOS] and [EOS].
    pub fn decode_ids(&self, ids: &[u32]) -> Vec<String> {
        ids.iter()
            .filter(|&&id| !crate::domain::example::is_special(id))
            .filter_map(|&id| self.token(id).map(str::to_owned))
            .collect()
    }

    /// Iterate `(token, id)` in id order, reserved tokens included.
    pub fn iter(&self) -> impl Iterator<Item = (&str, u32)> {
        self.tokens.iter().enumerate().map(|(id, t)| (t.as_str(), id as u32))
    }
}

fn check_target_size(size: usize) -> Result<()> {
    if size < RESERVED_COUNT {
        return Err(AutoencoderError::Configuration(format!(
            "requested vocabulary size ({size}) is smaller than the reserved-id count ({RESERVED_COUNT})"
        )));
    }
    Ok(())
}

/// Frequency-ranked vocabulary construction.
#[derive(Debug, Clone)]
pub struct VocabularyBuilder {
    target_size: usize,
    lowercase:   bool,
}

impl VocabularyBuilder {
    /// `target_size` is the number of corpus tokens kept on top of the
    /// reserved ids.
    pub fn new(target_size: usize) -> Self {
        Self { target_size, lowercase: true }
    }

    pub fn lowercase(mut self, lowercase: bool) -> Self {
        self.lowercase = lowercase;
        self
    }

    pub fn build<'a, I>(&self, docs: I) -> Result<Vocabulary>
    where
        I: IntoIterator<Item = &'a str>,
    {
        check_target_size(self.target_size)?;

        // token → (count, first-seen position)
        let mut freq: HashMap<String, (usize, usize)> = HashMap::new();
        let mut order = 0usize;
        for doc in docs {
            for token in pretokenize(doc, self.lowercase)? {
                if RESERVED_TOKENS.contains(&token.as_str()) {
                    continue;
                }
                let entry = freq.entry(token).or_insert((0, order));
                entry.0 += 1;
                order += 1;
            }
        }

        let unique = freq.len();
        let mut ranked: Vec<(String, (usize, usize))> = freq.into_iter().collect();
        ranked.sort_by(|a, b| b.1 .0.cmp(&a.1 .0).then(a.1 .1.cmp(&b.1 .1)));
        ranked.truncate(self.target_size);

        tracing::info!(
            "Built vocabulary: kept {} of {} unique tokens (+{} reserved)",
            ranked.len(),
            unique,
            RESERVED_COUNT
        );
        Ok(Vocabulary::from_corpus_tokens(
            ranked.into_iter().map(|(t, _)| t).collect(),
        ))
    }
}
