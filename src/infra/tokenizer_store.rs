// ============================================================
// Layer 6 — Tokenizer Store
// ============================================================
// Turns raw text into fixed-length Examples, and persists
// everything inference needs to tokenise exactly as training did.
//
// The HuggingFace tokenizer is a WordLevel model whose vocab is
// the Vocabulary's token → id map, written as JSON by hand and
// parsed back (tokenizers 0.15 trainers cannot produce a
// WordLevel model with fixed ids). Its Whitespace pre-tokenizer
// is the same one `vocabulary::pretokenize` uses, so every token
// the builder counted encodes to the id the builder gave it.
//
// Files written next to each checkpoint:
//   tokenizer.json          HF tokenizer (WordLevel + Whitespace)
//   tokenizer_config.json   TokenizerConfig below
//   vocab.txt               Vocabulary file (reserved ids implicit)

use std::{fs, path::Path};

use serde::{Deserialize, Serialize};
use tokenizers::Tokenizer;

use crate::data::vocabulary::Vocabulary;
use crate::domain::example::{Example, BOS_ID, EOS_ID, PAD_ID, UNK_ID, UNK_TOKEN};
use crate::error::{AutoencoderError, Result};

pub const TOKENIZER_FILE: &str = "tokenizer.json";
pub const TOKENIZER_CONFIG_FILE: &str = "tokenizer_config.json";
pub const VOCAB_FILE: &str = "vocab.txt";

/// Everything that determines how text maps to an Example.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenizerConfig {
    pub max_seq_len:   usize,
    pub pad_id:        u32,
    pub unk_id:        u32,
    pub bos_id:        u32,
    pub eos_id:        u32,
    pub pre_tokenizer: String,
    pub lowercase:     bool,
}

impl TokenizerConfig {
    pub fn new(max_seq_len: usize, lowercase: bool) -> Self {
        Self {
            max_seq_len,
            pad_id: PAD_ID,
            unk_id: UNK_ID,
            bos_id: BOS_ID,
            eos_id: EOS_ID,
            pre_tokenizer: "whitespace".into(),
            lowercase,
        }
    }

    fn check(&self) -> Result<()> {
        if self.max_seq_len < 2 {
            return Err(AutoencoderError::Configuration(format!(
                "max_seq_len must be at least 2 (one token plus [EOS]), got {}",
                self.max_seq_len
            )));
        }
        if (self.pad_id, self.unk_id, self.bos_id, self.eos_id) != (PAD_ID, UNK_ID, BOS_ID, EOS_ID) {
            return Err(AutoencoderError::Configuration(
                "tokenizer config uses special ids this build does not reserve".into(),
            ));
        }
        if self.pre_tokenizer != "whitespace" {
            return Err(AutoencoderError::Configuration(format!(
                "unsupported pre-tokenizer '{}'",
                self.pre_tokenizer
            )));
        }
        Ok(())
    }
}

#[derive(Clone)]
pub struct TextTokenizer {
    inner:  Tokenizer,
    vocab:  Vocabulary,
    config: TokenizerConfig,
}

impl TextTokenizer {
    /// Build the HF tokenizer for `vocab`.
    pub fn build(vocab: Vocabulary, config: TokenizerConfig) -> Result<Self> {
        config.check()?;

        let vocab_map: serde_json::Map<String, serde_json::Value> = vocab
            .iter()
            .map(|(token, id)| (token.to_string(), serde_json::json!(id)))
            .collect();

        // No added_tokens: "[PAD]" typed in a text pre-tokenizes to
        // "[", "PAD", "]" exactly as it did when the vocabulary was counted.
        let tokenizer_json = serde_json::json!({
            "version": "1.0",
            "truncation": null,
            "padding": null,
            "added_tokens": [],
            "normalizer": null,
            "pre_tokenizer": { "type": "Whitespace" },
            "post_processor": null,
            "decoder": null,
            "model": {
                "type": "WordLevel",
                "vocab": vocab_map,
                "unk_token": UNK_TOKEN
            }
        });

        let inner = serde_json::to_string(&tokenizer_json)?.parse::<Tokenizer>()?;
        tracing::debug!("Tokenizer built over {} ids", vocab.len());
        Ok(Self { inner, vocab, config })
    }

    /// Write tokenizer.json, tokenizer_config.json and vocab.txt into `dir`.
    pub fn save(&self, dir: &Path) -> Result<()> {
        fs::create_dir_all(dir).map_err(|e| AutoencoderError::io(e, dir))?;

        self.inner.save(dir.join(TOKENIZER_FILE), true)?;

        let cfg_path = dir.join(TOKENIZER_CONFIG_FILE);
        fs::write(&cfg_path, serde_json::to_string_pretty(&self.config)?)
            .map_err(|e| AutoencoderError::io(e, &cfg_path))?;

        self.vocab.write(dir.join(VOCAB_FILE))?;
        tracing::debug!("Saved tokenizer to '{}'", dir.display());
        Ok(())
    }

    /// Load a tokenizer saved by [`TextTokenizer::save`].
    pub fn load(dir: &Path) -> Result<Self> {
        let cfg_path = dir.join(TOKENIZER_CONFIG_FILE);
        let cfg_json = fs::read_to_string(&cfg_path).map_err(|e| {
            AutoencoderError::Configuration(format!(
                "cannot read tokenizer config '{}': {e}",
                cfg_path.display()
            ))
        })?;
        let config: TokenizerConfig = serde_json::from_str(&cfg_json)?;
        config.check()?;

        let vocab = Vocabulary::from_file(dir.join(VOCAB_FILE), None)?;

        let tok_path = dir.join(TOKENIZER_FILE);
        let inner = Tokenizer::from_file(&tok_path).map_err(|e| {
            AutoencoderError::Tokenizer(format!("cannot load '{}': {e}", tok_path.display()))
        })?;

        // tokenizer.json and vocab.txt must describe the same id space
        let hf_size = inner.get_vocab_size(false);
        if hf_size != vocab.len() {
            return Err(AutoencoderError::mismatch("tokenizer vocab size", hf_size, vocab.len()));
        }

        Ok(Self { inner, vocab, config })
    }

    pub fn vocab(&self) -> &Vocabulary {
        &self.vocab
    }

    pub fn config(&self) -> &TokenizerConfig {
        &self.config
    }

    pub fn max_seq_len(&self) -> usize {
        self.config.max_seq_len
    }

    /// Text → ids, before truncation and padding.
    pub fn token_ids(&self, text: &str) -> Result<Vec<u32>> {
        let text = if self.config.lowercase { text.to_lowercase() } else { text.to_owned() };
        let encoding = self.inner.encode(text.as_str(), false)?;
        Ok(encoding.get_ids().to_vec())
    }

    pub fn encode(&self, text: &str) -> Result<Example> {
        let ids = self.token_ids(text)?;
        Ok(Example::from_token_ids(&ids, self.config.max_seq_len))
    }

    pub fn encode_batch(&self, texts: &[&str]) -> Result<Vec<Example>> {
        texts.iter().map(|t| self.encode(t)).collect()
    }

    /// Tokens of an Example, padding and markers dropped.
    pub fn decode(&self, example: &Example) -> Vec<String> {
        self.vocab.decode_ids(example.real_ids())
    }

    /// Ids → space-joined text. Stops at the first [EOS].
    pub fn decode_text(&self, ids: &[u32]) -> String {
        let end = ids.iter().position(|&id| id == EOS_ID).unwrap_or(ids.len());
        self.vocab.decode_ids(&ids[..end]).join(" ")
    }
}

impl std::fmt::Debug for TextTokenizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TextTokenizer")
            .field("vocab_size", &self.vocab.len())
            .field("config", &self.config)
            .finish()
    }
}
