// ============================================================
// Layer 5 — Reconstructor
// ============================================================
// Loads a trained checkpoint and reconstructs unseen text.
//
//   1. Resolve the checkpoint directory (run dir → best/)
//   2. Compare checkpoint.json against the load environment
//      (embedding dim, vocabulary size, embedding file width)
//      → CheckpointMismatch before any weights are read
//   3. Load tokenizer + vocab saved next to the weights
//   4. Rebuild the model from model_config.json, dropout off
//   5. Encode → free-running greedy decode → score
//
// Decoding is free-running: each step consumes the previous
// step's argmax, never the true token.

use std::path::{Path, PathBuf};

use burn::{data::dataloader::batcher::Batcher, prelude::*};
use serde::Serialize;

use crate::data::{batcher::AutoencoderBatcher, embeddings};
use crate::domain::example::Example;
use crate::error::{AutoencoderError, Result};
use crate::infra::{
    checkpoint::{load_meta, load_model_config, load_weights, resolve_checkpoint_dir, CheckpointMeta},
    metrics::ReconstructionScore,
    tokenizer_store::TextTokenizer,
};
use crate::ml::model::{AutoencoderModel, Seq2Seq};

const EVAL_BATCH_SIZE: usize = 32;

/// What the caller believes the checkpoint was trained with.
#[derive(Debug, Clone)]
pub struct LoadEnvironment {
    pub embedding_dim:   usize,
    /// Requested (non-reserved) vocabulary size, if the caller states one
    pub vocab_size:      Option<usize>,
    pub embeddings_file: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ExampleReconstruction {
    pub text:           String,
    pub reconstruction: String,
    pub token_accuracy: f64,
    pub exact_match:    bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReconstructionReport {
    pub examples:         Vec<ExampleReconstruction>,
    pub token_accuracy:   f64,
    pub exact_match_rate: f64,
    pub score:            ReconstructionScore,
}

pub struct Reconstructor<B: Backend> {
    model:     AutoencoderModel<B>,
    tokenizer: TextTokenizer,
    meta:      CheckpointMeta,
    device:    B::Device,
}

impl<B: Backend> Reconstructor<B> {
    pub fn from_checkpoint(path: &Path, env: &LoadEnvironment, device: &B::Device) -> Result<Self> {
        let dir  = resolve_checkpoint_dir(path)?;
        let meta = load_meta(&dir)?;
        check_environment(&meta, env)?;

        let tokenizer = TextTokenizer::load(&dir)?;
        let mut cfg = load_model_config(&dir)?;
        if cfg.latent_size != meta.latent_size {
            return Err(AutoencoderError::mismatch("latent_size", meta.latent_size, cfg.latent_size));
        }
        if cfg.vocab_size != tokenizer.vocab().len() {
            return Err(AutoencoderError::mismatch("vocab_size", cfg.vocab_size, tokenizer.vocab().len()));
        }
        cfg.dropout = 0.0;

        let model = cfg.init::<B>(device, None)?;
        let model = load_weights(model, &dir, device)?;
        tracing::info!(
            "Loaded {} checkpoint from '{}' (epoch {}, vocab={}, dim={})",
            meta.variant,
            dir.display(),
            meta.epoch,
            meta.vocab_size,
            meta.embedding_dim
        );
        Ok(Self { model, tokenizer, meta, device: device.clone() })
    }

    #[cfg(test)]
    pub fn meta(&self) -> &CheckpointMeta {
        &self.meta
    }

    /// Encode then greedily decode `text`.
    pub fn reconstruct(&self, text: &str) -> Result<String> {
        let example = self.tokenizer.encode(text)?;
        let predicted = self.predict(vec![example])?;
        Ok(predicted
            .first()
            .map(|ids| self.tokenizer.decode_text(ids))
            .unwrap_or_default())
    }

    pub fn evaluate<S: AsRef<str>>(&self, texts: &[S]) -> Result<ReconstructionReport> {
        let mut examples = Vec::with_capacity(texts.len());
        let mut total = ReconstructionScore::default();

        for chunk in texts.chunks(EVAL_BATCH_SIZE) {
            let encoded = chunk
                .iter()
                .map(|t| self.tokenizer.encode(t.as_ref()))
                .collect::<Result<Vec<Example>>>()?;
            let predicted = self.predict(encoded.clone())?;

            for ((text, example), ids) in chunk.iter().zip(&encoded).zip(&predicted) {
                let score = ReconstructionScore::of(ids, example.real_ids());
                total.add(score);
                examples.push(ExampleReconstruction {
                    text:           text.as_ref().to_owned(),
                    reconstruction: self.tokenizer.decode_text(ids),
                    token_accuracy: score.token_accuracy(),
                    exact_match:    score.exact_matches == 1,
                });
            }
        }

        tracing::info!(
            "Evaluated {} texts: token_acc={:.1}% exact={:.1}%",
            total.sequences,
            total.token_accuracy() * 100.0,
            total.exact_match_rate() * 100.0
        );
        Ok(ReconstructionReport {
            examples,
            token_accuracy:   total.token_accuracy(),
            exact_match_rate: total.exact_match_rate(),
            score:            total,
        })
    }

    /// Greedy ids per example, one row of `max_seq_len` each.
    fn predict(&self, examples: Vec<Example>) -> Result<Vec<Vec<u32>>> {
        if examples.is_empty() {
            return Ok(Vec::new());
        }
        let batcher = AutoencoderBatcher::<B>::new(self.device.clone());
        let batch = batcher.batch(examples);
        let [rows, cols] = [batch.batch_size(), batch.seq_len()];

        let flat: Vec<u32> = self
            .model
            .reconstruct(&batch)
            .token_ids
            .into_data()
            .iter::<i64>()
            .map(token_id)
            .collect::<Result<_>>()?;
        Ok((0..rows).map(|r| flat[r * cols..(r + 1) * cols].to_vec()).collect())
    }
}

fn token_id(raw: i64) -> Result<u32> {
    u32::try_from(raw).map_err(|_| AutoencoderError::Checkpoint(format!("model produced token id {raw} outside u32")))
}

/// Fails on the first field where the environment disagrees with the checkpoint.
pub fn check_environment(meta: &CheckpointMeta, env: &LoadEnvironment) -> Result<()> {
    if meta.embedding_dim != env.embedding_dim {
        return Err(AutoencoderError::mismatch("embedding_dim", meta.embedding_dim, env.embedding_dim));
    }
    if let Some(requested) = env.vocab_size {
        if requested != meta.requested_vocab_size {
            return Err(AutoencoderError::mismatch("vocab_size", meta.requested_vocab_size, requested));
        }
    }
    if let Some(file) = &env.embeddings_file {
        if let Some(width) = embeddings::file_dim(file)? {
            if width != meta.embedding_dim {
                return Err(AutoencoderError::mismatch("embedding_dim", meta.embedding_dim, width));
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::vocabulary::VocabularyBuilder;
    use crate::infra::{checkpoint::CheckpointManager, tokenizer_store::TokenizerConfig};
    use crate::ml::model::{Architecture, AutoencoderConfig};
    use burn::backend::NdArray;

    type TestBackend = NdArray;

    fn saved_checkpoint(dir: &Path, embedding_dim: usize) -> AutoencoderConfig {
        let device = Default::default();
        let vocab = VocabularyBuilder::new(20).build(["o diário oficial publica a lei"]).unwrap();
        let cfg = AutoencoderConfig::new(Architecture::Gru, vocab.len(), embedding_dim, 8, 1, 4, 6);
        let tok = TextTokenizer::build(vocab, TokenizerConfig::new(6, true)).unwrap();
        let model = cfg.init::<TestBackend>(&device, None).unwrap();
        let ckpt = CheckpointManager::new(dir, cfg.clone(), 20, tok).unwrap();
        ckpt.save_best(&model, 1, 2.5).unwrap();
        cfg
    }

    fn env(embedding_dim: usize) -> LoadEnvironment {
        LoadEnvironment { embedding_dim, vocab_size: None, embeddings_file: None }
    }

    #[test]
    fn test_loads_from_run_directory() {
        let tmp = tempfile::tempdir().unwrap();
        saved_checkpoint(tmp.path(), 6);
        let r = Reconstructor::<TestBackend>::from_checkpoint(tmp.path(), &env(6), &Default::default()).unwrap();
        assert_eq!(r.meta().epoch, 1);
        assert_eq!(r.meta().embedding_dim, 6);
    }

    #[test]
    fn test_embedding_dim_mismatch() {
        let tmp = tempfile::tempdir().unwrap();
        saved_checkpoint(tmp.path(), 6);
        let err = Reconstructor::<TestBackend>::from_checkpoint(tmp.path(), &env(12), &Default::default())
            .err()
            .unwrap();
        assert!(matches!(err, AutoencoderError::CheckpointMismatch { field: "embedding_dim", .. }));
    }

    #[test]
    fn test_vocab_size_mismatch() {
        let tmp = tempfile::tempdir().unwrap();
        saved_checkpoint(tmp.path(), 6);
        let env = LoadEnvironment { vocab_size: Some(5000), ..env(6) };
        let err = Reconstructor::<TestBackend>::from_checkpoint(tmp.path(), &env, &Default::default())
            .err()
            .unwrap();
        assert!(matches!(err, AutoencoderError::CheckpointMismatch { field: "vocab_size", .. }));
    }

    #[test]
    fn test_embedding_file_width_mismatch() {
        let tmp = tempfile::tempdir().unwrap();
        saved_checkpoint(tmp.path(), 6);
        let emb = tmp.path().join("emb.txt");
        std::fs::write(&emb, "lei 0.1 0.2 0.3\n").unwrap();
        let env = LoadEnvironment { embeddings_file: Some(emb), ..env(6) };
        let err = Reconstructor::<TestBackend>::from_checkpoint(tmp.path(), &env, &Default::default())
            .err()
            .unwrap();
        assert!(matches!(
            err,
            AutoencoderError::CheckpointMismatch { field: "embedding_dim", ref supplied, .. } if supplied == "3"
        ));
    }

    #[test]
    fn test_evaluate_reports_every_text() {
        let tmp = tempfile::tempdir().unwrap();
        saved_checkpoint(tmp.path(), 6);
        let r = Reconstructor::<TestBackend>::from_checkpoint(tmp.path(), &env(6), &Default::default()).unwrap();
        let report = r.evaluate(&["a lei", "o diário oficial", "palavra desconhecida"]).unwrap();

        assert_eq!(report.examples.len(), 3);
        assert_eq!(report.score.sequences, 3);
        assert!((0.0..=1.0).contains(&report.token_accuracy));
        assert!(report.examples.iter().all(|e| (0.0..=1.0).contains(&e.token_accuracy)));
        assert!(r.reconstruct("a lei").unwrap().split_whitespace().count() <= 5);
    }

    #[test]
    fn test_token_ids_outside_u32_are_checkpoint_errors() {
        assert_eq!(token_id(7).unwrap(), 7);
        assert!(matches!(token_id(-1), Err(AutoencoderError::Checkpoint(_))));
        assert!(matches!(token_id(i64::from(u32::MAX) + 1), Err(AutoencoderError::Checkpoint(_))));
    }

    #[test]
    fn test_missing_checkpoint_is_configuration_error() {
        let tmp = tempfile::tempdir().unwrap();
        let err = Reconstructor::<TestBackend>::from_checkpoint(tmp.path(), &env(6), &Default::default())
            .err()
            .unwrap();
        assert!(matches!(err, AutoencoderError::Configuration(_)));
    }
}
