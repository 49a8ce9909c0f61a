// ============================================================
// Layer 6 — Checkpoint Manager
// ============================================================
// Saves and restores model weights using Burn's CompactRecorder,
// together with everything needed to rebuild and feed the model.
//
// Directory layout under the run's save path:
//
//   <save_path>/
//     train_config.json        full run configuration
//     metrics.csv              one row per epoch (MetricsLogger)
//     best/                    weights at the best validation loss
//       model.mpk.gz           CompactRecorder (MessagePack + gzip)
//       model_config.json      AutoencoderConfig: variant, sizes, layers
//       checkpoint.json        CheckpointMeta below
//       tokenizer.json         ┐
//       tokenizer_config.json  ├ TextTokenizer::save
//       vocab.txt              ┘
//     epoch-3/                 same layout, only with keep_epoch_checkpoints
//
// Every checkpoint directory is self-contained: prediction needs
// nothing but the directory itself plus, optionally, an
// embeddings file whose shape must agree with checkpoint.json.
//
// `best/` is only rewritten on an Improved epoch, so an
// interrupted run always leaves the last improved weights.

use std::{
    fs,
    path::{Path, PathBuf},
};

use burn::{
    prelude::*,
    record::{CompactRecorder, Recorder},
};
use serde::{Deserialize, Serialize};

use crate::error::{AutoencoderError, Result};
use crate::infra::tokenizer_store::TextTokenizer;
use crate::ml::model::{Architecture, AutoencoderConfig, AutoencoderModel};

pub const FORMAT_VERSION: u32 = 1;
pub const BEST_DIR: &str = "best";
pub const MODEL_FILE: &str = "model";
pub const MODEL_CONFIG_FILE: &str = "model_config.json";
pub const META_FILE: &str = "checkpoint.json";
pub const TRAIN_CONFIG_FILE: &str = "train_config.json";

/// What a checkpoint was trained with, recorded next to its weights.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckpointMeta {
    pub format_version:       u32,
    pub epoch:                usize,
    /// Monitored loss at save time; absent when it was not finite
    pub val_loss:             Option<f64>,
    /// Actual vocabulary length, reserved ids included
    pub vocab_size:           usize,
    /// Corpus tokens requested when the vocabulary was built
    pub requested_vocab_size: usize,
    pub embedding_dim:        usize,
    pub latent_size:          usize,
    pub variant:              Architecture,
}

/// Writes checkpoints for one training run.
pub struct CheckpointManager {
    dir:                  PathBuf,
    model_config:         AutoencoderConfig,
    requested_vocab_size: usize,
    tokenizer:            TextTokenizer,
}

impl CheckpointManager {
    pub fn new(
        dir:                  impl Into<PathBuf>,
        model_config:         AutoencoderConfig,
        requested_vocab_size: usize,
        tokenizer:            TextTokenizer,
    ) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|e| AutoencoderError::io(e, &dir))?;
        Ok(Self { dir, model_config, requested_vocab_size, tokenizer })
    }

    pub fn best_dir(&self) -> PathBuf {
        self.dir.join(BEST_DIR)
    }

    pub fn epoch_dir(&self, epoch: usize) -> PathBuf {
        self.dir.join(format!("epoch-{epoch}"))
    }

    /// Persist the run configuration before the first epoch.
    pub fn save_train_config<T: Serialize>(&self, cfg: &T) -> Result<()> {
        let path = self.dir.join(TRAIN_CONFIG_FILE);
        fs::write(&path, serde_json::to_string_pretty(cfg)?).map_err(|e| AutoencoderError::io(e, &path))?;
        tracing::debug!("Saved training config to '{}'", path.display());
        Ok(())
    }

    pub fn save_best<B: Backend>(&self, model: &AutoencoderModel<B>, epoch: usize, val_loss: f64) -> Result<PathBuf> {
        let dir = self.best_dir();
        self.save_to(&dir, model, epoch, val_loss)?;
        tracing::info!("Best checkpoint updated at epoch {} (val_loss={:.4})", epoch, val_loss);
        Ok(dir)
    }

    pub fn save_epoch<B: Backend>(&self, model: &AutoencoderModel<B>, epoch: usize, val_loss: f64) -> Result<PathBuf> {
        let dir = self.epoch_dir(epoch);
        self.save_to(&dir, model, epoch, val_loss)?;
        tracing::debug!("Saved epoch checkpoint: epoch {}", epoch);
        Ok(dir)
    }

    fn save_to<B: Backend>(&self, dir: &Path, model: &AutoencoderModel<B>, epoch: usize, val_loss: f64) -> Result<()> {
        fs::create_dir_all(dir).map_err(|e| AutoencoderError::io(e, dir))?;

        CompactRecorder::new()
            .record(model.clone().into_record(), dir.join(MODEL_FILE))
            .map_err(|e| {
                AutoencoderError::Checkpoint(format!("cannot save weights to '{}': {e}", dir.display()))
            })?;

        let cfg_path = dir.join(MODEL_CONFIG_FILE);
        fs::write(&cfg_path, serde_json::to_string_pretty(&self.model_config)?)
            .map_err(|e| AutoencoderError::io(e, &cfg_path))?;

        let meta = CheckpointMeta {
            format_version:       FORMAT_VERSION,
            epoch,
            val_loss:             val_loss.is_finite().then_some(val_loss),
            vocab_size:           self.model_config.vocab_size,
            requested_vocab_size: self.requested_vocab_size,
            embedding_dim:        self.model_config.embedding_dim,
            latent_size:          self.model_config.latent_size,
            variant:              self.model_config.variant,
        };
        let meta_path = dir.join(META_FILE);
        fs::write(&meta_path, serde_json::to_string_pretty(&meta)?)
            .map_err(|e| AutoencoderError::io(e, &meta_path))?;

        self.tokenizer.save(dir)
    }

    /// Load the weights of `best/` into `model`. The stored architecture
    /// must equal the current one. The returned meta carries the
    /// validation loss a resumed run has to beat.
    pub fn resume<B: Backend>(
        &self,
        model:  AutoencoderModel<B>,
        device: &B::Device,
    ) -> Result<(AutoencoderModel<B>, CheckpointMeta)> {
        let dir = self.best_dir();
        if !dir.join(META_FILE).exists() {
            return Err(AutoencoderError::Configuration(format!(
                "cannot resume: no checkpoint at '{}'",
                dir.display()
            )));
        }
        let stored = load_model_config(&dir)?;
        ensure_same_architecture(&stored, &self.model_config)?;
        let meta = load_meta(&dir)?;
        tracing::info!("Resuming from checkpoint of epoch {} (val_loss {:?})", meta.epoch, meta.val_loss);
        Ok((load_weights(model, &dir, device)?, meta))
    }
}

/// Accept either a checkpoint directory or a run's save path.
pub fn resolve_checkpoint_dir(path: &Path) -> Result<PathBuf> {
    if path.join(META_FILE).exists() {
        return Ok(path.to_path_buf());
    }
    let best = path.join(BEST_DIR);
    if best.join(META_FILE).exists() {
        return Ok(best);
    }
    Err(AutoencoderError::Configuration(format!(
        "no checkpoint found at '{}'. Have you trained the model first?",
        path.display()
    )))
}

pub fn load_meta(dir: &Path) -> Result<CheckpointMeta> {
    let path = dir.join(META_FILE);
    let json = fs::read_to_string(&path).map_err(|e| AutoencoderError::io(e, &path))?;
    let meta: CheckpointMeta = serde_json::from_str(&json)?;
    if meta.format_version != FORMAT_VERSION {
        return Err(AutoencoderError::mismatch("format_version", meta.format_version, FORMAT_VERSION));
    }
    Ok(meta)
}

pub fn load_model_config(dir: &Path) -> Result<AutoencoderConfig> {
    let path = dir.join(MODEL_CONFIG_FILE);
    let json = fs::read_to_string(&path).map_err(|e| AutoencoderError::io(e, &path))?;
    Ok(serde_json::from_str(&json)?)
}

/// Restore weights into a model built from the checkpoint's own config.
pub fn load_weights<B: Backend>(
    model:  AutoencoderModel<B>,
    dir:    &Path,
    device: &B::Device,
) -> Result<AutoencoderModel<B>> {
    let path = dir.join(MODEL_FILE);
    let record = CompactRecorder::new().load(path.clone(), device).map_err(|e| {
        AutoencoderError::Checkpoint(format!("cannot load weights '{}': {e}", path.display()))
    })?;
    Ok(model.load_record(record))
}

/// Every field that changes a parameter shape must agree.
pub fn ensure_same_architecture(stored: &AutoencoderConfig, current: &AutoencoderConfig) -> Result<()> {
    if stored.variant != current.variant {
        return Err(AutoencoderError::mismatch("variant", stored.variant, current.variant));
    }
    let fields: [(&'static str, usize, usize); 6] = [
        ("vocab_size", stored.vocab_size, current.vocab_size),
        ("embedding_dim", stored.embedding_dim, current.embedding_dim),
        ("hidden_size", stored.hidden_size, current.hidden_size),
        ("num_layers", stored.num_layers, current.num_layers),
        ("latent_size", stored.latent_size, current.latent_size),
        ("max_seq_len", stored.max_seq_len, current.max_seq_len),
    ];
    for (field, a, b) in fields {
        if a != b {
            return Err(AutoencoderError::mismatch(field, a, b));
        }
    }
    if stored.bidirectional != current.bidirectional {
        return Err(AutoencoderError::mismatch("bidirectional", stored.bidirectional, current.bidirectional));
    }
    if current.variant == Architecture::Transformer {
        if stored.num_heads != current.num_heads {
            return Err(AutoencoderError::mismatch("num_heads", stored.num_heads, current.num_heads));
        }
        if stored.ff_size() != current.ff_size() {
            return Err(AutoencoderError::mismatch("d_ff", stored.ff_size(), current.ff_size()));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::vocabulary::VocabularyBuilder;
    use crate::infra::tokenizer_store::TokenizerConfig;
    use crate::ml::model::Seq2Seq;
    use burn::backend::NdArray;

    type TestBackend = NdArray;

    fn setup(dir: &Path) -> (CheckpointManager, AutoencoderConfig) {
        let vocab = VocabularyBuilder::new(20).build(["a lei entra em vigor"]).unwrap();
        let cfg = AutoencoderConfig::new(Architecture::Gru, vocab.len(), 4, 8, 1, 3, 5).with_dropout(0.0);
        let tok = TextTokenizer::build(vocab, TokenizerConfig::new(5, true)).unwrap();
        (CheckpointManager::new(dir, cfg.clone(), 20, tok).unwrap(), cfg)
    }

    #[test]
    fn test_best_checkpoint_is_self_contained() {
        let tmp = tempfile::tempdir().unwrap();
        let (mgr, cfg) = setup(tmp.path());
        let model = cfg.init::<TestBackend>(&Default::default(), None).unwrap();

        let dir = mgr.save_best(&model, 3, 1.25).unwrap();
        for file in ["model.mpk.gz", MODEL_CONFIG_FILE, META_FILE, "tokenizer.json", "tokenizer_config.json", "vocab.txt"] {
            assert!(dir.join(file).exists(), "missing {file}");
        }

        let meta = load_meta(&dir).unwrap();
        assert_eq!(meta.epoch, 3);
        assert_eq!(meta.val_loss, Some(1.25));
        assert_eq!(meta.requested_vocab_size, 20);
        assert_eq!(meta.variant, Architecture::Gru);
        assert_eq!(load_model_config(&dir).unwrap().hidden_size, 8);
    }

    #[test]
    fn test_weights_round_trip() {
        let tmp = tempfile::tempdir().unwrap();
        let (mgr, cfg) = setup(tmp.path());
        let device = Default::default();
        let model = cfg.init::<TestBackend>(&device, None).unwrap();
        let dir = mgr.save_epoch(&model, 1, 2.0).unwrap();
        assert_eq!(dir, tmp.path().join("epoch-1"));

        let fresh = cfg.init::<TestBackend>(&device, None).unwrap();
        let loaded = load_weights(fresh, &dir, &device).unwrap();

        // CompactRecorder stores half precision
        let latent = Tensor::<TestBackend, 2>::ones([1, 3], &device);
        let a: Vec<f32> = model.decode(latent.clone(), 3).logits.into_data().iter::<f32>().collect();
        let b: Vec<f32> = loaded.decode(latent, 3).logits.into_data().iter::<f32>().collect();
        for (x, y) in a.iter().zip(&b) {
            assert!((x - y).abs() < 2e-2, "{x} vs {y}");
        }
    }

    #[test]
    fn test_resolve_accepts_save_path_or_checkpoint_dir() {
        let tmp = tempfile::tempdir().unwrap();
        let (mgr, cfg) = setup(tmp.path());
        let model = cfg.init::<TestBackend>(&Default::default(), None).unwrap();
        let best = mgr.save_best(&model, 1, 0.5).unwrap();

        assert_eq!(resolve_checkpoint_dir(tmp.path()).unwrap(), best);
        assert_eq!(resolve_checkpoint_dir(&best).unwrap(), best);
        assert!(matches!(
            resolve_checkpoint_dir(&tmp.path().join("nothing")),
            Err(AutoencoderError::Configuration(_))
        ));
    }

    #[test]
    fn test_non_finite_loss_is_not_recorded() {
        let tmp = tempfile::tempdir().unwrap();
        let (mgr, cfg) = setup(tmp.path());
        let model = cfg.init::<TestBackend>(&Default::default(), None).unwrap();
        let dir = mgr.save_epoch(&model, 2, f64::NAN).unwrap();
        assert_eq!(load_meta(&dir).unwrap().val_loss, None);
    }

    #[test]
    fn test_architecture_mismatch_is_reported() {
        let tmp = tempfile::tempdir().unwrap();
        let (_, cfg) = setup(tmp.path());
        let other = AutoencoderConfig { latent_size: 7, ..cfg.clone() };
        let err = ensure_same_architecture(&cfg, &other).unwrap_err();
        assert!(matches!(err, AutoencoderError::CheckpointMismatch { field: "latent_size", .. }));

        let lstm = AutoencoderConfig { variant: Architecture::Lstm, ..cfg.clone() };
        assert!(ensure_same_architecture(&cfg, &lstm).is_err());
        assert!(ensure_same_architecture(&cfg, &cfg.clone()).is_ok());
    }

    #[test]
    fn test_resume_without_checkpoint_is_configuration_error() {
        let tmp = tempfile::tempdir().unwrap();
        let (mgr, cfg) = setup(tmp.path());
        let model = cfg.init::<TestBackend>(&Default::default(), None).unwrap();
        let err = mgr.resume(model, &Default::default()).unwrap_err();
        assert!(matches!(err, AutoencoderError::Configuration(_)));
    }

    #[test]
    fn test_resume_returns_stored_loss() {
        let tmp = tempfile::tempdir().unwrap();
        let (mgr, cfg) = setup(tmp.path());
        let device = Default::default();
        let model = cfg.init::<TestBackend>(&device, None).unwrap();
        mgr.save_best(&model, 4, 0.75).unwrap();

        let fresh = cfg.init::<TestBackend>(&device, None).unwrap();
        let (_, meta) = mgr.resume(fresh, &device).unwrap();
        assert_eq!(meta.epoch, 4);
        assert_eq!(meta.val_loss, Some(0.75));
    }
}
