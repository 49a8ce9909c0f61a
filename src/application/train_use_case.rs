// ============================================================
// Layer 2 — TrainUseCase
// ============================================================
// Orchestrates a training run in order:
//
//   Step 1: Validate the TrainConfig                    (Layer 2)
//   Step 2: Load train / held-out splits                (Layer 4 - data)
//   Step 3: Build or load the vocabulary + tokenizer    (Layer 4 / 6)
//   Step 4: Tokenise through the per-split cache        (Layer 6 - infra)
//   Step 5: Load or draw the embedding matrix           (Layer 4 - data)
//   Step 6: Build the model, resume if asked            (Layer 5 - ml)
//   Step 7: Run the training loop                       (Layer 5 - ml)
//   Step 8: Evaluate the best checkpoint                (Layer 5 - ml)
//
// Resuming reuses the tokenizer stored with the checkpoint so
// token ids never drift between runs.

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use burn::{prelude::*, tensor::backend::AutodiffBackend};
use serde::{Deserialize, Serialize};

use crate::data::{
    embeddings::EmbeddingLoader,
    loader::CorpusLoader,
    splitter::split_train_val,
    vocabulary::{Vocabulary, VocabularyBuilder},
};
use crate::domain::{
    document::{texts, Document, Split},
    example::{Example, RESERVED_COUNT},
    traits::DocumentSource,
};
use crate::infra::{
    cache::ExampleCache,
    checkpoint::{resolve_checkpoint_dir, CheckpointManager},
    metrics::MetricsLogger,
    tokenizer_store::{TextTokenizer, TokenizerConfig},
};
use crate::ml::{
    inferencer::{LoadEnvironment, ReconstructionReport, Reconstructor},
    model::{Architecture, AutoencoderConfig},
    trainer::{train, TrainingOptions, TrainingReport},
};

// ─── Run plan ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InitMode {
    FromScratch,
    /// Continue from `<save_path>/best`
    Resume,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunPlan {
    pub init:     InitMode,
    pub train:    bool,
    pub evaluate: bool,
}

impl Default for RunPlan {
    fn default() -> Self {
        Self { init: InitMode::FromScratch, train: true, evaluate: true }
    }
}

// ─── Training Configuration ──────────────────────────────────────────────────
// Every knob of a run. Persisted as train_config.json next to the
// checkpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainConfig {
    /// Holds train.txt and optionally test.txt / evaluation.txt
    pub dataset_dir: PathBuf,
    pub save_path:   PathBuf,
    pub cache_dir:   PathBuf,

    /// Fixed token list; the vocabulary is built from train.txt when absent
    pub vocab_file: Option<PathBuf>,
    /// Corpus tokens kept, not counting the reserved ids
    pub vocab_size: usize,
    pub lowercase:  bool,
    pub max_seq_len: usize,

    pub embedding_dim:   usize,
    pub embeddings_file: Option<PathBuf>,

    pub variant:         Architecture,
    pub hidden_size:     usize,
    pub latent_size:     usize,
    pub num_layers:      usize,
    pub bidirectional:   bool,
    pub num_heads:       usize,
    pub d_ff:            usize,
    pub dropout:         f64,
    pub teacher_forcing: bool,

    pub batch_size:    usize,
    pub epochs:        usize,
    pub patience:      usize,
    pub learning_rate: f64,
    /// Share of train.txt carved off when the dataset has no test.txt
    pub validation_fraction:    f64,
    pub keep_epoch_checkpoints: bool,
    pub seed:                   u64,

    pub plan: RunPlan,
}

impl Default for TrainConfig {
    fn default() -> Self {
        Self {
            dataset_dir:            "data".into(),
            save_path:              "checkpoints".into(),
            cache_dir:              "cache".into(),
            vocab_file:             None,
            vocab_size:             20_000,
            lowercase:              true,
            max_seq_len:            20,
            embedding_dim:          100,
            embeddings_file:        None,
            variant:                Architecture::Lstm,
            hidden_size:            256,
            latent_size:            128,
            num_layers:             1,
            bidirectional:          false,
            num_heads:              4,
            d_ff:                   0,
            dropout:                0.1,
            teacher_forcing:        true,
            batch_size:             64,
            epochs:                 10,
            patience:               3,
            learning_rate:          1e-3,
            validation_fraction:    0.1,
            keep_epoch_checkpoints: false,
            seed:                   42,
            plan:                   RunPlan::default(),
        }
    }
}

impl TrainConfig {
    pub fn validate(&self) -> crate::error::Result<()> {
        use crate::error::AutoencoderError::Configuration;

        let positive = [
            ("batch_size", self.batch_size),
            ("epochs", self.epochs),
            ("patience", self.patience),
            ("num_layers", self.num_layers),
            ("embedding_dim", self.embedding_dim),
            ("hidden_size", self.hidden_size),
            ("latent_size", self.latent_size),
        ];
        for (name, value) in positive {
            if value == 0 {
                return Err(Configuration(format!("{name} must be greater than zero")));
            }
        }
        if self.max_seq_len < 2 {
            return Err(Configuration(format!("max_seq_len must be at least 2, got {}", self.max_seq_len)));
        }
        if self.vocab_size < RESERVED_COUNT {
            return Err(Configuration(format!(
                "vocab_size ({}) is smaller than the {RESERVED_COUNT} reserved ids",
                self.vocab_size
            )));
        }
        if self.learning_rate.is_nan() || self.learning_rate <= 0.0 {
            return Err(Configuration(format!("learning rate must be positive, got {}", self.learning_rate)));
        }
        if self.variant == Architecture::Transformer && (self.num_heads == 0 || self.hidden_size % self.num_heads != 0) {
            return Err(Configuration(format!(
                "hidden_size ({}) must be divisible by num_heads ({})",
                self.hidden_size, self.num_heads
            )));
        }
        if !(0.0..1.0).contains(&self.validation_fraction) {
            return Err(Configuration(format!(
                "validation_fraction must be in [0, 1), got {}",
                self.validation_fraction
            )));
        }
        if !self.plan.train && !self.plan.evaluate {
            return Err(Configuration("run plan has neither training nor evaluation".into()));
        }
        Ok(())
    }

    /// Cache key for the tokenisation settings of this config.
    pub fn fingerprint(&self, vocab_len: usize, carved: bool) -> String {
        let case = if self.lowercase { "lc" } else { "cased" };
        let mut key = format!("len{}-vocab{}-{}", self.max_seq_len, vocab_len, case);
        if carved {
            key.push_str(&format!("-holdout{}-seed{}", (self.validation_fraction * 100.0).round() as u32, self.seed));
        }
        key
    }

    pub fn model_config(&self, vocab_len: usize) -> AutoencoderConfig {
        AutoencoderConfig::new(
            self.variant,
            vocab_len,
            self.embedding_dim,
            self.hidden_size,
            self.num_layers,
            self.latent_size,
            self.max_seq_len,
        )
        .with_bidirectional(self.bidirectional)
        .with_num_heads(self.num_heads)
        .with_d_ff(self.d_ff)
        .with_dropout(self.dropout)
        .with_teacher_forcing(self.teacher_forcing)
    }

    pub fn training_options(&self) -> TrainingOptions {
        TrainingOptions {
            epochs:                 self.epochs,
            patience:               self.patience,
            learning_rate:          self.learning_rate,
            batch_size:             self.batch_size,
            seed:                   self.seed,
            keep_epoch_checkpoints: self.keep_epoch_checkpoints,
            initial_best:           None,
        }
    }

    pub fn load_environment(&self) -> LoadEnvironment {
        LoadEnvironment {
            embedding_dim:   self.embedding_dim,
            vocab_size:      Some(self.vocab_size),
            embeddings_file: self.embeddings_file.clone(),
        }
    }
}

// ─── Prepared data ───────────────────────────────────────────────────────────

/// Tokenised splits plus the tokenizer that produced them.
pub struct PreparedData {
    pub tokenizer:  TextTokenizer,
    pub train:      Vec<Example>,
    pub validation: Vec<Example>,
    /// Raw held-out texts, scored when there is no evaluation split
    pub validation_texts: Vec<String>,
    pub fingerprint: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct TrainOutcome {
    pub training:   Option<TrainingReport>,
    pub evaluation: Option<ReconstructionReport>,
}

// ─── TrainUseCase ─────────────────────────────────────────────────────────────
pub struct TrainUseCase {
    config: TrainConfig,
}

impl TrainUseCase {
    pub fn new(config: TrainConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &TrainConfig {
        &self.config
    }

    /// Run the plan: train and/or evaluate, as configured.
    pub fn execute<B: AutodiffBackend>(&self, device: &B::Device) -> Result<TrainOutcome> {
        let cfg = &self.config;
        cfg.validate().context("invalid training configuration")?;

        let mut outcome = TrainOutcome { training: None, evaluation: None };
        let mut fallback_texts = Vec::new();

        if cfg.plan.train {
            let data = self.prepare()?;
            fallback_texts = data.validation_texts.clone();
            outcome.training = Some(self.run_training::<B>(data, device)?);
        }

        if cfg.plan.evaluate {
            outcome.evaluation = Some(self.run_evaluation::<B::InnerBackend>(fallback_texts, device)?);
        }
        Ok(outcome)
    }

    /// Steps 2–4: splits → vocabulary → tokenizer → cached Examples.
    pub fn prepare(&self) -> Result<PreparedData> {
        let cfg = &self.config;

        // ── Step 2: Load the splits ───────────────────────────────────────────
        let train_docs = CorpusLoader::new(&cfg.dataset_dir, Split::Train).load_all()?;
        let test_docs  = CorpusLoader::new(&cfg.dataset_dir, Split::Test).load_all()?;
        let carved = test_docs.is_empty();
        let (train_docs, val_docs): (Vec<Document>, Vec<Document>) = if carved {
            tracing::info!(
                "No held-out split, carving {:.0}% of the training split",
                cfg.validation_fraction * 100.0
            );
            split_train_val(train_docs, 1.0 - cfg.validation_fraction, cfg.seed)
        } else {
            (train_docs, test_docs)
        };
        if train_docs.is_empty() {
            bail!("training split in '{}' has no text", cfg.dataset_dir.display());
        }
        tracing::info!("Split: {} train, {} held-out", train_docs.len(), val_docs.len());

        // ── Step 3: Vocabulary + tokenizer ────────────────────────────────────
        let tokenizer = if cfg.plan.init == InitMode::Resume {
            let dir = resolve_checkpoint_dir(&cfg.save_path)?;
            tracing::info!("Reusing tokenizer from '{}'", dir.display());
            TextTokenizer::load(&dir)?
        } else {
            let vocab = self.vocabulary(&train_docs)?;
            TextTokenizer::build(vocab, TokenizerConfig::new(cfg.max_seq_len, cfg.lowercase))?
        };
        if tokenizer.max_seq_len() != cfg.max_seq_len {
            return Err(crate::error::AutoencoderError::mismatch(
                "max_seq_len",
                tokenizer.max_seq_len(),
                cfg.max_seq_len,
            )
            .into());
        }

        // ── Step 4: Tokenise through the cache ───────────────────────────────
        let cache = ExampleCache::new(&cfg.cache_dir);
        let fingerprint = cfg.fingerprint(tokenizer.vocab().len(), carved);
        let train = cache
            .load_or_build(Split::Train, &fingerprint, &texts(&train_docs), &tokenizer)
            .context("failed to prepare the training split")?;
        let validation = cache
            .load_or_build(Split::Test, &fingerprint, &texts(&val_docs), &tokenizer)
            .context("failed to prepare the held-out split")?;

        Ok(PreparedData {
            tokenizer,
            train,
            validation,
            validation_texts: val_docs.into_iter().map(|d| d.text).collect(),
            fingerprint,
        })
    }

    fn vocabulary(&self, train_docs: &[Document]) -> Result<Vocabulary> {
        let cfg = &self.config;
        let vocab = match &cfg.vocab_file {
            Some(path) => Vocabulary::from_file(path, Some(cfg.vocab_size))
                .with_context(|| format!("failed to read vocabulary '{}'", path.display()))?,
            None => VocabularyBuilder::new(cfg.vocab_size)
                .lowercase(cfg.lowercase)
                .build(texts(train_docs))?,
        };
        Ok(vocab)
    }

    /// Steps 5–7.
    fn run_training<B: AutodiffBackend>(&self, data: PreparedData, device: &B::Device) -> Result<TrainingReport> {
        let cfg = &self.config;
        let vocab_len = data.tokenizer.vocab().len();

        // ── Step 5: Embeddings ────────────────────────────────────────────────
        let loader = EmbeddingLoader::new(cfg.embedding_dim, cfg.seed);
        let matrix = match &cfg.embeddings_file {
            Some(path) => loader.load(path, data.tokenizer.vocab())?,
            None => loader.random(data.tokenizer.vocab())?,
        };

        // ── Step 6: Model ────────────────────────────────────────────────────
        B::seed(cfg.seed);
        let model_cfg = cfg.model_config(vocab_len);
        let model = model_cfg.init::<B>(device, Some(&matrix))?;

        let checkpoints = CheckpointManager::new(&cfg.save_path, model_cfg, cfg.vocab_size, data.tokenizer)?;
        let mut options = cfg.training_options();
        let model = match cfg.plan.init {
            InitMode::Resume => {
                let (model, meta) = checkpoints.resume(model, device)?;
                options.initial_best = meta.val_loss;
                model
            }
            InitMode::FromScratch => model,
        };
        checkpoints.save_train_config(cfg)?;
        let metrics = MetricsLogger::new(&cfg.save_path, cfg.plan.init == InitMode::FromScratch)?;

        // ── Step 7: Train ────────────────────────────────────────────────────
        let (_, report) = train(
            model,
            data.train,
            data.validation,
            &options,
            &checkpoints,
            &metrics,
            device,
        )?;
        Ok(report)
    }

    /// Step 8: score the best checkpoint on evaluation.txt, or on the
    /// held-out texts when the dataset has no evaluation split.
    fn run_evaluation<B: Backend>(&self, fallback: Vec<String>, device: &B::Device) -> Result<ReconstructionReport> {
        let cfg = &self.config;
        let reconstructor = Reconstructor::<B>::from_checkpoint(&cfg.save_path, &cfg.load_environment(), device)
            .context("failed to load the trained model")?;

        let eval_docs = CorpusLoader::new(&cfg.dataset_dir, Split::Evaluation).load_all()?;
        let texts: Vec<String> = if eval_docs.is_empty() {
            tracing::warn!("No evaluation split, scoring {} held-out texts instead", fallback.len());
            fallback
        } else {
            eval_docs.into_iter().map(|d| d.text).collect()
        };
        if texts.is_empty() {
            return Err(crate::error::AutoencoderError::Configuration(format!(
                "nothing to evaluate: '{}' has no evaluation split and this run held out no texts",
                cfg.dataset_dir.display()
            ))
            .into());
        }
        Ok(reconstructor.evaluate(&texts)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AutoencoderError;
    use crate::ml::trainer::{EpochOutcome, TrainingStatus};
    use burn::backend::{Autodiff, NdArray};
    use std::fs;

    type TestBackend = Autodiff<NdArray>;

    fn dataset(dir: &std::path::Path) {
        fs::write(
            dir.join("train.txt"),
            "fica instituído o junho verde\nesta lei entra em vigor\no prefeito sanciona a lei\n",
        )
        .unwrap();
        fs::write(dir.join("test.txt"), "a lei entra em vigor\no junho verde\n").unwrap();
    }

    fn tiny_config(root: &std::path::Path) -> TrainConfig {
        TrainConfig {
            dataset_dir:   root.join("data"),
            save_path:     root.join("run"),
            cache_dir:     root.join("cache"),
            vocab_size:    100,
            max_seq_len:   7,
            embedding_dim: 8,
            hidden_size:   8,
            latent_size:   4,
            num_heads:     2,
            dropout:       0.0,
            batch_size:    4,
            epochs:        2,
            patience:      5,
            plan:          RunPlan { init: InitMode::FromScratch, train: true, evaluate: false },
            ..TrainConfig::default()
        }
    }

    fn setup() -> (tempfile::TempDir, TrainConfig) {
        let tmp = tempfile::tempdir().unwrap();
        fs::create_dir_all(tmp.path().join("data")).unwrap();
        dataset(&tmp.path().join("data"));
        let cfg = tiny_config(tmp.path());
        (tmp, cfg)
    }

    #[test]
    fn test_two_epochs_with_patience_five_complete() {
        let (_tmp, cfg) = setup();
        let cfg = TrainConfig { keep_epoch_checkpoints: true, ..cfg };
        let outcome = TrainUseCase::new(cfg.clone())
            .execute::<TestBackend>(&Default::default())
            .unwrap();
        let report = outcome.training.unwrap();

        assert_eq!(report.status, TrainingStatus::Completed);
        assert_eq!(report.history.len(), 2);
        assert!(report.history.iter().all(|m| m.val_loss.is_finite()));
        for epoch in 1..=2 {
            assert!(cfg.save_path.join(format!("epoch-{epoch}")).join("checkpoint.json").exists());
        }
        assert!(cfg.save_path.join("best").join("model_config.json").exists());
        assert!(cfg.save_path.join("train_config.json").exists());

        let csv = fs::read_to_string(cfg.save_path.join("metrics.csv")).unwrap();
        assert_eq!(csv.lines().count(), 3);
    }

    #[test]
    fn test_prediction_with_wider_embeddings_is_rejected() {
        let (tmp, cfg) = setup();
        let cfg = TrainConfig { embedding_dim: 50, epochs: 1, ..cfg };
        TrainUseCase::new(cfg.clone()).execute::<TestBackend>(&Default::default()).unwrap();

        let wide = tmp.path().join("wide.txt");
        let row: Vec<String> = (0..100).map(|i| format!("{:.2}", i as f32 / 100.0)).collect();
        fs::write(&wide, format!("lei {}\n", row.join(" "))).unwrap();

        for embedding_dim in [50, 100] {
            let env = LoadEnvironment { embedding_dim, vocab_size: None, embeddings_file: Some(wide.clone()) };
            let err = Reconstructor::<NdArray>::from_checkpoint(&cfg.save_path, &env, &Default::default())
                .err()
                .unwrap();
            assert!(matches!(err, AutoencoderError::CheckpointMismatch { field: "embedding_dim", .. }));
        }
    }

    #[test]
    fn test_cleared_cache_reproduces_examples() {
        let (_tmp, cfg) = setup();
        let use_case = TrainUseCase::new(cfg.clone());

        let first = use_case.prepare().unwrap();
        let entry = ExampleCache::new(&cfg.cache_dir).entry_path(Split::Train, &first.fingerprint).unwrap();
        let first_bytes = fs::read(&entry).unwrap();

        ExampleCache::new(&cfg.cache_dir).clear_all().unwrap();
        assert!(!entry.exists());

        let second = use_case.prepare().unwrap();
        assert_eq!(first.train, second.train);
        assert_eq!(first.validation, second.validation);
        assert_eq!(first_bytes, fs::read(&entry).unwrap());
    }

    #[test]
    fn test_missing_test_split_is_carved_from_train() {
        let (tmp, cfg) = setup();
        fs::remove_file(tmp.path().join("data").join("test.txt")).unwrap();
        let cfg = TrainConfig { validation_fraction: 0.34, ..cfg };
        let data = TrainUseCase::new(cfg).prepare().unwrap();
        assert_eq!(data.train.len() + data.validation.len(), 3);
        assert_eq!(data.validation.len(), 1);
        assert!(data.fingerprint.contains("holdout34"));
    }

    #[test]
    fn test_resume_continues_from_best_checkpoint() {
        let (_tmp, cfg) = setup();
        let first = TrainConfig { epochs: 1, ..cfg };
        TrainUseCase::new(first.clone()).execute::<TestBackend>(&Default::default()).unwrap();

        let resumed = TrainConfig {
            plan: RunPlan { init: InitMode::Resume, train: true, evaluate: true },
            ..first
        };
        let outcome = TrainUseCase::new(resumed.clone()).execute::<TestBackend>(&Default::default()).unwrap();
        assert_eq!(outcome.training.unwrap().history.len(), 1);
        // Rows of both runs are kept
        let csv = fs::read_to_string(resumed.save_path.join("metrics.csv")).unwrap();
        assert_eq!(csv.lines().count(), 3);
        // No evaluation.txt, so the held-out texts are scored
        assert_eq!(outcome.evaluation.unwrap().examples.len(), 2);
    }

    #[test]
    fn test_resume_keeps_best_checkpoint_it_cannot_beat() {
        let (_tmp, cfg) = setup();
        let first = TrainConfig { epochs: 1, ..cfg };
        TrainUseCase::new(first.clone()).execute::<TestBackend>(&Default::default()).unwrap();

        // Lower the stored loss below anything the next epochs can reach
        let best = first.save_path.join("best");
        let meta_path = best.join("checkpoint.json");
        let mut meta: serde_json::Value = serde_json::from_slice(&fs::read(&meta_path).unwrap()).unwrap();
        meta["val_loss"] = serde_json::json!(1e-9);
        fs::write(&meta_path, serde_json::to_vec_pretty(&meta).unwrap()).unwrap();
        let meta_bytes  = fs::read(&meta_path).unwrap();
        let model_bytes = fs::read(best.join("model.mpk.gz")).unwrap();

        let resumed = TrainConfig {
            epochs: 2,
            plan: RunPlan { init: InitMode::Resume, train: true, evaluate: false },
            ..first
        };
        let report = TrainUseCase::new(resumed)
            .execute::<TestBackend>(&Default::default())
            .unwrap()
            .training
            .unwrap();

        assert_eq!(report.history.len(), 2);
        assert!(report.history.iter().all(|m| m.outcome == EpochOutcome::Stalled));
        assert_eq!(report.best_epoch, None);
        assert_eq!(report.best_loss, Some(1e-9));
        assert_eq!(fs::read(&meta_path).unwrap(), meta_bytes);
        assert_eq!(fs::read(best.join("model.mpk.gz")).unwrap(), model_bytes);
    }

    #[test]
    fn test_evaluation_without_texts_is_configuration_error() {
        let (tmp, cfg) = setup();
        TrainUseCase::new(TrainConfig { epochs: 1, ..cfg.clone() })
            .execute::<TestBackend>(&Default::default())
            .unwrap();
        assert!(!tmp.path().join("data").join("evaluation.txt").exists());

        let eval_only = TrainConfig {
            plan: RunPlan { init: InitMode::FromScratch, train: false, evaluate: true },
            ..cfg
        };
        let err = TrainUseCase::new(eval_only).execute::<TestBackend>(&Default::default()).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<AutoencoderError>(),
            Some(AutoencoderError::Configuration(_))
        ));
    }

    #[test]
    fn test_resume_without_checkpoint_fails() {
        let (_tmp, cfg) = setup();
        let cfg = TrainConfig { plan: RunPlan { init: InitMode::Resume, train: true, evaluate: false }, ..cfg };
        assert!(TrainUseCase::new(cfg).execute::<TestBackend>(&Default::default()).is_err());
    }

    #[test]
    fn test_config_validation() {
        let ok = TrainConfig::default();
        assert!(ok.validate().is_ok());

        let bad = [
            TrainConfig { batch_size: 0, ..ok.clone() },
            TrainConfig { epochs: 0, ..ok.clone() },
            TrainConfig { patience: 0, ..ok.clone() },
            TrainConfig { num_layers: 0, ..ok.clone() },
            TrainConfig { max_seq_len: 1, ..ok.clone() },
            TrainConfig { learning_rate: 0.0, ..ok.clone() },
            TrainConfig { vocab_size: 3, ..ok.clone() },
            TrainConfig { embedding_dim: 0, ..ok.clone() },
            TrainConfig { variant: Architecture::Transformer, hidden_size: 10, num_heads: 4, ..ok.clone() },
            TrainConfig { plan: RunPlan { init: InitMode::FromScratch, train: false, evaluate: false }, ..ok.clone() },
        ];
        for cfg in bad {
            assert!(matches!(cfg.validate(), Err(AutoencoderError::Configuration(_))), "{cfg:?}");
        }
    }
}
