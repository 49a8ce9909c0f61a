// ============================================================
// Layer 1 — CLI Commands and Arguments
// ============================================================
// Five subcommands:
//
//   build-vocab          corpus → vocabulary file
//   train                full training / evaluation run
//   predict              checkpoint → reconstruction report
//   clear-cache          drop cached Examples
//   preprocess-gazettes  gazette tree → sentence corpus
//
// Each Args struct converts into an application-layer config,
// so Layer 2 never sees clap types.
//
// Reference: Rust Book §12 (Building a CLI Program)

use std::path::PathBuf;

use chrono::NaiveDate;
use clap::{Args, Subcommand, ValueEnum};

use crate::application::{
    corpus_use_case::{BuildVocabConfig, PreprocessConfig},
    predict_use_case::PredictConfig,
    train_use_case::{InitMode, RunPlan, TrainConfig},
};
use crate::data::loader::parse_since;
use crate::domain::document::Split;
use crate::ml::model::Architecture;

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Build a frequency-ranked vocabulary file from a corpus
    BuildVocab(BuildVocabArgs),

    /// Train an autoencoder and/or evaluate its best checkpoint
    Train(TrainArgs),

    /// Reconstruct a split with a trained checkpoint
    Predict(PredictArgs),

    /// Delete cached tokenised examples
    ClearCache(ClearCacheArgs),

    /// Clean and segment gazette files into a sentence corpus
    PreprocessGazettes(PreprocessArgs),
}

/// Tensor backend for train / predict
#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum BackendKind {
    /// GPU through wgpu
    Wgpu,
    /// CPU
    Ndarray,
}

#[derive(Args, Debug)]
pub struct BuildVocabArgs {
    /// Dataset directory (reads train.txt) or a plain text file
    #[arg(long)]
    pub corpus: PathBuf,

    #[arg(long, default_value = "vocab.txt")]
    pub output: PathBuf,

    /// Corpus tokens to keep, reserved tokens excluded
    #[arg(long, default_value_t = 20_000)]
    pub vocab_size: usize,

    /// Keep case instead of lowercasing
    #[arg(long)]
    pub cased: bool,
}

impl From<BuildVocabArgs> for BuildVocabConfig {
    fn from(a: BuildVocabArgs) -> Self {
        BuildVocabConfig {
            corpus:     a.corpus,
            output:     a.output,
            vocab_size: a.vocab_size,
            lowercase:  !a.cased,
        }
    }
}

/// All arguments for the `train` command.
#[derive(Args, Debug)]
pub struct TrainArgs {
    /// Directory holding train.txt, and optionally test.txt and evaluation.txt
    #[arg(long, default_value = "data")]
    pub dataset_dir: PathBuf,

    /// Where checkpoints, metrics.csv and train_config.json go
    #[arg(long, default_value = "checkpoints")]
    pub save_path: PathBuf,

    #[arg(long, default_value = "cache")]
    pub cache_dir: PathBuf,

    /// Fixed vocabulary file; built from train.txt when omitted
    #[arg(long)]
    pub vocab_file: Option<PathBuf>,

    #[arg(long, default_value_t = 20_000)]
    pub vocab_size: usize,

    #[arg(long)]
    pub cased: bool,

    /// Tokens per example, [EOS] included
    #[arg(long, default_value_t = 20)]
    pub max_seq_len: usize,

    /// GloVe-style `token v1 .. vD` file
    #[arg(long)]
    pub embeddings_file: Option<PathBuf>,

    #[arg(long, default_value_t = 100)]
    pub embedding_dim: usize,

    /// lstm, gru or transformer
    #[arg(long, default_value = "lstm")]
    pub variant: Architecture,

    #[arg(long, default_value_t = 256)]
    pub hidden_size: usize,

    #[arg(long, default_value_t = 128)]
    pub latent_size: usize,

    #[arg(long, default_value_t = 1)]
    pub num_layers: usize,

    /// Recurrent variants only
    #[arg(long)]
    pub bidirectional: bool,

    /// Transformer only; hidden_size must be divisible by it
    #[arg(long, default_value_t = 4)]
    pub num_heads: usize,

    /// Transformer feed-forward width, 0 for 4 × hidden_size
    #[arg(long, default_value_t = 0)]
    pub d_ff: usize,

    #[arg(long, default_value_t = 0.1)]
    pub dropout: f64,

    /// Decode from the model's own predictions during training
    #[arg(long)]
    pub no_teacher_forcing: bool,

    #[arg(long, default_value_t = 64)]
    pub batch_size: usize,

    #[arg(long, default_value_t = 10)]
    pub epochs: usize,

    /// Epochs without improvement before stopping
    #[arg(long, default_value_t = 3)]
    pub patience: usize,

    #[arg(long, default_value_t = 1e-3)]
    pub lr: f64,

    /// Share of train.txt held out when there is no test.txt
    #[arg(long, default_value_t = 0.1)]
    pub validation_fraction: f64,

    /// Also keep a checkpoint for every epoch
    #[arg(long)]
    pub keep_epoch_checkpoints: bool,

    #[arg(long, default_value_t = 42)]
    pub seed: u64,

    /// Continue from <save_path>/best instead of starting from scratch
    #[arg(long)]
    pub resume: bool,

    /// Skip training, only evaluate an existing checkpoint
    #[arg(long)]
    pub no_train: bool,

    /// Skip evaluation after training
    #[arg(long)]
    pub no_eval: bool,

    #[arg(long, value_enum, default_value_t = BackendKind::Wgpu)]
    pub backend: BackendKind,
}

impl From<TrainArgs> for TrainConfig {
    fn from(a: TrainArgs) -> Self {
        TrainConfig {
            dataset_dir:            a.dataset_dir,
            save_path:              a.save_path,
            cache_dir:              a.cache_dir,
            vocab_file:             a.vocab_file,
            vocab_size:             a.vocab_size,
            lowercase:              !a.cased,
            max_seq_len:            a.max_seq_len,
            embedding_dim:          a.embedding_dim,
            embeddings_file:        a.embeddings_file,
            variant:                a.variant,
            hidden_size:            a.hidden_size,
            latent_size:            a.latent_size,
            num_layers:             a.num_layers,
            bidirectional:          a.bidirectional,
            num_heads:              a.num_heads,
            d_ff:                   a.d_ff,
            dropout:                a.dropout,
            teacher_forcing:        !a.no_teacher_forcing,
            batch_size:             a.batch_size,
            epochs:                 a.epochs,
            patience:               a.patience,
            learning_rate:          a.lr,
            validation_fraction:    a.validation_fraction,
            keep_epoch_checkpoints: a.keep_epoch_checkpoints,
            seed:                   a.seed,
            plan: RunPlan {
                init:     if a.resume { InitMode::Resume } else { InitMode::FromScratch },
                train:    !a.no_train,
                evaluate: !a.no_eval,
            },
        }
    }
}

#[derive(Args, Debug)]
pub struct PredictArgs {
    /// Run directory or a checkpoint directory
    #[arg(long, default_value = "checkpoints")]
    pub model_path: PathBuf,

    #[arg(long, default_value = "data")]
    pub dataset_dir: PathBuf,

    /// train, test or evaluation
    #[arg(long, default_value = "evaluation")]
    pub split: Split,

    /// Must equal the dimension the checkpoint was trained with
    #[arg(long)]
    pub embedding_dim: usize,

    #[arg(long)]
    pub embeddings_file: Option<PathBuf>,

    /// Vocabulary size requested at training time
    #[arg(long)]
    pub vocab_size: Option<usize>,

    /// Write the full report as JSON
    #[arg(long)]
    pub output: Option<PathBuf>,

    /// Reconstruct this text instead of a split
    #[arg(long)]
    pub text: Option<String>,

    #[arg(long, value_enum, default_value_t = BackendKind::Wgpu)]
    pub backend: BackendKind,
}

impl From<&PredictArgs> for PredictConfig {
    fn from(a: &PredictArgs) -> Self {
        PredictConfig {
            model_path:      a.model_path.clone(),
            dataset_dir:     a.dataset_dir.clone(),
            split:           a.split,
            embedding_dim:   a.embedding_dim,
            embeddings_file: a.embeddings_file.clone(),
            vocab_size:      a.vocab_size,
            output:          a.output.clone(),
        }
    }
}

#[derive(Args, Debug)]
pub struct ClearCacheArgs {
    #[arg(long, default_value = "cache")]
    pub cache_dir: PathBuf,

    /// Clear only this split; every split when omitted
    #[arg(long)]
    pub split: Option<Split>,
}

#[derive(Args, Debug)]
pub struct PreprocessArgs {
    /// Root of <city>/<YYYY-MM-DD>/*.txt
    #[arg(long)]
    pub gazette_root: PathBuf,

    /// Only gazettes dated on or after this day (YYYY-MM-DD)
    #[arg(long, value_parser = parse_since)]
    pub since: Option<NaiveDate>,

    #[arg(long, default_value = "data/train.txt")]
    pub output: PathBuf,

    /// Keep sentences as segmented, without lowercasing or dropping punctuation
    #[arg(long)]
    pub raw: bool,
}

impl From<PreprocessArgs> for PreprocessConfig {
    fn from(a: PreprocessArgs) -> Self {
        PreprocessConfig {
            gazette_root: a.gazette_root,
            since:        a.since,
            output:       a.output,
            normalise:    !a.raw,
        }
    }
}
