// ============================================================
// Layer 5 — Training Loop
// ============================================================
// Epoch loop with Adam, validation and early stopping.
//
// State machine per epoch:
//
//   Running ──train + validate──► Improved ──► save best/, counter = 0
//                               └► Stalled  ──► counter += 1
//   then:  counter >= patience  → Stopped
//          epoch == max epochs  → Completed
//          otherwise            → Running
//
// Improved means strictly below the best loss seen so far; an
// equal or NaN loss is Stalled. Both terminal states leave
// best/ as the authoritative checkpoint. A resumed run starts
// from the loss stored in best/, so only a strictly better
// epoch replaces it.
//
// Backend split:
//   - Training runs on B (an AutodiffBackend) for gradients
//   - model.valid() returns the model on B::InnerBackend,
//     dropout off, no autodiff graph
//   - the validation loader builds tensors on the inner backend
//   - argmax(2) returns [batch, seq, 1], reshaped to [batch, seq]
//
// Reference: Kingma & Ba (2015) Adam

use std::fmt;

use burn::{
    data::dataloader::DataLoader,
    module::AutodiffModule,
    optim::{AdamConfig, GradientsParams, Optimizer},
    prelude::*,
    tensor::backend::AutodiffBackend,
};
use serde::{Deserialize, Serialize};

use crate::data::pipeline::{eval_loader, train_loader, ExampleLoader};
use crate::domain::example::Example;
use crate::error::{AutoencoderError, Result};
use crate::infra::{
    checkpoint::CheckpointManager,
    metrics::{EpochMetrics, MetricsLogger, ReconstructionScore},
};
use crate::ml::model::{masked_cross_entropy, score_predictions, AutoencoderModel, Seq2Seq};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EpochOutcome {
    Improved,
    Stalled,
}

impl fmt::Display for EpochOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            EpochOutcome::Improved => "improved",
            EpochOutcome::Stalled  => "stalled",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrainingStatus {
    Running,
    /// Patience exhausted before the epoch budget
    Stopped,
    /// Epoch budget exhausted
    Completed,
}

/// Patience bookkeeping over the monitored loss.
#[derive(Debug, Clone)]
pub struct EarlyStopping {
    patience: usize,
    best:     f64,
    counter:  usize,
}

impl EarlyStopping {
    pub fn new(patience: usize) -> Self {
        Self::with_best(patience, None)
    }

    /// Start from a loss already reached, e.g. by a resumed checkpoint.
    pub fn with_best(patience: usize, best: Option<f64>) -> Self {
        Self { patience, best: best.unwrap_or(f64::INFINITY), counter: 0 }
    }

    pub fn observe(&mut self, loss: f64) -> EpochOutcome {
        // NaN compares false, so it can never improve
        if loss < self.best {
            self.best = loss;
            self.counter = 0;
            EpochOutcome::Improved
        } else {
            self.counter += 1;
            EpochOutcome::Stalled
        }
    }

    pub fn should_stop(&self) -> bool {
        self.counter >= self.patience
    }

    pub fn best(&self) -> Option<f64> {
        self.best.is_finite().then_some(self.best)
    }

    pub fn counter(&self) -> usize {
        self.counter
    }
}

/// In-memory state of one run. Never persisted.
#[derive(Debug, Clone)]
pub struct TrainingState {
    pub epoch:         usize,
    pub learning_rate: f64,
    pub stopper:       EarlyStopping,
    pub status:        TrainingStatus,
}

impl TrainingState {
    pub fn new(options: &TrainingOptions) -> Self {
        Self {
            epoch:         0,
            learning_rate: options.learning_rate,
            stopper:       EarlyStopping::with_best(options.patience, options.initial_best),
            status:        TrainingStatus::Running,
        }
    }

    /// Record one epoch's monitored loss and move the state machine.
    pub fn advance(&mut self, loss: f64, max_epochs: usize) -> EpochOutcome {
        self.epoch += 1;
        let outcome = self.stopper.observe(loss);
        self.status = if self.stopper.should_stop() {
            TrainingStatus::Stopped
        } else if self.epoch >= max_epochs {
            TrainingStatus::Completed
        } else {
            TrainingStatus::Running
        };
        outcome
    }
}

#[derive(Debug, Clone)]
pub struct TrainingOptions {
    pub epochs:                 usize,
    pub patience:               usize,
    pub learning_rate:          f64,
    pub batch_size:             usize,
    /// Seeds the per-epoch shuffle of the training split
    pub seed:                   u64,
    pub keep_epoch_checkpoints: bool,
    /// Loss of the checkpoint a resumed run continues from
    pub initial_best:           Option<f64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TrainingReport {
    pub history:    Vec<EpochMetrics>,
    pub status:     TrainingStatus,
    pub best_epoch: Option<usize>,
    pub best_loss:  Option<f64>,
}

/// Mean loss and reconstruction counts of `model` over one split.
pub fn evaluate<B: Backend>(model: &AutoencoderModel<B>, loader: &ExampleLoader<B>) -> (f64, ReconstructionScore) {
    let mut loss_sum = 0.0f64;
    let mut batches  = 0usize;
    let mut score    = ReconstructionScore::default();

    for batch in loader.iter() {
        let logits = model.forward_train(&batch);
        let [batch_size, seq_len, _] = logits.dims();

        let loss = masked_cross_entropy(logits.clone(), batch.token_ids.clone(), batch.attention_mask.clone());
        loss_sum += loss.into_scalar().elem::<f64>();
        batches  += 1;

        let predicted = logits.argmax(2).reshape([batch_size, seq_len]);
        score.add(score_predictions(predicted, &batch));
    }

    let mean = if batches > 0 { loss_sum / batches as f64 } else { f64::NAN };
    (mean, score)
}

/// Train until early stop or the epoch budget, checkpointing on improvement.
///
/// An empty `validation` split falls back to monitoring the loss on
/// `train` (evaluated without dropout).
pub fn train<B: AutodiffBackend>(
    mut model:   AutoencoderModel<B>,
    train:       Vec<Example>,
    validation:  Vec<Example>,
    options:     &TrainingOptions,
    checkpoints: &CheckpointManager,
    metrics:     &MetricsLogger,
    device:      &B::Device,
) -> Result<(AutoencoderModel<B>, TrainingReport)> {
    if train.is_empty() {
        return Err(AutoencoderError::Configuration("training split is empty".into()));
    }
    let monitored = if validation.is_empty() {
        tracing::warn!("Held-out split is empty; early stopping monitors the training loss");
        train.clone()
    } else {
        validation
    };

    // ── Adam optimiser ────────────────────────────────────────────────────────
    // m = β1*m + (1-β1)*g        (mean)
    // v = β2*v + (1-β2)*g²       (variance)
    // θ = θ - lr * m / (√v + ε)  (update)
    let mut optim = AdamConfig::new().with_epsilon(1e-8).init::<B, AutoencoderModel<B>>();

    // ── Training data loader (AutodiffBackend) ────────────────────────────────
    let train_loader = train_loader::<B>(train, options.batch_size, options.seed, device)?;

    // ── Validation data loader (InnerBackend — no autodiff overhead) ──────────
    let val_loader = eval_loader::<B::InnerBackend>(monitored, options.batch_size, device)?;

    let mut state  = TrainingState::new(options);
    let mut report = TrainingReport {
        history:    Vec::new(),
        status:     TrainingStatus::Running,
        best_epoch: None,
        best_loss:  None,
    };

    tracing::info!(
        "Training: {} examples in {} batches per epoch, up to {} epochs, patience {}",
        train_loader.num_items(),
        train_loader.num_items().div_ceil(options.batch_size),
        options.epochs,
        options.patience
    );

    while state.status == TrainingStatus::Running && state.epoch < options.epochs {
        let epoch = state.epoch + 1;

        // ── Training phase ────────────────────────────────────────────────────
        let mut train_loss_sum = 0.0f64;
        let mut train_batches  = 0usize;

        for batch in train_loader.iter() {
            let loss = model.loss(&batch);

            train_loss_sum += loss.clone().into_scalar().elem::<f64>();
            train_batches  += 1;

            // Backward pass + Adam update
            let grads = loss.backward();
            let grads = GradientsParams::from_grads(grads, &model);
            model = optim.step(state.learning_rate, model, grads);
        }
        let train_loss = train_loss_sum / train_batches.max(1) as f64;

        // ── Validation phase ──────────────────────────────────────────────────
        let (val_loss, score) = evaluate(&model.valid(), &val_loader);

        let outcome = state.advance(val_loss, options.epochs);
        if outcome == EpochOutcome::Improved {
            checkpoints.save_best(&model, epoch, val_loss)?;
            report.best_epoch = Some(epoch);
        }
        if options.keep_epoch_checkpoints {
            checkpoints.save_epoch(&model, epoch, val_loss)?;
        }

        let row = EpochMetrics {
            epoch,
            train_loss,
            val_loss,
            token_accuracy: score.token_accuracy(),
            exact_match: score.exact_match_rate(),
            outcome,
        };
        metrics.log(&row)?;
        report.history.push(row);

        tracing::info!(
            "Epoch {:>3}/{} | train_loss={:.4} | val_loss={:.4} | token_acc={:.1}% | exact={:.1}% | {} (patience {}/{})",
            epoch,
            options.epochs,
            train_loss,
            val_loss,
            score.token_accuracy() * 100.0,
            score.exact_match_rate() * 100.0,
            outcome,
            state.stopper.counter(),
            options.patience,
        );
    }

    report.status    = state.status;
    report.best_loss = state.stopper.best();
    match report.status {
        TrainingStatus::Stopped => tracing::info!(
            "Early stop after epoch {}: no improvement for {} epochs",
            state.epoch,
            options.patience
        ),
        _ => tracing::info!("Training complete after {} epochs", state.epoch),
    }
    Ok((model, report))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::vocabulary::VocabularyBuilder;
    use crate::infra::tokenizer_store::{TextTokenizer, TokenizerConfig};
    use crate::ml::model::{Architecture, AutoencoderConfig};
    use burn::backend::{Autodiff, NdArray};

    type TestBackend = Autodiff<NdArray>;

    #[test]
    fn test_improvement_must_be_strict() {
        let mut es = EarlyStopping::new(3);
        assert_eq!(es.observe(2.0), EpochOutcome::Improved);
        assert_eq!(es.observe(2.0), EpochOutcome::Stalled);
        assert_eq!(es.counter(), 1);
        assert_eq!(es.observe(1.9), EpochOutcome::Improved);
        assert_eq!(es.counter(), 0);
        assert_eq!(es.best(), Some(1.9));
    }

    #[test]
    fn test_nan_never_improves() {
        let mut es = EarlyStopping::new(2);
        assert_eq!(es.observe(f64::NAN), EpochOutcome::Stalled);
        assert_eq!(es.best(), None);
        assert_eq!(es.observe(5.0), EpochOutcome::Improved);
        assert_eq!(es.observe(f64::NAN), EpochOutcome::Stalled);
    }

    #[test]
    fn test_counter_only_moves_on_stalls() {
        let losses = [5.0, 4.0, 4.5, 4.0, 3.0, 3.5, 3.5, 3.5];
        let mut es = EarlyStopping::new(10);
        let mut previous = 0;
        for loss in losses {
            let best_before = es.best().unwrap_or(f64::INFINITY);
            match es.observe(loss) {
                EpochOutcome::Improved => {
                    assert!(loss < best_before);
                    assert_eq!(es.counter(), 0);
                }
                EpochOutcome::Stalled => {
                    assert!(loss >= best_before);
                    assert_eq!(es.counter(), previous + 1);
                }
            }
            previous = es.counter();
        }
        assert_eq!(es.counter(), 3);
    }

    fn options(epochs: usize, patience: usize, learning_rate: f64) -> TrainingOptions {
        TrainingOptions {
            epochs,
            patience,
            learning_rate,
            batch_size: 2,
            seed: 1,
            keep_epoch_checkpoints: false,
            initial_best: None,
        }
    }

    #[test]
    fn test_carried_best_must_be_beaten() {
        let mut es = EarlyStopping::with_best(2, Some(1.5));
        assert_eq!(es.best(), Some(1.5));
        assert_eq!(es.observe(1.7), EpochOutcome::Stalled);
        assert_eq!(es.observe(1.5), EpochOutcome::Stalled);
        assert!(es.should_stop());

        let mut es = EarlyStopping::with_best(2, Some(1.5));
        assert_eq!(es.observe(1.4), EpochOutcome::Improved);
        assert_eq!(es.best(), Some(1.4));
    }

    #[test]
    fn test_stops_within_patience_of_last_improvement() {
        let options = options(100, 2, 1e-3);
        let mut state = TrainingState::new(&options);
        for loss in [3.0, 2.0, 2.5, 2.1] {
            state.advance(loss, options.epochs);
        }
        assert_eq!(state.epoch, 4);
        assert_eq!(state.status, TrainingStatus::Stopped);
    }

    #[test]
    fn test_completes_at_epoch_budget() {
        let options = options(3, 5, 1e-3);
        let mut state = TrainingState::new(&options);
        for loss in [3.0, 3.5, 3.4] {
            state.advance(loss, options.epochs);
        }
        assert_eq!(state.status, TrainingStatus::Completed);
    }

    #[test]
    fn test_frozen_model_stops_after_patience() {
        // lr = 0 keeps the weights fixed, so every epoch after the first
        // repeats the same validation loss and stalls.
        let tmp = tempfile::tempdir().unwrap();
        let device = Default::default();
        let texts = ["a lei entra em vigor", "fica o junho verde", "a lei"];
        let vocab = VocabularyBuilder::new(50).build(texts).unwrap();
        let cfg = AutoencoderConfig::new(Architecture::Lstm, vocab.len(), 4, 8, 1, 4, 6).with_dropout(0.0);
        let tok = TextTokenizer::build(vocab, TokenizerConfig::new(6, true)).unwrap();
        let examples = tok.encode_batch(&texts).unwrap();

        let ckpt = CheckpointManager::new(tmp.path(), cfg.clone(), 50, tok).unwrap();
        let metrics = MetricsLogger::new(tmp.path(), true).unwrap();
        let model = cfg.init::<TestBackend>(&device, None).unwrap();

        let options = options(10, 2, 0.0);
        let (_, report) = train(model, examples.clone(), examples, &options, &ckpt, &metrics, &device).unwrap();

        assert_eq!(report.status, TrainingStatus::Stopped);
        assert_eq!(report.history.len(), 3);
        assert_eq!(report.best_epoch, Some(1));
        assert_eq!(report.history[0].outcome, EpochOutcome::Improved);
        assert!(report.history[1..].iter().all(|m| m.outcome == EpochOutcome::Stalled));
        assert!(ckpt.best_dir().join("checkpoint.json").exists());
    }

    #[test]
    fn test_empty_training_split_is_configuration_error() {
        let tmp = tempfile::tempdir().unwrap();
        let device = Default::default();
        let vocab = VocabularyBuilder::new(10).build(["a b"]).unwrap();
        let cfg = AutoencoderConfig::new(Architecture::Gru, vocab.len(), 4, 4, 1, 2, 4);
        let tok = TextTokenizer::build(vocab, TokenizerConfig::new(4, true)).unwrap();
        let ckpt = CheckpointManager::new(tmp.path(), cfg.clone(), 10, tok).unwrap();
        let metrics = MetricsLogger::new(tmp.path(), true).unwrap();
        let model = cfg.init::<TestBackend>(&device, None).unwrap();
        let options = options(1, 1, 1e-3);

        let err = train(model, Vec::new(), Vec::new(), &options, &ckpt, &metrics, &device).unwrap_err();
        assert!(matches!(err, AutoencoderError::Configuration(_)));
    }
}
