// ============================================================
// Layer 6 — Metrics
// ============================================================
// Two kinds of numbers leave the training loop:
//
//   EpochMetrics         one CSV row per epoch in metrics.csv
//   ReconstructionScore  token / sequence agreement between a
//                        reconstruction and its input, summed
//                        over any number of examples
//
// Example CSV output:
//   epoch,train_loss,val_loss,token_accuracy,exact_match,outcome
//   1,5.812300,5.790100,0.041000,0.000000,improved
//   2,5.104200,5.233800,0.118000,0.000000,improved
//   3,4.722000,5.301200,0.131000,0.000000,stalled
//
// Reading the log:
//   - val_loss is the monitored quantity; "stalled" rows count
//     toward patience
//   - token_accuracy rising while val_loss stalls usually means
//     the decoder is memorising frequent tokens

use std::{
    fs::{self, OpenOptions},
    io::Write,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};

use crate::error::{AutoencoderError, Result};
use crate::ml::trainer::EpochOutcome;

pub const METRICS_FILE: &str = "metrics.csv";
const CSV_HEADER: &str = "epoch,train_loss,val_loss,token_accuracy,exact_match,outcome";

/// One row of metrics for a single training epoch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpochMetrics {
    /// Starts at 1
    pub epoch: usize,

    /// Mean masked cross-entropy over the training batches
    pub train_loss: f64,

    /// Mean masked cross-entropy on the held-out split
    /// (the training loss when there is no held-out split)
    pub val_loss: f64,

    /// Fraction of real positions reconstructed exactly
    pub token_accuracy: f64,

    /// Fraction of sequences reconstructed without a single error
    pub exact_match: f64,

    pub outcome: EpochOutcome,
}

/// Token and sequence agreement counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconstructionScore {
    pub correct_tokens: usize,
    pub total_tokens:   usize,
    pub exact_matches:  usize,
    pub sequences:      usize,
}

impl ReconstructionScore {
    /// Score one sequence. `target` holds the real ids ([EOS] included);
    /// `predicted` is compared position by position, missing positions
    /// count as wrong.
    pub fn of<T: PartialEq>(predicted: &[T], target: &[T]) -> Self {
        let correct = target
            .iter()
            .enumerate()
            .filter(|(i, t)| predicted.get(*i) == Some(*t))
            .count();
        Self {
            correct_tokens: correct,
            total_tokens:   target.len(),
            exact_matches:  usize::from(correct == target.len()),
            sequences:      1,
        }
    }

    pub fn add(&mut self, other: ReconstructionScore) {
        self.correct_tokens += other.correct_tokens;
        self.total_tokens   += other.total_tokens;
        self.exact_matches  += other.exact_matches;
        self.sequences      += other.sequences;
    }

    pub fn token_accuracy(&self) -> f64 {
        ratio(self.correct_tokens, self.total_tokens)
    }

    pub fn exact_match_rate(&self) -> f64 {
        ratio(self.exact_matches, self.sequences)
    }
}

fn ratio(num: usize, den: usize) -> f64 {
    if den == 0 { 0.0 } else { num as f64 / den as f64 }
}

/// Logs epoch metrics to `<dir>/metrics.csv`.
pub struct MetricsLogger {
    csv_path: PathBuf,
}

impl MetricsLogger {
    /// `fresh` truncates an existing log; otherwise rows are appended
    /// (a resumed run continues the previous log).
    pub fn new(dir: &Path, fresh: bool) -> Result<Self> {
        fs::create_dir_all(dir).map_err(|e| AutoencoderError::io(e, dir))?;
        let csv_path = dir.join(METRICS_FILE);

        if fresh || !csv_path.exists() {
            let mut f = fs::File::create(&csv_path).map_err(|e| AutoencoderError::io(e, &csv_path))?;
            writeln!(f, "{CSV_HEADER}").map_err(|e| AutoencoderError::io(e, &csv_path))?;
            tracing::debug!("Created metrics CSV: '{}'", csv_path.display());
        }

        Ok(Self { csv_path })
    }

    pub fn log(&self, m: &EpochMetrics) -> Result<()> {
        let mut f = OpenOptions::new()
            .append(true)
            .open(&self.csv_path)
            .map_err(|e| AutoencoderError::io(e, &self.csv_path))?;

        writeln!(
            f,
            "{},{:.6},{:.6},{:.6},{:.6},{}",
            m.epoch, m.train_loss, m.val_loss, m.token_accuracy, m.exact_match, m.outcome,
        )
        .map_err(|e| AutoencoderError::io(e, &self.csv_path))?;

        tracing::debug!(
            "Logged epoch {} metrics: train_loss={:.4}, val_loss={:.4}",
            m.epoch,
            m.train_loss,
            m.val_loss,
        );
        Ok(())
    }

    pub fn csv_path(&self) -> &Path {
        &self.csv_path
    }
}
