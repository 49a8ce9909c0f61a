// ============================================================
// Layer 5 — Autoencoder Model Abstraction
// ============================================================
// One contract, three architectures:
//
//   encode(batch)                  → latent   [batch, latent_size]
//   decode(latent, target_length)  → logits   [batch, len, vocab]
//                                    + greedy token ids [batch, len]
//   loss(batch)                    → masked cross-entropy against
//                                    the batch's own token_ids
//
//   Architecture::Lstm ┐
//   Architecture::Gru  ┴→ RecurrentAutoencoder   (recurrent.rs)
//   Architecture::Transformer → TransformerAutoencoder (transformer.rs)
//
// The variant is picked once in `AutoencoderConfig::init` and
// stored as an `AutoencoderModel` enum; nothing branches on a
// string after that. Every variant shares the vocabulary, the
// embedding-matrix input and `latent_size`, so a latent vector
// means the same shape whichever encoder produced it.
//
// Padding: positions where attention_mask == 0 never contribute
// to the loss, and every attention layer masks them as keys.

use std::{fmt, str::FromStr};

use burn::{
    module::Param,
    nn::{Embedding, EmbeddingConfig},
    prelude::*,
    tensor::{activation, TensorData},
};
use serde::{Deserialize, Serialize};

use crate::data::{batcher::AutoencoderBatch, embeddings::EmbeddingMatrix};
use crate::domain::example::RESERVED_COUNT;
use crate::error::{AutoencoderError, Result};
use crate::infra::metrics::ReconstructionScore;
use crate::ml::{recurrent::RecurrentAutoencoder, transformer::TransformerAutoencoder};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Architecture {
    Lstm,
    Gru,
    Transformer,
}

impl Architecture {
    pub fn as_str(&self) -> &'static str {
        match self {
            Architecture::Lstm        => "lstm",
            Architecture::Gru         => "gru",
            Architecture::Transformer => "transformer",
        }
    }

    pub fn is_recurrent(&self) -> bool {
        matches!(self, Architecture::Lstm | Architecture::Gru)
    }
}

impl fmt::Display for Architecture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Architecture {
    type Err = AutoencoderError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "lstm"                       => Ok(Architecture::Lstm),
            "gru"                        => Ok(Architecture::Gru),
            "transformer" | "attention"  => Ok(Architecture::Transformer),
            other => Err(AutoencoderError::Configuration(format!(
                "unknown architecture '{other}' (expected lstm, gru or transformer)"
            ))),
        }
    }
}

// NOTE: #[derive(Config)] already generates Clone and Serialize/Deserialize
// internally — do NOT add them again or you get conflicting impls.
#[derive(Config, Debug)]
pub struct AutoencoderConfig {
    pub variant:       Architecture,
    pub vocab_size:    usize,
    pub embedding_dim: usize,
    pub hidden_size:   usize,
    pub num_layers:    usize,
    pub latent_size:   usize,
    pub max_seq_len:   usize,
    /// Recurrent only: add a reverse-direction encoder stack
    #[config(default = false)]
    pub bidirectional: bool,
    /// Transformer only
    #[config(default = 4)]
    pub num_heads: usize,
    /// Transformer feed-forward width; 0 means 4 × hidden_size
    #[config(default = 0)]
    pub d_ff: usize,
    #[config(default = 0.1)]
    pub dropout: f64,
    /// Feed the true previous token to the decoder during training
    #[config(default = true)]
    pub teacher_forcing: bool,
}

impl AutoencoderConfig {
    pub fn validate(&self) -> Result<()> {
        let positive = [
            ("vocab_size", self.vocab_size),
            ("embedding_dim", self.embedding_dim),
            ("hidden_size", self.hidden_size),
            ("num_layers", self.num_layers),
            ("latent_size", self.latent_size),
        ];
        for (name, value) in positive {
            if value == 0 {
                return Err(AutoencoderError::Configuration(format!("{name} must be greater than zero")));
            }
        }
        if self.vocab_size <= RESERVED_COUNT {
            return Err(AutoencoderError::Configuration(format!(
                "vocab_size ({}) leaves no room beyond the {RESERVED_COUNT} reserved ids",
                self.vocab_size
            )));
        }
        if self.max_seq_len < 2 {
            return Err(AutoencoderError::Configuration(format!(
                "max_seq_len must be at least 2, got {}",
                self.max_seq_len
            )));
        }
        if !(0.0..1.0).contains(&self.dropout) {
            return Err(AutoencoderError::Configuration(format!(
                "dropout must be in [0, 1), got {}",
                self.dropout
            )));
        }
        if self.variant == Architecture::Transformer {
            if self.num_heads == 0 || self.hidden_size % self.num_heads != 0 {
                return Err(AutoencoderError::Configuration(format!(
                    "hidden_size ({}) must be divisible by num_heads ({})",
                    self.hidden_size, self.num_heads
                )));
            }
            if self.bidirectional {
                tracing::warn!("bidirectional has no effect on the transformer encoder");
            }
        }
        Ok(())
    }

    pub fn ff_size(&self) -> usize {
        if self.d_ff == 0 { 4 * self.hidden_size } else { self.d_ff }
    }

    /// Build the model, seeding token embeddings from `embeddings` when given.
    pub fn init<B: Backend>(
        &self,
        device:     &B::Device,
        embeddings: Option<&EmbeddingMatrix>,
    ) -> Result<AutoencoderModel<B>> {
        self.validate()?;
        if let Some(m) = embeddings {
            if m.rows() != self.vocab_size || m.dim() != self.embedding_dim {
                return Err(AutoencoderError::Configuration(format!(
                    "embedding matrix is {}x{} but the model expects {}x{}",
                    m.rows(),
                    m.dim(),
                    self.vocab_size,
                    self.embedding_dim
                )));
            }
        }

        let model = match self.variant {
            Architecture::Lstm | Architecture::Gru => {
                AutoencoderModel::Recurrent(RecurrentAutoencoder::new(self, device, embeddings))
            }
            Architecture::Transformer => {
                AutoencoderModel::Transformer(TransformerAutoencoder::new(self, device, embeddings))
            }
        };
        tracing::info!(
            "Model ready: {} x{} layers, hidden={}, latent={}, vocab={}",
            self.variant,
            self.num_layers,
            self.hidden_size,
            self.latent_size,
            self.vocab_size
        );
        Ok(model)
    }
}

/// Output of free-running decoding.
#[derive(Debug, Clone)]
pub struct Reconstruction<B: Backend> {
    /// Shape: [batch, target_length, vocab_size]
    pub logits: Tensor<B, 3>,
    /// Greedy choice at each step. Shape: [batch, target_length]
    pub token_ids: Tensor<B, 2, Int>,
}

/// The encode → latent → decode contract shared by every variant.
pub trait Seq2Seq<B: Backend> {
    fn encode(&self, batch: &AutoencoderBatch<B>) -> Tensor<B, 2>;

    /// Greedy decoding from [BOS], feeding back each step's argmax.
    fn decode(&self, latent: Tensor<B, 2>, target_length: usize) -> Reconstruction<B>;

    /// Logits when every step sees the true previous token.
    fn decode_teacher_forced(&self, latent: Tensor<B, 2>, batch: &AutoencoderBatch<B>) -> Tensor<B, 3>;

    fn teacher_forcing(&self) -> bool;

    fn forward_train(&self, batch: &AutoencoderBatch<B>) -> Tensor<B, 3> {
        let latent = self.encode(batch);
        if self.teacher_forcing() {
            self.decode_teacher_forced(latent, batch)
        } else {
            self.decode(latent, batch.seq_len()).logits
        }
    }

    fn loss(&self, batch: &AutoencoderBatch<B>) -> Tensor<B, 1> {
        masked_cross_entropy(
            self.forward_train(batch),
            batch.token_ids.clone(),
            batch.attention_mask.clone(),
        )
    }

    fn reconstruct(&self, batch: &AutoencoderBatch<B>) -> Reconstruction<B> {
        self.decode(self.encode(batch), batch.seq_len())
    }
}

#[derive(Module, Debug)]
pub enum AutoencoderModel<B: Backend> {
    Recurrent(RecurrentAutoencoder<B>),
    Transformer(TransformerAutoencoder<B>),
}

impl<B: Backend> Seq2Seq<B> for AutoencoderModel<B> {
    fn encode(&self, batch: &AutoencoderBatch<B>) -> Tensor<B, 2> {
        match self {
            Self::Recurrent(m)   => m.encode(batch),
            Self::Transformer(m) => m.encode(batch),
        }
    }

    fn decode(&self, latent: Tensor<B, 2>, target_length: usize) -> Reconstruction<B> {
        match self {
            Self::Recurrent(m)   => m.decode(latent, target_length),
            Self::Transformer(m) => m.decode(latent, target_length),
        }
    }

    fn decode_teacher_forced(&self, latent: Tensor<B, 2>, batch: &AutoencoderBatch<B>) -> Tensor<B, 3> {
        match self {
            Self::Recurrent(m)   => m.decode_teacher_forced(latent, batch),
            Self::Transformer(m) => m.decode_teacher_forced(latent, batch),
        }
    }

    fn teacher_forcing(&self) -> bool {
        match self {
            Self::Recurrent(m)   => m.teacher_forcing(),
            Self::Transformer(m) => m.teacher_forcing(),
        }
    }
}

/// Mean negative log-likelihood of `targets` over positions where
/// `mask` is 1. An all-zero mask gives 0 rather than NaN.
///
/// logits: [batch, seq, vocab], targets / mask: [batch, seq]
pub fn masked_cross_entropy<B: Backend>(
    logits:  Tensor<B, 3>,
    targets: Tensor<B, 2, Int>,
    mask:    Tensor<B, 2, Int>,
) -> Tensor<B, 1> {
    let [batch_size, seq_len, _] = logits.dims();
    let log_probs = activation::log_softmax(logits, 2);
    let picked = log_probs
        .gather(2, targets.reshape([batch_size, seq_len, 1]))
        .reshape([batch_size, seq_len]);

    let mask  = mask.float();
    let count = mask.clone().sum().clamp_min(1.0);
    (picked * mask).sum().neg() / count
}

/// Pick `states[b, positions[b], :]` for every row. Shape: [batch, hidden]
pub fn gather_positions<B: Backend>(states: Tensor<B, 3>, positions: &[usize]) -> Tensor<B, 2> {
    let [batch_size, _, hidden] = states.dims();
    let idx: Vec<i32> = positions.iter().map(|&p| p as i32).collect();
    let idx = Tensor::<B, 1, Int>::from_ints(idx.as_slice(), &states.device())
        .reshape([batch_size, 1, 1])
        .expand([batch_size, 1, hidden]);
    states.gather(1, idx).reshape([batch_size, hidden])
}

/// Token embedding table, optionally overwritten with a pretrained matrix.
pub fn token_embedding<B: Backend>(
    vocab_size: usize,
    dim:        usize,
    matrix:     Option<&EmbeddingMatrix>,
    device:     &B::Device,
) -> Embedding<B> {
    let mut embedding = EmbeddingConfig::new(vocab_size, dim).init(device);
    if let Some(m) = matrix {
        let data = TensorData::new(m.values().to_vec(), [m.rows(), m.dim()]);
        embedding.weight = Param::from_tensor(Tensor::from_data(data, device));
    }
    embedding
}

/// Per-example agreement between predicted ids and the batch's real ids.
pub fn score_predictions<B: Backend>(
    predicted: Tensor<B, 2, Int>,
    batch:     &AutoencoderBatch<B>,
) -> ReconstructionScore {
    let seq_len = batch.seq_len();
    let pred_len = predicted.dims()[1];
    let predicted: Vec<i64> = predicted.into_data().iter::<i64>().collect();
    let targets: Vec<i64> = batch.token_ids.clone().into_data().iter::<i64>().collect();

    let mut score = ReconstructionScore::default();
    for (row, &len) in batch.lengths.iter().enumerate() {
        let target = &targets[row * seq_len..row * seq_len + len];
        let pred = &predicted[row * pred_len..(row + 1) * pred_len];
        score.add(ReconstructionScore::of(pred, target));
    }
    score
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::batcher::AutoencoderBatcher;
    use crate::data::embeddings::EmbeddingLoader;
    use crate::data::vocabulary::VocabularyBuilder;
    use crate::domain::example::Example;
    use burn::backend::NdArray;
    use burn::data::dataloader::batcher::Batcher;

    type TestBackend = NdArray;

    fn config(variant: Architecture) -> AutoencoderConfig {
        AutoencoderConfig::new(variant, 20, 8, 16, 2, 6, 5).with_dropout(0.0)
    }

    fn batch() -> AutoencoderBatch<TestBackend> {
        AutoencoderBatcher::<TestBackend>::new(Default::default()).batch(vec![
            Example::from_token_ids(&[5, 6, 7], 5),
            Example::from_token_ids(&[8], 5),
        ])
    }

    #[test]
    fn test_architecture_parses_case_insensitively() {
        assert_eq!("LSTM".parse::<Architecture>().unwrap(), Architecture::Lstm);
        assert_eq!("attention".parse::<Architecture>().unwrap(), Architecture::Transformer);
        assert!(matches!(
            "cnn".parse::<Architecture>(),
            Err(AutoencoderError::Configuration(_))
        ));
    }

    #[test]
    fn test_every_variant_yields_latent_size() {
        let device = Default::default();
        for variant in [Architecture::Lstm, Architecture::Gru, Architecture::Transformer] {
            let model = config(variant).init::<TestBackend>(&device, None).unwrap();
            let latent = model.encode(&batch());
            assert_eq!(latent.dims(), [2, 6], "{variant}");

            let rec = model.decode(latent, 5);
            assert_eq!(rec.logits.dims(), [2, 5, 20], "{variant}");
            assert_eq!(rec.token_ids.dims(), [2, 5], "{variant}");
        }
    }

    #[test]
    fn test_bidirectional_recurrent_keeps_latent_size() {
        let device = Default::default();
        let model = config(Architecture::Gru)
            .with_bidirectional(true)
            .init::<TestBackend>(&device, None)
            .unwrap();
        assert_eq!(model.encode(&batch()).dims(), [2, 6]);
    }

    #[test]
    fn test_loss_is_finite_and_positive() {
        let device = Default::default();
        for variant in [Architecture::Lstm, Architecture::Transformer] {
            let model = config(variant).init::<TestBackend>(&device, None).unwrap();
            let loss: f64 = model.loss(&batch()).into_scalar().elem::<f64>();
            assert!(loss.is_finite() && loss > 0.0, "{variant}: {loss}");

            let free = config(variant)
                .with_teacher_forcing(false)
                .init::<TestBackend>(&device, None)
                .unwrap();
            let loss: f64 = free.loss(&batch()).into_scalar().elem::<f64>();
            assert!(loss.is_finite(), "{variant} free-running: {loss}");
        }
    }

    #[test]
    fn test_masked_cross_entropy_ignores_padding() {
        let device = Default::default();
        let targets = Tensor::<TestBackend, 2, Int>::from_ints([[1, 0]], &device);
        let mask = Tensor::<TestBackend, 2, Int>::from_ints([[1, 0]], &device);

        let a = Tensor::<TestBackend, 3>::from_floats([[[0.0, 2.0], [5.0, -5.0]]], &device);
        let b = Tensor::<TestBackend, 3>::from_floats([[[0.0, 2.0], [-9.0, 9.0]]], &device);
        let la: f64 = masked_cross_entropy(a, targets.clone(), mask.clone()).into_scalar().elem();
        let lb: f64 = masked_cross_entropy(b, targets, mask).into_scalar().elem();

        assert!((la - lb).abs() < 1e-6);
        // -ln(softmax([0, 2])[1])
        let expected = (1.0f64 + (-2.0f64).exp()).ln();
        assert!((la - expected).abs() < 1e-5);
    }

    #[test]
    fn test_gather_positions_picks_rows() {
        let device = Default::default();
        let states = Tensor::<TestBackend, 3>::from_floats(
            [[[1.0], [2.0], [3.0]], [[4.0], [5.0], [6.0]]],
            &device,
        );
        let picked: Vec<f32> = gather_positions(states, &[2, 0]).into_data().iter::<f32>().collect();
        assert_eq!(picked, vec![3.0, 4.0]);
    }

    #[test]
    fn test_pretrained_embeddings_are_copied() {
        let device = Default::default();
        let vocab = VocabularyBuilder::new(100).build(["a b c d e f"]).unwrap();
        let matrix = EmbeddingLoader::new(8, 1).random(&vocab).unwrap();
        let emb = token_embedding::<TestBackend>(vocab.len(), 8, Some(&matrix), &device);
        let weights: Vec<f32> = emb.weight.val().into_data().iter::<f32>().collect();
        assert_eq!(weights, matrix.values());
    }

    #[test]
    fn test_embedding_shape_mismatch_is_configuration_error() {
        let device = Default::default();
        let vocab = VocabularyBuilder::new(100).build(["a b c"]).unwrap();
        let matrix = EmbeddingLoader::new(4, 1).random(&vocab).unwrap();
        let err = config(Architecture::Lstm)
            .init::<TestBackend>(&device, Some(&matrix))
            .unwrap_err();
        assert!(matches!(err, AutoencoderError::Configuration(_)));
    }

    #[test]
    fn test_transformer_heads_must_divide_hidden() {
        let err = config(Architecture::Transformer).with_num_heads(3).validate().unwrap_err();
        assert!(matches!(err, AutoencoderError::Configuration(_)));
    }

    #[test]
    fn test_score_predictions_uses_real_positions_only() {
        let b = batch();
        // Row 0 exact ([5,6,7,EOS]), row 1 wrong on its first token
        let predicted = Tensor::<TestBackend, 2, Int>::from_ints(
            [[5, 6, 7, 3, 9], [9, 3, 0, 0, 0]],
            &Default::default(),
        );
        let score = score_predictions(predicted, &b);
        assert_eq!(score.total_tokens, 6);
        assert_eq!(score.correct_tokens, 5);
        assert_eq!(score.exact_matches, 1);
    }
}
