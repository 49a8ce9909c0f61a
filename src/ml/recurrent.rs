// ============================================================
// Layer 5 — Recurrent Autoencoder (LSTM / GRU)
// ============================================================
// Encoder:
//   tokens → embedding → N stacked LSTM/GRU layers
//   final hidden state = top-layer output at position length-1
//   (the [EOS]), so padding after it never reaches the latent.
//
//   Bidirectional: a second stack reads each example's real
//   tokens in reverse ([a b c EOS PAD] → [EOS c b a PAD]); its
//   output at length-1 has seen the whole sequence backwards.
//
//   latent = tanh(W · [h_fwd ; h_bwd])          [batch, latent]
//
// Decoder:
//   every layer starts from h0 = tanh(W' · latent), cell = 0
//   input at step t = embedding of token t-1 ([BOS] at t = 0),
//   the true token when teacher-forced, the previous argmax
//   when free-running
//   logits = Linear(hidden → vocab)

use burn::{
    nn::{
        gru::{Gru, GruConfig},
        lstm::{Lstm, LstmConfig, LstmState},
        Dropout, DropoutConfig, Embedding, Linear, LinearConfig,
    },
    prelude::*,
    tensor::activation,
};

use crate::data::{batcher::AutoencoderBatch, embeddings::EmbeddingMatrix};
use crate::domain::example::BOS_ID;
use crate::ml::model::{
    gather_positions, token_embedding, Architecture, AutoencoderConfig, Reconstruction, Seq2Seq,
};

#[derive(Module, Debug)]
pub enum RecurrentLayer<B: Backend> {
    Lstm(Lstm<B>),
    Gru(Gru<B>),
}

/// Per-layer carry between decoding steps.
pub enum LayerState<B: Backend> {
    Lstm(LstmState<B, 2>),
    Gru(Tensor<B, 2>),
}

impl<B: Backend> LayerState<B> {
    fn into_lstm(self) -> LstmState<B, 2> {
        match self {
            LayerState::Lstm(state) => state,
            LayerState::Gru(hidden) => LstmState::new(hidden.zeros_like(), hidden),
        }
    }

    fn into_hidden(self) -> Tensor<B, 2> {
        match self {
            LayerState::Lstm(state) => state.hidden,
            LayerState::Gru(hidden) => hidden,
        }
    }
}

impl<B: Backend> RecurrentLayer<B> {
    fn new(cell: Architecture, d_input: usize, d_hidden: usize, device: &B::Device) -> Self {
        match cell {
            Architecture::Gru => Self::Gru(GruConfig::new(d_input, d_hidden, true).init(device)),
            _ => Self::Lstm(LstmConfig::new(d_input, d_hidden, true).init(device)),
        }
    }

    /// x: [batch, seq, d_input] → ([batch, seq, d_hidden], state after the last step)
    fn forward(&self, x: Tensor<B, 3>, state: Option<LayerState<B>>) -> (Tensor<B, 3>, LayerState<B>) {
        match self {
            Self::Lstm(lstm) => {
                let (out, state) = lstm.forward(x, state.map(LayerState::into_lstm));
                (out, LayerState::Lstm(state))
            }
            Self::Gru(gru) => {
                let out = gru.forward(x, state.map(LayerState::into_hidden));
                let [batch_size, seq_len, hidden] = out.dims();
                let last = out
                    .clone()
                    .slice([0..batch_size, seq_len - 1..seq_len, 0..hidden])
                    .reshape([batch_size, hidden]);
                (out, LayerState::Gru(last))
            }
        }
    }

    fn initial_state(&self, hidden: Tensor<B, 2>) -> LayerState<B> {
        match self {
            Self::Lstm(_) => LayerState::Lstm(LstmState::new(hidden.zeros_like(), hidden)),
            Self::Gru(_)  => LayerState::Gru(hidden),
        }
    }
}

/// Run `x` through a layer stack. Dropout sits between layers, not after the top one.
fn run_stack<B: Backend>(
    layers:  &[RecurrentLayer<B>],
    x:       Tensor<B, 3>,
    states:  Option<Vec<LayerState<B>>>,
    dropout: &Dropout,
) -> (Tensor<B, 3>, Vec<LayerState<B>>) {
    let states: Vec<Option<LayerState<B>>> = match states {
        Some(states) => states.into_iter().map(Some).collect(),
        None => layers.iter().map(|_| None).collect(),
    };

    let mut x = x;
    let mut finals = Vec::with_capacity(layers.len());
    for (i, (layer, state)) in layers.iter().zip(states).enumerate() {
        let (out, last) = layer.forward(x, state);
        x = if i + 1 < layers.len() { dropout.forward(out) } else { out };
        finals.push(last);
    }
    (x, finals)
}

/// Reverse each row's first `lengths[b]` ids in place, leaving padding where it is.
pub fn reverse_real_tokens<B: Backend>(ids: Tensor<B, 2, Int>, lengths: &[usize]) -> Tensor<B, 2, Int> {
    let [batch_size, seq_len] = ids.dims();
    let idx: Vec<i32> = lengths
        .iter()
        .flat_map(|&len| (0..seq_len).map(move |t| if t < len { (len - 1 - t) as i32 } else { t as i32 }))
        .collect();
    let idx = Tensor::<B, 1, Int>::from_ints(idx.as_slice(), &ids.device()).reshape([batch_size, seq_len]);
    ids.gather(1, idx)
}

#[derive(Module, Debug)]
pub struct RecurrentAutoencoder<B: Backend> {
    pub embedding:        Embedding<B>,
    pub encoder:          Vec<RecurrentLayer<B>>,
    /// Empty unless bidirectional
    pub encoder_backward: Vec<RecurrentLayer<B>>,
    pub to_latent:        Linear<B>,
    pub from_latent:      Linear<B>,
    pub decoder:          Vec<RecurrentLayer<B>>,
    pub output:           Linear<B>,
    pub dropout:          Dropout,
    pub teacher_forcing:  bool,
}

impl<B: Backend> RecurrentAutoencoder<B> {
    pub fn new(cfg: &AutoencoderConfig, device: &B::Device, embeddings: Option<&EmbeddingMatrix>) -> Self {
        let stack = |count: usize| -> Vec<RecurrentLayer<B>> {
            (0..count)
                .map(|i| {
                    let d_input = if i == 0 { cfg.embedding_dim } else { cfg.hidden_size };
                    RecurrentLayer::new(cfg.variant, d_input, cfg.hidden_size, device)
                })
                .collect()
        };
        let directions = if cfg.bidirectional { 2 } else { 1 };

        Self {
            embedding:        token_embedding(cfg.vocab_size, cfg.embedding_dim, embeddings, device),
            encoder:          stack(cfg.num_layers),
            encoder_backward: if cfg.bidirectional { stack(cfg.num_layers) } else { Vec::new() },
            to_latent:        LinearConfig::new(directions * cfg.hidden_size, cfg.latent_size).init(device),
            from_latent:      LinearConfig::new(cfg.latent_size, cfg.hidden_size).init(device),
            decoder:          stack(cfg.num_layers),
            output:           LinearConfig::new(cfg.hidden_size, cfg.vocab_size).init(device),
            dropout:          DropoutConfig::new(cfg.dropout).init(),
            teacher_forcing:  cfg.teacher_forcing,
        }
    }

    fn embed(&self, ids: Tensor<B, 2, Int>) -> Tensor<B, 3> {
        self.dropout.forward(self.embedding.forward(ids))
    }

    fn decoder_states(&self, latent: Tensor<B, 2>) -> Vec<LayerState<B>> {
        let h0 = activation::tanh(self.from_latent.forward(latent));
        self.decoder.iter().map(|layer| layer.initial_state(h0.clone())).collect()
    }
}

impl<B: Backend> Seq2Seq<B> for RecurrentAutoencoder<B> {
    fn encode(&self, batch: &AutoencoderBatch<B>) -> Tensor<B, 2> {
        let positions = batch.terminal_positions();

        let (forward, _) = run_stack(&self.encoder, self.embed(batch.token_ids.clone()), None, &self.dropout);
        let mut finals = vec![gather_positions(forward, &positions)];

        if !self.encoder_backward.is_empty() {
            let reversed = reverse_real_tokens(batch.token_ids.clone(), &batch.lengths);
            let (backward, _) = run_stack(&self.encoder_backward, self.embed(reversed), None, &self.dropout);
            finals.push(gather_positions(backward, &positions));
        }

        activation::tanh(self.to_latent.forward(Tensor::cat(finals, 1)))
    }

    fn decode(&self, latent: Tensor<B, 2>, target_length: usize) -> Reconstruction<B> {
        let [batch_size, _] = latent.dims();
        let device = latent.device();
        let mut states = self.decoder_states(latent);
        let mut input = Tensor::<B, 2, Int>::full([batch_size, 1], BOS_ID as i64, &device);

        let steps = target_length.max(1);
        let mut logits = Vec::with_capacity(steps);
        let mut tokens = Vec::with_capacity(steps);

        for _ in 0..steps {
            let (out, next_states) = run_stack(&self.decoder, self.embed(input), Some(states), &self.dropout);
            let step_logits = self.output.forward(out); // [batch, 1, vocab]
            let next = step_logits.clone().argmax(2).reshape([batch_size, 1]);

            logits.push(step_logits);
            tokens.push(next.clone());
            input = next;
            states = next_states;
        }

        Reconstruction {
            logits:    Tensor::cat(logits, 1),
            token_ids: Tensor::cat(tokens, 1),
        }
    }

    fn decode_teacher_forced(&self, latent: Tensor<B, 2>, batch: &AutoencoderBatch<B>) -> Tensor<B, 3> {
        let states = self.decoder_states(latent);
        let (out, _) = run_stack(&self.decoder, self.embed(batch.decoder_input.clone()), Some(states), &self.dropout);
        self.output.forward(out)
    }

    fn teacher_forcing(&self) -> bool {
        self.teacher_forcing
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::batcher::AutoencoderBatcher;
    use crate::domain::example::Example;
    use burn::backend::NdArray;
    use burn::data::dataloader::batcher::Batcher;

    type TestBackend = NdArray;

    #[test]
    fn test_reverse_real_tokens_keeps_padding() {
        let device = Default::default();
        let ids = Tensor::<TestBackend, 2, Int>::from_ints([[5, 6, 7, 3, 0], [8, 3, 0, 0, 0]], &device);
        let rev: Vec<i64> = reverse_real_tokens(ids, &[4, 2]).into_data().iter::<i64>().collect();
        assert_eq!(rev, vec![3, 7, 6, 5, 0, 3, 8, 0, 0, 0]);
    }

    #[test]
    fn test_latent_ignores_trailing_padding() {
        let device = Default::default();
        let cfg = AutoencoderConfig::new(Architecture::Lstm, 12, 4, 8, 1, 3, 6).with_dropout(0.0);
        let model = RecurrentAutoencoder::<TestBackend>::new(&cfg, &device, None);

        // Same real tokens, different padded lengths
        let short = AutoencoderBatcher::<TestBackend>::new(device).batch(vec![Example::from_token_ids(&[5, 6], 4)]);
        let long = AutoencoderBatcher::<TestBackend>::new(device).batch(vec![Example::from_token_ids(&[5, 6], 6)]);

        let a: Vec<f32> = model.encode(&short).into_data().iter::<f32>().collect();
        let b: Vec<f32> = model.encode(&long).into_data().iter::<f32>().collect();
        for (x, y) in a.iter().zip(&b) {
            assert!((x - y).abs() < 1e-5);
        }
    }

    #[test]
    fn test_gru_state_carries_between_steps() {
        let device = Default::default();
        let layer = RecurrentLayer::<TestBackend>::new(Architecture::Gru, 3, 4, &device);
        let x = Tensor::<TestBackend, 3>::ones([2, 3, 3], &device);

        let (full, _) = layer.forward(x.clone(), None);
        let (first, state) = layer.forward(x.clone().slice([0..2, 0..2, 0..3]), None);
        let (rest, _) = layer.forward(x.slice([0..2, 2..3, 0..3]), Some(state));

        let stepped: Vec<f32> = Tensor::cat(vec![first, rest], 1).into_data().iter::<f32>().collect();
        let full: Vec<f32> = full.into_data().iter::<f32>().collect();
        for (x, y) in stepped.iter().zip(&full) {
            assert!((x - y).abs() < 1e-5);
        }
    }
}
