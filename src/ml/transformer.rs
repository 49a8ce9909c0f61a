// ============================================================
// Layer 5 — Transformer Autoencoder
// ============================================================
// Encoder (post-norm, as in Vaswani et al.):
//   tokens → embedding (E) → Linear(E → H) + learned position
//   → N × [self-attention (pad-masked) → Add&Norm → GELU FFN → Add&Norm]
//   → state at the [EOS] position → Linear → tanh → latent
//
// Decoder:
//   shifted tokens → same embedding path
//   → N × [causal self-attention (pad-masked) → Add&Norm
//          cross-attention over a 1-token memory from the latent → Add&Norm
//          GELU FFN → Add&Norm]
//   → Linear(H → vocab)
//
// The memory is a single token, so the latent vector is the
// only path from encoder to decoder: the bottleneck is the same
// fixed-size vector the recurrent variants produce.
//
// Free-running decoding re-runs the decoder over the growing
// prefix each step; sequences are short and this keeps the
// block code identical for both decoding modes.

use burn::{
    nn::{
        attention::{generate_autoregressive_mask, MhaInput, MultiHeadAttention, MultiHeadAttentionConfig},
        Dropout, DropoutConfig, Embedding, EmbeddingConfig, LayerNorm, LayerNormConfig, Linear,
        LinearConfig,
    },
    prelude::*,
    tensor::activation,
};

use crate::data::{batcher::AutoencoderBatch, embeddings::EmbeddingMatrix};
use crate::domain::example::BOS_ID;
use crate::ml::model::{gather_positions, token_embedding, AutoencoderConfig, Reconstruction, Seq2Seq};

#[derive(Module, Debug)]
pub struct FeedForward<B: Backend> {
    pub linear1: Linear<B>,
    pub linear2: Linear<B>,
}

impl<B: Backend> FeedForward<B> {
    fn new(cfg: &AutoencoderConfig, device: &B::Device) -> Self {
        Self {
            linear1: LinearConfig::new(cfg.hidden_size, cfg.ff_size()).init(device),
            linear2: LinearConfig::new(cfg.ff_size(), cfg.hidden_size).init(device),
        }
    }

    fn forward(&self, x: Tensor<B, 3>) -> Tensor<B, 3> {
        self.linear2.forward(activation::gelu(self.linear1.forward(x)))
    }
}

fn attention<B: Backend>(cfg: &AutoencoderConfig, device: &B::Device) -> MultiHeadAttention<B> {
    MultiHeadAttentionConfig::new(cfg.hidden_size, cfg.num_heads)
        .with_dropout(cfg.dropout)
        .init(device)
}

#[derive(Module, Debug)]
pub struct EncoderBlock<B: Backend> {
    pub self_attn: MultiHeadAttention<B>,
    pub ffn:       FeedForward<B>,
    pub norm1:     LayerNorm<B>,
    pub norm2:     LayerNorm<B>,
    pub dropout:   Dropout,
}

impl<B: Backend> EncoderBlock<B> {
    fn new(cfg: &AutoencoderConfig, device: &B::Device) -> Self {
        Self {
            self_attn: attention(cfg, device),
            ffn:       FeedForward::new(cfg, device),
            norm1:     LayerNormConfig::new(cfg.hidden_size).init(device),
            norm2:     LayerNormConfig::new(cfg.hidden_size).init(device),
            dropout:   DropoutConfig::new(cfg.dropout).init(),
        }
    }

    /// pad: [batch, seq], true = padded key
    pub fn forward(&self, x: Tensor<B, 3>, pad: Tensor<B, 2, Bool>) -> Tensor<B, 3> {
        let attn_output = self
            .self_attn
            .forward(MhaInput::self_attn(x.clone()).mask_pad(pad))
            .context;
        let x = self.norm1.forward(x + self.dropout.forward(attn_output));
        let ffn_out = self.ffn.forward(x.clone());
        self.norm2.forward(x + self.dropout.forward(ffn_out))
    }
}

#[derive(Module, Debug)]
pub struct DecoderBlock<B: Backend> {
    pub self_attn:  MultiHeadAttention<B>,
    pub cross_attn: MultiHeadAttention<B>,
    pub ffn:        FeedForward<B>,
    pub norm1:      LayerNorm<B>,
    pub norm2:      LayerNorm<B>,
    pub norm3:      LayerNorm<B>,
    pub dropout:    Dropout,
}

impl<B: Backend> DecoderBlock<B> {
    fn new(cfg: &AutoencoderConfig, device: &B::Device) -> Self {
        Self {
            self_attn:  attention(cfg, device),
            cross_attn: attention(cfg, device),
            ffn:        FeedForward::new(cfg, device),
            norm1:      LayerNormConfig::new(cfg.hidden_size).init(device),
            norm2:      LayerNormConfig::new(cfg.hidden_size).init(device),
            norm3:      LayerNormConfig::new(cfg.hidden_size).init(device),
            dropout:    DropoutConfig::new(cfg.dropout).init(),
        }
    }

    /// x: [batch, seq, H], memory: [batch, 1, H], causal: [batch, seq, seq]
    pub fn forward(
        &self,
        x:      Tensor<B, 3>,
        memory: Tensor<B, 3>,
        causal: Tensor<B, 3, Bool>,
        pad:    Option<Tensor<B, 2, Bool>>,
    ) -> Tensor<B, 3> {
        let mut input = MhaInput::self_attn(x.clone()).mask_attn(causal);
        if let Some(pad) = pad {
            input = input.mask_pad(pad);
        }
        let attn_output = self.self_attn.forward(input).context;
        let x = self.norm1.forward(x + self.dropout.forward(attn_output));

        let cross = self
            .cross_attn
            .forward(MhaInput::new(x.clone(), memory.clone(), memory))
            .context;
        let x = self.norm2.forward(x + self.dropout.forward(cross));

        let ffn_out = self.ffn.forward(x.clone());
        self.norm3.forward(x + self.dropout.forward(ffn_out))
    }
}

#[derive(Module, Debug)]
pub struct TransformerAutoencoder<B: Backend> {
    pub embedding:       Embedding<B>,
    pub input_proj:      Linear<B>,
    pub position:        Embedding<B>,
    pub encoder:         Vec<EncoderBlock<B>>,
    pub to_latent:       Linear<B>,
    pub from_latent:     Linear<B>,
    pub decoder:         Vec<DecoderBlock<B>>,
    pub output:          Linear<B>,
    pub dropout:         Dropout,
    pub max_seq_len:     usize,
    pub teacher_forcing: bool,
}

impl<B: Backend> TransformerAutoencoder<B> {
    pub fn new(cfg: &AutoencoderConfig, device: &B::Device, embeddings: Option<&EmbeddingMatrix>) -> Self {
        Self {
            embedding:       token_embedding(cfg.vocab_size, cfg.embedding_dim, embeddings, device),
            input_proj:      LinearConfig::new(cfg.embedding_dim, cfg.hidden_size).init(device),
            position:        EmbeddingConfig::new(cfg.max_seq_len, cfg.hidden_size).init(device),
            encoder:         (0..cfg.num_layers).map(|_| EncoderBlock::new(cfg, device)).collect(),
            to_latent:       LinearConfig::new(cfg.hidden_size, cfg.latent_size).init(device),
            from_latent:     LinearConfig::new(cfg.latent_size, cfg.hidden_size).init(device),
            decoder:         (0..cfg.num_layers).map(|_| DecoderBlock::new(cfg, device)).collect(),
            output:          LinearConfig::new(cfg.hidden_size, cfg.vocab_size).init(device),
            dropout:         DropoutConfig::new(cfg.dropout).init(),
            max_seq_len:     cfg.max_seq_len,
            teacher_forcing: cfg.teacher_forcing,
        }
    }

    /// ids: [batch, seq] → [batch, seq, H]
    fn embed(&self, ids: Tensor<B, 2, Int>) -> Tensor<B, 3> {
        let [batch_size, seq_len] = ids.dims();
        let tokens = self.input_proj.forward(self.embedding.forward(ids));

        // Self-attention is permutation-invariant, so position must be injected explicitly.
        let positions = Tensor::<B, 1, Int>::arange(0..seq_len as i64, &tokens.device())
            .unsqueeze::<2>()
            .expand([batch_size, seq_len]);
        self.dropout.forward(tokens + self.position.forward(positions))
    }

    fn memory(&self, latent: Tensor<B, 2>) -> Tensor<B, 3> {
        self.from_latent.forward(latent).unsqueeze_dim(1)
    }

    fn run_decoder(
        &self,
        ids:    Tensor<B, 2, Int>,
        memory: Tensor<B, 3>,
        pad:    Option<Tensor<B, 2, Bool>>,
    ) -> Tensor<B, 3> {
        let [batch_size, seq_len] = ids.dims();
        let mut x = self.embed(ids);
        let causal = generate_autoregressive_mask::<B>(batch_size, seq_len, &x.device());
        for block in &self.decoder {
            x = block.forward(x, memory.clone(), causal.clone(), pad.clone());
        }
        self.output.forward(x)
    }
}

impl<B: Backend> Seq2Seq<B> for TransformerAutoencoder<B> {
    fn encode(&self, batch: &AutoencoderBatch<B>) -> Tensor<B, 2> {
        let pad = batch.padding_mask();
        let mut x = self.embed(batch.token_ids.clone());
        for block in &self.encoder {
            x = block.forward(x, pad.clone());
        }
        let pooled = gather_positions(x, &batch.terminal_positions());
        activation::tanh(self.to_latent.forward(pooled))
    }

    fn decode(&self, latent: Tensor<B, 2>, target_length: usize) -> Reconstruction<B> {
        let [batch_size, _] = latent.dims();
        let device = latent.device();
        let memory = self.memory(latent);
        let steps = target_length.clamp(1, self.max_seq_len);

        let mut prefix = vec![Tensor::<B, 2, Int>::full([batch_size, 1], BOS_ID as i64, &device)];
        let mut logits = Vec::with_capacity(steps);

        for t in 0..steps {
            let all = self.run_decoder(Tensor::cat(prefix.clone(), 1), memory.clone(), None);
            let [_, _, vocab] = all.dims();
            let step_logits = all.slice([0..batch_size, t..t + 1, 0..vocab]);
            let next = step_logits.clone().argmax(2).reshape([batch_size, 1]);
            logits.push(step_logits);
            prefix.push(next);
        }

        Reconstruction {
            logits:    Tensor::cat(logits, 1),
            token_ids: Tensor::cat(prefix.split_off(1), 1),
        }
    }

    fn decode_teacher_forced(&self, latent: Tensor<B, 2>, batch: &AutoencoderBatch<B>) -> Tensor<B, 3> {
        self.run_decoder(
            batch.decoder_input.clone(),
            self.memory(latent),
            Some(batch.decoder_padding_mask()),
        )
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
    use crate::ml::model::Architecture;
    use burn::backend::NdArray;
    use burn::data::dataloader::batcher::Batcher;

    type TestBackend = NdArray;

    fn model() -> TransformerAutoencoder<TestBackend> {
        let cfg = AutoencoderConfig::new(Architecture::Transformer, 16, 4, 8, 1, 3, 6)
            .with_num_heads(2)
            .with_dropout(0.0);
        TransformerAutoencoder::new(&cfg, &Default::default(), None)
    }

    #[test]
    fn test_latent_ignores_padding_tokens() {
        let model = model();
        let batcher = AutoencoderBatcher::<TestBackend>::new(Default::default());
        let clean = batcher.batch(vec![Example::from_token_ids(&[5, 6], 6)]);
        let mut noisy = Example::from_token_ids(&[5, 6], 6);
        // Garbage behind the real length must be masked out
        noisy.token_ids[4] = 9;
        noisy.token_ids[5] = 11;
        let noisy = batcher.batch(vec![noisy]);

        let a: Vec<f32> = model.encode(&clean).into_data().iter::<f32>().collect();
        let b: Vec<f32> = model.encode(&noisy).into_data().iter::<f32>().collect();
        for (x, y) in a.iter().zip(&b) {
            assert!((x - y).abs() < 1e-4);
        }
    }

    #[test]
    fn test_decode_clamps_to_max_seq_len() {
        let model = model();
        let latent = Tensor::<TestBackend, 2>::zeros([2, 3], &Default::default());
        let rec = model.decode(latent, 50);
        assert_eq!(rec.token_ids.dims(), [2, 6]);
    }

    #[test]
    fn test_free_running_matches_teacher_forcing_on_own_output() {
        // Feeding the greedy output back as the teacher-forced input must
        // reproduce the same logits: the causal mask hides the future.
        let model = model();
        let batcher = AutoencoderBatcher::<TestBackend>::new(Default::default());
        let batch = batcher.batch(vec![Example::from_token_ids(&[5, 6, 7, 8, 9], 6)]);
        let latent = model.encode(&batch);

        let free = model.decode(latent.clone(), 6);
        let ids: Vec<u32> = free.token_ids.clone().into_data().iter::<i64>().map(|v| v as u32).collect();
        let mut forced_input = vec![BOS_ID];
        forced_input.extend_from_slice(&ids[..5]);
        let forced_ids = Tensor::<TestBackend, 1, Int>::from_ints(
            forced_input.iter().map(|&v| v as i32).collect::<Vec<_>>().as_slice(),
            &Default::default(),
        )
        .reshape([1, 6]);
        let forced = model.run_decoder(forced_ids, model.memory(latent), None);

        let a: Vec<f32> = free.logits.into_data().iter::<f32>().collect();
        let b: Vec<f32> = forced.into_data().iter::<f32>().collect();
        for (x, y) in a.iter().zip(&b) {
            assert!((x - y).abs() < 1e-4);
        }
    }
}
