// ============================================================
// Layer 5 — ML / Model Layer (Burn)
// ============================================================
// All Burn model, training and inference code lives here.
// The data layer only touches Burn through the Dataset and
// Batcher traits.
//
// What's in this layer:
//
//   model.rs       — AutoencoderConfig, the Seq2Seq contract
//                    and the AutoencoderModel enum that picks
//                    a variant once at init
//                    • masked cross-entropy over real tokens
//                    • terminal-position pooling helper
//
//   recurrent.rs   — LSTM / GRU encoder-decoder
//                    • optional reverse-direction encoder
//                    • latent = tanh(Linear(final hidden))
//                    • decoder state seeded from the latent
//
//   transformer.rs — Attention encoder-decoder
//                    • pad-masked self-attention encoder
//                    • causal decoder with cross-attention
//                      to a 1-token latent memory
//
//   trainer.rs     — Epoch loop, Adam, early stopping,
//                    best/epoch checkpoints, metrics rows
//
//   inferencer.rs  — Loads a checkpoint after checking it
//                    against the load environment, then
//                    reconstructs and scores text
//
// Reference: Burn Book §3 (Building Blocks)
//            Burn Book §5 (Training)
//            Sutskever et al. (2014) Sequence to Sequence Learning
//            Vaswani et al. (2017) Attention Is All You Need

/// Config, shared contract and variant enum
pub mod model;

/// LSTM / GRU autoencoder
pub mod recurrent;

/// Transformer autoencoder
pub mod transformer;

/// Training loop with validation, early stopping and checkpointing
pub mod trainer;

/// Checkpoint loading and reconstruction
pub mod inferencer;
