// ============================================================
// Layer 4 — Data Pipeline
// ============================================================
// Everything between raw text and model-ready tensor batches.
//
//   gazette .txt files
//       │
//       ▼
//   GazetteLoader      → Preprocessor + SentenceSegmenter
//       │                 → sentence corpus file
//       ▼
//   CorpusLoader       → <dataset_dir>/{train,test,evaluation}.txt
//       │
//       ▼
//   VocabularyBuilder  → token ↔ id, reserved ids first
//       │
//       ▼
//   TextTokenizer      → Example (infra::tokenizer_store, cached
//       │                 per split by infra::cache)
//       ▼
//   ExampleDataset     → Burn's Dataset trait
//       │
//       ▼
//   train_loader /     → Burn DataLoaders: shuffled per epoch
//   eval_loader          for training, fixed order otherwise
//       │
//       ▼
//   AutoencoderBatcher → [batch, seq] tensors for the model
//
// EmbeddingLoader runs beside this chain and feeds the model's
// initial token embeddings.

/// Frequency-ranked vocabulary and the shared pre-tokenizer
pub mod vocabulary;

/// GloVe-style pretrained vector files
pub mod embeddings;

/// Plain-text splits and gazette document trees
pub mod loader;

/// Cleans raw gazette text
pub mod preprocessor;

/// Splits cleaned gazette text into sentences
pub mod segmenter;

/// Implements Burn's Dataset trait for examples
pub mod dataset;

/// Implements Burn's Batcher trait to create tensor batches
pub mod batcher;

/// Burn DataLoaders for the training and held-out splits
pub mod pipeline;

/// Shuffles and splits data into train/validation sets
pub mod splitter;
