// ============================================================
// Layer 2 — Application / Use Cases
// ============================================================
// This layer orchestrates the other layers to accomplish one
// goal per command: build a vocabulary, train, predict, clear
// the cache or preprocess gazettes.
//
// Rules for this layer:
//   - No ML math or model code here
//   - No printing here (that's Layer 1)
//   - Only workflow coordination
//   - Errors leave this layer as anyhow::Error with context;
//     the typed AutoencoderError stays reachable via downcast
//
// Reference: Clean Architecture pattern
//            Rust Book §7 (Module System)

// The training workflow
pub mod train_use_case;

// Checkpoint loading and reconstruction reports
pub mod predict_use_case;

// Vocabulary building, cache clearing, gazette preprocessing
pub mod corpus_use_case;
