// ============================================================
// Layer 6 — Infrastructure Layer
// ============================================================
// Everything that persists state between runs:
//
//   checkpoint.rs      — Model checkpoints
//                        CompactRecorder weights plus
//                        model_config.json, checkpoint.json and
//                        the tokenizer files, written to best/
//                        and optionally epoch-<n>/
//
//   tokenizer_store.rs — Tokenizer persistence
//                        Builds a WordLevel tokenizer from the
//                        vocabulary and saves it next to its
//                        config so inference tokenises exactly
//                        as training did
//
//   cache.rs           — Per-split Example cache
//                        <cache_dir>/<split>/<fingerprint>.json,
//                        removed only by an explicit clear
//
//   metrics.rs         — Training metrics logging
//                        One CSV row per epoch plus the token
//                        and exact-match reconstruction counts
//
// Reference: Rust Book §7 (Modules)
//            Burn Book §5 (Checkpointing)

/// Model checkpoint saving and loading
pub mod checkpoint;

/// Tokenizer building, saving, and loading
pub mod tokenizer_store;

/// Tokenised example cache per split
pub mod cache;

/// Training metrics CSV logger
pub mod metrics;
