// ============================================================
// Layer 3 — Domain Layer
// ============================================================
// Plain Rust structs and traits describing the core concepts:
// raw documents, encoded examples and the reserved token ids
// every other layer agrees on.
//
// Rules for this layer:
//   - NO Burn framework types
//   - NO file I/O
//   - Only plain structs, enums, constants and traits

/// A raw text unit loaded from a corpus
pub mod document;

/// A fixed-length, padded id sequence plus reserved token ids
pub mod example;

/// Core abstractions implemented by the data layer
pub mod traits;
