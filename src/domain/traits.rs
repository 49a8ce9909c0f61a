// ============================================================
// Layer 3 — Core Traits
// ============================================================
// `CorpusLoader` (plain-text splits) and `GazetteLoader`
// (gazette sentence files) both implement DocumentSource, so
// the use cases never care which corpus they are reading.

use crate::domain::document::Document;
use crate::error::Result;

/// Any component that can load documents from a source.
pub trait DocumentSource {
    /// Load every document, in a deterministic order.
    fn load_all(&self) -> Result<Vec<Document>>;
}
