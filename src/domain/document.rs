// ============================================================
// Layer 3 — Document Domain Type
// ============================================================
// One raw text unit (a corpus line or a gazette sentence)
// before any tokenisation, tagged with where it came from.

use serde::{Deserialize, Serialize};

use crate::error::AutoencoderError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    /// File path (and line) the text was read from
    pub source: String,

    /// The text content, already cleaned by the preprocessor if needed
    pub text: String,
}

impl Document {
    pub fn new(source: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            text:   text.into(),
        }
    }

    #[cfg(test)]
    pub fn is_blank(&self) -> bool {
        self.text.trim().is_empty()
    }
}

/// A named corpus split. Train is shuffled every epoch; Test is the
/// held-out split checked at epoch end; Evaluation is scored after
/// training and by `predict`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Split {
    Train,
    Test,
    Evaluation,
}

impl Split {
    pub const ALL: [Split; 3] = [Split::Train, Split::Test, Split::Evaluation];

    pub fn as_str(&self) -> &'static str {
        match self {
            Split::Train      => "train",
            Split::Test       => "test",
            Split::Evaluation => "evaluation",
        }
    }
}

impl std::str::FromStr for Split {
    type Err = AutoencoderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "train"                => Ok(Split::Train),
            "test" | "validation"  => Ok(Split::Test),
            "evaluation" | "eval"  => Ok(Split::Evaluation),
            other => Err(AutoencoderError::Configuration(format!(
                "unknown split '{other}' (expected train, test or evaluation)"
            ))),
        }
    }
}

impl std::fmt::Display for Split {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Borrow just the texts of a document slice, in order.
pub fn texts(docs: &[Document]) -> Vec<&str> {
    docs.iter().map(|d| d.text.as_str()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_names_round_trip() {
        for split in Split::ALL {
            assert_eq!(split.as_str().parse::<Split>().unwrap(), split);
        }
        assert_eq!("validation".parse::<Split>().unwrap(), Split::Test);
        assert!("dev".parse::<Split>().is_err());
    }

    #[test]
    fn test_blank_document() {
        assert!(Document::new("x", "  \t").is_blank());
        assert!(!Document::new("x", "lei").is_blank());
    }
}
