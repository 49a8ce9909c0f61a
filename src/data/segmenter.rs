// ============================================================
// Layer 4 — Sentence Segmenter
// ============================================================
// Splits cleaned gazette text into sentences, the text units
// the autoencoder is trained on.
//
// A boundary is placed after '.', '!' or '?' when
//   - whitespace follows, and
//   - the next word starts with an uppercase letter or a quote, and
//   - the word ending in the period is neither a number ("73.")
//     nor a known abbreviation ("art.", "inc.", "n.").
//
// Example:
//   "Art. 4.º Fica ... desta Lei. Art. 5.º Compete ..."
//     → ["Art. 4.º Fica ... desta Lei.", "Art. 5.º Compete ..."]
//
// Whitespace inside a sentence is collapsed to single spaces.

const ABBREVIATIONS: &[&str] = &[
    "art", "arts", "inc", "n", "nº", "no", "sr", "sra", "dr", "dra", "prof", "profa",
    "av", "etc", "p", "pág", "cap", "fls", "ltda", "s.a", "obs",
];

#[derive(Debug, Clone)]
pub struct SentenceSegmenter {
    /// Sentences shorter than this many characters are dropped
    min_chars: usize,
}

impl SentenceSegmenter {
    pub fn new(min_chars: usize) -> Self {
        Self { min_chars }
    }

    pub fn segment(&self, text: &str) -> Vec<String> {
        let words: Vec<&str> = text.split_whitespace().collect();
        let mut sentences = Vec::new();
        let mut current: Vec<&str> = Vec::new();

        for (i, word) in words.iter().enumerate() {
            current.push(word);
            let next = words.get(i + 1);
            if next.is_some_and(|n| starts_sentence(n)) && ends_sentence(word) {
                self.push(&mut sentences, &current);
                current.clear();
            }
        }
        self.push(&mut sentences, &current);
        sentences
    }

    fn push(&self, sentences: &mut Vec<String>, words: &[&str]) {
        let sentence = words.join(" ");
        if sentence.chars().count() >= self.min_chars {
            sentences.push(sentence);
        }
    }
}

impl Default for SentenceSegmenter {
    fn default() -> Self {
        Self::new(3)
    }
}

fn starts_sentence(word: &str) -> bool {
    word.chars()
        .next()
        .is_some_and(|c| c.is_uppercase() || c == '"' || c == '(')
}

fn ends_sentence(word: &str) -> bool {
    let Some(last) = word.chars().last() else { return false };
    if !matches!(last, '.' | '!' | '?') {
        return false;
    }
    if last != '.' {
        return true;
    }
    let stem = word
        .trim_end_matches('.')
        .trim_start_matches(|c: char| c == '(' || c == '"');
    if stem.is_empty() || stem.chars().all(|c| c.is_ascii_digit() || c == '.' || c == 'º') {
        return false;
    }
    !ABBREVIATIONS.contains(&stem.to_lowercase().as_str())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_splits_plain_sentences() {
        let s = SentenceSegmenter::default();
        let out = s.segment(
            "Primeira frase do texto que precisa ser segmentado. Segunda frase do texto",
        );
        assert_eq!(
            out,
            vec![
                "Primeira frase do texto que precisa ser segmentado.",
                "Segunda frase do texto",
            ]
        );
    }

    #[test]
    fn test_does_not_split_after_article_abbreviation() {
        let s = SentenceSegmenter::default();
        let out = s.segment(
            "Art. 4.º Fica sob responsabilidade do inciso I do art. 3.º desta Lei. \
             Art. 5.º Compete à Secretaria a emissão da autorização.",
        );
        assert_eq!(
            out,
            vec![
                "Art. 4.º Fica sob responsabilidade do inciso I do art. 3.º desta Lei.",
                "Art. 5.º Compete à Secretaria a emissão da autorização.",
            ]
        );
    }

    #[test]
    fn test_does_not_split_after_numbers_and_inc() {
        let s = SentenceSegmenter::default();
        let text = "confere o art. 80, inc. XI, da Lei Orgânica. \"Art. 73.  X recursos.\" (NR)";
        let out = s.segment(text);
        assert_eq!(
            out,
            vec![
                "confere o art. 80, inc. XI, da Lei Orgânica.",
                "\"Art. 73. X recursos.\" (NR)",
            ]
        );
    }

    #[test]
    fn test_drops_short_fragments() {
        let s = SentenceSegmenter::new(3);
        assert!(s.segment("a.").is_empty());
        assert!(s.segment("   ").is_empty());
    }
}
