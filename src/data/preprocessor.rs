// ============================================================
// Layer 4 — Gazette Text Preprocessor
// ============================================================
// Cleans text extracted from official gazette PDFs before it
// is segmented into sentences and tokenised.
//
// Extraction leaves a lot of layout debris behind:
//   - doubled glyphs from bold fonts   "CCRRIIAADDOO" → "CRIADO"
//   - dotted leaders in tables          "Art.34......... III"
//   - curly quotes                      “...” → "..."
//   - article / paragraph markers       "Art. 4.º Fica ..." → "Fica ..."
//   - runs of spaces and blank lines
//
// `Preprocessor::clean` applies the document-level steps in a
// fixed order; the individual steps are public so callers can
// compose their own pipeline. `clean_sentence` is the final
// per-sentence normalisation used for the training corpus.

/// Characters treated as punctuation by the leader/debris filters.
fn is_punct(c: char) -> bool {
    c.is_ascii_punctuation()
        || matches!(c, '…' | '–' | '—' | '“' | '”' | '‘' | '’' | '•' | '·')
}

/// Collapse any run of newlines into a single newline.
pub fn remove_consecutive_empty_lines(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut last_newline = false;
    for c in text.chars() {
        if c == '\n' {
            if !last_newline {
                out.push(c);
            }
            last_newline = true;
        } else {
            out.push(c);
            last_newline = false;
        }
    }
    out
}

/// Join lines with single spaces and trim the result.
pub fn remove_new_line_char(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut last_newline = false;
    for c in text.chars() {
        if c == '\n' {
            if !last_newline {
                out.push(' ');
            }
            last_newline = true;
        } else {
            out.push(c);
            last_newline = false;
        }
    }
    out.trim().to_string()
}

/// Collapse runs of spaces into one space. Newlines are untouched.
pub fn remove_duplicate_whitespaces(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut last_space = false;
    for c in text.chars() {
        if c == ' ' {
            if !last_space {
                out.push(' ');
            }
            last_space = true;
        } else {
            out.push(c);
            last_space = false;
        }
    }
    out
}

/// A word made only of doubled letters ("MMEEDDIIAANNTTEE").
/// Words holding a digit are numbers or dates and never match.
fn undouble(word: &str) -> Option<String> {
    let chars: Vec<char> = word.chars().collect();
    if chars.is_empty() || chars.len() % 2 != 0 || chars.iter().any(char::is_ascii_digit) {
        return None;
    }
    if chars.chunks(2).all(|p| p[0] == p[1]) {
        Some(chars.chunks(2).map(|p| p[0]).collect())
    } else {
        None
    }
}

/// Undouble every word written with doubled glyphs, keeping the
/// surrounding whitespace exactly as it was.
pub fn remove_word_with_duplicate_letters(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut word = String::new();
    let flush = |word: &mut String, out: &mut String| {
        if !word.is_empty() {
            match undouble(word) {
                Some(w) => out.push_str(&w),
                None => out.push_str(word),
            }
            word.clear();
        }
    };
    for c in text.chars() {
        if c.is_whitespace() {
            flush(&mut word, &mut out);
            out.push(c);
        } else {
            word.push(c);
        }
    }
    flush(&mut word, &mut out);
    out
}

/// Drop dotted leaders and tokens that are nothing but punctuation.
///
/// Runs of three or more punctuation characters are removed first
/// ("Art.34......" → "Art.34"), then any whitespace-separated token
/// left with only punctuation. Works line by line.
pub fn remove_line_with_punctuation_only(text: &str) -> String {
    text.split('\n')
        .map(|line| {
            let chars: Vec<char> = line.chars().collect();
            let mut kept = String::with_capacity(line.len());
            let mut i = 0;
            while i < chars.len() {
                if is_punct(chars[i]) {
                    let run_end = chars[i..]
                        .iter()
                        .position(|&c| !is_punct(c))
                        .map_or(chars.len(), |p| i + p);
                    if run_end - i < 3 {
                        kept.extend(&chars[i..run_end]);
                    }
                    i = run_end;
                } else {
                    kept.push(chars[i]);
                    i += 1;
                }
            }
            kept.split_whitespace()
                .filter(|tok| !tok.chars().all(is_punct))
                .collect::<Vec<_>>()
                .join(" ")
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Replace typographic quotes with their ASCII forms.
pub fn remove_special_quotes(text: &str) -> String {
    text.chars()
        .map(|c| match c {
            '“' | '”' | '„' => '"',
            '‘' | '’' => '\'',
            c => c,
        })
        .collect()
}

/// "Art. 4.º Fica" → Some("Fica"); "§ 2 A Comissão" → Some("A Comissão").
fn strip_line_marker(line: &str) -> Option<&str> {
    let rest = if let Some(r) = line.strip_prefix("Art") {
        r.strip_prefix('.').unwrap_or(r)
    } else {
        line.strip_prefix('§')?
    };
    let rest = rest.trim_start_matches(' ');
    let digits = rest
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(rest.len());
    if digits == 0 {
        return None;
    }
    let rest = &rest[digits..];
    let rest = rest.strip_prefix('.').unwrap_or(rest);
    let rest = rest.strip_prefix(['º', '°']).unwrap_or(rest);
    if !rest.starts_with(' ') {
        return None;
    }
    Some(rest.trim_start_matches(' '))
}

/// Remove article ("Art. N.º") and paragraph ("§ N") markers at the
/// start of each line.
pub fn remove_special_line_prefix(text: &str) -> String {
    text.split('\n')
        .map(|line| strip_line_marker(line).unwrap_or(line))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Final normalisation of one sentence: whitespace collapsed to single
/// spaces, dashes / underscores / dots dropped, lowercased.
pub fn clean_sentence(sentence: &str) -> String {
    let mut out = String::with_capacity(sentence.len());
    let mut last_space = false;
    for c in sentence.chars() {
        match c {
            '\n' | '\r' | '\t' | ' ' => {
                if !last_space {
                    out.push(' ');
                }
                last_space = true;
            }
            '-' | '_' | '.' => {}
            c => {
                out.extend(c.to_lowercase());
                last_space = false;
            }
        }
    }
    out
}

/// Document-level cleaning pipeline for raw gazette text.
#[derive(Debug, Clone, Default)]
pub struct Preprocessor;

impl Preprocessor {
    pub fn new() -> Self {
        Self
    }

    pub fn clean(&self, text: &str) -> String {
        let text: String = text
            .chars()
            .map(|c| match c {
                '\r' => '\n',
                '\t' | '\u{00A0}' | '\u{200B}' | '\u{FEFF}' => ' ',
                c if c.is_control() && c != '\n' => ' ',
                c => c,
            })
            .collect();
        let text = remove_special_quotes(&text);
        let text = remove_word_with_duplicate_letters(&text);
        let text = remove_line_with_punctuation_only(&text);
        let text = remove_special_line_prefix(&text);
        let text = remove_duplicate_whitespaces(&text);
        remove_consecutive_empty_lines(&text).trim().to_string()
    }
}
