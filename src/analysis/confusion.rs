//! OCR character-confusion detection
//!
//! Flags characters that recognizers commonly mix up and proposes
//! alternative readings by single-character substitution. Everything here
//! is advisory; the underlying value is never changed.

use serde::Serialize;
use std::collections::BTreeSet;
use std::fmt;

/// Pairs that are always considered confusable
pub const BASE_PAIRS: &[(char, char)] = &[('S', '8'), ('O', '0'), ('I', '1')];

/// Optional pairs enabled by `extended_pairs`
pub const EXTENDED_PAIRS: &[(char, char)] = &[('B', '8'), ('Z', '2')];

/// Symmetric table of confusable characters
#[derive(Debug, Clone)]
pub struct ConfusionTable {
    pairs: Vec<(char, char)>,
}

impl Default for ConfusionTable {
    fn default() -> Self {
        Self::new(true)
    }
}

impl ConfusionTable {
    pub fn new(extended: bool) -> Self {
        let mut pairs = BASE_PAIRS.to_vec();
        if extended {
            pairs.extend_from_slice(EXTENDED_PAIRS);
        }
        Self { pairs }
    }

    /// Build from explicit pairs (letters are matched case-insensitively)
    pub fn from_pairs(pairs: impl IntoIterator<Item = (char, char)>) -> Self {
        Self {
            pairs: pairs
                .into_iter()
                .map(|(a, b)| (a.to_ascii_uppercase(), b.to_ascii_uppercase()))
                .filter(|(a, b)| a != b)
                .collect(),
        }
    }

    pub fn is_confusable(&self, c: char) -> bool {
        let c = c.to_ascii_uppercase();
        self.pairs.iter().any(|&(a, b)| a == c || b == c)
    }

    /// Every character `c` may have been misread from
    pub fn alternatives(&self, c: char) -> Vec<char> {
        let upper = c.to_ascii_uppercase();
        let mut alts: Vec<char> = self
            .pairs
            .iter()
            .filter_map(|&(a, b)| {
                if a == upper {
                    Some(b)
                } else if b == upper {
                    Some(a)
                } else {
                    None
                }
            })
            .map(|alt| {
                if c.is_ascii_lowercase() {
                    alt.to_ascii_lowercase()
                } else {
                    alt
                }
            })
            .filter(|&alt| alt != c)
            .collect();
        alts.sort_unstable();
        alts.dedup();
        alts
    }

    /// Annotate `text`, marking each confusable character
    pub fn flag(&self, text: &str) -> AnnotatedText {
        let mut spans: Vec<Span> = Vec::new();
        for c in text.chars() {
            let confusable = self.is_confusable(c);
            match spans.last_mut() {
                Some(last) if last.confusable == confusable => last.text.push(c),
                _ => spans.push(Span {
                    text: c.to_string(),
                    confusable,
                }),
            }
        }
        AnnotatedText { spans }
    }

    pub fn has_confusables(&self, text: &str) -> bool {
        text.chars().any(|c| self.is_confusable(c))
    }

    /// Alternative readings of `text`, one substituted position each
    ///
    /// Never contains `text` itself; every entry has the same character
    /// count as `text`.
    pub fn generate_candidates(&self, text: &str) -> BTreeSet<String> {
        let chars: Vec<char> = text.chars().collect();
        let mut candidates = BTreeSet::new();

        for (pos, &c) in chars.iter().enumerate() {
            for alt in self.alternatives(c) {
                let mut variant = chars.clone();
                variant[pos] = alt;
                candidates.insert(variant.into_iter().collect::<String>());
            }
        }

        candidates.remove(text);
        candidates
    }
}

/// A run of characters sharing the same confusable flag
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Span {
    pub text: String,
    pub confusable: bool,
}

/// Display form of a value with confusable characters marked
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AnnotatedText {
    pub spans: Vec<Span>,
}

impl AnnotatedText {
    /// Render with each confusable run wrapped in `open`/`close`
    pub fn render(&self, open: &str, close: &str) -> String {
        let mut out = String::new();
        for span in &self.spans {
            if span.confusable {
                out.push_str(open);
                out.push_str(&span.text);
                out.push_str(close);
            } else {
                out.push_str(&span.text);
            }
        }
        out
    }

    /// Underlying text without markers
    pub fn plain(&self) -> String {
        self.spans.iter().map(|s| s.text.as_str()).collect()
    }

    pub fn confusable_count(&self) -> usize {
        self.spans
            .iter()
            .filter(|s| s.confusable)
            .map(|s| s.text.chars().count())
            .sum()
    }
}

impl fmt::Display for AnnotatedText {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render("[", "]"))
    }
}
