//! Identifier sanitization
//!
//! Canonical form of an identifier: uppercase, known prefix tokens removed,
//! nothing but `[A-Z0-9]` left.

/// Prefix tokens recognized when no list is configured
pub const DEFAULT_PREFIX_TOKENS: &[&str] = &["S/N", "SERIAL NO", "SERIAL", "SER", "P/N", "N°"];

/// Deterministic, idempotent identifier normalizer
#[derive(Debug, Clone)]
pub struct Sanitizer {
    /// Uppercased tokens, longest first
    tokens: Vec<Vec<char>>,
    /// Tokens made only of identifier characters
    word_tokens: Vec<String>,
}

impl Default for Sanitizer {
    fn default() -> Self {
        Self::new(DEFAULT_PREFIX_TOKENS)
    }
}

impl Sanitizer {
    pub fn new<I, S>(prefix_tokens: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut tokens: Vec<Vec<char>> = prefix_tokens
            .into_iter()
            .map(|t| t.as_ref().trim().to_uppercase())
            .filter(|t| !t.is_empty())
            .map(|t| t.chars().collect())
            .collect();
        tokens.sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));
        tokens.dedup();

        let word_tokens = tokens
            .iter()
            .filter(|t| t.iter().all(|c| is_identifier_char(*c)))
            .map(|t| t.iter().collect::<String>())
            .collect();

        Self { tokens, word_tokens }
    }

    /// Canonicalize a raw candidate string
    ///
    /// Uppercases, drops prefix tokens that stand on their own (not glued to
    /// a surrounding alphanumeric run), then keeps only `[A-Z0-9]`.
    pub fn sanitize(&self, raw: &str) -> String {
        let upper: Vec<char> = raw.to_uppercase().chars().collect();
        let mut cleaned = String::with_capacity(upper.len());

        let mut i = 0;
        while i < upper.len() {
            if let Some(len) = self.token_at(&upper, i) {
                i += len;
                continue;
            }
            let c = upper[i];
            if is_identifier_char(c) {
                cleaned.push(c);
            }
            i += 1;
        }

        // A value that is nothing but a label word is not an identifier.
        // This also keeps a second pass from stripping a token that only
        // became standalone after punctuation removal.
        if self.word_tokens.iter().any(|t| *t == cleaned) {
            cleaned.clear();
        }

        cleaned
    }

    /// Length of the prefix token standing at `pos`, if any
    fn token_at(&self, text: &[char], pos: usize) -> Option<usize> {
        self.tokens.iter().find_map(|token| {
            let end = pos + token.len();
            if end > text.len() || text[pos..end] != token[..] {
                return None;
            }
            let starts_alnum = token.first().copied().is_some_and(is_identifier_char);
            if starts_alnum && pos > 0 && is_identifier_char(text[pos - 1]) {
                return None;
            }
            let ends_alnum = token.last().copied().is_some_and(is_identifier_char);
            if ends_alnum && end < text.len() && is_identifier_char(text[end]) {
                return None;
            }
            Some(token.len())
        })
    }
}

/// True for the characters a clean identifier may contain
pub fn is_identifier_char(c: char) -> bool {
    c.is_ascii_uppercase() || c.is_ascii_digit()
}

/// Sanitize with the default prefix tokens
pub fn sanitize(raw: &str) -> String {
    Sanitizer::default().sanitize(raw)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_serial_prefix_removed() {
        assert_eq!(sanitize("S/N 12-AB"), "12AB");
        assert_eq!(sanitize("s/n: 12-ab"), "12AB");
        assert_eq!(sanitize("SER. 4471-X"), "4471X");
    }

    #[test]
    fn test_value_without_prefix() {
        assert_eq!(sanitize("XY-99 88"), "XY9988");
        assert_eq!(sanitize("AB1234"), "AB1234");
    }

    #[test]
    fn test_token_inside_identifier_kept() {
        // SER is part of a longer alphanumeric run here
        assert_eq!(sanitize("SER123"), "SER123");
        assert_eq!(sanitize("XSER 9"), "XSER9");
        assert_eq!(sanitize("SERVO-7"), "SERVO7");
    }

    #[test]
    fn test_empty_input() {
        assert_eq!(sanitize(""), "");
        assert_eq!(sanitize(" -/ "), "");
    }

    #[test]
    fn test_label_only_is_empty() {
        assert_eq!(sanitize("S/N"), "");
        assert_eq!(sanitize("SE-R"), "");
    }

    #[test]
    fn test_punctuated_token_letters_are_kept() {
        assert_eq!(sanitize("SN"), "SN");
        assert_eq!(sanitize("PN"), "PN");
        assert_eq!(sanitize("N"), "N");
        assert_eq!(sanitize("S.N"), "SN");
    }

    #[test]
    fn test_custom_tokens() {
        let sanitizer = Sanitizer::new(["ref", "lot"]);
        assert_eq!(sanitizer.sanitize("Ref: A-1"), "A1");
        assert_eq!(sanitizer.sanitize("LOT 55 S/N"), "55SN");
    }

    #[test]
    fn test_idempotent() {
        let sanitizer = Sanitizer::default();
        let inputs = [
            "S/N 12-AB",
            "SE-R",
            "SER-SER",
            "ser ser 12",
            "SERIAL NO. 0042",
            "n° de série 77",
            "straße 12",
            "P/N:P/N",
            "SN",
            "ŠSER",
            "12 SER",
            "",
            "---",
            "ab/cd\\ef",
        ];
        for input in inputs {
            let once = sanitizer.sanitize(input);
            assert_eq!(sanitizer.sanitize(&once), once, "input {:?}", input);
            assert!(once.chars().all(is_identifier_char));
        }
    }

    proptest! {
        #[test]
        fn prop_sanitize_is_idempotent(raw in "\\PC{0,40}") {
            let once = sanitize(&raw);
            prop_assert_eq!(sanitize(&once), once.clone());
            prop_assert!(once.chars().all(is_identifier_char));
        }

        #[test]
        fn prop_sanitize_idempotent_near_tokens(raw in "(S/N|SERIAL NO|SERIAL|SER|P/N|N°|[A-Za-z0-9]{1,4}|[ ./:-]){0,8}") {
            let once = sanitize(&raw);
            prop_assert_eq!(sanitize(&once), once);
        }
    }
}
