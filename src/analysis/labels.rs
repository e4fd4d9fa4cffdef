//! Label/value association
//!
//! Finds groups that carry a field label ("Part Number", "N° de série", ...)
//! and pairs each with its value: the text after a `:`/`-` separator on the
//! same line, or else the next group in reading order. When no label is
//! found at all, every group containing a digit becomes a candidate.

use regex::{Regex, RegexBuilder};
use tracing::debug;

use super::candidate::{Candidate, CandidateId, Origin};
use super::grouping::FragmentGroup;
use super::sanitize::Sanitizer;
use crate::error::{PipelineError, Result};

/// Labels recognized when none are configured
pub const DEFAULT_LABELS: &[&str] = &[
    "part number",
    "serial number",
    "n° de série",
    "numéro de série",
    "designation class",
];

const DASHES: &[char] = &['-', '\u{2013}', '\u{2014}'];

/// A case-insensitive label phrase
#[derive(Debug, Clone)]
struct LabelPattern {
    phrase: String,
    regex: Regex,
}

impl LabelPattern {
    fn new(phrase: &str) -> Result<Self> {
        let words: Vec<String> = phrase.split_whitespace().map(regex::escape).collect();
        if words.is_empty() {
            return Err(PipelineError::invalid("labels.patterns", "empty label pattern"));
        }
        // OCR often merges or splits the words of a label
        let regex = RegexBuilder::new(&words.join(r"\s*"))
            .case_insensitive(true)
            .build()
            .map_err(|e| PipelineError::invalid("labels.patterns", e.to_string()))?;
        Ok(Self {
            phrase: phrase.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase(),
            regex,
        })
    }
}

/// Pairs label groups with their values
#[derive(Debug, Clone)]
pub struct LabelAssociator {
    patterns: Vec<LabelPattern>,
    fuzzy_threshold: Option<f64>,
    sanitizer: Sanitizer,
}

impl LabelAssociator {
    pub fn new<I, S>(patterns: I, fuzzy_threshold: Option<f64>, sanitizer: Sanitizer) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        if let Some(t) = fuzzy_threshold {
            if !(0.0..=1.0).contains(&t) {
                return Err(PipelineError::invalid(
                    "labels.fuzzy_threshold",
                    format!("must be within [0, 1], got {}", t),
                ));
            }
        }
        let patterns = patterns
            .into_iter()
            .map(|p| LabelPattern::new(p.as_ref()))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            patterns,
            fuzzy_threshold,
            sanitizer,
        })
    }

    pub fn sanitizer(&self) -> &Sanitizer {
        &self.sanitizer
    }

    /// Byte ranges of the labels carried by `text`, in reading order
    ///
    /// Exact matches may repeat within one text; the fuzzy match only
    /// applies when there is no exact one, and yields at most one label.
    fn label_spans(&self, text: &str) -> Vec<(usize, usize)> {
        let mut found: Vec<(usize, usize)> = self
            .patterns
            .iter()
            .flat_map(|p| p.regex.find_iter(text).map(|m| (m.start(), m.end())))
            .collect();
        found.sort_by(|a, b| a.0.cmp(&b.0).then(b.1.cmp(&a.1)));

        let mut spans: Vec<(usize, usize)> = Vec::with_capacity(found.len());
        for span in found {
            if spans.last().map_or(true, |last| span.0 >= last.1) {
                spans.push(span);
            }
        }
        if !spans.is_empty() {
            return spans;
        }

        // Fuzzy: compare the text before a colon, or else a same-length head
        let Some(threshold) = self.fuzzy_threshold else {
            return spans;
        };
        self.patterns
            .iter()
            .find_map(|p| {
                let end = text.find(':').unwrap_or_else(|| {
                    let n = p.phrase.chars().count();
                    text.char_indices().nth(n).map(|(i, _)| i).unwrap_or(text.len())
                });
                let head = text[..end].trim().to_lowercase();
                (strsim::normalized_levenshtein(&head, &p.phrase) >= threshold).then_some((0, end))
            })
            .into_iter()
            .collect()
    }

    /// Emit candidates for one page's groups
    pub fn associate(&self, groups: &[FragmentGroup], page_index: usize) -> Vec<Candidate> {
        let texts: Vec<String> = groups.iter().map(FragmentGroup::text).collect();
        let spans: Vec<Vec<(usize, usize)>> = texts.iter().map(|t| self.label_spans(t)).collect();

        if spans.iter().all(Vec::is_empty) {
            debug!("No label found on page {}, falling back to digit-bearing groups", page_index);
            return texts
                .iter()
                .enumerate()
                .filter(|(_, text)| text.chars().any(|c| c.is_ascii_digit()))
                .map(|(i, text)| self.candidate(CandidateId::new(page_index, i, 0), text, groups[i].min_confidence()))
                .collect();
        }

        let mut candidates = Vec::new();
        for (i, labels) in spans.iter().enumerate() {
            let text = &texts[i];
            for (k, &(_, end)) in labels.iter().enumerate() {
                // A value stops where the next label on the same line starts
                let value_end = labels.get(k + 1).map_or(text.len(), |next| next.0);
                if let Some(value) = split_value(&text[end..value_end]) {
                    candidates.push(self.candidate(
                        CandidateId::new(page_index, i, k),
                        value,
                        groups[i].min_confidence(),
                    ));
                    continue;
                }
                if k + 1 < labels.len() {
                    debug!("Label in '{}' on page {} has no value", text, page_index);
                    continue;
                }

                // Value expected on the following group, unless that is a label itself
                let next = i + 1;
                match texts.get(next) {
                    Some(value) if spans[next].is_empty() && !value.trim().is_empty() => {
                        candidates.push(self.candidate(
                            CandidateId::new(page_index, next, 0),
                            value.trim(),
                            groups[next].min_confidence(),
                        ));
                    }
                    _ => debug!("Label '{}' on page {} has no value", text, page_index),
                }
            }
        }

        candidates
    }

    fn candidate(&self, id: CandidateId, raw: &str, confidence: Option<f32>) -> Candidate {
        Candidate::new(id, raw, confidence, Origin::Ocr, &self.sanitizer)
    }
}

/// Value after a separator following the label, if non-empty
///
/// A colon anywhere after the label separates; a dash only when it directly
/// follows the label, so hyphens inside the value are left alone.
fn split_value(rest: &str) -> Option<&str> {
    let value = if let Some(pos) = rest.find(':') {
        &rest[pos + 1..]
    } else {
        rest.trim_start().strip_prefix(DASHES)?
    };
    let value = value.trim();
    (!value.is_empty()).then_some(value)
}
