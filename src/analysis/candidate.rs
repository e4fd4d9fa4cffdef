//! Identifier candidates

use serde::Serialize;
use std::fmt;

use super::sanitize::Sanitizer;

/// Stable synthetic identity of a candidate within a document
///
/// `member_index` distinguishes several candidates drawn from one group; it
/// is 0 for the usual one-candidate-per-group case.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct CandidateId {
    pub page_index: usize,
    pub group_index: usize,
    pub member_index: usize,
}

impl CandidateId {
    pub fn new(page_index: usize, group_index: usize, member_index: usize) -> Self {
        Self {
            page_index,
            group_index,
            member_index,
        }
    }
}

impl fmt::Display for CandidateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.page_index, self.group_index, self.member_index)
    }
}

/// Where a candidate's text came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Origin {
    /// Read by the recognition engine
    Ocr,
    /// Typed by the operator
    Manual,
    /// Operator correction of an earlier candidate
    Corrected,
}

/// A string under consideration as an identifier
///
/// `cleaned` is always derived from `raw` by the sanitizer; changing the
/// text means building a new candidate.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Candidate {
    id: CandidateId,
    raw: String,
    cleaned: String,
    confidence: Option<f32>,
    origin: Origin,
}

impl Candidate {
    pub fn new(
        id: CandidateId,
        raw: impl Into<String>,
        confidence: Option<f32>,
        origin: Origin,
        sanitizer: &Sanitizer,
    ) -> Self {
        let raw = raw.into();
        let cleaned = sanitizer.sanitize(&raw);
        Self {
            id,
            raw,
            cleaned,
            confidence,
            origin,
        }
    }

    /// Operator correction of this candidate, keeping its identity
    pub fn corrected(&self, raw: impl Into<String>, sanitizer: &Sanitizer) -> Self {
        Self::new(self.id, raw, None, Origin::Corrected, sanitizer)
    }

    pub fn id(&self) -> CandidateId {
        self.id
    }

    pub fn raw(&self) -> &str {
        &self.raw
    }

    pub fn cleaned(&self) -> &str {
        &self.cleaned
    }

    pub fn confidence(&self) -> Option<f32> {
        self.confidence
    }

    pub fn origin(&self) -> Origin {
        self.origin
    }

    /// Sanitizes to nothing; needs manual entry
    pub fn is_empty(&self) -> bool {
        self.cleaned.is_empty()
    }
}

/// Split operator-edited text into one manual candidate per non-empty line
///
/// Group indices are assigned from `first_group_index` upwards.
pub fn split_manual_entry(
    text: &str,
    page_index: usize,
    first_group_index: usize,
    sanitizer: &Sanitizer,
) -> Vec<Candidate> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .enumerate()
        .map(|(i, line)| {
            Candidate::new(
                CandidateId::new(page_index, first_group_index + i, 0),
                line,
                None,
                Origin::Manual,
                sanitizer,
            )
        })
        .collect()
}
