//! Pipeline error taxonomy
//!
//! Every error here is scoped to a single page or a single identifier.
//! None of them is meant to abort a multi-page document.

use thiserror::Error;

use crate::analysis::CandidateId;

/// Errors raised by the segmentation and validation core
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PipelineError {
    /// The recognition engine failed or returned nothing for a page
    #[error("Recognition unavailable for page {page_index}: {reason}")]
    RecognitionUnavailable { page_index: usize, reason: String },

    /// A configuration value is outside its valid range
    #[error("Invalid parameter `{name}`: {reason}")]
    InvalidParameter { name: &'static str, reason: String },

    /// A candidate sanitizes to the empty string and needs manual entry
    #[error("Candidate {id} sanitizes to an empty identifier, manual entry required")]
    SanitizationEmpty { id: CandidateId },

    /// Page confirmation attempted while candidates remain pending
    #[error("Page {page_index} has {} unresolved candidate(s)", .unresolved.len())]
    ValidationIncomplete {
        page_index: usize,
        unresolved: Vec<CandidateId>,
    },

    /// Every candidate is resolved but none was validated
    #[error("Page {page_index} has no validated identifier")]
    NothingValidated { page_index: usize },

    /// The barcode renderer refused an identifier
    #[error("Renderer rejected identifier '{identifier}': {reason}")]
    RendererRejected { identifier: String, reason: String },

    /// Low-confidence candidate confirmed with the unmodified recognized text
    #[error("Candidate {id} has confidence {confidence:.2} below {threshold:.2}; retype a corrected value")]
    UnchangedLowConfidence {
        id: CandidateId,
        confidence: f32,
        threshold: f32,
    },

    /// Confusable characters present and no valid supervisor token supplied
    #[error("Candidate {id} contains confusable characters and requires supervisor authorization")]
    AuthorizationRequired { id: CandidateId },

    /// The candidate already reached a terminal state
    #[error("Candidate {id} is already resolved")]
    AlreadyResolved { id: CandidateId },

    /// No candidate with this id exists on the page
    #[error("Unknown candidate {id}")]
    UnknownCandidate { id: CandidateId },

    /// The page was already confirmed and accepts no further actions
    #[error("Page {page_index} is already confirmed")]
    PageClosed { page_index: usize },
}

impl PipelineError {
    /// Shorthand for an out-of-range configuration value
    pub fn invalid(name: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidParameter {
            name,
            reason: reason.into(),
        }
    }
}

/// Result alias for the pipeline core
pub type Result<T> = std::result::Result<T, PipelineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_incomplete_message_reports_count() {
        let err = PipelineError::ValidationIncomplete {
            page_index: 2,
            unresolved: vec![CandidateId::new(2, 0, 0), CandidateId::new(2, 3, 0)],
        };
        assert_eq!(err.to_string(), "Page 2 has 2 unresolved candidate(s)");
    }

    #[test]
    fn test_invalid_shorthand() {
        let err = PipelineError::invalid("threshold", "must be > 0");
        assert!(matches!(err, PipelineError::InvalidParameter { name: "threshold", .. }));
    }
}
