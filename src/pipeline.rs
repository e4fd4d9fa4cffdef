//! Per-page orchestration
//!
//! recognition -> grouping -> label association -> sanitization ->
//! confusion flagging, ending in an open [`PageGate`] for the operator.

use serde::Serialize;
use std::time::Instant;
use tracing::{debug, info};

use crate::analysis::{
    split_manual_entry, Candidate, CandidateId, ConfusionTable, Grouper, LabelAssociator,
};
use crate::config::AppConfig;
use crate::error::{PipelineError, Result};
use crate::validation::{GatePolicy, PageGate};
use crate::vision::{recognize_page, RecognitionEngine};

/// Operator-facing view of one candidate
#[derive(Debug, Clone, Serialize)]
pub struct CandidateView {
    pub id: CandidateId,
    pub raw: String,
    pub cleaned: String,
    pub confidence: Option<f32>,
    /// Cleaned value with confusable characters bracketed
    pub annotated: String,
    /// Single-substitution readings, offered when confidence is low
    pub alternatives: Vec<String>,
    /// Sanitized to nothing; the operator has to type the value
    pub needs_manual_entry: bool,
}

/// Result of processing one page, awaiting operator decisions
#[derive(Debug)]
pub struct PageReview {
    pub page_index: usize,
    /// Space-joined OCR text, for manual line splitting
    pub raw_text: String,
    pub dropped_fragments: usize,
    pub recognition_error: Option<PipelineError>,
    pub gate: PageGate,
}

/// Builds page reviews with one fixed configuration
#[derive(Debug, Clone)]
pub struct PageProcessor {
    grouper: Grouper,
    associator: LabelAssociator,
    confusion: ConfusionTable,
    policy: GatePolicy,
    suggestion_threshold: f32,
}

impl PageProcessor {
    pub fn new(
        grouper: Grouper,
        associator: LabelAssociator,
        confusion: ConfusionTable,
        policy: GatePolicy,
        suggestion_threshold: f32,
    ) -> Self {
        Self {
            grouper,
            associator,
            confusion,
            policy,
            suggestion_threshold,
        }
    }

    /// Validates the configuration first
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self::new(
            config.grouper()?,
            config.associator()?,
            config.confusion_table(),
            config.gate_policy()?,
            config.confusion.suggestion_threshold,
        ))
    }

    pub fn confusion(&self) -> &ConfusionTable {
        &self.confusion
    }

    /// Run the full pipeline on one page image
    pub fn process_page(&self, page_index: usize, engine: &dyn RecognitionEngine, image: &[u8]) -> PageReview {
        let start = Instant::now();

        let outcome = recognize_page(engine, page_index, image);
        let groups = self.grouper.group(&outcome.fragments);
        let candidates = self.associator.associate(&groups, page_index);
        debug!(
            "Page {}: {} fragment(s), {} group(s), {} candidate(s)",
            page_index,
            outcome.fragments.len(),
            groups.len(),
            candidates.len()
        );

        let review = PageReview {
            page_index,
            raw_text: outcome.joined_text(),
            dropped_fragments: outcome.dropped,
            recognition_error: outcome.error,
            gate: self.open_gate(page_index, candidates),
        };

        info!(
            "Page {} processed in {:.2?} ({} candidate(s))",
            page_index,
            start.elapsed(),
            review.gate.entries().len()
        );
        review
    }

    /// Replace OCR candidates with one manual candidate per line of `text`
    pub fn manual_review(&self, page_index: usize, text: &str) -> PageGate {
        let candidates = split_manual_entry(text, page_index, 0, self.associator.sanitizer());
        self.open_gate(page_index, candidates)
    }

    fn open_gate(&self, page_index: usize, candidates: Vec<Candidate>) -> PageGate {
        PageGate::new(
            page_index,
            self.policy.clone(),
            self.confusion.clone(),
            self.associator.sanitizer().clone(),
            candidates,
        )
    }

    /// Display data for every candidate on `gate`
    pub fn views(&self, gate: &PageGate) -> Vec<CandidateView> {
        gate.entries()
            .iter()
            .map(|entry| self.view(entry.candidate()))
            .collect()
    }

    pub fn view(&self, candidate: &Candidate) -> CandidateView {
        let low_confidence = candidate
            .confidence()
            .is_some_and(|c| c < self.suggestion_threshold);
        let alternatives = if low_confidence {
            self.confusion
                .generate_candidates(candidate.cleaned())
                .into_iter()
                .collect()
        } else {
            Vec::new()
        };

        CandidateView {
            id: candidate.id(),
            raw: candidate.raw().to_string(),
            cleaned: candidate.cleaned().to_string(),
            confidence: candidate.confidence(),
            annotated: self.confusion.flag(candidate.cleaned()).to_string(),
            alternatives,
            needs_manual_entry: candidate.is_empty(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validation::{CandidateState, Confirmation};
    use crate::vision::JsonDetectionsEngine;

    fn processor() -> PageProcessor {
        PageProcessor::from_config(&AppConfig::default()).unwrap()
    }

    fn run(json: &str) -> PageReview {
        processor().process_page(0, &JsonDetectionsEngine, json.as_bytes())
    }

    #[test]
    fn test_serial_prefix_needs_retyping_below_threshold() {
        let mut review = run(r#"[{"text":"S/N 12-AB","bbox":[[0,0],[50,0],[50,10],[0,10]],"confidence":0.95}]"#);

        assert!(review.recognition_error.is_none());
        assert_eq!(review.gate.entries().len(), 1);
        let id = review.gate.entries()[0].id();
        assert_eq!(review.gate.entries()[0].candidate().cleaned(), "12AB");

        let err = review.gate.confirm(id, Confirmation::as_shown()).unwrap_err();
        assert!(matches!(err, PipelineError::UnchangedLowConfidence { .. }));

        let validated = review.gate.confirm(id, Confirmation::with_text("12A8")).unwrap();
        assert_eq!(validated.value, "12A8");
    }

    #[test]
    fn test_close_lines_group_together() {
        let review = run(
            r#"[
                [[[0,10],[40,10],[40,20],[0,20]], "AB", 0.9],
                [[[50,12],[90,12],[90,22],[50,22]], "12", 0.9],
                [[[0,200],[40,200],[40,210],[0,210]], "CD34", 0.9]
            ]"#,
        );

        let cleaned: Vec<&str> = review
            .gate
            .entries()
            .iter()
            .map(|e| e.candidate().cleaned())
            .collect();
        assert_eq!(cleaned, vec!["AB12", "CD34"]);
        assert_eq!(review.raw_text, "AB 12 CD34");
    }

    #[test]
    fn test_label_with_colon() {
        let review = run(r#"[{"text":"Part Number: AB1234","bbox":[[0,0],[90,0],[90,10],[0,10]],"confidence":0.97}]"#);

        let candidate = review.gate.entries()[0].candidate();
        assert_eq!(candidate.raw(), "AB1234");
        assert_eq!(candidate.cleaned(), "AB1234");
    }

    #[test]
    fn test_label_followed_by_value_group() {
        let review = run(
            r#"[
                {"text":"Serial Number","bbox":[[0,0],[90,0],[90,10],[0,10]],"confidence":0.97},
                {"text":"XY-99 88","bbox":[[0,40],[60,40],[60,50],[0,50]],"confidence":0.93}
            ]"#,
        );

        assert_eq!(review.gate.entries().len(), 1);
        let candidate = review.gate.entries()[0].candidate();
        assert_eq!(candidate.raw(), "XY-99 88");
        assert_eq!(candidate.cleaned(), "XY9988");
    }

    #[test]
    fn test_recognition_failure_leaves_manual_path() {
        let p = processor();
        let review = p.process_page(3, &JsonDetectionsEngine, b"not json");

        assert!(matches!(
            review.recognition_error,
            Some(PipelineError::RecognitionUnavailable { page_index: 3, .. })
        ));
        assert!(review.gate.entries().is_empty());

        let mut gate = p.manual_review(3, "AB-1\n\n  CD 2  \n");
        assert_eq!(gate.entries().len(), 2);
        let ids: Vec<_> = gate.entries().iter().map(|e| e.id()).collect();
        for id in ids {
            gate.confirm(id, Confirmation::as_shown()).unwrap();
        }
        let validated = gate.confirm_page().unwrap();
        assert_eq!(validated.len(), 2);
        assert_eq!(validated[1].value, "CD2");
    }

    #[test]
    fn test_dropped_fragments_are_counted() {
        let review = run(
            r#"[
                [[[0,0],[40,0],[40,10]], "BAD", 0.9],
                [[[0,0],[40,0],[40,10],[0,10]], "AB12", 1.5],
                [[[0,0],[40,0],[40,10],[0,10]], "CD34", 0.9]
            ]"#,
        );

        assert_eq!(review.dropped_fragments, 2);
        assert_eq!(review.gate.entries().len(), 1);
    }

    #[test]
    fn test_views_flag_and_suggest() {
        let p = processor();
        let review = run(r#"[{"text":"Serial Number: S01","bbox":[[0,0],[90,0],[90,10],[0,10]],"confidence":0.5}]"#);

        let views = p.views(&review.gate);
        assert_eq!(views.len(), 1);
        assert_eq!(views[0].annotated, "[S01]");
        assert!(views[0].alternatives.contains(&"801".to_string()));
        assert!(!views[0].alternatives.contains(&"S01".to_string()));
        assert!(!views[0].needs_manual_entry);
        assert_eq!(review.gate.entries()[0].state(), CandidateState::Pending);
    }

    #[test]
    fn test_confident_candidates_get_no_suggestions() {
        let p = processor();
        let review = run(r#"[{"text":"Serial Number: S01","bbox":[[0,0],[90,0],[90,10],[0,10]],"confidence":0.995}]"#);

        let views = p.views(&review.gate);
        assert!(views[0].alternatives.is_empty());
    }

    #[test]
    fn test_invalid_config_rejected_before_processing() {
        let mut config = AppConfig::default();
        config.grouping.threshold = -1.0;
        assert!(matches!(
            PageProcessor::from_config(&config),
            Err(PipelineError::InvalidParameter { .. })
        ));
    }
}
