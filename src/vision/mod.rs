//! Vision/OCR Layer
//!
//! Boundary with the external recognition engine. Raw detections are
//! validated into [`TextFragment`]s here; malformed detections are dropped
//! and counted, never passed on.

pub mod engine;
pub mod fragment;

pub use engine::{parse_detections, CommandEngine, JsonDetectionsEngine, RecognitionEngine};
pub use fragment::{BoundingBox, FragmentDefect, Point, RawDetection, TextFragment};

use tracing::{debug, warn};

use crate::error::PipelineError;

/// Fragments recognized on one page, plus what went wrong along the way
#[derive(Debug, Clone, Default)]
pub struct RecognitionOutcome {
    /// Valid fragments in recognizer order
    pub fragments: Vec<TextFragment>,
    /// Number of detections dropped as malformed
    pub dropped: usize,
    /// Set when the engine failed or returned nothing
    pub error: Option<PipelineError>,
}

impl RecognitionOutcome {
    /// Space-joined text of all fragments, in recognizer order
    pub fn joined_text(&self) -> String {
        self.fragments
            .iter()
            .map(TextFragment::text)
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Validate raw detections, returning the kept fragments and the drop count
pub fn validate_detections(raw: &[RawDetection]) -> (Vec<TextFragment>, usize) {
    let mut fragments = Vec::with_capacity(raw.len());
    let mut dropped = 0;

    for detection in raw {
        match TextFragment::from_raw(fragments.len(), detection) {
            Ok(fragment) => fragments.push(fragment),
            Err(defect) => {
                debug!("Dropping detection '{}': {}", detection.text(), defect);
                dropped += 1;
            }
        }
    }

    if dropped > 0 {
        warn!("Dropped {} malformed detection(s) of {}", dropped, raw.len());
    }

    (fragments, dropped)
}

/// Run recognition for one page
///
/// Never fails: engine errors and empty results are reported through
/// [`RecognitionOutcome::error`] so the page can still be handled manually.
pub fn recognize_page(engine: &dyn RecognitionEngine, page_index: usize, image: &[u8]) -> RecognitionOutcome {
    let raw = match engine.recognize(image) {
        Ok(raw) => raw,
        Err(e) => {
            warn!("Recognition failed for page {}: {:#}", page_index, e);
            return RecognitionOutcome {
                fragments: vec![],
                dropped: 0,
                error: Some(PipelineError::RecognitionUnavailable {
                    page_index,
                    reason: format!("{:#}", e),
                }),
            };
        }
    };

    let (fragments, dropped) = validate_detections(&raw);

    let error = if fragments.is_empty() {
        warn!("No usable text recognized on page {}", page_index);
        Some(PipelineError::RecognitionUnavailable {
            page_index,
            reason: if dropped > 0 {
                format!("all {} detection(s) were malformed", dropped)
            } else {
                "no text detected".to_string()
            },
        })
    } else {
        None
    };

    RecognitionOutcome {
        fragments,
        dropped,
        error,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;

    struct FailingEngine;

    impl RecognitionEngine for FailingEngine {
        fn recognize(&self, _image: &[u8]) -> anyhow::Result<Vec<RawDetection>> {
            Err(anyhow!("engine timed out"))
        }
    }

    #[test]
    fn test_engine_failure_becomes_flagged_empty_outcome() {
        let outcome = recognize_page(&FailingEngine, 4, b"img");
        assert!(outcome.fragments.is_empty());
        assert!(matches!(
            outcome.error,
            Some(PipelineError::RecognitionUnavailable { page_index: 4, .. })
        ));
    }

    #[test]
    fn test_malformed_detections_counted() {
        let json = br#"[
            [[[0,0],[10,0],[10,5],[0,5]], "A1", 0.9],
            [[[0,0],[10,0],[10,5]], "B2", 0.9],
            [[[0,0],[10,0],[10,5],[0,"x"]], "C3", 0.9]
        ]"#;
        let outcome = recognize_page(&JsonDetectionsEngine, 0, json);
        assert_eq!(outcome.fragments.len(), 1);
        assert_eq!(outcome.dropped, 2);
        assert!(outcome.error.is_none());
        assert_eq!(outcome.fragments[0].index(), 0);
    }

    #[test]
    fn test_incomplete_record_dropped_without_losing_page() {
        let json = br#"[
            {"text":"AB12","bbox":[[0,0],[10,0],[10,5],[0,5]],"confidence":0.9},
            {"text":"CD34","bbox":[[0,20],[10,20],[10,25],[0,25]]},
            {"text":null,"bbox":[[0,40],[10,40],[10,45],[0,45]],"confidence":0.9},
            [[[0,60],[10,60],[10,65],[0,65]], "EF56"]
        ]"#;
        let outcome = recognize_page(&JsonDetectionsEngine, 0, json);
        assert!(outcome.error.is_none());
        assert_eq!(outcome.dropped, 3);
        assert_eq!(outcome.fragments.len(), 1);
        assert_eq!(outcome.fragments[0].text(), "AB12");
    }

    #[test]
    fn test_empty_result_is_flagged() {
        let outcome = recognize_page(&JsonDetectionsEngine, 1, b"[]");
        assert!(outcome.fragments.is_empty());
        assert!(outcome.error.is_some());
    }

    #[test]
    fn test_joined_text() {
        let json = br#"[
            [[[0,0],[10,0],[10,5],[0,5]], "Part", 0.9],
            [[[12,0],[30,0],[30,5],[12,5]], "AB12", 0.9]
        ]"#;
        let outcome = recognize_page(&JsonDetectionsEngine, 0, json);
        assert_eq!(outcome.joined_text(), "Part AB12");
    }
}
