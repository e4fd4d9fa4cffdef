//! Validation
//!
//! Operator-driven acceptance of candidates, page by page, and the
//! document-level accumulation of the accepted identifiers.

pub mod gate;
pub mod session;

pub use gate::{CandidateState, Confirmation, GateEntry, GatePolicy, PageGate};
pub use session::{DocumentSession, DocumentSnapshot};

use serde::Serialize;

use crate::analysis::CandidateId;

/// An operator-confirmed identifier, ready for barcode generation
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidatedIdentifier {
    /// Sanitized identifier value
    pub value: String,
    /// Page the identifier was confirmed on
    pub page_index: usize,
    /// Candidate it was confirmed from
    pub source: CandidateId,
}
