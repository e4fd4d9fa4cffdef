//! Text analysis
//!
//! Turns a page's fragments into sanitized identifier candidates:
//! geometric grouping, label/value association, sanitization and
//! confusion flagging.

pub mod candidate;
pub mod confusion;
pub mod grouping;
pub mod labels;
pub mod sanitize;

pub use candidate::{split_manual_entry, Candidate, CandidateId, Origin};
pub use confusion::{AnnotatedText, ConfusionTable, Span};
pub use grouping::{group, Axis, FragmentGroup, Grouper, ReferencePolicy};
pub use labels::{LabelAssociator, DEFAULT_LABELS};
pub use sanitize::{sanitize, Sanitizer, DEFAULT_PREFIX_TOKENS};
