//! Reception serials - OCR extraction and operator validation of serial
//! and part numbers from scanned delivery documents.

pub mod analysis;
pub mod cli;
pub mod config;
pub mod error;
pub mod export;
pub mod pipeline;
pub mod storage;
pub mod validation;
pub mod vision;

pub use config::AppConfig;
pub use error::{PipelineError, Result};
pub use pipeline::{CandidateView, PageProcessor, PageReview};
pub use validation::{DocumentSession, DocumentSnapshot, ValidatedIdentifier};
