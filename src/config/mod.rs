//! Application Configuration
//!
//! Pipeline settings stored in TOML format.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::analysis::{
    Axis, ConfusionTable, Grouper, LabelAssociator, ReferencePolicy, Sanitizer, DEFAULT_LABELS,
    DEFAULT_PREFIX_TOKENS,
};
use crate::error::PipelineError;
use crate::validation::GatePolicy;

/// Application settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Fragment grouping
    pub grouping: GroupingConfig,
    /// Field labels
    pub labels: LabelConfig,
    /// Identifier sanitization
    pub sanitizer: SanitizerConfig,
    /// Confusable characters
    pub confusion: ConfusionConfig,
    /// Validation gate
    pub validation: ValidationConfig,
    /// External recognizer
    pub recognition: RecognitionConfig,
    /// Barcode and document output
    pub export: ExportConfig,
    /// Feedback persistence
    pub storage: StorageConfig,
}

/// Geometric grouping settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GroupingConfig {
    /// Line or column grouping
    pub axis: Axis,
    /// Maximum coordinate distance (pixels) to the group reference
    pub threshold: f32,
    /// Running average or fixed reference coordinate
    pub reference: ReferencePolicy,
}

impl Default for GroupingConfig {
    fn default() -> Self {
        Self {
            axis: Axis::Line,
            threshold: 15.0,
            reference: ReferencePolicy::RunningAverage,
        }
    }
}

/// Label detection settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LabelConfig {
    /// Label phrases, matched case-insensitively
    pub patterns: Vec<String>,
    /// Minimum similarity (0.0 - 1.0) for approximate label matches; unset disables
    pub fuzzy_threshold: Option<f64>,
}

impl Default for LabelConfig {
    fn default() -> Self {
        Self {
            patterns: DEFAULT_LABELS.iter().map(|s| s.to_string()).collect(),
            fuzzy_threshold: Some(0.85),
        }
    }
}

/// Sanitizer settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SanitizerConfig {
    /// Prefix tokens stripped from candidates
    pub prefix_tokens: Vec<String>,
}

impl Default for SanitizerConfig {
    fn default() -> Self {
        Self {
            prefix_tokens: DEFAULT_PREFIX_TOKENS.iter().map(|s| s.to_string()).collect(),
        }
    }
}

/// Confusion detector settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfusionConfig {
    /// Also treat B/8 and Z/2 as confusable
    pub extended_pairs: bool,
    /// Below this confidence, alternative readings are suggested (0.0 - 1.0)
    pub suggestion_threshold: f32,
}

impl Default for ConfusionConfig {
    fn default() -> Self {
        Self {
            extended_pairs: true,
            suggestion_threshold: 0.9,
        }
    }
}

/// Gate policy selector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicyKind {
    Manual,
    #[default]
    ConfidenceGated,
    SupervisorOverride,
}

/// Validation settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationConfig {
    /// Policy applied to every page of a session
    pub policy: PolicyKind,
    /// Confidence required for single-action confirmation (0.0 - 1.0)
    pub confidence_threshold: f32,
    /// Token expected by the supervisor policy
    pub supervisor_token: Option<String>,
    /// Drop repeated identifiers when finalizing a document
    pub deduplicate: bool,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            policy: PolicyKind::ConfidenceGated,
            confidence_threshold: 0.99,
            supervisor_token: None,
            deduplicate: false,
        }
    }
}

/// Recognition settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RecognitionConfig {
    /// Recognizer command line; reads image bytes on stdin, prints JSON detections
    pub command: Option<String>,
}

/// Output settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportConfig {
    /// Barcode renderer command line; reads the identifier on stdin, prints image bytes
    pub barcode_command: Option<String>,
    /// Document assembler command line; `{output}` and `{inputs}` are substituted
    pub document_command: Option<String>,
    /// Directory receiving identifier lists, barcodes and documents
    pub output_dir: PathBuf,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            barcode_command: None,
            document_command: None,
            output_dir: PathBuf::from("output"),
        }
    }
}

/// Feedback persistence settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Feedback database path; defaults to the application data directory
    pub database_path: Option<PathBuf>,
    /// Separator used to join a page's identifiers in a feedback record
    pub delimiter: String,
    /// Disable feedback recording entirely
    pub enabled: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: None,
            delimiter: "\n".to_string(),
            enabled: true,
        }
    }
}

impl AppConfig {
    /// Reject out-of-range values before any processing starts
    pub fn validate(&self) -> Result<(), PipelineError> {
        self.grouper()?;
        self.associator()?;

        let threshold = self.validation.confidence_threshold;
        if !(0.0..=1.0).contains(&threshold) {
            return Err(PipelineError::invalid(
                "validation.confidence_threshold",
                format!("must be within [0, 1], got {}", threshold),
            ));
        }
        let suggestion = self.confusion.suggestion_threshold;
        if !(0.0..=1.0).contains(&suggestion) {
            return Err(PipelineError::invalid(
                "confusion.suggestion_threshold",
                format!("must be within [0, 1], got {}", suggestion),
            ));
        }
        self.gate_policy()?;
        Ok(())
    }

    pub fn grouper(&self) -> Result<Grouper, PipelineError> {
        Grouper::new(self.grouping.axis, self.grouping.threshold, self.grouping.reference)
    }

    pub fn sanitizer(&self) -> Sanitizer {
        Sanitizer::new(&self.sanitizer.prefix_tokens)
    }

    pub fn associator(&self) -> Result<LabelAssociator, PipelineError> {
        LabelAssociator::new(&self.labels.patterns, self.labels.fuzzy_threshold, self.sanitizer())
    }

    pub fn confusion_table(&self) -> ConfusionTable {
        ConfusionTable::new(self.confusion.extended_pairs)
    }

    pub fn gate_policy(&self) -> Result<GatePolicy, PipelineError> {
        match self.validation.policy {
            PolicyKind::Manual => Ok(GatePolicy::Manual),
            PolicyKind::ConfidenceGated => Ok(GatePolicy::ConfidenceGated {
                threshold: self.validation.confidence_threshold,
            }),
            PolicyKind::SupervisorOverride => match self.validation.supervisor_token.as_deref() {
                Some(token) if !token.trim().is_empty() => Ok(GatePolicy::SupervisorOverride {
                    token: token.to_string(),
                }),
                _ => Err(PipelineError::invalid(
                    "validation.supervisor_token",
                    "required by the supervisor_override policy",
                )),
            },
        }
    }
}

/// Load configuration from file
pub fn load_config(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path)?;
    let config: AppConfig = toml::from_str(&content)?;
    Ok(config)
}

/// Save configuration to file
pub fn save_config(config: &AppConfig, path: &Path) -> Result<()> {
    let content = toml::to_string_pretty(config)?;
    std::fs::write(path, content)?;
    Ok(())
}
