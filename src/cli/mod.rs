//! Operator command handlers
//!
//! Glue between the binary's arguments and the pipeline: engine and
//! collaborator selection from configuration, the review loop over a
//! document's pages, and the non-interactive commands.

pub mod review;

pub use review::{parse_command, OperatorCommand, PageOutcome, ReviewDriver};

use anyhow::{Context, Result};
use serde::Serialize;
use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

use crate::config::{save_config, AppConfig};
use crate::export::{
    assemble_document, export_barcodes, save_barcodes, write_identifier_list, CommandAssembler, CommandRenderer,
};
use crate::pipeline::{CandidateView, PageProcessor};
use crate::storage::{self, FeedbackDatabase, FeedbackRecord, FeedbackWriter};
use crate::validation::{DocumentSession, DocumentSnapshot};
use crate::vision::{CommandEngine, JsonDetectionsEngine, RecognitionEngine};

/// Upper bound on waiting for queued feedback at exit
const FEEDBACK_FLUSH_TIMEOUT: Duration = Duration::from_secs(5);

/// Recognizer for the configured command, or JSON detection files when unset
pub fn engine_from_config(config: &AppConfig) -> Result<Box<dyn RecognitionEngine>> {
    match config.recognition.command.as_deref() {
        Some(command) => {
            let engine = CommandEngine::from_command_line(command)?;
            info!("Using recognition command '{}'", engine.program());
            Ok(Box::new(engine))
        }
        None => {
            info!("No recognition command configured; pages are read as JSON detections");
            Ok(Box::new(JsonDetectionsEngine))
        }
    }
}

fn read_page(path: &Path) -> Result<Vec<u8>> {
    std::fs::read(path).with_context(|| format!("Failed to read page {}", path.display()))
}

/// JSON form of one processed page
#[derive(Debug, Serialize)]
pub struct PageReport {
    pub page_index: usize,
    pub source: PathBuf,
    pub raw_text: String,
    pub dropped_fragments: usize,
    pub recognition_error: Option<String>,
    pub candidates: Vec<CandidateView>,
}

/// Process every page without operator input
pub fn extract(config: &AppConfig, pages: &[PathBuf]) -> Result<Vec<PageReport>> {
    let processor = PageProcessor::from_config(config)?;
    let engine = engine_from_config(config)?;

    let mut reports = Vec::with_capacity(pages.len());
    for (page_index, path) in pages.iter().enumerate() {
        let image = read_page(path)?;
        let review = processor.process_page(page_index, engine.as_ref(), &image);
        reports.push(PageReport {
            page_index,
            source: path.clone(),
            raw_text: review.raw_text.clone(),
            dropped_fragments: review.dropped_fragments,
            recognition_error: review.recognition_error.as_ref().map(ToString::to_string),
            candidates: processor.views(&review.gate),
        });
    }
    Ok(reports)
}

fn open_feedback_writer(config: &AppConfig) -> Option<FeedbackWriter> {
    if !config.storage.enabled {
        return None;
    }
    let path = match config.storage.database_path.clone() {
        Some(path) => path,
        None => match storage::default_database_path() {
            Ok(path) => path,
            Err(e) => {
                warn!("Feedback disabled: {:#}", e);
                return None;
            }
        },
    };
    match FeedbackDatabase::open(&path) {
        Ok(db) => Some(FeedbackWriter::spawn(db)),
        Err(e) => {
            warn!("Feedback disabled: {:#}", e);
            None
        }
    }
}

/// Interactive review of a document's pages
///
/// Returns the finalized snapshot after writing the configured outputs.
pub fn review<R: BufRead, W: Write>(
    config: &AppConfig,
    pages: &[PathBuf],
    input: R,
    mut output: W,
) -> Result<DocumentSnapshot> {
    let processor = PageProcessor::from_config(config)?;
    let engine = engine_from_config(config)?;
    let mut session = DocumentSession::new(config.validation.deduplicate);
    let feedback = open_feedback_writer(config);

    info!("Session {} started with {} page(s)", session.id(), pages.len());
    {
        let mut driver = ReviewDriver::new(&processor, input, &mut output);
        for (page_index, path) in pages.iter().enumerate() {
            let image = match read_page(path) {
                Ok(image) => image,
                Err(e) => {
                    warn!("{:#}", e);
                    continue;
                }
            };
            let mut page = processor.process_page(page_index, engine.as_ref(), &image);

            match driver.review_page(&mut page, &mut session)? {
                PageOutcome::Committed(validated) => {
                    if let Some(writer) = &feedback {
                        let values: Vec<&str> = validated.iter().map(|v| v.value.as_str()).collect();
                        writer.submit(FeedbackRecord::new(
                            session.id(),
                            page_index,
                            image,
                            page.raw_text.clone(),
                            &values,
                            &config.storage.delimiter,
                        ));
                    }
                }
                PageOutcome::Skipped => info!("Page {} skipped", page_index),
                PageOutcome::Quit => break,
            }
        }
    }

    let snapshot = session.finalize_document();
    if let Err(e) = write_outputs(config, &snapshot, &mut output) {
        warn!("Output for session {} incomplete: {:#}", snapshot.session_id, e);
        writeln!(output, "Output incomplete: {:#}", e)?;
    }

    if let Some(writer) = feedback {
        writer.shutdown(FEEDBACK_FLUSH_TIMEOUT);
    }
    Ok(snapshot)
}

/// Identifier list, barcodes and document for a finalized session
fn write_outputs<W: Write>(config: &AppConfig, snapshot: &DocumentSnapshot, output: &mut W) -> Result<()> {
    if snapshot.identifiers.is_empty() {
        writeln!(output, "No identifiers validated")?;
        return Ok(());
    }

    let dir = config.export.output_dir.join(snapshot.session_id.to_string());
    std::fs::create_dir_all(&dir).with_context(|| format!("Failed to create {}", dir.display()))?;

    let list_path = dir.join("identifiers.txt");
    write_identifier_list(snapshot, &list_path)?;
    writeln!(output, "{} identifier(s) written to {}", snapshot.identifiers.len(), list_path.display())?;

    let Some(command) = config.export.barcode_command.as_deref() else {
        return Ok(());
    };
    let renderer = CommandRenderer::from_command_line(command)?;
    let batch = export_barcodes(&renderer, snapshot);
    for rejection in &batch.rejected {
        writeln!(output, "{}", rejection)?;
    }
    let saved = save_barcodes(&batch, &dir.join("barcodes"))?;
    writeln!(output, "{} barcode(s) saved", saved.len())?;

    if let Some(command) = config.export.document_command.as_deref() {
        if batch.rendered.is_empty() {
            return Ok(());
        }
        let assembler = CommandAssembler::from_command_line(command)?;
        let document = assemble_document(&assembler, &batch)?;
        let document_path = dir.join("document.pdf");
        std::fs::write(&document_path, document)
            .with_context(|| format!("Failed to write {}", document_path.display()))?;
        writeln!(output, "Document written to {}", document_path.display())?;
    }
    Ok(())
}

/// Dump the feedback database as training CSV
pub fn export_feedback(config: &AppConfig, csv_path: &Path) -> Result<usize> {
    let db_path = match config.storage.database_path.clone() {
        Some(path) => path,
        None => storage::default_database_path()?,
    };
    let db = FeedbackDatabase::open(&db_path)?;
    db.export_csv(csv_path)
}

/// Write the default configuration, refusing to overwrite
pub fn init_config(path: &Path) -> Result<()> {
    if path.exists() {
        anyhow::bail!("{} already exists", path.display());
    }
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    save_config(&AppConfig::default(), path)?;
    info!("Wrote default configuration to {:?}", path);
    Ok(())
}
