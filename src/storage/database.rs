//! SQLite feedback store
//!
//! Append-only record of what the recognizer read and what the operator
//! validated, kept as training material for later correction models.

use anyhow::{Context, Result};
use rusqlite::{params, Connection};
use std::path::Path;
use tracing::info;
use uuid::Uuid;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS feedback (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    session_id TEXT NOT NULL,
    page_index INTEGER NOT NULL,
    image BLOB NOT NULL,
    ocr_text TEXT NOT NULL,
    corrected_text TEXT NOT NULL,
    created_at TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE INDEX IF NOT EXISTS idx_feedback_session ON feedback(session_id);
"#;

/// CSV header of the training export
const CSV_HEADER: [&str; 2] = ["ocr_text", "corrected_text"];

/// One validated page
#[derive(Debug, Clone, PartialEq)]
pub struct FeedbackRecord {
    pub session_id: Uuid,
    pub page_index: usize,
    /// Page image as submitted to recognition
    pub image: Vec<u8>,
    /// Space-joined recognizer output
    pub ocr_text: String,
    /// Validated identifiers, delimiter-joined
    pub corrected_text: String,
}

impl FeedbackRecord {
    pub fn new(
        session_id: Uuid,
        page_index: usize,
        image: Vec<u8>,
        ocr_text: impl Into<String>,
        identifiers: &[&str],
        delimiter: &str,
    ) -> Self {
        Self {
            session_id,
            page_index,
            image,
            ocr_text: ocr_text.into(),
            corrected_text: identifiers.join(delimiter),
        }
    }
}

/// Append-only sink for feedback records
pub trait FeedbackStore: Send {
    fn append(&mut self, record: &FeedbackRecord) -> Result<()>;
}

/// Feedback database backed by SQLite
pub struct FeedbackDatabase {
    conn: Connection,
}

impl FeedbackDatabase {
    /// Open or create the database at path
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open feedback database {}", path.display()))?;
        conn.execute_batch(SCHEMA)?;
        info!("Opened feedback database {:?}", path);
        Ok(Self { conn })
    }

    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self { conn })
    }

    pub fn count(&self) -> Result<usize> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM feedback", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    /// Recorded (ocr_text, corrected_text) pairs, oldest first
    pub fn pairs(&self) -> Result<Vec<(String, String)>> {
        let mut stmt = self
            .conn
            .prepare_cached("SELECT ocr_text, corrected_text FROM feedback ORDER BY id")?;
        let rows = stmt.query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))?;
        let pairs = rows.collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(pairs)
    }

    /// Write every record as an `ocr_text,corrected_text` CSV row
    ///
    /// Returns the number of rows written.
    pub fn export_csv(&self, path: &Path) -> Result<usize> {
        let pairs = self.pairs()?;
        let mut wtr =
            csv::Writer::from_path(path).with_context(|| format!("Failed to create {}", path.display()))?;

        wtr.write_record(CSV_HEADER).context("Failed to write CSV header")?;
        for (ocr_text, corrected_text) in &pairs {
            wtr.write_record([ocr_text, corrected_text])
                .context("Failed to write CSV row")?;
        }
        wtr.flush()?;

        info!("Exported {} feedback row(s) to {:?}", pairs.len(), path);
        Ok(pairs.len())
    }
}

impl FeedbackStore for FeedbackDatabase {
    fn append(&mut self, record: &FeedbackRecord) -> Result<()> {
        self.conn
            .execute(
                "INSERT INTO feedback (session_id, page_index, image, ocr_text, corrected_text)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    record.session_id.to_string(),
                    record.page_index as i64,
                    record.image,
                    record.ocr_text,
                    record.corrected_text
                ],
            )
            .context("Failed to insert feedback record")?;
        Ok(())
    }
}
