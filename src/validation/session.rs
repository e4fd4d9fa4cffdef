//! Document-scoped accumulation of validated identifiers

use serde::Serialize;
use std::collections::HashSet;
use tracing::info;
use uuid::Uuid;

use super::gate::PageGate;
use super::ValidatedIdentifier;
use crate::error::Result;

/// Accumulates validated identifiers across the pages of one document
///
/// Passed by reference into each page's processing; nothing is shared
/// between sessions.
#[derive(Debug, Clone)]
pub struct DocumentSession {
    id: Uuid,
    identifiers: Vec<ValidatedIdentifier>,
    committed_pages: Vec<usize>,
    deduplicate: bool,
}

impl DocumentSession {
    pub fn new(deduplicate: bool) -> Self {
        Self {
            id: Uuid::new_v4(),
            identifiers: Vec::new(),
            committed_pages: Vec::new(),
            deduplicate,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Confirm `gate`'s page and append its identifiers
    ///
    /// On failure nothing is appended and the page stays open.
    pub fn commit_page(&mut self, gate: &mut PageGate) -> Result<Vec<ValidatedIdentifier>> {
        let validated = gate.confirm_page()?;
        self.identifiers.extend(validated.iter().cloned());
        self.committed_pages.push(gate.page_index());
        info!(
            "Session {}: page {} committed, {} identifier(s) so far",
            self.id,
            gate.page_index(),
            self.identifiers.len()
        );
        Ok(validated)
    }

    pub fn identifiers(&self) -> &[ValidatedIdentifier] {
        &self.identifiers
    }

    pub fn committed_pages(&self) -> &[usize] {
        &self.committed_pages
    }

    /// Snapshot of the document's identifiers, in commit order
    ///
    /// Duplicates are kept unless the session was created with
    /// deduplication, in which case the first occurrence wins.
    pub fn finalize_document(&self) -> DocumentSnapshot {
        let identifiers = if self.deduplicate {
            let mut seen = HashSet::new();
            self.identifiers
                .iter()
                .filter(|id| seen.insert(id.value.clone()))
                .cloned()
                .collect()
        } else {
            self.identifiers.clone()
        };

        DocumentSnapshot {
            session_id: self.id,
            pages: self.committed_pages.clone(),
            identifiers,
        }
    }
}

/// Immutable result of a document session
#[derive(Debug, Clone, Serialize)]
pub struct DocumentSnapshot {
    pub session_id: Uuid,
    pub pages: Vec<usize>,
    pub identifiers: Vec<ValidatedIdentifier>,
}

impl DocumentSnapshot {
    pub fn values(&self) -> Vec<&str> {
        self.identifiers.iter().map(|id| id.value.as_str()).collect()
    }
}
