//! Validation gate
//!
//! Per-page state machine deciding which candidates become validated
//! identifiers. Each candidate moves from `Pending` to `Validated` or
//! `Rejected` exactly once; the page itself closes on a successful
//! [`PageGate::confirm_page`].

use serde::Serialize;
use tracing::{debug, info};

use super::ValidatedIdentifier;
use crate::analysis::{Candidate, CandidateId, ConfusionTable, Origin, Sanitizer};
use crate::error::{PipelineError, Result};

/// Acceptance policy, applied uniformly to every candidate of a page
#[derive(Debug, Clone, PartialEq)]
pub enum GatePolicy {
    /// Operator confirms or rejects each candidate explicitly
    Manual,
    /// Below `threshold` confidence the operator must type a different value
    ConfidenceGated { threshold: f32 },
    /// Values with confusable characters need the supervisor token
    SupervisorOverride { token: String },
}

/// Lifecycle state of one candidate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CandidateState {
    Pending,
    Validated,
    Rejected,
}

impl CandidateState {
    pub fn is_terminal(self) -> bool {
        !matches!(self, CandidateState::Pending)
    }
}

/// Operator confirmation of a candidate
#[derive(Debug, Clone, Default)]
pub struct Confirmation {
    /// Retyped value; `None` confirms the value as shown
    pub text: Option<String>,
    /// Supervisor authorization token
    pub token: Option<String>,
}

impl Confirmation {
    pub fn as_shown() -> Self {
        Self::default()
    }

    pub fn with_text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            token: None,
        }
    }

    pub fn authorized(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }
}

/// A candidate tracked by the gate
#[derive(Debug, Clone, Serialize)]
pub struct GateEntry {
    /// Value currently shown to the operator
    current: Candidate,
    /// Value as first produced for this slot (recognized or typed)
    original: Candidate,
    state: CandidateState,
}

impl GateEntry {
    pub fn candidate(&self) -> &Candidate {
        &self.current
    }

    pub fn original(&self) -> &Candidate {
        &self.original
    }

    pub fn state(&self) -> CandidateState {
        self.state
    }

    pub fn id(&self) -> CandidateId {
        self.current.id()
    }
}

/// Validation state of one page
#[derive(Debug, Clone)]
pub struct PageGate {
    page_index: usize,
    policy: GatePolicy,
    confusion: ConfusionTable,
    sanitizer: Sanitizer,
    entries: Vec<GateEntry>,
    next_group_index: usize,
    closed: bool,
}

impl PageGate {
    pub fn new(
        page_index: usize,
        policy: GatePolicy,
        confusion: ConfusionTable,
        sanitizer: Sanitizer,
        candidates: Vec<Candidate>,
    ) -> Self {
        let next_group_index = candidates
            .iter()
            .map(|c| c.id().group_index + 1)
            .max()
            .unwrap_or(0);
        let entries = candidates
            .into_iter()
            .map(|c| GateEntry {
                original: c.clone(),
                current: c,
                state: CandidateState::Pending,
            })
            .collect();

        Self {
            page_index,
            policy,
            confusion,
            sanitizer,
            entries,
            next_group_index,
            closed: false,
        }
    }

    pub fn page_index(&self) -> usize {
        self.page_index
    }

    pub fn policy(&self) -> &GatePolicy {
        &self.policy
    }

    pub fn entries(&self) -> &[GateEntry] {
        &self.entries
    }

    pub fn entry(&self, id: CandidateId) -> Option<&GateEntry> {
        self.entries.iter().find(|e| e.id() == id)
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Ids of candidates still pending
    pub fn unresolved(&self) -> Vec<CandidateId> {
        self.entries
            .iter()
            .filter(|e| !e.state.is_terminal())
            .map(GateEntry::id)
            .collect()
    }

    /// Add an operator-typed candidate to the page
    pub fn add_manual(&mut self, raw: &str) -> Result<CandidateId> {
        self.ensure_open()?;
        let id = CandidateId::new(self.page_index, self.next_group_index, 0);
        self.next_group_index += 1;
        let candidate = Candidate::new(id, raw, None, Origin::Manual, &self.sanitizer);
        self.entries.push(GateEntry {
            original: candidate.clone(),
            current: candidate,
            state: CandidateState::Pending,
        });
        debug!("Added manual candidate {} on page {}", id, self.page_index);
        Ok(id)
    }

    /// Replace the shown value of a pending candidate
    pub fn correct(&mut self, id: CandidateId, raw: &str) -> Result<()> {
        let sanitizer = self.sanitizer.clone();
        let entry = self.pending_entry_mut(id)?;
        entry.current = entry.current.corrected(raw, &sanitizer);
        Ok(())
    }

    /// Reject a pending candidate
    pub fn reject(&mut self, id: CandidateId) -> Result<()> {
        let entry = self.pending_entry_mut(id)?;
        entry.state = CandidateState::Rejected;
        debug!("Rejected candidate {}", id);
        Ok(())
    }

    /// Try to validate a pending candidate under the page policy
    ///
    /// A refused confirmation leaves the candidate pending.
    pub fn confirm(&mut self, id: CandidateId, confirmation: Confirmation) -> Result<ValidatedIdentifier> {
        let page_index = self.page_index;
        let policy = self.policy.clone();
        let confusion = self.confusion.clone();
        let sanitizer = self.sanitizer.clone();
        let entry = self.pending_entry_mut(id)?;

        let submitted = match confirmation.text {
            Some(text) if text != entry.current.raw() => entry.current.corrected(text, &sanitizer),
            _ => entry.current.clone(),
        };

        if submitted.is_empty() {
            return Err(PipelineError::SanitizationEmpty { id });
        }

        match &policy {
            GatePolicy::Manual => {}
            GatePolicy::ConfidenceGated { threshold } => {
                let original = &entry.original;
                if let Some(confidence) = original.confidence() {
                    if original.origin() == Origin::Ocr
                        && confidence < *threshold
                        && submitted.cleaned() == original.cleaned()
                    {
                        return Err(PipelineError::UnchangedLowConfidence {
                            id,
                            confidence,
                            threshold: *threshold,
                        });
                    }
                }
            }
            GatePolicy::SupervisorOverride { token } => {
                if confusion.has_confusables(submitted.cleaned())
                    && confirmation.token.as_deref() != Some(token.as_str())
                {
                    return Err(PipelineError::AuthorizationRequired { id });
                }
            }
        }

        let validated = ValidatedIdentifier {
            value: submitted.cleaned().to_string(),
            page_index,
            source: id,
        };
        entry.current = submitted;
        entry.state = CandidateState::Validated;
        debug!("Validated candidate {} as '{}'", id, validated.value);
        Ok(validated)
    }

    /// Close the page, returning its validated identifiers in page order
    ///
    /// Fails without changing anything while any candidate is pending or
    /// when nothing was validated.
    pub fn confirm_page(&mut self) -> Result<Vec<ValidatedIdentifier>> {
        self.ensure_open()?;

        let unresolved = self.unresolved();
        if !unresolved.is_empty() {
            return Err(PipelineError::ValidationIncomplete {
                page_index: self.page_index,
                unresolved,
            });
        }

        let validated: Vec<ValidatedIdentifier> = self
            .entries
            .iter()
            .filter(|e| e.state == CandidateState::Validated)
            .map(|e| ValidatedIdentifier {
                value: e.current.cleaned().to_string(),
                page_index: self.page_index,
                source: e.id(),
            })
            .collect();

        if validated.is_empty() {
            return Err(PipelineError::NothingValidated {
                page_index: self.page_index,
            });
        }

        self.closed = true;
        info!(
            "Page {} confirmed with {} identifier(s)",
            self.page_index,
            validated.len()
        );
        Ok(validated)
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed {
            return Err(PipelineError::PageClosed {
                page_index: self.page_index,
            });
        }
        Ok(())
    }

    fn pending_entry_mut(&mut self, id: CandidateId) -> Result<&mut GateEntry> {
        self.ensure_open()?;
        let entry = self
            .entries
            .iter_mut()
            .find(|e| e.id() == id)
            .ok_or(PipelineError::UnknownCandidate { id })?;
        if entry.state.is_terminal() {
            return Err(PipelineError::AlreadyResolved { id });
        }
        Ok(entry)
    }
}
