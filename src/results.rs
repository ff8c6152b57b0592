//! Verification outcomes and their aggregation.

use serde::Serialize;

use crate::input::{InputRecord, ResolvedSchema, NOT_AVAILABLE};

/// Classification of one record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Verdict {
    Matched,
    Unmatched,
    Errored { reason: String },
}

impl Verdict {
    pub fn is_match(&self) -> bool {
        matches!(self, Verdict::Matched)
    }
}

/// Fields captured for the browsable summary of a matched record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Snapshot {
    pub title: String,
    pub fields: Vec<(String, String)>,
}

impl Snapshot {
    /// Build from the record's snapshot fields. Missing values become "N/A".
    pub fn capture(record: &InputRecord, schema: &ResolvedSchema) -> Self {
        let fields: Vec<(String, String)> = schema
            .snapshot_fields()
            .map(|(label, idx)| {
                let value = idx
                    .and_then(|i| record.value_at(i))
                    .unwrap_or(NOT_AVAILABLE)
                    .to_string();
                (label.to_string(), value)
            })
            .collect();

        let title = fields
            .first()
            .map(|(_, value)| value.clone())
            .unwrap_or_else(|| NOT_AVAILABLE.to_string());

        Self { title, fields }
    }
}

/// Result of verifying one record.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VerificationOutcome {
    pub record: InputRecord,
    pub url: String,
    pub verdict: Verdict,
    /// Present only for matched records
    pub snapshot: Option<Snapshot>,
}

impl VerificationOutcome {
    pub fn matched(record: InputRecord, url: String, schema: &ResolvedSchema) -> Self {
        let snapshot = Snapshot::capture(&record, schema);
        Self {
            record,
            url,
            verdict: Verdict::Matched,
            snapshot: Some(snapshot),
        }
    }

    pub fn unmatched(record: InputRecord, url: String) -> Self {
        Self {
            record,
            url,
            verdict: Verdict::Unmatched,
            snapshot: None,
        }
    }

    pub fn errored(record: InputRecord, url: String, reason: impl Into<String>) -> Self {
        Self {
            record,
            url,
            verdict: Verdict::Errored {
                reason: reason.into(),
            },
            snapshot: None,
        }
    }
}

/// Counts reported back to the caller.
///
/// `unmatched` includes errored records, so `matched + unmatched == total`
/// while `errored` is an overlapping subset of `unmatched`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub total: usize,
    pub matched: usize,
    pub unmatched: usize,
    pub errored: usize,
}

impl RunSummary {
    pub fn completion_message(&self) -> String {
        format!(
            "Verification completed. {} matching records out of {} total.",
            self.matched, self.total
        )
    }
}

/// Outcomes in input order, with matched/unmatched partitions kept as indices.
#[derive(Debug, Default)]
pub struct ResultSet {
    ordered: Vec<VerificationOutcome>,
    matched: Vec<usize>,
    unmatched: Vec<usize>,
    errors: usize,
}

impl ResultSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, outcome: VerificationOutcome) {
        let idx = self.ordered.len();
        match outcome.verdict {
            Verdict::Matched => self.matched.push(idx),
            Verdict::Unmatched => self.unmatched.push(idx),
            Verdict::Errored { .. } => {
                self.unmatched.push(idx);
                self.errors += 1;
            }
        }
        self.ordered.push(outcome);
    }

    pub fn ordered(&self) -> &[VerificationOutcome] {
        &self.ordered
    }

    pub fn matched(&self) -> impl Iterator<Item = &VerificationOutcome> + '_ {
        self.matched.iter().map(move |&i| &self.ordered[i])
    }

    /// Unmatched and errored outcomes, in input order.
    pub fn unmatched(&self) -> impl Iterator<Item = &VerificationOutcome> + '_ {
        self.unmatched.iter().map(move |&i| &self.ordered[i])
    }

    pub fn len(&self) -> usize {
        self.ordered.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ordered.is_empty()
    }

    pub fn summary(&self) -> RunSummary {
        RunSummary {
            total: self.ordered.len(),
            matched: self.matched.len(),
            unmatched: self.unmatched.len(),
            errored: self.errors,
        }
    }
}
