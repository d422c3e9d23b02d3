//! Per-run results returned by the routers.
//!
//! Every document (outbound) or partner (inbound) ends up with exactly one
//! outcome, so a caller can tell what happened to each unit of work without
//! parsing logs.

use std::fmt;
use std::path::PathBuf;

use edirelay_core::{ArchiveError, EnvelopeError, TransportError};

/// Why an outbound document was left in the pickup folder untouched.
#[derive(Debug)]
pub enum SkipReason {
    MalformedEnvelope(EnvelopeError),
    PartnerNotFound { partner_id: String },
    PartnerDisabled { partner_id: String },
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MalformedEnvelope(e) => write!(f, "malformed envelope: {e}"),
            Self::PartnerNotFound { partner_id } => write!(f, "unknown partner {partner_id}"),
            Self::PartnerDisabled { partner_id } => write!(f, "partner {partner_id} is disabled"),
        }
    }
}

#[derive(Debug)]
pub enum DocumentOutcome {
    /// Uploaded and moved into the archive.
    Archived {
        partner_id: String,
        destination: PathBuf,
    },
    Skipped(SkipReason),
    /// Upload did not complete; the document stays for the next run.
    TransferFailed {
        partner_id: String,
        error: TransportError,
    },
    /// Uploaded, but still in the pickup folder. The next run sends it again.
    ArchiveFailed {
        partner_id: String,
        error: ArchiveError,
    },
}

impl DocumentOutcome {
    /// The partner received the document.
    pub fn is_delivered(&self) -> bool {
        matches!(self, Self::Archived { .. } | Self::ArchiveFailed { .. })
    }
}

#[derive(Debug)]
pub struct DocumentReport {
    pub document: PathBuf,
    pub outcome: DocumentOutcome,
}

#[derive(Debug, Default)]
pub struct OutboundReport {
    pub documents: Vec<DocumentReport>,
}

impl OutboundReport {
    pub fn succeeded(&self) -> usize {
        self.count(|o| matches!(o, DocumentOutcome::Archived { .. }))
    }

    /// Transfer and archive failures together.
    pub fn failed(&self) -> usize {
        self.transfer_failures() + self.archive_failures()
    }

    pub fn skipped(&self) -> usize {
        self.count(|o| matches!(o, DocumentOutcome::Skipped(_)))
    }

    pub fn transfer_failures(&self) -> usize {
        self.count(|o| matches!(o, DocumentOutcome::TransferFailed { .. }))
    }

    pub fn archive_failures(&self) -> usize {
        self.count(|o| matches!(o, DocumentOutcome::ArchiveFailed { .. }))
    }

    pub fn total(&self) -> usize {
        self.documents.len()
    }

    fn count(&self, pred: impl Fn(&DocumentOutcome) -> bool) -> usize {
        self.documents.iter().filter(|d| pred(&d.outcome)).count()
    }
}

impl fmt::Display for OutboundReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} document(s): {} sent, {} failed, {} skipped",
            self.total(),
            self.succeeded(),
            self.failed(),
            self.skipped()
        )
    }
}

/// Step at which a single inbound file failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryStage {
    /// Name not safe to use as a local file name.
    Rejected,
    Download,
    Mark,
}

impl fmt::Display for EntryStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Rejected => "rejected",
            Self::Download => "download",
            Self::Mark => "mark",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryFailure {
    pub name: String,
    pub stage: EntryStage,
    pub error: String,
}

#[derive(Debug)]
pub enum PartnerOutcome {
    Completed {
        /// Files in the listing.
        listed: usize,
        /// Files carrying the marker prefix, ignored.
        already_marked: usize,
        /// Files now in the drop folder.
        downloaded: Vec<String>,
        /// Downloaded files that were also marked on the server.
        marked: usize,
        failures: Vec<EntryFailure>,
    },
    ConnectFailed(TransportError),
    ListFailed(TransportError),
}

#[derive(Debug)]
pub struct PartnerReport {
    pub partner_id: String,
    pub partner_name: String,
    pub outcome: PartnerOutcome,
}

#[derive(Debug, Default)]
pub struct InboundReport {
    pub partners: Vec<PartnerReport>,
}

impl InboundReport {
    pub fn downloaded(&self) -> usize {
        self.partners
            .iter()
            .map(|p| match &p.outcome {
                PartnerOutcome::Completed { downloaded, .. } => downloaded.len(),
                _ => 0,
            })
            .sum()
    }

    /// Partners that could not be reached or listed.
    pub fn unreachable(&self) -> usize {
        self.partners
            .iter()
            .filter(|p| !matches!(p.outcome, PartnerOutcome::Completed { .. }))
            .count()
    }

    /// Individual file failures across reachable partners.
    pub fn file_failures(&self) -> usize {
        self.partners
            .iter()
            .map(|p| match &p.outcome {
                PartnerOutcome::Completed { failures, .. } => failures.len(),
                _ => 0,
            })
            .sum()
    }

    pub fn has_failures(&self) -> bool {
        self.unreachable() > 0 || self.file_failures() > 0
    }
}

impl fmt::Display for InboundReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} partner(s): {} file(s) collected, {} partner(s) unreachable, {} file failure(s)",
            self.partners.len(),
            self.downloaded(),
            self.unreachable(),
            self.file_failures()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(outcome: DocumentOutcome) -> DocumentReport {
        DocumentReport {
            document: "pickup/a.edi".into(),
            outcome,
        }
    }

    #[test]
    fn outbound_counts_and_summary() {
        let report = OutboundReport {
            documents: vec![
                doc(DocumentOutcome::Archived {
                    partner_id: "A".into(),
                    destination: "archive/a.edi".into(),
                }),
                doc(DocumentOutcome::Skipped(SkipReason::PartnerNotFound {
                    partner_id: "Z".into(),
                })),
                doc(DocumentOutcome::TransferFailed {
                    partner_id: "A".into(),
                    error: TransportError::Aborted("boom".into()),
                }),
                doc(DocumentOutcome::ArchiveFailed {
                    partner_id: "A".into(),
                    error: ArchiveError::EmptyFileName,
                }),
            ],
        };
        assert_eq!(report.succeeded(), 1);
        assert_eq!(report.failed(), 2);
        assert_eq!(report.skipped(), 1);
        assert_eq!(report.archive_failures(), 1);
        assert_eq!(report.to_string(), "4 document(s): 1 sent, 2 failed, 1 skipped");
    }

    #[test]
    fn archive_failure_still_counts_as_delivered() {
        let outcome = DocumentOutcome::ArchiveFailed {
            partner_id: "A".into(),
            error: ArchiveError::EmptyFileName,
        };
        assert!(outcome.is_delivered());
        assert!(!DocumentOutcome::Skipped(SkipReason::MalformedEnvelope(EnvelopeError::Empty))
            .is_delivered());
    }

    #[test]
    fn skip_reasons_read_naturally() {
        let reason = SkipReason::PartnerDisabled {
            partner_id: "6048558786".into(),
        };
        assert_eq!(reason.to_string(), "partner 6048558786 is disabled");
    }

    #[test]
    fn inbound_aggregates() {
        let report = InboundReport {
            partners: vec![
                PartnerReport {
                    partner_id: "A".into(),
                    partner_name: "Alpha".into(),
                    outcome: PartnerOutcome::Completed {
                        listed: 3,
                        already_marked: 1,
                        downloaded: vec!["one.edi".into()],
                        marked: 1,
                        failures: vec![EntryFailure {
                            name: "two.edi".into(),
                            stage: EntryStage::Download,
                            error: "gone".into(),
                        }],
                    },
                },
                PartnerReport {
                    partner_id: "B".into(),
                    partner_name: "Beta".into(),
                    outcome: PartnerOutcome::ConnectFailed(TransportError::Aborted("x".into())),
                },
            ],
        };
        assert_eq!(report.downloaded(), 1);
        assert_eq!(report.unreachable(), 1);
        assert_eq!(report.file_failures(), 1);
        assert!(report.has_failures());
        assert!(!InboundReport::default().has_failures());
    }
}
