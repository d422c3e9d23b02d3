//! Outbound routing: pickup folder -> partner server -> archive.

use std::path::{Path, PathBuf};
use std::time::Duration;

use edirelay_core::{
    MasterSettings, Partner, PartnerDirectory, Resolution, TransportError, TransportRegistry,
    read_receiver_id,
};
use tracing::{debug, error, info, warn};

use crate::archive::archive_document;
use crate::lock::RunLock;
use crate::report::{DocumentOutcome, DocumentReport, OutboundReport, SkipReason};
use crate::{DEFAULT_STALE_LOCK_AFTER, RouterError};

pub const DIRECTION: &str = "outbound";

/// Sends every document in the pickup folder to the partner named by its
/// ISA08 receiver identifier.
///
/// Documents are processed one at a time in file-name order. One connection
/// is opened per document. A document only leaves the pickup folder after a
/// confirmed upload.
pub struct OutboundRouter<'a> {
    settings: &'a MasterSettings,
    directory: &'a PartnerDirectory,
    transports: &'a TransportRegistry,
    stale_lock_after: Duration,
}

impl<'a> OutboundRouter<'a> {
    pub fn new(
        settings: &'a MasterSettings,
        directory: &'a PartnerDirectory,
        transports: &'a TransportRegistry,
    ) -> Self {
        Self {
            settings,
            directory,
            transports,
            stale_lock_after: DEFAULT_STALE_LOCK_AFTER,
        }
    }

    pub fn with_stale_lock_after(mut self, stale_after: Duration) -> Self {
        self.stale_lock_after = stale_after;
        self
    }

    /// Process the whole pickup folder.
    ///
    /// Fails only when the folder is missing or another outbound run holds
    /// the lock. Per-document failures are reported, not returned.
    pub async fn run(&self) -> Result<OutboundReport, RouterError> {
        let pickup = &self.settings.pickup_dir;
        if !tokio::fs::metadata(pickup)
            .await
            .map(|m| m.is_dir())
            .unwrap_or(false)
        {
            return Err(RouterError::MissingDirectory {
                path: pickup.clone(),
            });
        }

        let _lock = RunLock::acquire(pickup, DIRECTION, self.stale_lock_after).await?;

        info!(
            pickup = %pickup.display(),
            archive = %self.settings.archive_root.display(),
            partners = self.directory.len(),
            "Outbound run started"
        );

        let documents = discover_documents(pickup).await?;
        if documents.is_empty() {
            info!("No documents waiting in pickup folder");
        } else {
            info!(count = documents.len(), "Documents found in pickup folder");
        }

        let mut report = OutboundReport::default();
        for document in documents {
            let outcome = self.process_document(&document).await;
            report.documents.push(DocumentReport { document, outcome });
        }

        info!(
            sent = report.succeeded(),
            failed = report.failed(),
            skipped = report.skipped(),
            "Outbound run finished: {report}"
        );
        if report.archive_failures() > 0 {
            warn!(
                count = report.archive_failures(),
                "Some delivered documents could not be archived and will be sent again next run"
            );
        }
        Ok(report)
    }

    /// Route a single document. Never fails; the outcome says what happened.
    pub async fn process_document(&self, document: &Path) -> DocumentOutcome {
        let file = display_name(document);

        let receiver = match read_receiver_id(document).await {
            Ok(id) => id,
            Err(e) => {
                error!(file = %file, error = %e, "Cannot read receiver from envelope, leaving document in place");
                return DocumentOutcome::Skipped(SkipReason::MalformedEnvelope(e));
            }
        };
        debug!(file = %file, receiver = %receiver, "Envelope parsed");

        let partner = match self.directory.resolve(&receiver) {
            Resolution::Found(partner) => partner,
            Resolution::Disabled(_) => {
                warn!(file = %file, partner_id = %receiver, "Partner is disabled, leaving document in place");
                return DocumentOutcome::Skipped(SkipReason::PartnerDisabled {
                    partner_id: receiver,
                });
            }
            Resolution::NotFound => {
                error!(file = %file, partner_id = %receiver, "No partner configured for receiver, leaving document in place");
                return DocumentOutcome::Skipped(SkipReason::PartnerNotFound {
                    partner_id: receiver,
                });
            }
        };

        info!(
            file = %file,
            partner_id = %partner.id,
            partner = %partner.name,
            protocol = %partner.protocol,
            "Sending document"
        );

        if let Err(e) = self.upload(partner, document).await {
            error!(file = %file, partner_id = %partner.id, error = %e, "Transfer failed, document stays for the next run");
            return DocumentOutcome::TransferFailed {
                partner_id: partner.id.clone(),
                error: e,
            };
        }
        info!(file = %file, partner_id = %partner.id, path = %partner.outbound_path, "Upload complete");

        match archive_document(self.settings, partner, document).await {
            Ok(destination) => {
                info!(file = %file, destination = %destination.display(), "Document archived");
                DocumentOutcome::Archived {
                    partner_id: partner.id.clone(),
                    destination,
                }
            }
            Err(e) => {
                error!(
                    file = %file,
                    partner_id = %partner.id,
                    error = %e,
                    "Document was delivered but could not be archived; it will be sent again on the next run"
                );
                DocumentOutcome::ArchiveFailed {
                    partner_id: partner.id.clone(),
                    error: e,
                }
            }
        }
    }

    async fn upload(&self, partner: &Partner, document: &Path) -> Result<(), TransportError> {
        let mut session = self.transports.connect(partner).await?;
        let result = session.upload(document, &partner.outbound_path).await;

        // A close failure does not change the upload result.
        if let Err(e) = session.close().await {
            warn!(partner_id = %partner.id, error = %e, "Closing connection failed");
        }
        result
    }
}

/// Regular, non-hidden files directly in `dir`, sorted by name.
///
/// Our own run lock is skipped silently. Other dot-files are usually
/// documents still being written, so they are skipped with a warning.
async fn discover_documents(dir: &Path) -> Result<Vec<PathBuf>, RouterError> {
    let io_error = |source| RouterError::Io {
        path: dir.to_path_buf(),
        source,
    };

    let lock_name = RunLock::file_name(DIRECTION);
    let mut entries = tokio::fs::read_dir(dir).await.map_err(io_error)?;
    let mut documents = Vec::new();
    while let Some(entry) = entries.next_entry().await.map_err(io_error)? {
        let name = entry.file_name();
        let name = name.to_string_lossy();
        if name == lock_name.as_str() {
            continue;
        }
        if name.starts_with('.') {
            warn!(path = %entry.path().display(), "Skipping hidden file in pickup folder");
            continue;
        }
        match entry.file_type().await {
            Ok(kind) if kind.is_file() => documents.push(entry.path()),
            Ok(_) => debug!(path = %entry.path().display(), "Skipping non-file entry"),
            Err(e) => warn!(path = %entry.path().display(), error = %e, "Cannot stat entry, skipping"),
        }
    }
    documents.sort();
    Ok(documents)
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}
