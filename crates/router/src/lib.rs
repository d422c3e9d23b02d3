//! Outbound and inbound routing for edirelay.
//!
//! - [`OutboundRouter`] sends documents from the local pickup folder to the
//!   partner named in their ISA header and archives them afterwards.
//! - [`InboundRouter`] collects unmarked documents from every enabled
//!   partner into the local drop folder and marks them on the server.
//!
//! Both routers process one unit of work at a time and never abort a batch
//! because of a single document or partner. A [`RunLock`] keeps overlapping
//! invocations of the same direction apart.
//!
//! Delivery is at-least-once: a document is only archived (outbound) or
//! marked (inbound) after its transfer succeeded, and a failure in that
//! second step means the next run transfers it again.

pub mod archive;
pub mod inbound;
pub mod lock;
pub mod outbound;
pub mod report;

use std::path::PathBuf;
use std::time::Duration;

pub use inbound::InboundRouter;
pub use lock::{LockError, LockInfo, RunLock};
pub use outbound::OutboundRouter;
pub use report::{
    DocumentOutcome, DocumentReport, EntryFailure, EntryStage, InboundReport, OutboundReport,
    PartnerOutcome, PartnerReport, SkipReason,
};

/// Age after which a leftover run lock is considered abandoned.
pub const DEFAULT_STALE_LOCK_AFTER: Duration = Duration::from_secs(2 * 60 * 60);

/// Errors that stop a run before or while enumerating work.
#[derive(Debug, thiserror::Error)]
pub enum RouterError {
    #[error("Folder does not exist: {path}")]
    MissingDirectory { path: PathBuf },

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Lock(#[from] LockError),
}

#[cfg(test)]
pub(crate) mod test_helpers;
