//! Inbound routing: every enabled partner's server -> local drop folder.
//!
//! The drop folder is shared with the enterprise system. Everything the
//! router keeps there besides finished documents is a dot-file: the run lock
//! and the `.<name>.part` files of downloads in progress. Consumers of the
//! folder should ignore names starting with `.`.

use std::path::{Path, PathBuf};
use std::time::Duration;

use edirelay_core::{
    MasterSettings, Partner, PartnerDirectory, RemoteMark, Session, TransportError,
    TransportRegistry,
};
use tracing::{debug, error, info, warn};

use crate::lock::RunLock;
use crate::report::{EntryFailure, EntryStage, InboundReport, PartnerOutcome, PartnerReport};
use crate::{DEFAULT_STALE_LOCK_AFTER, RouterError};

pub const DIRECTION: &str = "inbound";

/// Names in a listing that still need collecting, in listing order.
pub fn pending(names: &[String]) -> Vec<&str> {
    names
        .iter()
        .map(String::as_str)
        .filter(|name| RemoteMark::of(name) == RemoteMark::Unmarked)
        .collect()
}

/// A remote name that is safe to use as a file name in the drop folder.
fn is_safe_name(name: &str) -> bool {
    !name.is_empty()
        && name != "."
        && name != ".."
        && !name.contains('/')
        && !name.contains('\\')
        && !name.contains('\0')
}

/// Collects unmarked documents from each enabled partner, in configuration
/// order, and marks them on the server once they are safely on local disk.
pub struct InboundRouter<'a> {
    settings: &'a MasterSettings,
    directory: &'a PartnerDirectory,
    transports: &'a TransportRegistry,
    stale_lock_after: Duration,
}

impl<'a> InboundRouter<'a> {
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

    /// Poll every enabled partner once.
    ///
    /// The drop folder is created if missing. Fails only when it cannot be
    /// created or another inbound run holds the lock.
    pub async fn run(&self) -> Result<InboundReport, RouterError> {
        let dropoff = &self.settings.dropoff_dir;
        tokio::fs::create_dir_all(dropoff)
            .await
            .map_err(|source| RouterError::Io {
                path: dropoff.clone(),
                source,
            })?;

        let _lock = RunLock::acquire(dropoff, DIRECTION, self.stale_lock_after).await?;

        let partners: Vec<&Partner> = self.directory.active().collect();
        info!(
            dropoff = %dropoff.display(),
            partners = partners.len(),
            "Inbound run started"
        );

        let mut report = InboundReport::default();
        for partner in partners {
            report.partners.push(self.process_partner(partner).await);
        }

        info!(
            collected = report.downloaded(),
            unreachable = report.unreachable(),
            failures = report.file_failures(),
            "Inbound run finished: {report}"
        );
        Ok(report)
    }

    /// Collect from one partner. Never fails; problems end up in the report.
    pub async fn process_partner(&self, partner: &Partner) -> PartnerReport {
        info!(
            partner_id = %partner.id,
            partner = %partner.name,
            protocol = %partner.protocol,
            host = %partner.host,
            path = %partner.inbound_path,
            "Checking partner for inbound documents"
        );

        let outcome = match self.transports.connect(partner).await {
            Ok(mut session) => {
                let outcome = self.collect(partner, session.as_mut()).await;
                if let Err(e) = session.close().await {
                    warn!(partner_id = %partner.id, error = %e, "Closing connection failed");
                }
                outcome
            }
            Err(e) => {
                error!(partner_id = %partner.id, error = %e, "Cannot connect to partner, skipping");
                PartnerOutcome::ConnectFailed(e)
            }
        };

        PartnerReport {
            partner_id: partner.id.clone(),
            partner_name: partner.name.clone(),
            outcome,
        }
    }

    async fn collect(&self, partner: &Partner, session: &mut dyn Session) -> PartnerOutcome {
        let names = match session.list(&partner.inbound_path).await {
            Ok(names) => names,
            Err(e) => {
                error!(partner_id = %partner.id, error = %e, "Cannot list inbound folder, skipping");
                return PartnerOutcome::ListFailed(e);
            }
        };

        let todo = pending(&names);
        let already_marked = names.len() - todo.len();
        if todo.is_empty() {
            info!(partner_id = %partner.id, already_marked, "No new documents");
        } else {
            info!(partner_id = %partner.id, count = todo.len(), already_marked, "New documents found");
        }

        let mut downloaded = Vec::new();
        let mut marked = 0;
        let mut failures = Vec::new();

        if !todo.is_empty()
            && let Err(e) = tokio::fs::create_dir_all(&self.settings.dropoff_dir).await
        {
            error!(dropoff = %self.settings.dropoff_dir.display(), error = %e, "Cannot create drop folder");
            failures.extend(todo.iter().map(|name| EntryFailure {
                name: name.to_string(),
                stage: EntryStage::Download,
                error: e.to_string(),
            }));
            return PartnerOutcome::Completed {
                listed: names.len(),
                already_marked,
                downloaded,
                marked,
                failures,
            };
        }

        for name in todo {
            let fail = |stage: EntryStage, error: String| EntryFailure {
                name: name.to_string(),
                stage,
                error,
            };

            if !is_safe_name(name) {
                warn!(partner_id = %partner.id, file = %name, "Refusing remote file name");
                failures.push(fail(EntryStage::Rejected, format!("unsafe file name '{name}'")));
                continue;
            }

            if let Err(e) = self.download(session, partner, name).await {
                error!(partner_id = %partner.id, file = %name, error = %e, "Download failed, leaving file unmarked");
                failures.push(fail(EntryStage::Download, e.to_string()));
                continue;
            }
            info!(partner_id = %partner.id, file = %name, "Downloaded");
            downloaded.push(name.to_string());

            let marked_name = RemoteMark::marked_name(name);
            match session
                .rename(&partner.inbound_path, name, &marked_name)
                .await
            {
                Ok(()) => {
                    debug!(partner_id = %partner.id, from = %name, to = %marked_name, "Marked on server");
                    marked += 1;
                }
                Err(e) => {
                    error!(
                        partner_id = %partner.id,
                        file = %name,
                        error = %e,
                        "Downloaded but not marked on the server; it will be collected again next run"
                    );
                    failures.push(fail(EntryStage::Mark, e.to_string()));
                }
            }
        }

        PartnerOutcome::Completed {
            listed: names.len(),
            already_marked,
            downloaded,
            marked,
            failures,
        }
    }

    /// Download into a hidden partial file, then move it into place so the
    /// enterprise system never sees a half-written document.
    async fn download(
        &self,
        session: &mut dyn Session,
        partner: &Partner,
        name: &str,
    ) -> Result<(), TransportError> {
        let target = self.settings.dropoff_dir.join(name);
        let partial = partial_path(&self.settings.dropoff_dir, name);

        if let Err(e) = session
            .download(&partner.inbound_path, name, &partial)
            .await
        {
            let _ = tokio::fs::remove_file(&partial).await;
            return Err(e);
        }

        if let Err(e) = tokio::fs::rename(&partial, &target).await {
            let _ = tokio::fs::remove_file(&partial).await;
            return Err(e.into());
        }
        Ok(())
    }
}

fn partial_path(dir: &Path, name: &str) -> PathBuf {
    dir.join(format!(".{name}.part"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{MemoryTransport, partner, settings};

    struct Fixture {
        _dir: tempfile::TempDir,
        settings: MasterSettings,
        remote: MemoryTransport,
        transports: TransportRegistry,
    }

    fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let settings = settings(dir.path(), "", "{filename}");
        let remote = MemoryTransport::default();
        let transports = remote.registry();
        Fixture {
            _dir: dir,
            settings,
            remote,
            transports,
        }
    }

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn pending_skips_marked_names() {
        let listing = names(&["invoice1.edi", "Xinvoice2.edi", "order.edi", "X"]);
        assert_eq!(pending(&listing), ["invoice1.edi", "order.edi"]);
    }

    #[test]
    fn marker_prefix_is_case_sensitive() {
        let listing = names(&["xray.edi"]);
        assert_eq!(pending(&listing), ["xray.edi"]);
    }

    #[test]
    fn unsafe_names_are_recognised() {
        assert!(is_safe_name("invoice.edi"));
        assert!(is_safe_name(".hidden"));
        assert!(!is_safe_name(".."));
        assert!(!is_safe_name("../etc/passwd"));
        assert!(!is_safe_name("a\\b"));
        assert!(!is_safe_name(""));
    }

    #[tokio::test]
    async fn collects_unmarked_and_marks_them() {
        let fx = fixture();
        let p = partner("A", true);
        fx.remote.put("/out", "invoice1.edi", b"ISA*1");
        fx.remote.put("/out", "Xinvoice2.edi", b"ISA*2");

        let directory = PartnerDirectory::default();
        let router = InboundRouter::new(&fx.settings, &directory, &fx.transports);
        let report = router.process_partner(&p).await;

        match report.outcome {
            PartnerOutcome::Completed {
                listed,
                already_marked,
                downloaded,
                marked,
                failures,
            } => {
                assert_eq!(listed, 2);
                assert_eq!(already_marked, 1);
                assert_eq!(downloaded, ["invoice1.edi"]);
                assert_eq!(marked, 1);
                assert!(failures.is_empty());
            }
            other => panic!("expected Completed, got {other:?}"),
        }
        assert_eq!(
            std::fs::read(fx.settings.dropoff_dir.join("invoice1.edi")).unwrap(),
            b"ISA*1"
        );
        assert!(!fx.settings.dropoff_dir.join("Xinvoice2.edi").exists());
        assert!(!partial_path(&fx.settings.dropoff_dir, "invoice1.edi").exists());
        assert_eq!(fx.remote.files("/out"), ["Xinvoice1.edi", "Xinvoice2.edi"]);
    }

    #[tokio::test]
    async fn process_partner_creates_missing_drop_folder() {
        let fx = fixture();
        fx.remote.put("/out", "a.edi", b"ISA*a");
        assert!(!fx.settings.dropoff_dir.exists());

        let directory = PartnerDirectory::default();
        let router = InboundRouter::new(&fx.settings, &directory, &fx.transports);
        let report = router.process_partner(&partner("A", true)).await;

        assert!(matches!(
            report.outcome,
            PartnerOutcome::Completed { marked: 1, .. }
        ));
        assert!(fx.settings.dropoff_dir.join("a.edi").is_file());
    }

    #[tokio::test]
    async fn unusable_drop_folder_leaves_everything_unmarked() {
        let mut fx = fixture();
        let blocker = fx._dir.path().join("blocker");
        std::fs::write(&blocker, b"").unwrap();
        fx.settings.dropoff_dir = blocker.join("inbound");
        fx.remote.put("/out", "a.edi", b"ISA*a");
        fx.remote.put("/out", "b.edi", b"ISA*b");

        let directory = PartnerDirectory::default();
        let router = InboundRouter::new(&fx.settings, &directory, &fx.transports);
        let report = router.process_partner(&partner("A", true)).await;

        let PartnerOutcome::Completed {
            downloaded,
            failures,
            ..
        } = report.outcome
        else {
            panic!("expected Completed");
        };
        assert!(downloaded.is_empty());
        assert_eq!(failures.len(), 2);
        assert!(failures.iter().all(|f| f.stage == EntryStage::Download));
        assert_eq!(fx.remote.files("/out"), ["a.edi", "b.edi"]);
        assert_eq!(fx.remote.downloads(), 0);
    }

    #[test]
    fn router_files_in_drop_folder_are_hidden() {
        let dir = Path::new("/drop");
        let partial = partial_path(dir, "invoice.edi");
        assert_eq!(partial, dir.join(".invoice.edi.part"));
        assert!(RunLock::file_name(DIRECTION).starts_with('.'));
    }

    #[tokio::test]
    async fn download_failure_leaves_file_unmarked() {
        let fx = fixture();
        let p = partner("A", true);
        fx.remote.put("/out", "a.edi", b"ISA*a");
        fx.remote.put("/out", "b.edi", b"ISA*b");
        fx.remote.fail_download("a.edi");

        let directory = PartnerDirectory::default();
        let router = InboundRouter::new(&fx.settings, &directory, &fx.transports);
        let report = router.process_partner(&p).await;

        let PartnerOutcome::Completed {
            downloaded,
            failures,
            ..
        } = report.outcome
        else {
            panic!("expected Completed");
        };
        assert_eq!(downloaded, ["b.edi"]);
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].stage, EntryStage::Download);
        assert_eq!(fx.remote.files("/out"), ["Xb.edi", "a.edi"]);
        assert!(!fx.settings.dropoff_dir.join("a.edi").exists());
        assert!(!partial_path(&fx.settings.dropoff_dir, "a.edi").exists());
    }

    #[tokio::test]
    async fn mark_failure_keeps_the_local_copy() {
        let fx = fixture();
        let p = partner("A", true);
        fx.remote.put("/out", "a.edi", b"ISA*a");
        fx.remote.fail_rename("a.edi");

        let directory = PartnerDirectory::default();
        let router = InboundRouter::new(&fx.settings, &directory, &fx.transports);
        let report = router.process_partner(&p).await;

        let PartnerOutcome::Completed {
            downloaded,
            marked,
            failures,
            ..
        } = report.outcome
        else {
            panic!("expected Completed");
        };
        assert_eq!(downloaded, ["a.edi"]);
        assert_eq!(marked, 0);
        assert_eq!(failures[0].stage, EntryStage::Mark);
        assert!(fx.settings.dropoff_dir.join("a.edi").exists());
        assert_eq!(fx.remote.files("/out"), ["a.edi"]);
    }

    #[tokio::test]
    async fn connect_and_list_failures_are_per_partner() {
        let fx = fixture();
        let down = partner("DOWN", true);
        let mut broken = partner("BROKEN", true);
        broken.inbound_path = "/missing".into();
        let ok = partner("OK", true);
        fx.remote.fail_connect("DOWN");
        fx.remote.fail_list("/missing");
        fx.remote.put("/out", "a.edi", b"ISA*");

        let directory = PartnerDirectory::new(vec![down, broken, ok]).unwrap();
        let router = InboundRouter::new(&fx.settings, &directory, &fx.transports);
        let report = router.run().await.unwrap();

        assert_eq!(report.partners.len(), 3);
        assert!(matches!(report.partners[0].outcome, PartnerOutcome::ConnectFailed(_)));
        assert!(matches!(report.partners[1].outcome, PartnerOutcome::ListFailed(_)));
        assert!(matches!(report.partners[2].outcome, PartnerOutcome::Completed { .. }));
        assert_eq!(report.downloaded(), 1);
        // The session that failed to list is still closed.
        assert_eq!(fx.remote.closes(), 2);
    }

    #[tokio::test]
    async fn run_skips_disabled_partners_and_creates_drop_folder() {
        let fx = fixture();
        let mut off = partner("OFF", false);
        off.inbound_path = "/off".into();
        fx.remote.put("/off", "a.edi", b"ISA*");

        let directory = PartnerDirectory::new(vec![off]).unwrap();
        let report = InboundRouter::new(&fx.settings, &directory, &fx.transports)
            .run()
            .await
            .unwrap();

        assert!(report.partners.is_empty());
        assert_eq!(fx.remote.connects(), 0);
        assert!(fx.settings.dropoff_dir.is_dir());
        assert!(!fx.settings.dropoff_dir.join(RunLock::file_name(DIRECTION)).exists());
    }

    #[tokio::test]
    async fn rerun_collects_nothing_new() {
        let fx = fixture();
        fx.remote.put("/out", "a.edi", b"ISA*");
        let directory = PartnerDirectory::new(vec![partner("A", true)]).unwrap();
        let router = InboundRouter::new(&fx.settings, &directory, &fx.transports);

        assert_eq!(router.run().await.unwrap().downloaded(), 1);
        assert_eq!(router.run().await.unwrap().downloaded(), 0);
        assert_eq!(fx.remote.downloads(), 1);
    }
}
