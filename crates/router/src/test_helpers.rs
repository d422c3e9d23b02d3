//! Shared fixtures for router unit tests: partners, settings and an
//! in-memory transport with failure injection.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use edirelay_core::{
    Credentials, MasterSettings, Partner, Protocol, Session, Template, Transport, TransportError,
    TransportRegistry,
};

pub(crate) fn partner(id: &str, enabled: bool) -> Partner {
    Partner {
        id: id.into(),
        name: format!("Partner {id}"),
        protocol: Protocol::Ftp,
        host: "ftp.example.com".into(),
        port: 21,
        credentials: Credentials {
            username: "edi".into(),
            password: "s3cret".into(),
        },
        outbound_path: "/in".into(),
        inbound_path: "/out".into(),
        enabled,
        archive_path_template: None,
        archive_filename_template: None,
    }
}

/// Settings rooted at `root` with `pickup/`, `archive/` and `inbound/`.
pub(crate) fn settings(root: &Path, path_template: &str, filename_template: &str) -> MasterSettings {
    MasterSettings {
        pickup_dir: root.join("pickup"),
        archive_root: root.join("archive"),
        dropoff_dir: root.join("inbound"),
        archive_path_template: Template::parse(path_template).unwrap(),
        archive_filename_template: Template::parse(filename_template).unwrap(),
    }
}

/// A minimal interchange addressed to `receiver`.
pub(crate) fn header(receiver: &str) -> String {
    format!(
        "ISA*00*          *00*          *ZZ*SENDER         *ZZ*{receiver:<15}*260109*1230*U*00401*000000323*0*P*>~\nGS*PO*SENDER*{receiver}*20260109*1230*323*X*004010~\n"
    )
}

#[derive(Default)]
struct Remote {
    dirs: HashMap<String, BTreeMap<String, Vec<u8>>>,
    fail_connect: HashSet<String>,
    fail_list: HashSet<String>,
    fail_upload: HashSet<String>,
    fail_download: HashSet<String>,
    fail_rename: HashSet<String>,
    connects: usize,
    closes: usize,
    downloads: usize,
}

/// FTP stand-in that keeps remote folders in memory.
#[derive(Clone, Default)]
pub(crate) struct MemoryTransport {
    remote: Arc<Mutex<Remote>>,
}

impl MemoryTransport {
    fn state(&self) -> MutexGuard<'_, Remote> {
        self.remote.lock().unwrap()
    }

    pub(crate) fn registry(&self) -> TransportRegistry {
        let mut registry = TransportRegistry::new();
        registry.register(Box::new(self.clone()));
        registry
    }

    pub(crate) fn put(&self, dir: &str, name: &str, content: &[u8]) {
        self.state()
            .dirs
            .entry(dir.into())
            .or_default()
            .insert(name.into(), content.to_vec());
    }

    /// Sorted file names in `dir`.
    pub(crate) fn files(&self, dir: &str) -> Vec<String> {
        self.state()
            .dirs
            .get(dir)
            .map(|files| files.keys().cloned().collect())
            .unwrap_or_default()
    }

    pub(crate) fn has_file(&self, dir: &str, name: &str) -> bool {
        self.files(dir).iter().any(|f| f == name)
    }

    pub(crate) fn fail_connect(&self, partner_id: &str) {
        self.state().fail_connect.insert(partner_id.into());
    }

    pub(crate) fn fail_list(&self, dir: &str) {
        self.state().fail_list.insert(dir.into());
    }

    pub(crate) fn fail_upload(&self, name: &str) {
        self.state().fail_upload.insert(name.into());
    }

    pub(crate) fn fail_download(&self, name: &str) {
        self.state().fail_download.insert(name.into());
    }

    pub(crate) fn fail_rename(&self, name: &str) {
        self.state().fail_rename.insert(name.into());
    }

    pub(crate) fn connects(&self) -> usize {
        self.state().connects
    }

    pub(crate) fn closes(&self) -> usize {
        self.state().closes
    }

    pub(crate) fn downloads(&self) -> usize {
        self.state().downloads
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    fn protocol(&self) -> Protocol {
        Protocol::Ftp
    }

    async fn connect(&self, partner: &Partner) -> Result<Box<dyn Session>, TransportError> {
        let mut state = self.state();
        if state.fail_connect.contains(&partner.id) {
            return Err(TransportError::Connect {
                host: partner.host.clone(),
                port: partner.port,
                reason: "connection refused".into(),
            });
        }
        state.connects += 1;
        Ok(Box::new(MemorySession {
            remote: self.remote.clone(),
        }))
    }
}

struct MemorySession {
    remote: Arc<Mutex<Remote>>,
}

#[async_trait]
impl Session for MemorySession {
    async fn list(&mut self, remote_dir: &str) -> Result<Vec<String>, TransportError> {
        let state = self.remote.lock().unwrap();
        if state.fail_list.contains(remote_dir) {
            return Err(TransportError::List {
                path: remote_dir.into(),
                reason: "550 No such directory".into(),
            });
        }
        Ok(state
            .dirs
            .get(remote_dir)
            .map(|files| files.keys().cloned().collect())
            .unwrap_or_default())
    }

    async fn upload(&mut self, local: &Path, remote_dir: &str) -> Result<(), TransportError> {
        let name = local
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let content = std::fs::read(local)?;
        let mut state = self.remote.lock().unwrap();
        if state.fail_upload.contains(&name) {
            return Err(TransportError::Upload {
                file: name,
                path: remote_dir.into(),
                reason: "452 Insufficient storage".into(),
            });
        }
        state
            .dirs
            .entry(remote_dir.into())
            .or_default()
            .insert(name, content);
        Ok(())
    }

    async fn download(
        &mut self,
        remote_dir: &str,
        name: &str,
        local: &Path,
    ) -> Result<(), TransportError> {
        let content = {
            let mut state = self.remote.lock().unwrap();
            let failure = |reason: &str| TransportError::Download {
                file: name.into(),
                path: remote_dir.into(),
                reason: reason.into(),
            };
            if state.fail_download.contains(name) {
                return Err(failure("426 Transfer aborted"));
            }
            let content = state
                .dirs
                .get(remote_dir)
                .and_then(|files| files.get(name))
                .cloned()
                .ok_or_else(|| failure("550 File not found"))?;
            state.downloads += 1;
            content
        };
        std::fs::write(local, content)?;
        Ok(())
    }

    async fn rename(
        &mut self,
        remote_dir: &str,
        from: &str,
        to: &str,
    ) -> Result<(), TransportError> {
        let mut state = self.remote.lock().unwrap();
        let failure = |reason: &str| TransportError::Rename {
            from: from.into(),
            to: to.into(),
            path: remote_dir.into(),
            reason: reason.into(),
        };
        if state.fail_rename.contains(from) {
            return Err(failure("553 Permission denied"));
        }
        let files = state
            .dirs
            .get_mut(remote_dir)
            .ok_or_else(|| failure("550 No such directory"))?;
        let content = files
            .remove(from)
            .ok_or_else(|| failure("550 File not found"))?;
        files.insert(to.into(), content);
        Ok(())
    }

    async fn close(self: Box<Self>) -> Result<(), TransportError> {
        self.remote.lock().unwrap().closes += 1;
        Ok(())
    }
}
