//! SFTP transport on top of `ssh2` (libssh2).

use std::net::TcpStream;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use edirelay_core::{Partner, Protocol, Session, Transport, TransportError};
use ssh2::Sftp;
use tokio::sync::Mutex;

use crate::{TransportOptions, blocking, remote_join, resolve, step};

/// SFTP with password authentication.
pub struct SftpTransport {
    options: TransportOptions,
}

impl SftpTransport {
    pub fn new(options: TransportOptions) -> Self {
        Self { options }
    }
}

#[async_trait]
impl Transport for SftpTransport {
    fn protocol(&self) -> Protocol {
        Protocol::Sftp
    }

    async fn connect(&self, partner: &Partner) -> Result<Box<dyn Session>, TransportError> {
        let host = partner.host.clone();
        let port = partner.port;
        let credentials = partner.credentials.clone();
        let TransportOptions { timeout, debug } = self.options;

        step!(debug, host = %host, port, "Connecting to SFTP server");
        let connection = blocking(move || {
            let connect_error = |reason: String| TransportError::Connect {
                host: host.clone(),
                port,
                reason,
            };

            let addr = resolve(&host, port)?;
            let tcp = TcpStream::connect_timeout(&addr, timeout)
                .map_err(|e| connect_error(e.to_string()))?;

            let mut ssh = ssh2::Session::new().map_err(|e| connect_error(e.to_string()))?;
            ssh.set_timeout(u32::try_from(timeout.as_millis()).unwrap_or(u32::MAX));
            ssh.set_tcp_stream(tcp);
            ssh.handshake()
                .map_err(|e| connect_error(format!("SSH handshake failed: {e}")))?;

            let auth_error = |reason: String| TransportError::Auth {
                user: credentials.username.clone(),
                host: host.clone(),
                reason,
            };
            ssh.userauth_password(&credentials.username, &credentials.password)
                .map_err(|e| auth_error(e.to_string()))?;
            if !ssh.authenticated() {
                return Err(auth_error("server did not accept the credentials".into()));
            }

            let sftp = ssh
                .sftp()
                .map_err(|e| connect_error(format!("SFTP subsystem unavailable: {e}")))?;
            Ok(SftpConnection { ssh, sftp })
        })
        .await?;
        step!(debug, host = %partner.host, "SFTP login succeeded");

        Ok(Box::new(SftpSession {
            inner: Arc::new(Mutex::new(connection)),
            debug,
        }))
    }
}

struct SftpConnection {
    ssh: ssh2::Session,
    sftp: Sftp,
}

struct SftpSession {
    inner: Arc<Mutex<SftpConnection>>,
    debug: bool,
}

#[async_trait]
impl Session for SftpSession {
    /// Regular files only; directories and links are left out.
    async fn list(&mut self, remote_dir: &str) -> Result<Vec<String>, TransportError> {
        step!(self.debug, path = %remote_dir, "readdir");
        let inner = self.inner.clone();
        let dir = remote_dir.to_string();
        blocking(move || {
            let conn = inner.blocking_lock();
            let target = if dir.is_empty() { "." } else { dir.as_str() };
            let entries = conn
                .sftp
                .readdir(Path::new(target))
                .map_err(|e| TransportError::List {
                    path: dir.clone(),
                    reason: e.to_string(),
                })?;
            Ok(entries
                .into_iter()
                .filter(|(_, stat)| stat.is_file())
                .filter_map(|(path, _)| {
                    path.file_name()
                        .map(|n| n.to_string_lossy().into_owned())
                })
                .collect())
        })
        .await
    }

    async fn upload(&mut self, local: &Path, remote_dir: &str) -> Result<(), TransportError> {
        let name = local
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        step!(self.debug, file = %name, path = %remote_dir, "put");
        let inner = self.inner.clone();
        let local = local.to_path_buf();
        let dir = remote_dir.to_string();
        blocking(move || {
            let upload_error = |reason: String| TransportError::Upload {
                file: name.clone(),
                path: dir.clone(),
                reason,
            };
            let mut source = std::fs::File::open(&local).map_err(|e| upload_error(e.to_string()))?;
            let conn = inner.blocking_lock();
            let mut remote = conn
                .sftp
                .create(Path::new(&remote_join(&dir, &name)))
                .map_err(|e| upload_error(e.to_string()))?;
            std::io::copy(&mut source, &mut remote).map_err(|e| upload_error(e.to_string()))?;
            Ok(())
        })
        .await
    }

    async fn download(
        &mut self,
        remote_dir: &str,
        name: &str,
        local: &Path,
    ) -> Result<(), TransportError> {
        step!(self.debug, file = %name, path = %remote_dir, "get");
        let inner = self.inner.clone();
        let dir = remote_dir.to_string();
        let name = name.to_string();
        let local = local.to_path_buf();
        blocking(move || {
            let download_error = |reason: String| TransportError::Download {
                file: name.clone(),
                path: dir.clone(),
                reason,
            };
            let conn = inner.blocking_lock();
            let mut remote = conn
                .sftp
                .open(Path::new(&remote_join(&dir, &name)))
                .map_err(|e| download_error(e.to_string()))?;
            let mut target =
                std::fs::File::create(&local).map_err(|e| download_error(e.to_string()))?;
            std::io::copy(&mut remote, &mut target).map_err(|e| download_error(e.to_string()))?;
            Ok(())
        })
        .await
    }

    async fn rename(
        &mut self,
        remote_dir: &str,
        from: &str,
        to: &str,
    ) -> Result<(), TransportError> {
        step!(self.debug, from = %from, to = %to, path = %remote_dir, "rename");
        let inner = self.inner.clone();
        let dir = remote_dir.to_string();
        let (from, to) = (from.to_string(), to.to_string());
        blocking(move || {
            let conn = inner.blocking_lock();
            let source = remote_join(&dir, &from);
            let target = remote_join(&dir, &to);
            conn.sftp
                .rename(Path::new(&source), Path::new(&target), None)
                .map_err(|e| TransportError::Rename {
                    from: from.clone(),
                    to: to.clone(),
                    path: dir.clone(),
                    reason: e.to_string(),
                })
        })
        .await
    }

    async fn close(self: Box<Self>) -> Result<(), TransportError> {
        step!(self.debug, "disconnect");
        let inner = self.inner;
        blocking(move || {
            let conn = inner.blocking_lock();
            conn.ssh
                .disconnect(None, "edirelay session complete", None)
                .map_err(|e| TransportError::Aborted(format!("disconnect failed: {e}")))
        })
        .await
    }
}
