//! Plain FTP transport on top of `suppaftp`.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use edirelay_core::{Partner, Protocol, Session, Transport, TransportError};
use suppaftp::types::FileType;
use suppaftp::{FtpError, FtpStream};
use tokio::sync::Mutex;

use crate::{TransportOptions, blocking, resolve, step};

/// FTP in passive, binary mode.
pub struct FtpTransport {
    options: TransportOptions,
}

impl FtpTransport {
    pub fn new(options: TransportOptions) -> Self {
        Self { options }
    }
}

#[async_trait]
impl Transport for FtpTransport {
    fn protocol(&self) -> Protocol {
        Protocol::Ftp
    }

    async fn connect(&self, partner: &Partner) -> Result<Box<dyn Session>, TransportError> {
        let host = partner.host.clone();
        let port = partner.port;
        let credentials = partner.credentials.clone();
        let TransportOptions { timeout, debug } = self.options;

        step!(debug, host = %host, port, "Connecting to FTP server");
        let stream = blocking(move || {
            let addr = resolve(&host, port)?;
            let mut stream =
                FtpStream::connect_timeout(addr, timeout).map_err(|e| TransportError::Connect {
                    host: host.clone(),
                    port,
                    reason: e.to_string(),
                })?;
            stream
                .login(&credentials.username, &credentials.password)
                .map_err(|e| TransportError::Auth {
                    user: credentials.username.clone(),
                    host: host.clone(),
                    reason: e.to_string(),
                })?;
            stream
                .transfer_type(FileType::Binary)
                .map_err(|e| TransportError::Connect {
                    host: host.clone(),
                    port,
                    reason: format!("TYPE I rejected: {e}"),
                })?;
            Ok(stream)
        })
        .await?;
        step!(debug, host = %partner.host, "FTP login succeeded");

        Ok(Box::new(FtpSession {
            inner: Arc::new(Mutex::new(FtpConnection { stream, cwd: None })),
            debug,
        }))
    }
}

struct FtpConnection {
    stream: FtpStream,
    cwd: Option<String>,
}

impl FtpConnection {
    /// Change into `dir` unless already there. Empty = stay in login dir.
    fn enter(&mut self, dir: &str) -> Result<(), FtpError> {
        if dir.is_empty() || self.cwd.as_deref() == Some(dir) {
            return Ok(());
        }
        self.stream.cwd(dir)?;
        self.cwd = Some(dir.to_string());
        Ok(())
    }
}

struct FtpSession {
    inner: Arc<Mutex<FtpConnection>>,
    debug: bool,
}

#[async_trait]
impl Session for FtpSession {
    async fn list(&mut self, remote_dir: &str) -> Result<Vec<String>, TransportError> {
        step!(self.debug, path = %remote_dir, "NLST");
        let inner = self.inner.clone();
        let dir = remote_dir.to_string();
        blocking(move || {
            let mut conn = inner.blocking_lock();
            let list_error = |e: FtpError| TransportError::List {
                path: dir.clone(),
                reason: e.to_string(),
            };
            conn.enter(&dir).map_err(list_error)?;
            let names = conn.stream.nlst(None).map_err(list_error)?;
            // Some servers answer NLST with full paths.
            Ok(names
                .into_iter()
                .filter_map(|n| n.rsplit('/').next().map(str::to_string))
                .filter(|n| !n.is_empty() && n != "." && n != "..")
                .collect())
        })
        .await
    }

    async fn upload(&mut self, local: &Path, remote_dir: &str) -> Result<(), TransportError> {
        let name = file_name(local);
        step!(self.debug, file = %name, path = %remote_dir, "STOR");
        let inner = self.inner.clone();
        let local = local.to_path_buf();
        let dir = remote_dir.to_string();
        blocking(move || {
            let upload_error = |reason: String| TransportError::Upload {
                file: name.clone(),
                path: dir.clone(),
                reason,
            };
            let mut file = std::fs::File::open(&local).map_err(|e| upload_error(e.to_string()))?;
            let mut conn = inner.blocking_lock();
            conn.enter(&dir).map_err(|e| upload_error(e.to_string()))?;
            conn.stream
                .put_file(&name, &mut file)
                .map_err(|e| upload_error(e.to_string()))?;
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
        step!(self.debug, file = %name, path = %remote_dir, "RETR");
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
            let buffer = {
                let mut conn = inner.blocking_lock();
                conn.enter(&dir).map_err(|e| download_error(e.to_string()))?;
                conn.stream
                    .retr_as_buffer(&name)
                    .map_err(|e| download_error(e.to_string()))?
            };
            std::fs::write(&local, buffer.into_inner()).map_err(|e| download_error(e.to_string()))
        })
        .await
    }

    async fn rename(
        &mut self,
        remote_dir: &str,
        from: &str,
        to: &str,
    ) -> Result<(), TransportError> {
        step!(self.debug, from = %from, to = %to, path = %remote_dir, "RNFR/RNTO");
        let inner = self.inner.clone();
        let dir = remote_dir.to_string();
        let (from, to) = (from.to_string(), to.to_string());
        blocking(move || {
            let mut conn = inner.blocking_lock();
            let rename_error = |e: FtpError| TransportError::Rename {
                from: from.clone(),
                to: to.clone(),
                path: dir.clone(),
                reason: e.to_string(),
            };
            conn.enter(&dir).map_err(rename_error)?;
            conn.stream.rename(&from, &to).map_err(rename_error)
        })
        .await
    }

    async fn close(self: Box<Self>) -> Result<(), TransportError> {
        step!(self.debug, "QUIT");
        let inner = self.inner;
        blocking(move || {
            let mut conn = inner.blocking_lock();
            conn.stream
                .quit()
                .map_err(|e| TransportError::Aborted(format!("QUIT failed: {e}")))
        })
        .await
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}
