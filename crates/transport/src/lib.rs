//! FTP and SFTP transports for edirelay.
//!
//! Both client libraries are blocking, so every remote operation runs on
//! tokio's blocking pool with the connection behind a mutex. Operations are
//! still issued one at a time; the routers never overlap calls on a session.

pub mod ftp;
pub mod sftp;

use std::net::{SocketAddr, ToSocketAddrs};
use std::time::Duration;

use edirelay_core::{TransportError, TransportRegistry};

pub use ftp::FtpTransport;
pub use sftp::SftpTransport;

/// Settings shared by every transport.
#[derive(Debug, Clone, Copy)]
pub struct TransportOptions {
    /// Connect timeout, also applied to reads and writes where supported.
    pub timeout: Duration,
    /// Log every protocol step at INFO instead of DEBUG.
    pub debug: bool,
}

impl Default for TransportOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            debug: false,
        }
    }
}

/// Create a registry with the FTP and SFTP transports.
pub fn default_registry(options: TransportOptions) -> TransportRegistry {
    let mut registry = TransportRegistry::new();
    registry.register(Box::new(FtpTransport::new(options)));
    registry.register(Box::new(SftpTransport::new(options)));
    registry
}

/// Run a blocking client call on the blocking pool.
pub(crate) async fn blocking<T, F>(f: F) -> Result<T, TransportError>
where
    F: FnOnce() -> Result<T, TransportError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| TransportError::Aborted(e.to_string()))?
}

/// Resolve `host:port` to the first socket address.
pub(crate) fn resolve(host: &str, port: u16) -> Result<SocketAddr, TransportError> {
    let connect_error = |reason: String| TransportError::Connect {
        host: host.to_string(),
        port,
        reason,
    };
    (host, port)
        .to_socket_addrs()
        .map_err(|e| connect_error(e.to_string()))?
        .next()
        .ok_or_else(|| connect_error("host resolved to no addresses".into()))
}

/// Join a remote directory and a file name with `/`.
///
/// An empty directory means the login directory.
pub(crate) fn remote_join(dir: &str, name: &str) -> String {
    if dir.is_empty() {
        return name.to_string();
    }
    format!("{}/{name}", dir.trim_end_matches('/'))
}

/// Log a protocol step at the configured verbosity.
macro_rules! step {
    ($debug:expr, $($arg:tt)+) => {
        if $debug {
            tracing::info!($($arg)+);
        } else {
            tracing::debug!($($arg)+);
        }
    };
}
pub(crate) use step;
