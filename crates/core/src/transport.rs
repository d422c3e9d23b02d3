//! Transport trait — the abstraction over file-transfer protocols.
//!
//! A [`Transport`] opens a [`Session`] to a partner's server. The routers
//! only ever talk to these traits; FTP and SFTP implementations live in
//! `edirelay-transport`, and tests plug in in-memory ones.

use std::collections::HashMap;
use std::path::Path;

use async_trait::async_trait;

use crate::error::TransportError;
use crate::partner::{Partner, Protocol};

/// Remote names starting with this prefix have already been collected.
pub const MARKER_PREFIX: char = 'X';

/// Processed state of a remote inbound document, carried only by its name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteMark {
    Unmarked,
    Marked,
}

impl RemoteMark {
    pub fn of(name: &str) -> Self {
        if name.starts_with(MARKER_PREFIX) {
            RemoteMark::Marked
        } else {
            RemoteMark::Unmarked
        }
    }

    /// The name a document is renamed to once collected.
    pub fn marked_name(name: &str) -> String {
        format!("{MARKER_PREFIX}{name}")
    }
}

/// An open connection to a partner server.
#[async_trait]
pub trait Session: Send {
    /// Names of the regular files in `remote_dir`.
    async fn list(&mut self, remote_dir: &str) -> Result<Vec<String>, TransportError>;

    /// Upload `local` into `remote_dir`, keeping its file name.
    async fn upload(&mut self, local: &Path, remote_dir: &str) -> Result<(), TransportError>;

    /// Download `remote_dir/name` to `local`.
    async fn download(
        &mut self,
        remote_dir: &str,
        name: &str,
        local: &Path,
    ) -> Result<(), TransportError>;

    /// Rename `from` to `to` within `remote_dir`.
    async fn rename(&mut self, remote_dir: &str, from: &str, to: &str)
    -> Result<(), TransportError>;

    /// Log out and drop the connection.
    async fn close(self: Box<Self>) -> Result<(), TransportError>;
}

/// A file-transfer protocol implementation.
#[async_trait]
pub trait Transport: Send + Sync {
    /// The protocol tag partners select this transport with.
    fn protocol(&self) -> Protocol;

    /// Connect and authenticate against `partner`'s server.
    async fn connect(&self, partner: &Partner) -> Result<Box<dyn Session>, TransportError>;
}

/// Transports keyed by protocol tag.
pub struct TransportRegistry {
    transports: HashMap<Protocol, Box<dyn Transport>>,
}

impl TransportRegistry {
    pub fn new() -> Self {
        Self {
            transports: HashMap::new(),
        }
    }

    /// Register a transport. Replaces any existing one for the same protocol.
    pub fn register(&mut self, transport: Box<dyn Transport>) {
        self.transports.insert(transport.protocol(), transport);
    }

    pub fn get(&self, protocol: Protocol) -> Option<&dyn Transport> {
        self.transports.get(&protocol).map(|t| t.as_ref())
    }

    /// Open a session to `partner` using the transport for its protocol.
    pub async fn connect(&self, partner: &Partner) -> Result<Box<dyn Session>, TransportError> {
        let transport = self
            .get(partner.protocol)
            .ok_or(TransportError::Unsupported(partner.protocol))?;
        transport.connect(partner).await
    }

    pub fn protocols(&self) -> Vec<Protocol> {
        self.transports.keys().copied().collect()
    }
}

impl Default for TransportRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::partner::tests::partner;

    struct RefusingTransport;

    #[async_trait]
    impl Transport for RefusingTransport {
        fn protocol(&self) -> Protocol {
            Protocol::Sftp
        }

        async fn connect(&self, partner: &Partner) -> Result<Box<dyn Session>, TransportError> {
            Err(TransportError::Connect {
                host: partner.host.clone(),
                port: partner.port,
                reason: "refused".into(),
            })
        }
    }

    #[test]
    fn marker_prefix_classifies_names() {
        assert_eq!(RemoteMark::of("invoice1.edi"), RemoteMark::Unmarked);
        assert_eq!(RemoteMark::of("Xinvoice2.edi"), RemoteMark::Marked);
        assert_eq!(RemoteMark::of("xinvoice3.edi"), RemoteMark::Unmarked);
        assert_eq!(RemoteMark::marked_name("invoice1.edi"), "Xinvoice1.edi");
    }

    #[test]
    fn registry_register_and_lookup() {
        let mut registry = TransportRegistry::new();
        registry.register(Box::new(RefusingTransport));
        assert!(registry.get(Protocol::Sftp).is_some());
        assert!(registry.get(Protocol::Ftp).is_none());
        assert_eq!(registry.protocols(), vec![Protocol::Sftp]);
    }

    #[tokio::test]
    async fn registry_connect_missing_protocol() {
        let registry = TransportRegistry::new();
        let err = registry.connect(&partner("A", true)).await.err().unwrap();
        assert!(matches!(err, TransportError::Unsupported(Protocol::Ftp)));
    }

    #[tokio::test]
    async fn registry_connect_dispatches_by_protocol() {
        let mut registry = TransportRegistry::new();
        registry.register(Box::new(RefusingTransport));
        let mut p = partner("A", true);
        p.protocol = Protocol::Sftp;
        let err = registry.connect(&p).await.err().unwrap();
        assert!(matches!(err, TransportError::Connect { .. }));
    }
}
