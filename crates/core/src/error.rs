//! Error types for the edirelay domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each stage of a document's journey has its own error type so the routers
//! can log them with distinct reasons.

use std::path::PathBuf;

use thiserror::Error;

use crate::partner::Protocol;

/// Failure to extract a receiver identifier from an envelope header.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EnvelopeError {
    #[error("Header does not start with an ISA segment (found '{found}')")]
    NotIsa { found: String },

    #[error("ISA segment incomplete: {fields} field(s), need at least 9")]
    TooFewFields { fields: usize },

    #[error("ISA08 receiver identifier is empty")]
    EmptyReceiver,

    #[error("Document is empty")]
    Empty,

    #[error("Failed to read header from {path}: {reason}")]
    Unreadable { path: PathBuf, reason: String },
}

/// Template parsing and rendering errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TemplateError {
    #[error("Unknown placeholder '{{{name}}}' in template '{template}'")]
    UnknownPlaceholder { name: String, template: String },

    #[error("Unterminated placeholder at byte {position} in template '{template}'")]
    Unterminated { position: usize, template: String },
}

/// Errors raised while building the partner directory.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DirectoryError {
    #[error("Duplicate partner identifier: {0}")]
    DuplicatePartner(String),

    #[error("Partner identifier must not be empty (partner '{name}')")]
    EmptyIdentifier { name: String },
}

/// Remote transfer failures. All of these are non-fatal to a run.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("No transport registered for protocol {0}")]
    Unsupported(Protocol),

    #[error("Connection to {host}:{port} failed: {reason}")]
    Connect {
        host: String,
        port: u16,
        reason: String,
    },

    #[error("Authentication failed for {user}@{host}: {reason}")]
    Auth {
        user: String,
        host: String,
        reason: String,
    },

    #[error("Listing {path} failed: {reason}")]
    List { path: String, reason: String },

    #[error("Upload of {file} to {path} failed: {reason}")]
    Upload {
        file: String,
        path: String,
        reason: String,
    },

    #[error("Download of {path}/{file} failed: {reason}")]
    Download {
        file: String,
        path: String,
        reason: String,
    },

    #[error("Rename {from} -> {to} in {path} failed: {reason}")]
    Rename {
        from: String,
        to: String,
        path: String,
        reason: String,
    },

    #[error("Transfer task aborted: {0}")]
    Aborted(String),

    #[error("Local I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Local archive failures. Raised only after a successful upload, so they
/// carry a duplicate-delivery risk on the next run.
#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("Rendered archive path '{path}' escapes the archive root")]
    EscapesRoot { path: String },

    #[error("Rendered archive filename is empty")]
    EmptyFileName,

    #[error("Failed to create archive directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to move {from} to {to}: {source}")]
    Move {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Template(#[from] TemplateError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_placeholder_displays_braces() {
        let err = TemplateError::UnknownPlaceholder {
            name: "bogus".into(),
            template: "{bogus}.edi".into(),
        };
        assert_eq!(
            err.to_string(),
            "Unknown placeholder '{bogus}' in template '{bogus}.edi'"
        );
    }

    #[test]
    fn transport_error_displays_endpoint() {
        let err = TransportError::Connect {
            host: "ftp.partner.example".into(),
            port: 21,
            reason: "connection refused".into(),
        };
        assert!(err.to_string().contains("ftp.partner.example:21"));
        assert!(err.to_string().contains("refused"));
    }

    #[test]
    fn envelope_error_reports_field_count() {
        let err = EnvelopeError::TooFewFields { fields: 4 };
        assert!(err.to_string().contains('4'));
    }
}
