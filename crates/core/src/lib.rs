//! # edirelay Core
//!
//! Domain types, traits, and error definitions for the edirelay EDI routing
//! engine. This crate holds the routing and templating logic; everything that
//! touches the network lives behind the [`Transport`] trait.
//!
//! ## Layout
//!
//! - [`envelope`] extracts the receiver identifier from an ISA header
//! - [`partner`] holds partner records and the [`PartnerDirectory`]
//! - [`template`] renders archive paths and filenames
//! - [`settings`] holds the master settings and template override resolution
//! - [`transport`] defines the file-transfer capability the routers drive

pub mod envelope;
pub mod error;
pub mod partner;
pub mod settings;
pub mod template;
pub mod transport;

// Re-export key types at crate root for ergonomics
pub use envelope::{EnvelopeHeader, parse_receiver_id, read_receiver_id};
pub use error::{ArchiveError, DirectoryError, EnvelopeError, TemplateError, TransportError};
pub use partner::{Credentials, Partner, PartnerDirectory, Protocol, Resolution};
pub use settings::{MasterSettings, TemplateKind, effective_template};
pub use template::{Placeholder, RenderContext, Template, render};
pub use transport::{MARKER_PREFIX, RemoteMark, Session, Transport, TransportRegistry};
