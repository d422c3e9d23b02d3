//! Trading partners and the in-memory partner directory.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use crate::error::DirectoryError;
use crate::template::Template;

/// File-transfer protocol a partner is reached over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Protocol {
    Ftp,
    Sftp,
}

impl Protocol {
    pub fn as_str(&self) -> &'static str {
        match self {
            Protocol::Ftp => "ftp",
            Protocol::Sftp => "sftp",
        }
    }

    /// Port used when a partner does not configure one.
    pub fn default_port(&self) -> u16 {
        match self {
            Protocol::Ftp => 21,
            Protocol::Sftp => 22,
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Protocol {
    type Err = String;

    /// Case-insensitive, surrounding whitespace ignored.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ftp" => Ok(Protocol::Ftp),
            "sftp" => Ok(Protocol::Sftp),
            other => Err(format!("unknown protocol '{other}' (expected ftp or sftp)")),
        }
    }
}

/// Login credentials for a partner server.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .finish()
    }
}

/// A trading partner. Immutable for the duration of a run.
#[derive(Debug, Clone)]
pub struct Partner {
    /// ISA08 receiver identifier; unique within a directory.
    pub id: String,
    pub name: String,
    pub protocol: Protocol,
    pub host: String,
    pub port: u16,
    pub credentials: Credentials,
    /// Remote directory outbound documents are uploaded into.
    pub outbound_path: String,
    /// Remote directory inbound documents are collected from.
    pub inbound_path: String,
    pub enabled: bool,
    pub archive_path_template: Option<Template>,
    pub archive_filename_template: Option<Template>,
}

/// Outcome of a directory lookup.
#[derive(Debug, Clone, Copy)]
pub enum Resolution<'a> {
    Found(&'a Partner),
    /// The partner exists but is switched off.
    Disabled(&'a Partner),
    NotFound,
}

/// Exact-match lookup of partners by identifier.
#[derive(Debug, Clone, Default)]
pub struct PartnerDirectory {
    partners: Vec<Partner>,
    index: HashMap<String, usize>,
}

impl PartnerDirectory {
    /// Build a directory, rejecting empty and duplicate identifiers.
    ///
    /// Configuration order is preserved for [`PartnerDirectory::active`].
    pub fn new(partners: Vec<Partner>) -> Result<Self, DirectoryError> {
        let mut index = HashMap::with_capacity(partners.len());
        for (position, partner) in partners.iter().enumerate() {
            if partner.id.is_empty() {
                return Err(DirectoryError::EmptyIdentifier {
                    name: partner.name.clone(),
                });
            }
            if index.insert(partner.id.clone(), position).is_some() {
                return Err(DirectoryError::DuplicatePartner(partner.id.clone()));
            }
        }
        Ok(Self { partners, index })
    }

    pub fn resolve(&self, id: &str) -> Resolution<'_> {
        match self.index.get(id).map(|&i| &self.partners[i]) {
            Some(partner) if partner.enabled => Resolution::Found(partner),
            Some(partner) => Resolution::Disabled(partner),
            None => Resolution::NotFound,
        }
    }

    /// Enabled partners, in configuration order.
    pub fn active(&self) -> impl Iterator<Item = &Partner> {
        self.partners.iter().filter(|p| p.enabled)
    }

    pub fn all(&self) -> &[Partner] {
        &self.partners
    }

    pub fn len(&self) -> usize {
        self.partners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.partners.is_empty()
    }
}
