//! Configuration loading, validation, and management for edirelay.
//!
//! Two files drive a run: the master settings (`master_config.json`) with
//! local folders, default archive templates and logging preferences, and the
//! partner list (`partners.json`). Both are JSON by default; a `.toml`
//! extension switches the parser. Everything is validated up front and turned
//! into the immutable core types before any document is touched.

use std::path::{Path, PathBuf};
use std::time::Duration;

use edirelay_core::error::{DirectoryError, TemplateError};
use edirelay_core::settings::DEFAULT_FILENAME_TEMPLATE;
use edirelay_core::{Credentials, MasterSettings, Partner, PartnerDirectory, Protocol, Template};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// Default master settings path, relative to the working directory.
pub const DEFAULT_MASTER_CONFIG: &str = "master_config.json";

/// Default partner list path, relative to the working directory.
pub const DEFAULT_PARTNERS_CONFIG: &str = "partners.json";

/// The master settings file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MasterConfig {
    pub local_folders: LocalFolders,

    #[serde(default)]
    pub archive_templates: ArchiveTemplates,

    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub locking: LockingConfig,

    #[serde(default)]
    pub transfer: TransferConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocalFolders {
    pub outbound_pickup: String,
    pub outbound_archive: String,
    pub inbound_dropoff: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArchiveTemplates {
    /// Subdirectory under the archive root. Empty = archive root itself.
    #[serde(default)]
    pub archive_path_template: String,

    #[serde(default = "default_filename_template")]
    pub archive_filename_template: String,
}

fn default_filename_template() -> String {
    DEFAULT_FILENAME_TEMPLATE.into()
}

impl Default for ArchiveTemplates {
    fn default() -> Self {
        Self {
            archive_path_template: String::new(),
            archive_filename_template: default_filename_template(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_folder")]
    pub log_folder: String,

    /// DEBUG, INFO, WARNING, ERROR or CRITICAL (case-insensitive).
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Non-zero turns on protocol-level tracing in the transports.
    #[serde(default)]
    pub ftp_debug_level: u8,
}

fn default_log_folder() -> String {
    "logs".into()
}
fn default_log_level() -> String {
    "INFO".into()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            log_folder: default_log_folder(),
            log_level: default_log_level(),
            ftp_debug_level: 0,
        }
    }
}

impl LoggingConfig {
    /// The `tracing` filter directive for the configured level.
    pub fn filter_directive(&self) -> Result<&'static str, ConfigError> {
        match self.log_level.trim().to_ascii_uppercase().as_str() {
            "TRACE" => Ok("trace"),
            "DEBUG" => Ok("debug"),
            "INFO" => Ok("info"),
            "WARN" | "WARNING" => Ok("warn"),
            "ERROR" | "CRITICAL" => Ok("error"),
            other => Err(ConfigError::ValidationError(format!(
                "logging.log_level '{other}' is not one of TRACE, DEBUG, INFO, WARNING, ERROR, CRITICAL"
            ))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LockingConfig {
    /// A run lock older than this is treated as abandoned.
    #[serde(default = "default_stale_after_minutes")]
    pub stale_after_minutes: u64,
}

fn default_stale_after_minutes() -> u64 {
    120
}

impl Default for LockingConfig {
    fn default() -> Self {
        Self {
            stale_after_minutes: default_stale_after_minutes(),
        }
    }
}

impl LockingConfig {
    pub fn stale_after(&self) -> Duration {
        Duration::from_secs(self.stale_after_minutes.saturating_mul(60))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferConfig {
    /// Connect and read/write timeout for partner servers.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_timeout_secs() -> u64 {
    30
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl TransferConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// The partner list file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PartnersFile {
    #[serde(default)]
    pub partners: Vec<PartnerConfig>,
}

/// One partner entry as written in the partner list.
#[derive(Clone, Serialize, Deserialize)]
pub struct PartnerConfig {
    pub partner_id: String,

    #[serde(default)]
    pub partner_name: String,

    pub protocol: String,

    pub host: String,

    /// Defaults to the protocol's well-known port.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,

    #[serde(default)]
    pub username: String,

    #[serde(default)]
    pub password: String,

    /// Remote folder outbound documents are uploaded to.
    #[serde(default)]
    pub outbound_path: String,

    /// Remote folder inbound documents are collected from.
    #[serde(default)]
    pub inbound_path: String,

    #[serde(default)]
    pub enabled: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub archive_path_template: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub archive_filename_template: Option<String>,
}

impl std::fmt::Debug for PartnerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PartnerConfig")
            .field("partner_id", &self.partner_id)
            .field("partner_name", &self.partner_name)
            .field("protocol", &self.protocol)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .field("outbound_path", &self.outbound_path)
            .field("inbound_path", &self.inbound_path)
            .field("enabled", &self.enabled)
            .field("archive_path_template", &self.archive_path_template)
            .field("archive_filename_template", &self.archive_filename_template)
            .finish()
    }
}

impl PartnerConfig {
    /// Validate this entry and convert it into a core [`Partner`].
    pub fn into_partner(self) -> Result<Partner, ConfigError> {
        let id = self.partner_id.trim().to_string();
        let label = if id.is_empty() {
            format!("'{}'", self.partner_name)
        } else {
            id.clone()
        };

        let protocol: Protocol = self
            .protocol
            .parse()
            .map_err(|e| ConfigError::ValidationError(format!("partner {label}: {e}")))?;

        if self.host.trim().is_empty() {
            return Err(ConfigError::ValidationError(format!(
                "partner {label}: host must not be empty"
            )));
        }

        let port = self.port.unwrap_or_else(|| protocol.default_port());
        if port == 0 {
            return Err(ConfigError::ValidationError(format!(
                "partner {label}: port must be between 1 and 65535"
            )));
        }

        let context = format!("partner {label}");
        let archive_path_template = self
            .archive_path_template
            .as_deref()
            .map(|t| parse_template(t, &context))
            .transpose()?;
        let archive_filename_template = self
            .archive_filename_template
            .as_deref()
            .map(|t| parse_template(t, &context))
            .transpose()?;

        let name = if self.partner_name.trim().is_empty() {
            id.clone()
        } else {
            self.partner_name
        };

        Ok(Partner {
            id,
            name,
            protocol,
            host: self.host.trim().to_string(),
            port,
            credentials: Credentials {
                username: self.username,
                password: self.password,
            },
            outbound_path: self.outbound_path,
            inbound_path: self.inbound_path,
            enabled: self.enabled,
            archive_path_template,
            archive_filename_template,
        })
    }
}

fn parse_template(source: &str, context: &str) -> Result<Template, ConfigError> {
    Template::parse(source).map_err(|source| ConfigError::Template {
        context: context.to_string(),
        source,
    })
}

impl MasterConfig {
    /// Load the master settings from `path`.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let config: Self = read_document(path)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let folders = [
            ("local_folders.outbound_pickup", &self.local_folders.outbound_pickup),
            ("local_folders.outbound_archive", &self.local_folders.outbound_archive),
            ("local_folders.inbound_dropoff", &self.local_folders.inbound_dropoff),
        ];
        for (key, value) in folders {
            if value.trim().is_empty() {
                return Err(ConfigError::ValidationError(format!("{key} must not be empty")));
            }
        }

        if self.logging.log_folder.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "logging.log_folder must not be empty".into(),
            ));
        }
        self.logging.filter_directive()?;

        if self.transfer.timeout_secs == 0 {
            return Err(ConfigError::ValidationError(
                "transfer.timeout_secs must be greater than 0".into(),
            ));
        }

        Ok(())
    }

    /// Convert into the core settings, parsing the default templates.
    pub fn settings(&self) -> Result<MasterSettings, ConfigError> {
        let context = "archive_templates";
        Ok(MasterSettings {
            pickup_dir: PathBuf::from(&self.local_folders.outbound_pickup),
            archive_root: PathBuf::from(&self.local_folders.outbound_archive),
            dropoff_dir: PathBuf::from(&self.local_folders.inbound_dropoff),
            archive_path_template: parse_template(
                &self.archive_templates.archive_path_template,
                context,
            )?,
            archive_filename_template: parse_template(
                &self.archive_templates.archive_filename_template,
                context,
            )?,
        })
    }
}

impl PartnersFile {
    /// Load the partner list from `path`.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        read_document(path)
    }

    /// Validate every entry and build the directory.
    pub fn into_directory(self) -> Result<PartnerDirectory, ConfigError> {
        let partners = self
            .partners
            .into_iter()
            .map(PartnerConfig::into_partner)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(PartnerDirectory::new(partners)?)
    }
}

/// Everything a run needs, validated.
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub settings: MasterSettings,
    pub directory: PartnerDirectory,
    pub logging: LoggingConfig,
    pub locking: LockingConfig,
    pub transfer: TransferConfig,
}

impl RunConfig {
    /// Load and validate both configuration files.
    pub fn load(master_path: &Path, partners_path: &Path) -> Result<Self, ConfigError> {
        let master = MasterConfig::load_from(master_path)?;
        let settings = master.settings()?;
        let directory = PartnersFile::load_from(partners_path)?.into_directory()?;

        tracing::debug!(
            master = %master_path.display(),
            partners = %partners_path.display(),
            partner_count = directory.len(),
            "Configuration loaded"
        );

        Ok(Self {
            settings,
            directory,
            logging: master.logging,
            locking: master.locking,
            transfer: master.transfer,
        })
    }
}

/// Supported configuration file formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    Json,
    Toml,
}

impl ConfigFormat {
    /// JSON unless the file ends in `.toml`.
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("toml") => ConfigFormat::Toml,
            _ => ConfigFormat::Json,
        }
    }
}

/// Read and deserialize a configuration document.
fn read_document<T: DeserializeOwned>(path: &Path) -> Result<T, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            ConfigError::NotFound {
                path: path.to_path_buf(),
            }
        } else {
            ConfigError::ReadError {
                path: path.to_path_buf(),
                reason: e.to_string(),
            }
        }
    })?;

    let parsed = match ConfigFormat::from_path(path) {
        ConfigFormat::Json => serde_json::from_str(&content).map_err(|e| e.to_string()),
        ConfigFormat::Toml => toml::from_str(&content).map_err(|e| e.to_string()),
    };
    parsed.map_err(|reason| ConfigError::ParseError {
        path: path.to_path_buf(),
        reason,
    })
}

/// Configuration errors. All of them abort a run before any work starts.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Configuration file not found: {path}")]
    NotFound { path: PathBuf },

    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),

    #[error("Invalid template in {context}: {source}")]
    Template {
        context: String,
        #[source]
        source: TemplateError,
    },

    #[error("Invalid partner list: {0}")]
    Directory(#[from] DirectoryError),
}
