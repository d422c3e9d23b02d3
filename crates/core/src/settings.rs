//! Master settings shared by both routers.

use std::path::PathBuf;

use crate::partner::Partner;
use crate::template::Template;

/// Filename template used when neither the master settings nor the partner
/// configure one.
pub const DEFAULT_FILENAME_TEMPLATE: &str = "{filename}_{timestamp}.{extension}";

/// Local folders and default archive templates. Immutable for a run.
#[derive(Debug, Clone)]
pub struct MasterSettings {
    /// Flat folder the enterprise system drops outbound documents into.
    pub pickup_dir: PathBuf,
    /// Root of the archive tree for transmitted documents.
    pub archive_root: PathBuf,
    /// Flat folder inbound documents are delivered to.
    pub dropoff_dir: PathBuf,
    pub archive_path_template: Template,
    pub archive_filename_template: Template,
}

/// Which archive template to resolve.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TemplateKind {
    /// Subdirectory under the archive root.
    Path,
    /// Archived file name.
    Filename,
}

/// The template in effect for `partner`: its override if present, else the
/// master default.
pub fn effective_template<'a>(
    partner: &'a Partner,
    master: &'a MasterSettings,
    kind: TemplateKind,
) -> &'a Template {
    let (override_, default) = match kind {
        TemplateKind::Path => (
            partner.archive_path_template.as_ref(),
            &master.archive_path_template,
        ),
        TemplateKind::Filename => (
            partner.archive_filename_template.as_ref(),
            &master.archive_filename_template,
        ),
    };
    override_.unwrap_or(default)
}
