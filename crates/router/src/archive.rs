//! Archive destinations and the local move into the archive tree.

use std::path::{Component, Path, PathBuf};

use edirelay_core::{
    ArchiveError, MasterSettings, Partner, RenderContext, TemplateKind, effective_template,
};

/// Where a document goes, relative to the archive root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchivePlan {
    pub directory: PathBuf,
    pub file_name: PathBuf,
}

impl ArchivePlan {
    /// Render the effective templates for `partner` against `context`.
    ///
    /// Both rendered values must stay inside the archive root.
    pub fn new(
        settings: &MasterSettings,
        partner: &Partner,
        context: &RenderContext,
    ) -> Result<Self, ArchiveError> {
        let directory =
            effective_template(partner, settings, TemplateKind::Path).render(context);
        let file_name =
            effective_template(partner, settings, TemplateKind::Filename).render(context);

        let file_name = contained(&file_name)?;
        if file_name.as_os_str().is_empty() {
            return Err(ArchiveError::EmptyFileName);
        }

        Ok(Self {
            directory: contained(&directory)?,
            file_name,
        })
    }

    pub fn destination(&self, archive_root: &Path) -> PathBuf {
        archive_root.join(&self.directory).join(&self.file_name)
    }
}

/// Reject absolute paths and `..`; drop `.` components.
fn contained(rendered: &str) -> Result<PathBuf, ArchiveError> {
    let mut relative = PathBuf::new();
    for component in Path::new(rendered).components() {
        match component {
            Component::Normal(part) => relative.push(part),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                return Err(ArchiveError::EscapesRoot {
                    path: rendered.to_string(),
                });
            }
        }
    }
    Ok(relative)
}

/// Move `document` into the archive for `partner`, rendering the
/// destination at this instant. Returns the final path.
pub async fn archive_document(
    settings: &MasterSettings,
    partner: &Partner,
    document: &Path,
) -> Result<PathBuf, ArchiveError> {
    let file_name = document
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let context = RenderContext::capture(&file_name, partner);
    let plan = ArchivePlan::new(settings, partner, &context)?;
    let destination = plan.destination(&settings.archive_root);

    move_file(document, &destination).await?;
    Ok(destination)
}

/// Move a file, creating the destination's parent directories.
///
/// Falls back to copy-and-delete when source and destination are on
/// different filesystems. An existing destination is replaced.
pub async fn move_file(from: &Path, to: &Path) -> Result<(), ArchiveError> {
    if let Some(parent) = to.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|source| ArchiveError::CreateDir {
                path: parent.to_path_buf(),
                source,
            })?;
    }

    let move_error = |source| ArchiveError::Move {
        from: from.to_path_buf(),
        to: to.to_path_buf(),
        source,
    };

    match tokio::fs::rename(from, to).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::CrossesDevices => {
            tracing::debug!(from = %from.display(), to = %to.display(), "Cross-device move, copying");
            tokio::fs::copy(from, to).await.map_err(move_error)?;
            tokio::fs::remove_file(from).await.map_err(move_error)
        }
        Err(e) => Err(move_error(e)),
    }
}
