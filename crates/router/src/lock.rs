//! Per-direction run lock.
//!
//! A lock file in the router's local folder keeps two invocations of the same
//! direction from working on the same files. The file is created atomically
//! and removed when the [`RunLock`] guard is dropped. A lock older than the
//! configured stale age is assumed to be left over from a crashed run and
//! is taken over.

use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

/// Contents of a lock file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockInfo {
    pub direction: String,
    pub process_id: u32,
    pub acquired_at: DateTime<Utc>,
}

impl LockInfo {
    fn current(direction: &str) -> Self {
        Self {
            direction: direction.to_string(),
            process_id: std::process::id(),
            acquired_at: Utc::now(),
        }
    }
}

impl std::fmt::Display for LockInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} run by PID {} since {}",
            self.direction,
            self.process_id,
            self.acquired_at.format("%Y-%m-%d %H:%M:%S UTC")
        )
    }
}

#[derive(Debug, thiserror::Error)]
pub enum LockError {
    #[error("Another run holds {path} ({holder})")]
    Held { path: PathBuf, holder: String },

    #[error("Lock file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// RAII guard; the lock file is removed on drop while it is still ours.
#[derive(Debug)]
pub struct RunLock {
    path: PathBuf,
    info: LockInfo,
}

impl RunLock {
    /// File name of the lock for `direction` inside its folder.
    pub fn file_name(direction: &str) -> String {
        format!(".edirelay-{direction}.lock")
    }

    /// Take the `direction` lock in `dir`.
    pub async fn acquire(
        dir: &Path,
        direction: &str,
        stale_after: Duration,
    ) -> Result<Self, LockError> {
        let path = dir.join(Self::file_name(direction));

        if let Some(lock) = Self::try_create(&path, direction).await? {
            return Ok(lock);
        }

        if !Self::is_stale(&path, stale_after).await {
            return Err(LockError::Held {
                holder: Self::describe_holder(&path).await,
                path,
            });
        }

        if !Self::clear_stale(&path, stale_after).await? {
            return Err(LockError::Held {
                holder: Self::describe_holder(&path).await,
                path,
            });
        }
        warn!(path = %path.display(), "Removed stale run lock");

        // One retry after clearing a stale lock. Losing this race to another
        // process means that process now legitimately holds it.
        match Self::try_create(&path, direction).await? {
            Some(lock) => Ok(lock),
            None => Err(LockError::Held {
                holder: Self::describe_holder(&path).await,
                path,
            }),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn info(&self) -> &LockInfo {
        &self.info
    }

    /// `Ok(None)` when the file already exists.
    async fn try_create(path: &Path, direction: &str) -> Result<Option<Self>, LockError> {
        let io_error = |source| LockError::Io {
            path: path.to_path_buf(),
            source,
        };

        let mut file = match tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(path)
            .await
        {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => return Ok(None),
            Err(e) => return Err(io_error(e)),
        };

        let info = LockInfo::current(direction);
        // Serializing a struct of plain fields cannot fail.
        let body = serde_json::to_vec_pretty(&info).unwrap_or_default();
        let written = match file.write_all(&body).await {
            Ok(()) => file.flush().await,
            Err(e) => Err(e),
        };
        if let Err(e) = written {
            let _ = tokio::fs::remove_file(path).await;
            return Err(io_error(e));
        }

        debug!(path = %path.display(), "Acquired run lock");
        Ok(Some(Self {
            path: path.to_path_buf(),
            info,
        }))
    }

    /// Move a stale lock out of the way.
    ///
    /// The file is renamed to a unique name first, so two processes that
    /// both judged it stale cannot both delete it. If what was moved turns
    /// out to be fresh (another process re-created the lock in between), it
    /// is linked back into place and `Ok(false)` is returned.
    async fn clear_stale(path: &Path, stale_after: Duration) -> Result<bool, LockError> {
        let io_error = |source| LockError::Io {
            path: path.to_path_buf(),
            source,
        };

        let nanos = Utc::now().timestamp_nanos_opt().unwrap_or_default();
        let mut aside = path.as_os_str().to_owned();
        aside.push(format!(".stale-{}-{nanos}", std::process::id()));
        let aside = PathBuf::from(aside);

        match tokio::fs::rename(path, &aside).await {
            Ok(()) => {}
            // Someone else cleared it first.
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(true),
            Err(e) => return Err(io_error(e)),
        }

        if Self::is_stale(&aside, stale_after).await {
            let _ = tokio::fs::remove_file(&aside).await;
            return Ok(true);
        }

        // Put the fresh lock back unless yet another holder already exists.
        match tokio::fs::hard_link(&aside, path).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {}
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Failed to restore run lock");
            }
        }
        let _ = tokio::fs::remove_file(&aside).await;
        Ok(false)
    }

    async fn read_info(path: &Path) -> Option<LockInfo> {
        let contents = tokio::fs::read(path).await.ok()?;
        serde_json::from_slice(&contents).ok()
    }

    /// Age from the recorded acquisition time, else the file's mtime.
    async fn is_stale(path: &Path, stale_after: Duration) -> bool {
        let age = match Self::read_info(path).await {
            Some(info) => (Utc::now() - info.acquired_at).to_std().unwrap_or_default(),
            None => match tokio::fs::metadata(path).await.and_then(|m| m.modified()) {
                Ok(modified) => SystemTime::now()
                    .duration_since(modified)
                    .unwrap_or_default(),
                // Vanished in the meantime; the retry will find out.
                Err(_) => return true,
            },
        };
        age >= stale_after
    }

    async fn describe_holder(path: &Path) -> String {
        Self::read_info(path)
            .await
            .map(|info| info.to_string())
            .unwrap_or_else(|| "unknown holder".to_string())
    }
}

impl Drop for RunLock {
    /// Removes the lock file only while it still records this holder; a lock
    /// taken over as stale belongs to the new holder.
    fn drop(&mut self) {
        let current = std::fs::read(&self.path)
            .ok()
            .and_then(|contents| serde_json::from_slice::<LockInfo>(&contents).ok());
        if current.as_ref() != Some(&self.info) {
            warn!(path = %self.path.display(), "Run lock was taken over by another run, leaving it");
            return;
        }

        if let Err(e) = std::fs::remove_file(&self.path) {
            warn!(path = %self.path.display(), error = %e, "Failed to release run lock");
        } else {
            debug!(path = %self.path.display(), "Released run lock");
        }
    }
}
