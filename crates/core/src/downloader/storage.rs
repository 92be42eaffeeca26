//! Storage lifecycle: session directories and their deferred deletion.

use std::path::{Component, Path, PathBuf};
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::error::DownloadError;
use super::types::SessionId;
use crate::auth::Privilege;
use crate::config::StorageConfig;
use crate::metrics;

/// Hands out destination directories and removes ephemeral ones later.
#[derive(Debug, Clone)]
pub struct StorageManager {
    base_dir: PathBuf,
    admin_dir: PathBuf,
    deletion_delay: Duration,
    shutdown: broadcast::Sender<()>,
}

impl StorageManager {
    pub fn new(
        base_dir: impl Into<PathBuf>,
        admin_dir: impl Into<PathBuf>,
        deletion_delay: Duration,
        shutdown: broadcast::Sender<()>,
    ) -> Self {
        Self {
            base_dir: base_dir.into(),
            admin_dir: admin_dir.into(),
            deletion_delay,
            shutdown,
        }
    }

    pub fn from_config(
        config: &StorageConfig,
        deletion_delay: Duration,
        shutdown: broadcast::Sender<()>,
    ) -> Self {
        Self::new(
            config.base_dir.clone(),
            config.admin_dir(),
            deletion_delay,
            shutdown,
        )
    }

    /// Root holding one directory per anonymous session.
    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Shared directory all admin downloads land in.
    pub fn admin_dir(&self) -> &Path {
        &self.admin_dir
    }

    pub fn deletion_delay(&self) -> Duration {
        self.deletion_delay
    }

    /// Issue a session id and make sure its destination exists.
    ///
    /// Anonymous sessions get `base_dir/<id>`; admin sessions share
    /// `admin_dir` and use the id for addressing only.
    pub async fn allocate(&self, privilege: Privilege) -> Result<(SessionId, PathBuf), DownloadError> {
        let session_id = SessionId::new();
        let destination = if privilege.is_admin() {
            self.admin_dir.clone()
        } else {
            self.base_dir.join(session_id.to_string())
        };

        tokio::fs::create_dir_all(&destination).await?;
        debug!(session_id = %session_id, destination = %destination.display(), "Allocated session directory");

        Ok((session_id, destination))
    }

    /// Remove `dir` once the deletion delay has passed.
    ///
    /// Runs regardless of whether anyone is still listening to the session.
    /// Errors are logged and dropped. A shutdown broadcast cancels the wait.
    pub fn schedule_deletion(&self, dir: PathBuf) -> JoinHandle<()> {
        let delay = self.deletion_delay;
        let mut shutdown_rx = self.shutdown.subscribe();

        debug!(dir = %dir.display(), delay_secs = delay.as_secs(), "Scheduled deletion");

        tokio::spawn(async move {
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = shutdown_rx.recv() => {
                    debug!(dir = %dir.display(), "Deletion cancelled by shutdown");
                    metrics::DEFERRED_DELETIONS.with_label_values(&["cancelled"]).inc();
                    return;
                }
            }

            match tokio::fs::remove_dir_all(&dir).await {
                Ok(()) => {
                    info!(dir = %dir.display(), "Deleted session folder");
                    metrics::DEFERRED_DELETIONS.with_label_values(&["removed"]).inc();
                }
                Err(e) => {
                    warn!(dir = %dir.display(), error = %e, "Failed to delete session folder");
                    metrics::DEFERRED_DELETIONS.with_label_values(&["failed"]).inc();
                }
            }
        })
    }

    /// Resolve a delivered file for download.
    ///
    /// Traversal attempts are rejected on the raw input, before the
    /// filesystem is touched.
    pub async fn resolve_delivered(
        &self,
        session_id: &str,
        relative: &str,
    ) -> Result<PathBuf, DownloadError> {
        let session_id: SessionId = session_id
            .parse()
            .map_err(|_| DownloadError::invalid_path(session_id))?;
        check_relative(relative)?;

        let path = self.base_dir.join(session_id.to_string()).join(relative);
        match tokio::fs::metadata(&path).await {
            Ok(meta) if meta.is_file() => Ok(path),
            _ => Err(DownloadError::FileNotFound { path }),
        }
    }
}

/// Reject empty paths, absolute paths and any `..` segment.
fn check_relative(relative: &str) -> Result<(), DownloadError> {
    if relative.is_empty()
        || relative.starts_with('/')
        || relative.starts_with('\\')
        || relative.split(['/', '\\']).any(|segment| segment == "..")
    {
        return Err(DownloadError::invalid_path(relative));
    }

    let clean = Path::new(relative)
        .components()
        .all(|c| matches!(c, Component::Normal(_) | Component::CurDir));
    if !clean {
        return Err(DownloadError::invalid_path(relative));
    }

    Ok(())
}
