//! Periodic sweeper: wipes the ephemeral storage root on an interval.
//!
//! This is a coarse backstop for leaked session directories. It does not
//! look at session state, so a sweep that lands mid-download removes that
//! download's files too.

use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::metrics;

/// What a single sweep did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Entry names that were removed.
    pub removed: Vec<String>,
    /// Entry names that could not be removed, with the reason.
    pub failed: Vec<(String, String)>,
}

impl SweepReport {
    pub fn is_empty(&self) -> bool {
        self.removed.is_empty() && self.failed.is_empty()
    }
}

/// Remove every top-level entry under `root`.
///
/// Per-entry failures are logged and recorded, never raised.
pub async fn sweep_once(root: &Path) -> SweepReport {
    let mut report = SweepReport::default();

    let mut entries = match tokio::fs::read_dir(root).await {
        Ok(entries) => entries,
        Err(e) => {
            warn!(root = %root.display(), error = %e, "Cannot list storage root");
            return report;
        }
    };

    loop {
        let entry = match entries.next_entry().await {
            Ok(Some(entry)) => entry,
            Ok(None) => break,
            Err(e) => {
                warn!(root = %root.display(), error = %e, "Stopped listing storage root");
                break;
            }
        };

        let name = entry.file_name().to_string_lossy().into_owned();
        let path = entry.path();
        let is_dir = match entry.file_type().await {
            Ok(file_type) => file_type.is_dir(),
            Err(e) => {
                report.failed.push((name, e.to_string()));
                continue;
            }
        };

        let result = if is_dir {
            tokio::fs::remove_dir_all(&path).await
        } else {
            tokio::fs::remove_file(&path).await
        };

        match result {
            Ok(()) => {
                info!(path = %path.display(), "Deleted");
                metrics::SWEPT_ENTRIES.with_label_values(&["removed"]).inc();
                report.removed.push(name);
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Error deleting");
                metrics::SWEPT_ENTRIES.with_label_values(&["failed"]).inc();
                report.failed.push((name, e.to_string()));
            }
        }
    }

    report.removed.sort();
    report
}

/// Background task running [`sweep_once`] every `interval`.
pub struct Sweeper;

impl Sweeper {
    /// Spawn the sweep loop. The first sweep happens one interval after
    /// spawning; a shutdown broadcast ends the loop.
    pub fn spawn(
        root: PathBuf,
        interval: Duration,
        mut shutdown_rx: broadcast::Receiver<()>,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            info!(root = %root.display(), interval_secs = interval.as_secs(), "Sweeper started");
            loop {
                tokio::select! {
                    _ = shutdown_rx.recv() => {
                        info!("Sweeper received shutdown signal");
                        break;
                    }
                    _ = tokio::time::sleep(interval) => {
                        let report = sweep_once(&root).await;
                        metrics::SWEEPS_TOTAL.inc();
                        debug!(
                            removed = report.removed.len(),
                            failed = report.failed.len(),
                            "Sweep finished"
                        );
                    }
                }
            }
            info!("Sweeper stopped");
        })
    }
}
