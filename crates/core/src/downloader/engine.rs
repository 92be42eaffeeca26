//! Download engine - runs one session per request and owns the cleanup tasks.

use chrono::Utc;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, error, info, warn};

use super::classifier;
use super::error::DownloadError;
use super::process::{ExternalProcess, ProcessLauncher};
use super::relay::{LineClassifier, PatternClassifier, ProgressRelay};
use super::storage::StorageManager;
use super::sweeper::Sweeper;
use super::types::{
    CommandSpec, DownloadRequest, DownloadSession, SessionEvent, SessionId, SessionOutcome,
};
use super::watchdog::{IdleWatchdog, WatchdogRead};
use crate::auth::Privilege;
use crate::config::{Config, DownloaderConfig};
use crate::metrics;

/// Events buffered per session before the tool output is back-pressured.
const EVENT_BUFFER: usize = 64;

/// A started session as seen by the caller.
#[derive(Debug)]
pub struct SessionHandle {
    pub session_id: SessionId,
    /// Progress lines followed by exactly one terminal event.
    pub events: mpsc::Receiver<SessionEvent>,
}

/// Engine status snapshot.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct EngineStatus {
    pub running: bool,
    pub active_sessions: usize,
}

/// Starts download sessions and runs the background cleanup.
pub struct DownloadEngine {
    storage: StorageManager,
    launcher: Arc<dyn ProcessLauncher>,
    classifier: Arc<dyn LineClassifier>,
    downloader: DownloaderConfig,
    sweep_interval: Duration,

    // Runtime state
    running: Arc<AtomicBool>,
    active: Arc<AtomicUsize>,
    shutdown_tx: broadcast::Sender<()>,
}

impl DownloadEngine {
    /// Create a new engine. Nothing runs until [`start`](Self::start).
    pub fn new(config: &Config, launcher: Arc<dyn ProcessLauncher>) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        let storage = StorageManager::from_config(
            &config.storage,
            config.cleanup.deletion_delay(),
            shutdown_tx.clone(),
        );

        Self {
            storage,
            launcher,
            classifier: Arc::new(PatternClassifier::album_names()),
            downloader: config.downloader.clone(),
            sweep_interval: config.cleanup.interval(),
            running: Arc::new(AtomicBool::new(false)),
            active: Arc::new(AtomicUsize::new(0)),
            shutdown_tx,
        }
    }

    /// Swap the album-name heuristic.
    pub fn with_classifier(mut self, classifier: Arc<dyn LineClassifier>) -> Self {
        self.classifier = classifier;
        self
    }

    pub fn storage(&self) -> &StorageManager {
        &self.storage
    }

    /// Start the periodic sweeper.
    pub fn start(&self) {
        if self.running.swap(true, Ordering::SeqCst) {
            warn!("Download engine already running");
            return;
        }

        info!("Starting download engine");
        Sweeper::spawn(
            self.storage.base_dir().to_path_buf(),
            self.sweep_interval,
            self.shutdown_tx.subscribe(),
        );
    }

    /// Stop the sweeper, cancel pending deletions and abort running sessions.
    pub fn stop(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            warn!("Download engine not running");
            return;
        }

        info!("Stopping download engine");
        let _ = self.shutdown_tx.send(());
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Relaxed)
    }

    pub fn active_sessions(&self) -> usize {
        self.active.load(Ordering::Relaxed)
    }

    pub fn status(&self) -> EngineStatus {
        EngineStatus {
            running: self.is_running(),
            active_sessions: self.active_sessions(),
        }
    }

    /// Start a download for `link`.
    ///
    /// A missing link is rejected before anything is allocated. Everything
    /// that goes wrong later arrives as the terminal event on the returned
    /// stream instead.
    pub async fn begin(
        &self,
        link: &str,
        privilege: Privilege,
    ) -> Result<SessionHandle, DownloadError> {
        if link.trim().is_empty() {
            return Err(DownloadError::MissingLink);
        }

        let (session_id, destination) = self.storage.allocate(privilege).await?;
        let request =
            DownloadRequest::resolve(link, privilege, &destination, &self.downloader)?;
        let session = DownloadSession::new(session_id, destination, privilege, request.tool);

        metrics::SESSIONS_STARTED
            .with_label_values(&[request.tool.name(), privilege_label(privilege)])
            .inc();

        let (events_tx, events_rx) = mpsc::channel(EVENT_BUFFER);
        let runner = SessionRunner {
            launcher: Arc::clone(&self.launcher),
            classifier: Arc::clone(&self.classifier),
            watchdog: IdleWatchdog::new(self.downloader.stall_timeout()),
            storage: self.storage.clone(),
            active: ActiveGuard::enter(&self.active),
            shutdown_rx: self.shutdown_tx.subscribe(),
            events: events_tx,
        };
        tokio::spawn(runner.run(session, request.command));

        Ok(SessionHandle {
            session_id,
            events: events_rx,
        })
    }
}

fn privilege_label(privilege: Privilege) -> &'static str {
    if privilege.is_admin() {
        "admin"
    } else {
        "anonymous"
    }
}

/// Keeps the active session count accurate even if a session task panics.
struct ActiveGuard(Arc<AtomicUsize>);

impl ActiveGuard {
    fn enter(counter: &Arc<AtomicUsize>) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(Arc::clone(counter))
    }
}

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Everything one session task needs, moved into the task.
struct SessionRunner {
    launcher: Arc<dyn ProcessLauncher>,
    classifier: Arc<dyn LineClassifier>,
    watchdog: IdleWatchdog,
    storage: StorageManager,
    active: ActiveGuard,
    shutdown_rx: broadcast::Receiver<()>,
    events: mpsc::Sender<SessionEvent>,
}

impl SessionRunner {
    async fn run(mut self, mut session: DownloadSession, command: CommandSpec) {
        info!(session_id = %session.id, tool = session.tool.name(), command = %command, "Starting download");

        let terminal = match self.drive(&mut session, &command).await {
            Ok(event) => event,
            Err(DownloadError::Disconnected) => {
                session.outcome = SessionOutcome::Failed;
                SessionEvent::Failed(DownloadError::Disconnected.to_string())
            }
            Err(e) => {
                error!(session_id = %session.id, error = %e, "Download session failed");
                session.outcome = SessionOutcome::Failed;
                SessionEvent::Failed(e.to_string())
            }
        };

        let elapsed = (Utc::now() - session.started_at).num_milliseconds().max(0) as f64 / 1000.0;
        metrics::SESSION_OUTCOMES
            .with_label_values(&[session.outcome.as_str()])
            .inc();
        metrics::SESSION_DURATION
            .with_label_values(&[session.tool.name()])
            .observe(elapsed);

        if terminal.is_error() {
            warn!(session_id = %session.id, outcome = session.outcome.as_str(), message = %terminal.message(), "Download finished");
        } else {
            info!(session_id = %session.id, outcome = session.outcome.as_str(), message = %terminal.message(), "Download finished");
        }

        if self.events.send(terminal).await.is_err() {
            debug!(session_id = %session.id, "Listener gone before terminal event");
        }

        if session.is_ephemeral() {
            self.storage.schedule_deletion(session.destination.clone());
        }

        drop(self.active);
    }

    /// Run the tool to completion and decide the terminal event.
    async fn drive(
        &mut self,
        session: &mut DownloadSession,
        command: &CommandSpec,
    ) -> Result<SessionEvent, DownloadError> {
        let mut process = self.launcher.launch(command).map_err(|e| {
            metrics::LAUNCH_FAILURES
                .with_label_values(&[session.tool.name()])
                .inc();
            e
        })?;

        let relay = ProgressRelay::new(self.classifier.as_ref(), &self.events);
        loop {
            let read = tokio::select! {
                read = self.watchdog.read(process.as_mut()) => read,
                _ = self.shutdown_rx.recv() => {
                    info!(session_id = %session.id, "Aborting download for shutdown");
                    process.kill().await;
                    return Err(DownloadError::Shutdown);
                }
            };

            let read = match read {
                Ok(read) => read,
                Err(e) => {
                    process.kill().await;
                    return Err(e.into());
                }
            };

            match read {
                WatchdogRead::Line(line) => {
                    if !relay.relay(&line, &mut session.album_name).await {
                        warn!(session_id = %session.id, "Listener disconnected, killing download");
                        process.kill().await;
                        if let Err(e) = process.wait().await {
                            debug!(session_id = %session.id, error = %e, "Failed to reap killed process");
                        }
                        return Err(DownloadError::Disconnected);
                    }
                }
                WatchdogRead::Eof => break,
                WatchdogRead::Stalled => {
                    return Ok(self.stall(session, process.as_mut()).await);
                }
            }
        }

        let exit_code = process.wait().await?;
        debug!(session_id = %session.id, exit_code, album = %session.album_name, "Download process exited");

        classifier::classify(session, exit_code).await
    }

    async fn stall(
        &self,
        session: &mut DownloadSession,
        process: &mut dyn ExternalProcess,
    ) -> SessionEvent {
        let idle = self.watchdog.threshold();
        warn!(session_id = %session.id, idle_secs = idle.as_secs(), "Download stalled, killing process");
        process.kill().await;
        metrics::STALL_KILLS.inc();
        session.outcome = SessionOutcome::Stalled;
        SessionEvent::Stalled { idle }
    }
}
