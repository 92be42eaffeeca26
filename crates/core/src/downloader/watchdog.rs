//! Idle-time watchdog over process output.

use std::time::Duration;
use tokio::time::timeout;

use super::process::ExternalProcess;

/// Result of one watched read.
#[derive(Debug, PartialEq, Eq)]
pub enum WatchdogRead {
    Line(String),
    Eof,
    /// No line arrived within the idle threshold.
    Stalled,
}

/// Bounds the time between two output lines, not the total runtime.
#[derive(Debug, Clone, Copy)]
pub struct IdleWatchdog {
    threshold: Duration,
}

impl IdleWatchdog {
    pub fn new(threshold: Duration) -> Self {
        Self { threshold }
    }

    pub fn threshold(&self) -> Duration {
        self.threshold
    }

    /// Read the next line with the idle threshold as deadline.
    ///
    /// Every call starts a fresh window, so a steady trickle of output keeps
    /// a long download alive. Killing the process on `Stalled` is left to the
    /// caller.
    pub async fn read(&self, process: &mut dyn ExternalProcess) -> std::io::Result<WatchdogRead> {
        match timeout(self.threshold, process.next_line()).await {
            Ok(Ok(Some(line))) => Ok(WatchdogRead::Line(line)),
            Ok(Ok(None)) => Ok(WatchdogRead::Eof),
            Ok(Err(e)) => Err(e),
            Err(_) => Ok(WatchdogRead::Stalled),
        }
    }
}
