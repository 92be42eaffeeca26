//! Mock launcher for testing.

use std::sync::{Arc, Mutex};

use super::scripted_process::ScriptedProcess;
use crate::downloader::{CommandSpec, DownloadError, ExternalProcess, ProcessLauncher};

type LaunchFn = dyn Fn(&CommandSpec) -> Result<ScriptedProcess, DownloadError> + Send + Sync;

/// Mock implementation of the ProcessLauncher trait.
///
/// Every launch is recorded, then handed to the closure, which may prepare
/// files in the destination directory before returning the script to replay.
pub struct MockLauncher {
    on_launch: Box<LaunchFn>,
    launches: Arc<Mutex<Vec<CommandSpec>>>,
}

impl MockLauncher {
    pub fn new<F>(on_launch: F) -> Self
    where
        F: Fn(&CommandSpec) -> Result<ScriptedProcess, DownloadError> + Send + Sync + 'static,
    {
        Self {
            on_launch: Box::new(on_launch),
            launches: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Launcher whose processes print nothing and exit cleanly.
    pub fn silent() -> Self {
        Self::new(|_| Ok(ScriptedProcess::new(Vec::new())))
    }

    /// Get all recorded launches.
    pub fn recorded_launches(&self) -> Vec<CommandSpec> {
        self.launches.lock().expect("launch log poisoned").clone()
    }

    pub fn launch_count(&self) -> usize {
        self.launches.lock().expect("launch log poisoned").len()
    }
}

impl ProcessLauncher for MockLauncher {
    fn launch(&self, command: &CommandSpec) -> Result<Box<dyn ExternalProcess>, DownloadError> {
        self.launches
            .lock()
            .expect("launch log poisoned")
            .push(command.clone());
        let process = (self.on_launch)(command)?;
        Ok(Box::new(process))
    }
}
