//! A fake external process that replays a script.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::downloader::ExternalProcess;

/// Exit code reported after [`ScriptedProcess::kill`], like SIGKILL.
const KILLED_EXIT_CODE: i32 = -9;

/// One step of a scripted process.
#[derive(Debug, Clone)]
pub enum ScriptStep {
    /// Emit a line after a delay.
    Line { delay: Duration, text: String },
    /// Never produce anything again (until killed).
    Hang,
    /// Fail the read with an I/O error.
    ReadError(String),
}

impl ScriptStep {
    pub fn line(text: impl Into<String>) -> Self {
        Self::Line {
            delay: Duration::ZERO,
            text: text.into(),
        }
    }

    pub fn line_after(delay: Duration, text: impl Into<String>) -> Self {
        Self::Line {
            delay,
            text: text.into(),
        }
    }
}

/// Replays [`ScriptStep`]s as process output, then exits with a set code.
#[derive(Debug)]
pub struct ScriptedProcess {
    steps: VecDeque<ScriptStep>,
    exit_code: i32,
    killed: Arc<AtomicBool>,
}

impl ScriptedProcess {
    pub fn new(steps: Vec<ScriptStep>) -> Self {
        Self {
            steps: steps.into(),
            exit_code: 0,
            killed: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn with_exit_code(mut self, code: i32) -> Self {
        self.exit_code = code;
        self
    }

    /// Flag flipped when the process gets killed, observable after the
    /// process itself has been handed off.
    pub fn killed_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.killed)
    }

    fn is_killed(&self) -> bool {
        self.killed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ExternalProcess for ScriptedProcess {
    async fn next_line(&mut self) -> std::io::Result<Option<String>> {
        if self.is_killed() {
            return Ok(None);
        }

        // Steps are only consumed once complete, so a cancelled read
        // replays the same step next time.
        match self.steps.front().cloned() {
            None => Ok(None),
            Some(ScriptStep::Line { delay, text }) => {
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                self.steps.pop_front();
                Ok(Some(text))
            }
            Some(ScriptStep::Hang) => std::future::pending().await,
            Some(ScriptStep::ReadError(message)) => {
                self.steps.pop_front();
                Err(std::io::Error::other(message))
            }
        }
    }

    async fn kill(&mut self) {
        self.killed.store(true, Ordering::SeqCst);
    }

    async fn wait(&mut self) -> std::io::Result<i32> {
        if self.is_killed() {
            Ok(KILLED_EXIT_CODE)
        } else {
            Ok(self.exit_code)
        }
    }

    fn is_running(&mut self) -> bool {
        !self.is_killed() && !self.steps.is_empty()
    }
}
