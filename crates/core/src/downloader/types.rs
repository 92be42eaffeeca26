//! Types for the downloader module.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use uuid::Uuid;

use super::error::DownloadError;
use crate::auth::Privilege;
use crate::config::DownloaderConfig;

/// Album name used until the tool output names one.
pub const DEFAULT_ALBUM_NAME: &str = "playlist";

/// Opaque identifier addressing one download session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for SessionId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// Which external tool handles a link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolVariant {
    /// spotdl, for Spotify links.
    Spotdl,
    /// yt-dlp, for everything else.
    YtDlp,
}

impl ToolVariant {
    pub fn for_link(link: &str) -> Self {
        if link.contains("spotify") {
            Self::Spotdl
        } else {
            Self::YtDlp
        }
    }

    /// spotdl lays out artist folders itself; yt-dlp's uploader-named
    /// folders (`Artist - topic`) need normalizing for the admin library.
    pub fn is_archive_capable(self) -> bool {
        matches!(self, Self::Spotdl)
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Spotdl => "spotdl",
            Self::YtDlp => "yt-dlp",
        }
    }
}

/// A program and its arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: PathBuf,
    pub args: Vec<String>,
}

impl CommandSpec {
    pub fn new(program: impl Into<PathBuf>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }
}

impl fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program.display())?;
        for arg in &self.args {
            write!(f, " {}", arg)?;
        }
        Ok(())
    }
}

/// One inbound download request, fully resolved.
#[derive(Debug, Clone)]
pub struct DownloadRequest {
    pub link: String,
    pub privilege: Privilege,
    pub tool: ToolVariant,
    pub command: CommandSpec,
}

impl DownloadRequest {
    /// Pick the tool for `link` and build its command targeting `destination`.
    pub fn resolve(
        link: &str,
        privilege: Privilege,
        destination: &Path,
        config: &DownloaderConfig,
    ) -> Result<Self, DownloadError> {
        let link = link.trim();
        if link.is_empty() {
            return Err(DownloadError::MissingLink);
        }

        let tool = ToolVariant::for_link(link);
        let dest = destination.display();
        let command = match tool {
            ToolVariant::Spotdl => CommandSpec::new(
                &config.spotdl_path,
                vec![
                    "--output".to_string(),
                    format!("{dest}/{{artist}}/{{album}}/{{track-number}} - {{title}}.{{output-ext}}"),
                    link.to_string(),
                ],
            ),
            ToolVariant::YtDlp => CommandSpec::new(
                &config.ytdlp_path,
                vec![
                    "-x".to_string(),
                    "--newline".to_string(),
                    "--audio-format".to_string(),
                    config.audio_format.clone(),
                    "-o".to_string(),
                    format!(
                        "{dest}/%(uploader|artist)s/%(album|playlist)s/%(playlist_index)s - %(title)s.%(ext)s"
                    ),
                    link.to_string(),
                ],
            ),
        };

        Ok(Self {
            link: link.to_string(),
            privilege,
            tool,
            command,
        })
    }
}

/// Where a session ended up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionOutcome {
    Pending,
    Stalled,
    Failed,
    SucceededEmpty,
    SucceededSingle,
    SucceededMulti,
    SucceededInPlace,
}

impl SessionOutcome {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Stalled => "stalled",
            Self::Failed => "failed",
            Self::SucceededEmpty => "succeeded_empty",
            Self::SucceededSingle => "succeeded_single",
            Self::SucceededMulti => "succeeded_multi",
            Self::SucceededInPlace => "succeeded_in_place",
        }
    }

    pub fn is_success(self) -> bool {
        matches!(
            self,
            Self::SucceededSingle | Self::SucceededMulti | Self::SucceededInPlace
        )
    }
}

/// Something the caller sees on the progress stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// A verbatim output line from the tool.
    Progress(String),
    /// No output for the idle threshold; the tool was killed.
    Stalled { idle: Duration },
    /// The tool finished but left no audio behind.
    NoAudioFiles,
    /// The tool failed and left no audio behind.
    ExitedWithCode(i32),
    /// Anything unexpected, including launch failures.
    Failed(String),
    /// `session_id/path` of the file or archive to fetch.
    Delivery(String),
    /// Admin download finished in place.
    Completed,
}

impl SessionEvent {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Progress(_))
    }

    pub fn is_error(&self) -> bool {
        matches!(
            self,
            Self::Stalled { .. } | Self::NoAudioFiles | Self::ExitedWithCode(_) | Self::Failed(_)
        )
    }

    /// Text carried in the event's `data:` field.
    pub fn message(&self) -> String {
        match self {
            Self::Progress(line) => line.clone(),
            Self::Stalled { idle } => {
                format!("Error: Download stalled for {}.", describe_idle(*idle))
            }
            Self::NoAudioFiles => "Error: No valid audio files found.".to_string(),
            Self::ExitedWithCode(code) => format!("Error: Download exited with code {}.", code),
            Self::Failed(reason) => format!("Error: {}", reason),
            Self::Delivery(path) => format!("DOWNLOAD: {}", path),
            Self::Completed => "Download completed. Files saved to server directory.".to_string(),
        }
    }
}

fn describe_idle(idle: Duration) -> String {
    let secs = idle.as_secs();
    match secs {
        60 => "1 minute".to_string(),
        s if s > 0 && s % 60 == 0 => format!("{} minutes", s / 60),
        1 => "1 second".to_string(),
        s => format!("{} seconds", s),
    }
}

/// State of one running download.
#[derive(Debug, Clone)]
pub struct DownloadSession {
    pub id: SessionId,
    pub destination: PathBuf,
    pub privilege: Privilege,
    pub tool: ToolVariant,
    pub album_name: String,
    pub outcome: SessionOutcome,
    pub started_at: DateTime<Utc>,
}

impl DownloadSession {
    pub fn new(id: SessionId, destination: PathBuf, privilege: Privilege, tool: ToolVariant) -> Self {
        Self {
            id,
            destination,
            privilege,
            tool,
            album_name: DEFAULT_ALBUM_NAME.to_string(),
            outcome: SessionOutcome::Pending,
            started_at: Utc::now(),
        }
    }

    /// Anonymous sessions own their directory and get it deleted afterwards.
    pub fn is_ephemeral(&self) -> bool {
        !self.privilege.is_admin()
    }
}
