//! Testing utilities and mock implementations.
//!
//! Provides a scripted stand-in for the external downloader tools so the
//! engine can be driven end to end without spotdl or yt-dlp installed.
//!
//! # Example
//!
//! ```rust,ignore
//! use audiograb_core::testing::{MockLauncher, ScriptStep, ScriptedProcess};
//!
//! let launcher = MockLauncher::new(|command| {
//!     let dest = fixtures::destination_of(command);
//!     fixtures::write_file(&dest.join("Artist/Album/01 - Song.mp3"));
//!     Ok(ScriptedProcess::new(vec![ScriptStep::line("[download] 100%")]))
//! });
//! ```

mod mock_launcher;
mod scripted_process;

pub use mock_launcher::MockLauncher;
pub use scripted_process::{ScriptStep, ScriptedProcess};

/// Test fixtures and helper functions.
pub mod fixtures {
    use std::path::{Path, PathBuf};

    use crate::downloader::CommandSpec;

    /// Destination directory a resolved spotdl or yt-dlp command writes to.
    pub fn destination_of(command: &CommandSpec) -> PathBuf {
        let template = command
            .args
            .iter()
            .find(|arg| arg.contains("/{artist}") || arg.contains("/%(uploader"))
            .expect("command has no output template");
        let end = template
            .find("/{artist}")
            .or_else(|| template.find("/%(uploader"))
            .unwrap_or(template.len());
        PathBuf::from(&template[..end])
    }

    /// Write a small file, creating parent directories.
    pub fn write_file(path: &Path) {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).expect("failed to create parent dir");
        }
        std::fs::write(path, b"not really audio").expect("failed to write file");
    }
}
