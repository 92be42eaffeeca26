//! Completion classifier: decides what a finished download delivers.
//!
//! Runs once per session after the tool has exited and its output has been
//! drained. Filesystem work happens on the blocking pool.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Component, Path, PathBuf};
use tracing::{debug, info, warn};
use walkdir::WalkDir;
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipWriter};

use super::error::DownloadError;
use crate::metrics;
use super::types::{DownloadSession, SessionEvent, SessionOutcome, DEFAULT_ALBUM_NAME};

/// Extensions counted as delivered audio.
pub const AUDIO_EXTENSIONS: &[&str] = &["mp3", "m4a", "flac", "wav", "ogg"];

/// Suffix yt-dlp leaves on auto-generated artist channels.
pub const TOPIC_SUFFIX: &str = " - topic";

pub fn is_audio_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            AUDIO_EXTENSIONS
                .iter()
                .any(|known| known.eq_ignore_ascii_case(ext))
        })
        .unwrap_or(false)
}

/// All audio files below `dir`, relative to it, sorted.
///
/// Unreadable entries are skipped: a concurrent sweep may remove files
/// mid-walk and that simply shows up as fewer results.
pub fn collect_audio_files(dir: &Path) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = WalkDir::new(dir)
        .into_iter()
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(e) => {
                debug!(dir = %dir.display(), error = %e, "Skipping unreadable entry");
                None
            }
        })
        .filter(|entry| entry.file_type().is_file() && is_audio_file(entry.path()))
        .filter_map(|entry| entry.path().strip_prefix(dir).ok().map(Path::to_path_buf))
        .collect();
    files.sort();
    files
}

/// Strip the topic suffix from the immediate subdirectories of `dir`.
///
/// Only the top level is touched: the admin directory may be shared with
/// anonymous session folders whose delivered paths must stay valid.
/// Returns the renames that succeeded.
pub fn normalize_topic_dirs(dir: &Path) -> Vec<(PathBuf, PathBuf)> {
    let candidates: Vec<PathBuf> = WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name()
        .into_iter()
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().is_dir())
        .map(|entry| entry.into_path())
        .filter(|path| strip_topic_suffix(path).is_some())
        .collect();

    let mut renamed = Vec::new();
    for from in candidates {
        let Some(to) = strip_topic_suffix(&from) else {
            continue;
        };
        if to.exists() {
            warn!(from = %from.display(), to = %to.display(), "Rename target exists, leaving folder as is");
            continue;
        }
        match std::fs::rename(&from, &to) {
            Ok(()) => {
                info!(from = %from.display(), to = %to.display(), "Renamed folder");
                renamed.push((from, to));
            }
            Err(e) => warn!(from = %from.display(), error = %e, "Failed to rename folder"),
        }
    }
    renamed
}

fn strip_topic_suffix(path: &Path) -> Option<PathBuf> {
    let name = path.file_name()?.to_str()?;
    let split = name.len().checked_sub(TOPIC_SUFFIX.len())?;
    if !name.is_char_boundary(split) || !name[split..].eq_ignore_ascii_case(TOPIC_SUFFIX) {
        return None;
    }
    let stripped = &name[..split];
    if stripped.is_empty() {
        return None;
    }
    Some(path.with_file_name(stripped))
}

/// Archive file name for an album: path separators replaced, `.zip` appended.
pub fn archive_file_name(album_name: &str) -> String {
    let cleaned: String = album_name
        .trim()
        .chars()
        .map(|c| match c {
            '/' | '\\' | '\0' => '_',
            c => c,
        })
        .collect();
    let base = match cleaned.as_str() {
        "" | "." | ".." => DEFAULT_ALBUM_NAME,
        other => other,
    };
    format!("{}.zip", base)
}

/// Zip `files` (relative to `dir`) into `dir/archive_name`.
pub fn build_archive(
    dir: &Path,
    archive_name: &str,
    files: &[PathBuf],
) -> Result<PathBuf, DownloadError> {
    let archive_path = dir.join(archive_name);
    let file = File::create(&archive_path)?;
    let mut zip = ZipWriter::new(BufWriter::new(file));
    let options = FileOptions::default().compression_method(CompressionMethod::Deflated);

    for relative in files {
        let entry_name = zip_entry_name(relative);
        zip.start_file(entry_name.as_str(), options)
            .map_err(|e| DownloadError::archive(&archive_path, e))?;
        let mut source = File::open(dir.join(relative))?;
        std::io::copy(&mut source, &mut zip)?;
        debug!(entry = %entry_name, "Added to archive");
    }

    let mut writer = zip
        .finish()
        .map_err(|e| DownloadError::archive(&archive_path, e))?;
    writer.flush()?;

    Ok(archive_path)
}

/// Zip entries always use `/`, whatever the host separator.
fn zip_entry_name(relative: &Path) -> String {
    relative
        .components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}

/// Percent-escape each segment of a relative path, keeping `/` between them.
pub fn url_escape_path(relative: &Path) -> String {
    relative
        .components()
        .filter_map(|c| match c {
            Component::Normal(part) => {
                Some(urlencoding::encode(&part.to_string_lossy()).into_owned())
            }
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}

/// Inspect the session directory and produce the terminal event.
///
/// A non-zero exit fails the session whatever the tool left behind.
/// Sets `session.outcome` as a side effect.
pub async fn classify(
    session: &mut DownloadSession,
    exit_code: i32,
) -> Result<SessionEvent, DownloadError> {
    if exit_code != 0 {
        session.outcome = SessionOutcome::Failed;
        return Ok(SessionEvent::ExitedWithCode(exit_code));
    }

    let destination = session.destination.clone();
    let files = run_blocking({
        let destination = destination.clone();
        move || Ok(collect_audio_files(&destination))
    })
    .await?;

    if files.is_empty() {
        session.outcome = SessionOutcome::Failed;
        return Ok(SessionEvent::NoAudioFiles);
    }

    if session.privilege.is_admin() {
        if !session.tool.is_archive_capable() {
            let dir = destination.clone();
            run_blocking(move || Ok(normalize_topic_dirs(&dir))).await?;
        }
        session.outcome = SessionOutcome::SucceededInPlace;
        return Ok(SessionEvent::Completed);
    }

    if files.len() > 1 {
        let archive_name = archive_file_name(&session.album_name);
        let count = files.len();
        let path = run_blocking({
            let archive_name = archive_name.clone();
            move || build_archive(&destination, &archive_name, &files)
        })
        .await?;
        info!(session_id = %session.id, archive = %path.display(), files = count, "Built archive");
        metrics::ARCHIVES_BUILT.inc();
        session.outcome = SessionOutcome::SucceededMulti;
        return Ok(SessionEvent::Delivery(format!(
            "{}/{}",
            session.id,
            urlencoding::encode(&archive_name)
        )));
    }

    session.outcome = SessionOutcome::SucceededSingle;
    Ok(SessionEvent::Delivery(format!(
        "{}/{}",
        session.id,
        url_escape_path(&files[0])
    )))
}

async fn run_blocking<T, F>(f: F) -> Result<T, DownloadError>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, DownloadError> + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| DownloadError::Task(e.to_string()))?
}
