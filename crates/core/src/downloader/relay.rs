//! Progress relay: forwards tool output and scrapes the album name.

use regex_lite::Regex;
use tokio::sync::mpsc;

use super::types::SessionEvent;

/// spotdl: `Found 12 songs in Some Album (Album)`.
pub const SPOTDL_ALBUM_PATTERN: &str = r"Found \d+ songs in (.+?) \(";
/// yt-dlp: `Downloading playlist "Some Playlist"`.
pub const YTDLP_PLAYLIST_PATTERN: &str = r#"Downloading playlist "(.+?)""#;

/// Extracts a collection name from a single output line.
pub trait LineClassifier: Send + Sync {
    fn classify(&self, line: &str) -> Option<String>;
}

/// Ordered regex list; the first pattern that matches wins and its first
/// capture group is the result.
#[derive(Debug, Clone)]
pub struct PatternClassifier {
    patterns: Vec<Regex>,
}

impl PatternClassifier {
    pub fn new(patterns: Vec<Regex>) -> Self {
        Self { patterns }
    }

    /// Patterns for spotdl and yt-dlp album/playlist announcements.
    pub fn album_names() -> Self {
        let patterns = [SPOTDL_ALBUM_PATTERN, YTDLP_PLAYLIST_PATTERN]
            .into_iter()
            .filter_map(|p| Regex::new(p).ok())
            .collect();
        Self::new(patterns)
    }
}

impl Default for PatternClassifier {
    fn default() -> Self {
        Self::album_names()
    }
}

impl LineClassifier for PatternClassifier {
    fn classify(&self, line: &str) -> Option<String> {
        self.patterns.iter().find_map(|re| {
            let captured = re.captures(line)?.get(1)?.as_str().trim();
            (!captured.is_empty()).then(|| captured.to_string())
        })
    }
}

/// Relays lines to the event stream and keeps the latest album name.
pub struct ProgressRelay<'a> {
    classifier: &'a dyn LineClassifier,
    events: &'a mpsc::Sender<SessionEvent>,
}

impl<'a> ProgressRelay<'a> {
    pub fn new(classifier: &'a dyn LineClassifier, events: &'a mpsc::Sender<SessionEvent>) -> Self {
        Self { classifier, events }
    }

    /// Forward one line verbatim, then update `album_name` if it names one.
    ///
    /// Returns `false` once nobody is listening anymore.
    pub async fn relay(&self, line: &str, album_name: &mut String) -> bool {
        let line = line.trim_end();
        let delivered = self
            .events
            .send(SessionEvent::Progress(line.to_string()))
            .await
            .is_ok();

        if let Some(name) = self.classifier.classify(line) {
            *album_name = name;
        }

        delivered
    }
}
