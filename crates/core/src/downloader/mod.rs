//! Download engine: runs an external tool per request, relays its output,
//! decides what to deliver and cleans up afterwards.

pub mod classifier;
mod engine;
mod error;
mod process;
mod relay;
mod storage;
pub mod sweeper;
mod types;
mod watchdog;

pub use classifier::{classify, AUDIO_EXTENSIONS};
pub use engine::{DownloadEngine, EngineStatus, SessionHandle};
pub use error::DownloadError;
pub use process::{ExternalProcess, ProcessLauncher, TokioProcess, TokioProcessLauncher};
pub use relay::{
    LineClassifier, PatternClassifier, ProgressRelay, SPOTDL_ALBUM_PATTERN,
    YTDLP_PLAYLIST_PATTERN,
};
pub use storage::StorageManager;
pub use sweeper::{sweep_once, SweepReport, Sweeper};
pub use types::*;
pub use watchdog::{IdleWatchdog, WatchdogRead};
