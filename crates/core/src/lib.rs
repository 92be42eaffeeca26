pub mod auth;
pub mod config;
pub mod downloader;
pub mod metrics;
pub mod testing;

pub use auth::{
    AdminCredentials, AuthError, AuthRequest, Authenticator, LoginSession, LoginSessions,
    Privilege, SESSION_COOKIE,
};
pub use config::{
    load_config, load_config_from_str, validate_config, AdminConfig, CleanupConfig, Config,
    ConfigError, DownloaderConfig, SanitizedConfig, ServerConfig, StorageConfig,
};
pub use downloader::{
    DownloadEngine, DownloadError, DownloadRequest, DownloadSession, EngineStatus,
    ProcessLauncher, SessionEvent, SessionHandle, SessionId, SessionOutcome, StorageManager,
    TokioProcessLauncher, ToolVariant,
};
