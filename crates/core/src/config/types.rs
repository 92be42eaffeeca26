use serde::{Deserialize, Deserializer, Serialize};
use std::net::IpAddr;
use std::path::PathBuf;
use std::time::Duration;

/// Root configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub admin: AdminConfig,
    #[serde(default)]
    pub cleanup: CleanupConfig,
    #[serde(default)]
    pub downloader: DownloaderConfig,
}

/// Server configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: IpAddr,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Directory holding the static web client.
    #[serde(default = "default_web_dir")]
    pub web_dir: PathBuf,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            web_dir: default_web_dir(),
        }
    }
}

fn default_host() -> IpAddr {
    IpAddr::V4(std::net::Ipv4Addr::UNSPECIFIED)
}

fn default_port() -> u16 {
    5000
}

fn default_web_dir() -> PathBuf {
    PathBuf::from("web")
}

/// Where downloads land on disk.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
    /// Ephemeral root. Anonymous sessions get a subdirectory each and the
    /// sweeper wipes everything below it.
    #[serde(default = "default_base_dir")]
    pub base_dir: PathBuf,
    /// Shared destination for admin downloads (defaults to `base_dir`).
    #[serde(default)]
    pub admin_dir: Option<PathBuf>,
}

impl StorageConfig {
    pub fn admin_dir(&self) -> PathBuf {
        self.admin_dir
            .clone()
            .unwrap_or_else(|| self.base_dir.clone())
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            base_dir: default_base_dir(),
            admin_dir: None,
        }
    }
}

fn default_base_dir() -> PathBuf {
    PathBuf::from("/app/downloads")
}

/// Admin credential pair
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AdminConfig {
    #[serde(default = "default_admin_username", deserialize_with = "lenient_string")]
    pub username: String,
    #[serde(default = "default_admin_password", deserialize_with = "lenient_string")]
    pub password: String,
    /// How long a login stays valid
    #[serde(default = "default_session_ttl")]
    pub session_ttl_secs: u64,
}

impl AdminConfig {
    pub fn session_ttl(&self) -> Duration {
        Duration::from_secs(self.session_ttl_secs)
    }
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            username: default_admin_username(),
            password: default_admin_password(),
            session_ttl_secs: default_session_ttl(),
        }
    }
}

fn default_admin_username() -> String {
    "admin".to_string()
}

fn default_admin_password() -> String {
    "password".to_string()
}

fn default_session_ttl() -> u64 {
    7 * 24 * 3600
}

/// Environment providers parse purely numeric values as integers, so a
/// password like `1234` must still land in a `String`.
fn lenient_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Text(String),
        Signed(i64),
        Unsigned(u64),
        Float(f64),
        Flag(bool),
    }

    Ok(match Raw::deserialize(deserializer)? {
        Raw::Text(s) => s,
        Raw::Signed(n) => n.to_string(),
        Raw::Unsigned(n) => n.to_string(),
        Raw::Float(n) => n.to_string(),
        Raw::Flag(b) => b.to_string(),
    })
}

/// Cleanup timing
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CleanupConfig {
    /// Seconds between sweeps of the ephemeral root.
    #[serde(default = "default_interval")]
    pub interval_secs: u64,
    /// Seconds an anonymous session directory survives after its outcome.
    #[serde(default = "default_deletion_delay")]
    pub deletion_delay_secs: u64,
}

impl CleanupConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn deletion_delay(&self) -> Duration {
        Duration::from_secs(self.deletion_delay_secs)
    }
}

impl Default for CleanupConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_interval(),
            deletion_delay_secs: default_deletion_delay(),
        }
    }
}

fn default_interval() -> u64 {
    3600
}

fn default_deletion_delay() -> u64 {
    300
}

/// External downloader tools
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DownloaderConfig {
    #[serde(default = "default_spotdl_path")]
    pub spotdl_path: PathBuf,
    #[serde(default = "default_ytdlp_path")]
    pub ytdlp_path: PathBuf,
    /// Target format passed to yt-dlp's `--audio-format`.
    #[serde(default = "default_audio_format")]
    pub audio_format: String,
    /// Idle seconds without output before a download is considered stalled.
    #[serde(default = "default_stall_timeout")]
    pub stall_timeout_secs: u64,
}

impl DownloaderConfig {
    pub fn stall_timeout(&self) -> Duration {
        Duration::from_secs(self.stall_timeout_secs)
    }
}

impl Default for DownloaderConfig {
    fn default() -> Self {
        Self {
            spotdl_path: default_spotdl_path(),
            ytdlp_path: default_ytdlp_path(),
            audio_format: default_audio_format(),
            stall_timeout_secs: default_stall_timeout(),
        }
    }
}

fn default_spotdl_path() -> PathBuf {
    PathBuf::from("spotdl")
}

fn default_ytdlp_path() -> PathBuf {
    PathBuf::from("yt-dlp")
}

fn default_audio_format() -> String {
    "mp3".to_string()
}

fn default_stall_timeout() -> u64 {
    300
}

/// Sanitized config for API responses (secrets redacted)
#[derive(Debug, Clone, Serialize)]
pub struct SanitizedConfig {
    pub server: ServerConfig,
    pub storage: SanitizedStorageConfig,
    pub admin: SanitizedAdminConfig,
    pub cleanup: CleanupConfig,
    pub downloader: DownloaderConfig,
}

#[derive(Debug, Clone, Serialize)]
pub struct SanitizedStorageConfig {
    pub base_dir: PathBuf,
    pub admin_dir: PathBuf,
}

/// Admin section with the password hidden
#[derive(Debug, Clone, Serialize)]
pub struct SanitizedAdminConfig {
    pub username: String,
    pub password_configured: bool,
    pub session_ttl_secs: u64,
}

impl From<&Config> for SanitizedConfig {
    fn from(config: &Config) -> Self {
        Self {
            server: config.server.clone(),
            storage: SanitizedStorageConfig {
                base_dir: config.storage.base_dir.clone(),
                admin_dir: config.storage.admin_dir(),
            },
            admin: SanitizedAdminConfig {
                username: config.admin.username.clone(),
                password_configured: !config.admin.password.is_empty(),
                session_ttl_secs: config.admin.session_ttl_secs,
            },
            cleanup: config.cleanup.clone(),
            downloader: config.downloader.clone(),
        }
    }
}
