use super::{types::Config, ConfigError};

/// Validate configuration
/// Currently validates:
/// - Server port is not 0
/// - Sweep interval and stall timeout are non-zero
/// - Admin username is set and logins have a non-zero lifetime
/// - Tool paths are not empty
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    if config.server.port == 0 {
        return Err(ConfigError::ValidationError(
            "server.port cannot be 0".to_string(),
        ));
    }

    if config.cleanup.interval_secs == 0 {
        return Err(ConfigError::ValidationError(
            "cleanup.interval_secs cannot be 0".to_string(),
        ));
    }

    if config.admin.session_ttl_secs == 0 {
        return Err(ConfigError::ValidationError(
            "admin.session_ttl_secs cannot be 0".to_string(),
        ));
    }

    if config.downloader.stall_timeout_secs == 0 {
        return Err(ConfigError::ValidationError(
            "downloader.stall_timeout_secs cannot be 0".to_string(),
        ));
    }

    if config.admin.username.trim().is_empty() {
        return Err(ConfigError::ValidationError(
            "admin.username cannot be empty".to_string(),
        ));
    }

    for (name, path) in [
        ("downloader.spotdl_path", &config.downloader.spotdl_path),
        ("downloader.ytdlp_path", &config.downloader.ytdlp_path),
    ] {
        if path.as_os_str().is_empty() {
            return Err(ConfigError::ValidationError(format!("{} cannot be empty", name)));
        }
    }

    Ok(())
}
