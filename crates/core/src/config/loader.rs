use figment::{
    providers::{Env, Format, Serialized, Toml},
    value::{Uncased, UncasedStr},
    Figment,
};
use std::path::Path;

use super::{types::Config, ConfigError};

/// Unprefixed variables the container images have always exported.
const LEGACY_ENV_VARS: &[&str] = &[
    "AUDIO_DOWNLOAD_PATH",
    "ADMIN_USERNAME",
    "ADMIN_PASSWORD",
    "CLEANUP_INTERVAL",
];

/// Load configuration from defaults, an optional TOML file and the environment.
///
/// Precedence (lowest first): built-in defaults, the file, `AUDIOGRAB_*`
/// variables (`__` separates sections), then the legacy variables.
pub fn load_config(path: Option<&Path>) -> Result<Config, ConfigError> {
    let mut figment = Figment::from(Serialized::defaults(Config::default()));

    if let Some(path) = path {
        if !path.exists() {
            return Err(ConfigError::FileNotFound(path.display().to_string()));
        }
        figment = figment.merge(Toml::file(path));
    }

    let config: Config = figment
        .merge(Env::prefixed("AUDIOGRAB_").split("__"))
        .merge(Env::raw().only(LEGACY_ENV_VARS).map(legacy_key))
        .extract()
        .map_err(|e| ConfigError::ParseError(e.to_string()))?;

    Ok(config)
}

fn legacy_key(key: &UncasedStr) -> Uncased<'_> {
    let mapped = match key.as_str().to_ascii_uppercase().as_str() {
        "AUDIO_DOWNLOAD_PATH" => "storage.admin_dir",
        "ADMIN_USERNAME" => "admin.username",
        "ADMIN_PASSWORD" => "admin.password",
        "CLEANUP_INTERVAL" => "cleanup.interval_secs",
        _ => return Uncased::from(key.as_str()),
    };
    mapped.into()
}

/// Load configuration from TOML string (useful for testing)
pub fn load_config_from_str(toml_str: &str) -> Result<Config, ConfigError> {
    toml::from_str(toml_str).map_err(|e| ConfigError::ParseError(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::Jail;
    use std::io::Write;
    use std::path::PathBuf;
    use tempfile::NamedTempFile;

    #[test]
    fn test_load_config_from_str_valid() {
        let toml = r#"
[server]
port = 9000

[cleanup]
interval_secs = 60
"#;
        let config = load_config_from_str(toml).unwrap();
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.cleanup.interval_secs, 60);
    }

    #[test]
    fn test_load_config_from_str_bad_type() {
        let toml = r#"
[server]
port = "not-a-port"
"#;
        let result = load_config_from_str(toml);
        assert!(matches!(result, Err(ConfigError::ParseError(_))));
    }

    #[test]
    fn test_load_config_file_not_found() {
        let result = load_config(Some(Path::new("/nonexistent/config.toml")));
        assert!(matches!(result, Err(ConfigError::FileNotFound(_))));
    }

    #[test]
    fn test_load_config_from_file() {
        // Jail serializes access to the process environment with the env tests.
        Jail::expect_with(|_jail| {
            let mut temp_file = NamedTempFile::new().unwrap();
            writeln!(
                temp_file,
                r#"
[server]
host = "127.0.0.1"
port = 3000

[storage]
base_dir = "/tmp/audiograb"
"#
            )
            .unwrap();

            let config = load_config(Some(temp_file.path())).unwrap();
            assert_eq!(config.server.port, 3000);
            assert_eq!(config.server.host.to_string(), "127.0.0.1");
            assert_eq!(config.storage.base_dir, PathBuf::from("/tmp/audiograb"));
            Ok(())
        });
    }

    #[test]
    fn test_prefixed_env_overrides_file() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "audiograb.toml",
                r#"
[server]
port = 3000
"#,
            )?;
            jail.set_env("AUDIOGRAB_SERVER__PORT", "4000");
            jail.set_env("AUDIOGRAB_DOWNLOADER__STALL_TIMEOUT_SECS", "30");

            let config = load_config(Some(Path::new("audiograb.toml"))).unwrap();
            assert_eq!(config.server.port, 4000);
            assert_eq!(config.downloader.stall_timeout_secs, 30);
            Ok(())
        });
    }

    #[test]
    fn test_legacy_env_vars() {
        Jail::expect_with(|jail| {
            jail.set_env("AUDIO_DOWNLOAD_PATH", "/music");
            jail.set_env("ADMIN_USERNAME", "dj");
            jail.set_env("ADMIN_PASSWORD", "1234");
            jail.set_env("CLEANUP_INTERVAL", "120");

            let config = load_config(None).unwrap();
            assert_eq!(config.storage.admin_dir(), PathBuf::from("/music"));
            assert_eq!(config.storage.base_dir, PathBuf::from("/app/downloads"));
            assert_eq!(config.admin.username, "dj");
            assert_eq!(config.admin.password, "1234");
            assert_eq!(config.cleanup.interval_secs, 120);
            Ok(())
        });
    }
}
