use std::sync::Arc;
use audiograb_core::{
    AdminCredentials, Authenticator, Config, DownloadEngine, LoginSessions, SanitizedConfig,
};

/// Shared application state
///
/// Created once at startup and never persisted. Login sessions live only in
/// this process, so running several instances behind a balancer would need
/// them moved to a shared store.
pub struct AppState {
    config: Config,
    engine: Arc<DownloadEngine>,
    sessions: Arc<LoginSessions>,
}

impl AppState {
    pub fn new(config: Config, engine: Arc<DownloadEngine>) -> Self {
        let sessions = Arc::new(
            LoginSessions::new(AdminCredentials::from(&config.admin))
                .with_ttl(config.admin.session_ttl()),
        );
        Self {
            config,
            engine,
            sessions,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn sanitized_config(&self) -> SanitizedConfig {
        SanitizedConfig::from(&self.config)
    }

    pub fn engine(&self) -> &DownloadEngine {
        self.engine.as_ref()
    }

    pub fn sessions(&self) -> &LoginSessions {
        self.sessions.as_ref()
    }

    pub fn authenticator(&self) -> &dyn Authenticator {
        self.sessions.as_ref()
    }
}
