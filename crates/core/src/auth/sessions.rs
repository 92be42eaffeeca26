//! In-memory login sessions.
//!
//! Lives for the lifetime of the process and is never persisted, so a restart
//! logs everyone out. Running more than one instance would need this moved to
//! a shared store.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, info};
use uuid::Uuid;

use super::credentials::AdminCredentials;
use super::traits::{AuthError, Authenticator};
use super::types::{AuthRequest, LoginSession, Privilege};

/// Default login lifetime.
const DEFAULT_TTL: Duration = Duration::from_secs(7 * 24 * 3600);

/// Login tokens issued to the admin, keyed by token.
pub struct LoginSessions {
    credentials: AdminCredentials,
    ttl: Duration,
    sessions: RwLock<HashMap<String, LoginSession>>,
}

impl LoginSessions {
    pub fn new(credentials: AdminCredentials) -> Self {
        Self {
            credentials,
            ttl: DEFAULT_TTL,
            sessions: RwLock::new(HashMap::new()),
        }
    }

    /// Expire logins older than `ttl`.
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    fn is_expired(&self, session: &LoginSession) -> bool {
        let age = (Utc::now() - session.created_at).to_std().unwrap_or_default();
        age >= self.ttl
    }

    /// Drop expired logins. Returns how many were removed.
    pub async fn prune_expired(&self) -> usize {
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|_, session| !self.is_expired(session));
        let removed = before - sessions.len();
        if removed > 0 {
            debug!(removed, "Pruned expired logins");
        }
        removed
    }

    /// Check credentials and issue a fresh token.
    pub async fn login(&self, username: &str, password: &str) -> Result<String, AuthError> {
        if !self.credentials.verify(username, password) {
            return Err(AuthError::InvalidCredentials);
        }

        self.prune_expired().await;

        let token = Uuid::new_v4().to_string();
        self.sessions.write().await.insert(
            token.clone(),
            LoginSession {
                username: username.to_string(),
                created_at: Utc::now(),
            },
        );
        info!(username, "Admin logged in");
        Ok(token)
    }

    /// Drop a token. Returns whether it existed.
    pub async fn logout(&self, token: &str) -> bool {
        let removed = self.sessions.write().await.remove(token);
        if let Some(session) = &removed {
            info!(username = %session.username, "Admin logged out");
        }
        removed.is_some()
    }

    pub async fn is_logged_in(&self, token: &str) -> bool {
        self.sessions
            .read()
            .await
            .get(token)
            .is_some_and(|session| !self.is_expired(session))
    }

    pub async fn privilege_for(&self, token: Option<&str>) -> Privilege {
        match token {
            Some(token) if self.is_logged_in(token).await => Privilege::Admin,
            _ => Privilege::Anonymous,
        }
    }

    /// Number of logins that have not expired.
    pub async fn count(&self) -> usize {
        self.sessions
            .read()
            .await
            .values()
            .filter(|session| !self.is_expired(session))
            .count()
    }
}

#[async_trait]
impl Authenticator for LoginSessions {
    async fn privilege(&self, request: &AuthRequest) -> Privilege {
        self.privilege_for(request.session_token()).await
    }

    fn method_name(&self) -> &'static str {
        "session_cookie"
    }
}
