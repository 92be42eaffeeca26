use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Name of the cookie carrying the login token.
pub const SESSION_COOKIE: &str = "session";

/// Request information for authentication
#[derive(Debug, Clone, Default)]
pub struct AuthRequest {
    /// Lowercased header names to values.
    pub headers: HashMap<String, String>,
}

impl AuthRequest {
    /// Value of the named cookie, if the request carries one.
    pub fn cookie(&self, name: &str) -> Option<&str> {
        self.headers.get("cookie")?.split(';').find_map(|pair| {
            let (key, value) = pair.trim().split_once('=')?;
            (key == name).then_some(value)
        })
    }

    /// The login token from the session cookie.
    pub fn session_token(&self) -> Option<&str> {
        self.cookie(SESSION_COOKIE).filter(|token| !token.is_empty())
    }
}

/// Whether a caller downloads into the shared admin directory.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Privilege {
    #[default]
    Anonymous,
    Admin,
}

impl Privilege {
    pub fn is_admin(self) -> bool {
        matches!(self, Self::Admin)
    }
}

/// A logged-in admin.
#[derive(Debug, Clone, Serialize)]
pub struct LoginSession {
    pub username: String,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request_with_cookie(cookie: &str) -> AuthRequest {
        let mut headers = HashMap::new();
        headers.insert("cookie".to_string(), cookie.to_string());
        AuthRequest { headers }
    }

    #[test]
    fn test_cookie_lookup() {
        let request = request_with_cookie("theme=dark; session=abc-123; lang=en");
        assert_eq!(request.cookie("session"), Some("abc-123"));
        assert_eq!(request.cookie("lang"), Some("en"));
        assert_eq!(request.cookie("missing"), None);
    }

    #[test]
    fn test_session_token_ignores_empty_value() {
        let request = request_with_cookie("session=");
        assert_eq!(request.session_token(), None);
    }

    #[test]
    fn test_no_cookie_header() {
        assert_eq!(AuthRequest::default().session_token(), None);
    }

    #[test]
    fn test_privilege() {
        assert!(Privilege::Admin.is_admin());
        assert!(!Privilege::Anonymous.is_admin());
        assert_eq!(Privilege::default(), Privilege::Anonymous);
    }
}
