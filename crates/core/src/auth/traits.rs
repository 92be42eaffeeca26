use async_trait::async_trait;
use thiserror::Error;

use super::types::{AuthRequest, Privilege};

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Authentication required")]
    NotAuthenticated,

    #[error("Invalid credentials")]
    InvalidCredentials,
}

#[async_trait]
pub trait Authenticator: Send + Sync {
    /// Resolve the privilege of a request. Unknown callers are anonymous.
    async fn privilege(&self, request: &AuthRequest) -> Privilege;

    /// Name of this authentication method
    fn method_name(&self) -> &'static str;
}
