//! Identity verification for relay handshakes
//!
//! The relay depends only on [`IdentityVerifier`]: an opaque credential goes
//! in, a [`VerifiedIdentity`] or an [`AuthError`] comes out. [`JwtVerifier`]
//! is the production implementation, backed by a [`UserDirectory`].

pub mod credential;
pub mod directory;
pub mod jwt;

use futures::future::BoxFuture;

use crate::types::VerifiedIdentity;

pub use credential::{extract_credential, SESSION_COOKIE};
pub use directory::{InMemoryUserDirectory, UserDirectory};
pub use jwt::{Claims, JwtVerifier};

/// Resolves a session credential to a user identity
pub trait IdentityVerifier: Send + Sync {
    fn resolve_identity<'a>(
        &'a self,
        credential: &'a str,
    ) -> BoxFuture<'a, Result<VerifiedIdentity, AuthError>>;
}

/// Authentication errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthError {
    #[error("Unauthorized - No Token Provided")]
    MissingToken,

    #[error("Unauthorized - Invalid Token: {0}")]
    InvalidToken(String),

    #[error("Unauthorized - Token Expired")]
    TokenExpired,

    #[error("Unauthorized - User Not Found")]
    UserNotFound,

    #[error("Invalid secret: {0}")]
    InvalidSecret(String),

    #[error("Token error: {0}")]
    TokenError(String),
}

impl AuthError {
    /// Whether the error should reject the caller rather than indicate a
    /// server-side fault
    pub fn is_unauthorized(&self) -> bool {
        !matches!(self, AuthError::InvalidSecret(_) | AuthError::TokenError(_))
    }
}
