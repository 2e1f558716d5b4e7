//! JWT session verification
//!
//! Tokens are issued by the auth layer and carried to the relay in the
//! `jwt` cookie:
//!
//! ```text
//! { "userId": "64f0c2...", "iat": 1700000000, "exp": 1700604800 }
//! ```
//!
//! A token is accepted when its signature and expiry check out *and* the
//! user it names is still present in the [`UserDirectory`].

use std::sync::Arc;

use futures::future::BoxFuture;
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, TokenData, Validation};
use serde::{Deserialize, Serialize};

use super::{AuthError, IdentityVerifier, UserDirectory};
use crate::types::{UserId, VerifiedIdentity};

/// Session token claims
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Subject user id
    #[serde(rename = "userId")]
    pub user_id: String,
    /// Issued at (Unix timestamp)
    pub iat: i64,
    /// Expiration (Unix timestamp)
    pub exp: i64,
}

impl Claims {
    /// Create claims for a user valid for `ttl_seconds`
    pub fn new(user_id: &UserId, ttl_seconds: i64) -> Self {
        let now = chrono::Utc::now().timestamp();
        Self {
            user_id: user_id.to_string(),
            iat: now,
            exp: now + ttl_seconds,
        }
    }

    /// Check if token is expired
    pub fn is_expired(&self) -> bool {
        chrono::Utc::now().timestamp() > self.exp
    }
}

/// JWT verifier backed by a user directory
pub struct JwtVerifier {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    users: Arc<dyn UserDirectory>,
    /// Token TTL in seconds for issued tokens (default: 7 days)
    pub token_ttl: i64,
}

impl JwtVerifier {
    /// Minimum secret length before a warning is logged
    pub const RECOMMENDED_SECRET_LEN: usize = 32;

    /// Create a verifier for the given shared secret
    pub fn new(secret: &str, users: Arc<dyn UserDirectory>) -> Result<Self, AuthError> {
        if secret.is_empty() {
            return Err(AuthError::InvalidSecret("JWT secret must not be empty".to_string()));
        }
        if secret.len() < Self::RECOMMENDED_SECRET_LEN {
            tracing::warn!(
                len = secret.len(),
                "JWT secret is shorter than {} characters",
                Self::RECOMMENDED_SECRET_LEN
            );
        }

        Ok(Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            users,
            token_ttl: 7 * 24 * 3600,
        })
    }

    /// Sign a session token for the user
    pub fn issue_token(&self, user_id: &UserId) -> Result<String, AuthError> {
        let claims = Claims::new(user_id, self.token_ttl);
        self.sign(&claims)
    }

    /// Sign arbitrary claims
    pub fn sign(&self, claims: &Claims) -> Result<String, AuthError> {
        encode(&Header::default(), claims, &self.encoding_key)
            .map_err(|e| AuthError::TokenError(e.to_string()))
    }

    /// Validate a token and return its claims
    pub fn validate_token(&self, token: &str) -> Result<Claims, AuthError> {
        if token.is_empty() {
            return Err(AuthError::MissingToken);
        }

        let token_data: TokenData<Claims> =
            decode(token, &self.decoding_key, &Validation::default()).map_err(|e| {
                match e.kind() {
                    ErrorKind::ExpiredSignature => AuthError::TokenExpired,
                    _ => AuthError::InvalidToken(e.to_string()),
                }
            })?;

        if token_data.claims.is_expired() {
            return Err(AuthError::TokenExpired);
        }

        Ok(token_data.claims)
    }

    /// Validate a token and resolve it against the user directory
    pub fn verify(&self, token: &str) -> Result<VerifiedIdentity, AuthError> {
        let claims = self.validate_token(token)?;
        let user_id = UserId::new(claims.user_id);

        self.users.find_user(&user_id).ok_or(AuthError::UserNotFound)
    }
}

impl IdentityVerifier for JwtVerifier {
    fn resolve_identity<'a>(
        &'a self,
        credential: &'a str,
    ) -> BoxFuture<'a, Result<VerifiedIdentity, AuthError>> {
        Box::pin(async move { self.verify(credential) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::InMemoryUserDirectory;

    const SECRET: &str = "test-secret-key-that-is-at-least-32-characters-long";

    fn create_test_verifier() -> (JwtVerifier, Arc<InMemoryUserDirectory>) {
        let users = Arc::new(InMemoryUserDirectory::with_users(vec![
            (UserId::new("alice"), "Alice".to_string()),
            (UserId::new("bob"), "Bob".to_string()),
        ]));
        let verifier = JwtVerifier::new(SECRET, users.clone()).unwrap();
        (verifier, users)
    }

    #[tokio::test]
    async fn test_issued_token_resolves_identity() {
        let (verifier, _) = create_test_verifier();
        let token = verifier.issue_token(&UserId::new("alice")).unwrap();

        let identity = verifier.resolve_identity(&token).await.unwrap();
        assert_eq!(identity.user_id, UserId::new("alice"));
        assert_eq!(identity.full_name, "Alice");
    }

    #[test]
    fn test_claims_use_user_id_field() {
        let claims = Claims::new(&UserId::new("alice"), 60);
        let json = serde_json::to_value(&claims).unwrap();
        assert_eq!(json["userId"], "alice");
        assert!(!claims.is_expired());
    }

    #[test]
    fn test_expired_token_rejected() {
        let (verifier, _) = create_test_verifier();
        let now = chrono::Utc::now().timestamp();
        let claims = Claims {
            user_id: "alice".to_string(),
            iat: now - 7200,
            exp: now - 3600,
        };
        let token = verifier.sign(&claims).unwrap();

        assert_eq!(verifier.verify(&token), Err(AuthError::TokenExpired));
    }

    #[test]
    fn test_malformed_token_rejected() {
        let (verifier, _) = create_test_verifier();
        let result = verifier.verify("not-a-jwt");
        assert!(matches!(result, Err(AuthError::InvalidToken(_))));
    }

    #[test]
    fn test_token_signed_with_other_secret_rejected() {
        let (verifier, users) = create_test_verifier();
        let other = JwtVerifier::new("another-secret-key-that-is-long-enough-too", users).unwrap();
        let token = other.issue_token(&UserId::new("alice")).unwrap();

        assert!(matches!(verifier.verify(&token), Err(AuthError::InvalidToken(_))));
    }

    #[test]
    fn test_removed_user_rejected() {
        let (verifier, users) = create_test_verifier();
        let token = verifier.issue_token(&UserId::new("bob")).unwrap();
        users.remove(&UserId::new("bob"));

        assert_eq!(verifier.verify(&token), Err(AuthError::UserNotFound));
    }

    #[test]
    fn test_empty_secret_rejected() {
        let users = Arc::new(InMemoryUserDirectory::new());
        assert!(matches!(
            JwtVerifier::new("", users),
            Err(AuthError::InvalidSecret(_))
        ));
    }

    #[test]
    fn test_empty_token_is_missing() {
        let (verifier, _) = create_test_verifier();
        assert_eq!(verifier.verify(""), Err(AuthError::MissingToken));
    }
}
