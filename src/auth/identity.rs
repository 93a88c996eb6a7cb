use moka::sync::Cache;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};

use crate::services::auth_service::validate_jwt;
use crate::ws::UserId;

/// Who is on the other end of a connection, as vouched for by a token.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Identity {
    pub user_id: UserId,
    pub username: String,
}

/// Claims carried by the tokens the account service issues on login.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Claims {
    pub user_id: UserId,
    pub username: String,
    #[serde(default)]
    pub email: String,
    pub exp: i64,
    #[serde(default)]
    pub iat: i64,
}

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("missing authentication token")]
    MissingToken,

    #[error("malformed authentication header")]
    MalformedHeader,

    #[error("invalid or expired token: {0}")]
    InvalidToken(#[from] jsonwebtoken::errors::Error),

    #[error("token has expired")]
    Expired,

    #[error("no JWT secret configured")]
    NotConfigured,
}

/// Turns a bearer token into an [`Identity`].
pub trait IdentityProvider: Send + Sync {
    fn authenticate(&self, token: &str) -> Result<Identity, AuthError>;

    /// Number of validated tokens currently remembered, if the provider
    /// caches at all.
    fn cached_identities(&self) -> u64 {
        0
    }
}

#[derive(Clone, Debug)]
struct CachedIdentity {
    identity: Identity,
    expires_at: i64,
}

/// HS256 JWT validation with a short-lived cache of tokens already checked.
pub struct JwtIdentityProvider {
    secret: Option<String>,
    cache: Cache<String, CachedIdentity>,
}

impl JwtIdentityProvider {
    pub fn new(secret: Option<String>, ttl: Duration) -> Self {
        let cache = Cache::builder()
            .max_capacity(100_000)
            .time_to_live(ttl)
            .build();
        info!("Identity cache initialized");
        Self { secret, cache }
    }
}

impl IdentityProvider for JwtIdentityProvider {
    fn authenticate(&self, token: &str) -> Result<Identity, AuthError> {
        let now = chrono::Utc::now().timestamp();

        if let Some(cached) = self.cache.get(token) {
            if cached.expires_at > now {
                return Ok(cached.identity);
            }
            self.cache.invalidate(token);
            return Err(AuthError::Expired);
        }

        let secret = self.secret.as_deref().ok_or(AuthError::NotConfigured)?;
        let claims = validate_jwt::<Claims>(token, secret)?.claims;
        debug!(user_id = claims.user_id, "JWT token validated");

        let identity = Identity {
            user_id: claims.user_id,
            username: claims.username,
        };
        self.cache.insert(
            token.to_string(),
            CachedIdentity {
                identity: identity.clone(),
                expires_at: claims.exp,
            },
        );
        Ok(identity)
    }

    fn cached_identities(&self) -> u64 {
        self.cache.entry_count()
    }
}
