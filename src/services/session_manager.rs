//! SessionManager: stateless HS256 session tokens.
//!
//! Two token classes, each signed with its own secret:
//! - access tokens live 30 minutes and ride on every request;
//! - refresh tokens live 7 days and are only ever sent to the refresh path.
//!
//! Rotation trades a refresh token for a fresh access token and never
//! re-issues the refresh token itself. Claims are rebuilt from the token on
//! every request; nothing is persisted. The optional deny-list keyed by
//! `jti` lets logout revoke tokens before they expire.

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;
use uuid::Uuid;

/// Access token lifetime in seconds.
pub const ACCESS_TOKEN_TTL_SECS: i64 = 30 * 60;
/// Refresh token lifetime in seconds.
pub const REFRESH_TOKEN_TTL_SECS: i64 = 7 * 24 * 3600;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenClass {
    Access,
    Refresh,
}

/// Claims carried inside every session token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionClaims {
    /// Username the token was issued to.
    pub sub: String,
    /// Expiry, unix seconds.
    pub exp: i64,
    /// Issuance, unix seconds.
    pub iat: i64,
    /// Unique token id, used by the deny-list.
    pub jti: String,
    pub class: TokenClass,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SessionError {
    #[error("invalid token")]
    InvalidToken,
    #[error("token expired")]
    Expired,
    #[error("token revoked")]
    Revoked,
    #[error("failed to sign token: {0}")]
    Signing(String),
}

pub type SessionResult<T> = Result<T, SessionError>;

struct TokenKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
    ttl: Duration,
}

impl TokenKeys {
    fn new(secret: &[u8], ttl_secs: i64) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            ttl: Duration::seconds(ttl_secs),
        }
    }
}

pub struct SessionManager {
    access: TokenKeys,
    refresh: TokenKeys,
    /// Revoked `jti` -> expiry of the revoked token.
    revoked: Mutex<HashMap<String, i64>>,
}

impl SessionManager {
    pub fn new(access_secret: &[u8], refresh_secret: &[u8]) -> Self {
        Self {
            access: TokenKeys::new(access_secret, ACCESS_TOKEN_TTL_SECS),
            refresh: TokenKeys::new(refresh_secret, REFRESH_TOKEN_TTL_SECS),
            revoked: Mutex::new(HashMap::new()),
        }
    }

    fn keys(&self, class: TokenClass) -> &TokenKeys {
        match class {
            TokenClass::Access => &self.access,
            TokenClass::Refresh => &self.refresh,
        }
    }

    pub fn issue_access_token(&self, subject: &str) -> SessionResult<String> {
        self.issue_at(subject, TokenClass::Access, Utc::now())
    }

    pub fn issue_refresh_token(&self, subject: &str) -> SessionResult<String> {
        self.issue_at(subject, TokenClass::Refresh, Utc::now())
    }

    /// Sign a token of `class` for `subject` as if issued at `now`.
    pub fn issue_at(
        &self,
        subject: &str,
        class: TokenClass,
        now: DateTime<Utc>,
    ) -> SessionResult<String> {
        let keys = self.keys(class);
        let claims = SessionClaims {
            sub: subject.to_string(),
            exp: (now + keys.ttl).timestamp(),
            iat: now.timestamp(),
            jti: Uuid::new_v4().to_string(),
            class,
        };
        encode(&Header::new(Algorithm::HS256), &claims, &keys.encoding)
            .map_err(|err| SessionError::Signing(err.to_string()))
    }

    pub fn verify(&self, token: &str, class: TokenClass) -> SessionResult<SessionClaims> {
        self.verify_at(token, class, Utc::now())
    }

    /// Verify `token` against the secret of `class` as of `now`.
    ///
    /// Signature and shape are checked first; expiry uses no leeway, so a
    /// token is rejected from the first second after `exp`.
    pub fn verify_at(
        &self,
        token: &str,
        class: TokenClass,
        now: DateTime<Utc>,
    ) -> SessionResult<SessionClaims> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = false;
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp", "sub"]);

        let claims = decode::<SessionClaims>(token, &self.keys(class).decoding, &validation)
            .map_err(|_| SessionError::InvalidToken)?
            .claims;

        if claims.class != class {
            return Err(SessionError::InvalidToken);
        }
        if now.timestamp() > claims.exp {
            return Err(SessionError::Expired);
        }
        if self.revoked.lock().contains_key(&claims.jti) {
            return Err(SessionError::Revoked);
        }
        Ok(claims)
    }

    /// Exchange a refresh token for a new access token.
    pub fn rotate(&self, refresh_token: &str) -> SessionResult<String> {
        self.rotate_at(refresh_token, Utc::now())
    }

    pub fn rotate_at(&self, refresh_token: &str, now: DateTime<Utc>) -> SessionResult<String> {
        let claims = self.verify_at(refresh_token, TokenClass::Refresh, now)?;
        self.issue_at(&claims.sub, TokenClass::Access, now)
    }

    /// Deny `token` until its natural expiry. Tokens that already fail
    /// verification need no entry.
    pub fn revoke(&self, token: &str, class: TokenClass) {
        self.revoke_at(token, class, Utc::now());
    }

    pub fn revoke_at(&self, token: &str, class: TokenClass, now: DateTime<Utc>) {
        let Ok(claims) = self.verify_at(token, class, now) else {
            return;
        };
        let mut revoked = self.revoked.lock();
        let now = now.timestamp();
        revoked.retain(|_, exp| *exp >= now);
        revoked.insert(claims.jti, claims.exp);
        tracing::debug!(subject = %claims.sub, ?class, "token revoked");
    }

    /// Number of live deny-list entries.
    pub fn revoked_count(&self) -> usize {
        self.revoked.lock().len()
    }
}
