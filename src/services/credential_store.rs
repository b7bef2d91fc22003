//! CredentialStore: registration and password checks.
//!
//! Passwords are hashed with Argon2id into PHC strings; verification goes
//! through `argon2`'s constant-time comparison. Hashing runs on the blocking
//! pool so it never stalls request tasks.

use crate::services::metadata_store::{MetadataError, MetadataStore};
use argon2::{
    Argon2, PasswordHasher, PasswordVerifier,
    password_hash::{PasswordHash, SaltString},
};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CredentialError {
    #[error("username or email already registered")]
    Conflict,
    #[error("invalid username or password")]
    InvalidCredentials,
    #[error("password hashing failed: {0}")]
    Hashing(String),
    #[error(transparent)]
    Metadata(#[from] MetadataError),
}

pub type CredentialResult<T> = Result<T, CredentialError>;

#[derive(Clone)]
pub struct CredentialStore {
    metadata: MetadataStore,
}

impl CredentialStore {
    pub fn new(metadata: MetadataStore) -> Self {
        Self { metadata }
    }

    /// Register a new user. Fails with `Conflict` when the username or email
    /// is taken, including when a concurrent registration wins the race.
    pub async fn register(&self, username: &str, email: &str, password: &str) -> CredentialResult<i64> {
        if self.metadata.credential_exists(username, email).await? {
            return Err(CredentialError::Conflict);
        }

        let password = password.to_string();
        let hash = tokio::task::spawn_blocking(move || hash_password(&password))
            .await
            .map_err(|err| CredentialError::Hashing(err.to_string()))??;

        match self.metadata.insert_credential(username, email, &hash).await {
            Ok(id) => {
                tracing::info!(%username, "registered user");
                Ok(id)
            }
            Err(MetadataError::DuplicateCredential) => Err(CredentialError::Conflict),
            Err(err) => Err(err.into()),
        }
    }

    /// Check a username/password pair.
    pub async fn verify(&self, username: &str, password: &str) -> CredentialResult<()> {
        let Some(credential) = self.metadata.find_credential(username).await? else {
            return Err(CredentialError::InvalidCredentials);
        };

        let password = password.to_string();
        let matches = tokio::task::spawn_blocking(move || {
            verify_password(&credential.password_hash, &password)
        })
        .await
        .map_err(|err| CredentialError::Hashing(err.to_string()))?;

        if matches {
            Ok(())
        } else {
            Err(CredentialError::InvalidCredentials)
        }
    }
}

fn hash_password(password: &str) -> CredentialResult<String> {
    let mut salt_bytes = [0u8; 16];
    getrandom::getrandom(&mut salt_bytes).map_err(|e| CredentialError::Hashing(e.to_string()))?;
    let salt =
        SaltString::encode_b64(&salt_bytes).map_err(|e| CredentialError::Hashing(e.to_string()))?;
    let phc = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| CredentialError::Hashing(e.to_string()))?
        .to_string();
    Ok(phc)
}

fn verify_password(hash: &str, password: &str) -> bool {
    match PasswordHash::new(hash) {
        Ok(parsed) => Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok(),
        Err(_) => false,
    }
}
