//! Stored login credentials.

use chrono::{DateTime, Utc};
use sqlx::FromRow;

/// A registered user's credential record.
///
/// Written once at registration; only read afterwards. `password_hash` is an
/// Argon2 PHC string and is never serialized.
#[derive(Clone, FromRow, Debug)]
pub struct Credential {
    pub id: i64,
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub created_at: DateTime<Utc>,
}
