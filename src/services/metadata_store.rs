//! MetadataStore: relational access to images, categories and credentials.
//!
//! Asset mutators run inside a transaction the caller begins and ends; this
//! adapter never commits or rolls back on its own. Reads that need no
//! isolation go straight to the pool.

use crate::models::{
    asset::{AssetListing, AssetPatch, ImageAsset},
    category::Category,
    credential::Credential,
};
use chrono::Utc;
use sqlx::{QueryBuilder, SqlitePool, Transaction, error::ErrorKind, sqlite::Sqlite};
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MetadataError {
    #[error("image `{0}` not found")]
    AssetNotFound(i64),
    #[error("update carries no fields")]
    NoOp,
    #[error("username or email already registered")]
    DuplicateCredential,
    #[error("category `{0}` already exists")]
    DuplicateCategory(String),
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
}

pub type MetadataResult<T> = Result<T, MetadataError>;

/// An open metadata transaction.
pub type MetadataTx = Transaction<'static, Sqlite>;

#[derive(Clone)]
pub struct MetadataStore {
    /// Shared SQLite connection pool.
    pub db: Arc<SqlitePool>,
}

impl MetadataStore {
    pub fn new(db: Arc<SqlitePool>) -> Self {
        Self { db }
    }

    pub async fn begin(&self) -> MetadataResult<MetadataTx> {
        Ok(self.db.begin().await?)
    }

    /// Insert an asset row and return its assigned id.
    pub async fn insert_asset(
        &self,
        tx: &mut MetadataTx,
        name: &str,
        category_id: i64,
        description: &str,
        object_key: &str,
    ) -> MetadataResult<i64> {
        let id = sqlx::query_scalar::<_, i64>(
            "INSERT INTO images (name, category_id, description, object_key)
             VALUES (?, ?, ?, ?)
             RETURNING id",
        )
        .bind(name)
        .bind(category_id)
        .bind(description)
        .bind(object_key)
        .fetch_one(&mut **tx)
        .await?;
        Ok(id)
    }

    /// Take the write lock on an asset row for the rest of `tx`.
    ///
    /// SQLite has no `SELECT ... FOR UPDATE`; a no-op write acquires the
    /// database write lock, so any other transaction trying to lock the same
    /// (or any) asset waits until this one commits or rolls back.
    pub async fn lock_asset_for_update(
        &self,
        tx: &mut MetadataTx,
        id: i64,
    ) -> MetadataResult<ImageAsset> {
        sqlx::query_as::<_, ImageAsset>(
            "UPDATE images SET id = id WHERE id = ?
             RETURNING id, name, category_id, description, object_key",
        )
        .bind(id)
        .fetch_optional(&mut **tx)
        .await?
        .ok_or(MetadataError::AssetNotFound(id))
    }

    /// Apply only the fields present in `patch`.
    pub async fn update_asset_fields(
        &self,
        tx: &mut MetadataTx,
        id: i64,
        patch: &AssetPatch,
    ) -> MetadataResult<u64> {
        let mut builder = patch_statement(id, patch)?;
        let result = builder.build().execute(&mut **tx).await?;
        Ok(result.rows_affected())
    }

    pub async fn delete_asset(&self, tx: &mut MetadataTx, id: i64) -> MetadataResult<u64> {
        let result = sqlx::query("DELETE FROM images WHERE id = ?")
            .bind(id)
            .execute(&mut **tx)
            .await?;
        Ok(result.rows_affected())
    }

    pub async fn fetch_asset(&self, id: i64) -> MetadataResult<ImageAsset> {
        sqlx::query_as::<_, ImageAsset>(
            "SELECT id, name, category_id, description, object_key FROM images WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&*self.db)
        .await?
        .ok_or(MetadataError::AssetNotFound(id))
    }

    /// List assets whose key lives under `key_prefix`, with category names.
    pub async fn list_assets(&self, key_prefix: &str) -> MetadataResult<Vec<AssetListing>> {
        let rows = sqlx::query_as::<_, AssetListing>(
            r"SELECT i.id, i.name, i.object_key, c.name AS category_name, i.description
              FROM images i
              JOIN categories c ON i.category_id = c.id
              WHERE i.object_key LIKE ? ESCAPE '\'
              ORDER BY i.id ASC",
        )
        .bind(like_prefix(key_prefix))
        .fetch_all(&*self.db)
        .await?;
        Ok(rows)
    }

    pub async fn list_categories(&self) -> MetadataResult<Vec<Category>> {
        let rows = sqlx::query_as::<_, Category>("SELECT id, name FROM categories ORDER BY id")
            .fetch_all(&*self.db)
            .await?;
        Ok(rows)
    }

    pub async fn insert_category(&self, name: &str) -> MetadataResult<Category> {
        sqlx::query_as::<_, Category>("INSERT INTO categories (name) VALUES (?) RETURNING id, name")
            .bind(name)
            .fetch_one(&*self.db)
            .await
            .map_err(|err| {
                if is_unique_violation(&err) {
                    MetadataError::DuplicateCategory(name.to_string())
                } else {
                    MetadataError::Sqlx(err)
                }
            })
    }

    pub async fn credential_exists(&self, username: &str, email: &str) -> MetadataResult<bool> {
        let exists = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS (SELECT 1 FROM users WHERE username = ? OR email = ?)",
        )
        .bind(username)
        .bind(email)
        .fetch_one(&*self.db)
        .await?;
        Ok(exists)
    }

    pub async fn insert_credential(
        &self,
        username: &str,
        email: &str,
        password_hash: &str,
    ) -> MetadataResult<i64> {
        sqlx::query_scalar::<_, i64>(
            "INSERT INTO users (username, email, password_hash, created_at)
             VALUES (?, ?, ?, ?)
             RETURNING id",
        )
        .bind(username)
        .bind(email)
        .bind(password_hash)
        .bind(Utc::now())
        .fetch_one(&*self.db)
        .await
        .map_err(|err| {
            if is_unique_violation(&err) {
                MetadataError::DuplicateCredential
            } else {
                MetadataError::Sqlx(err)
            }
        })
    }

    pub async fn find_credential(&self, username: &str) -> MetadataResult<Option<Credential>> {
        let row = sqlx::query_as::<_, Credential>(
            "SELECT id, username, email, password_hash, created_at FROM users WHERE username = ?",
        )
        .bind(username)
        .fetch_optional(&*self.db)
        .await?;
        Ok(row)
    }

    /// Lightweight connectivity probe.
    pub async fn ping(&self) -> MetadataResult<()> {
        sqlx::query_scalar::<_, i64>("SELECT 1")
            .fetch_one(&*self.db)
            .await?;
        Ok(())
    }
}

/// Build the parameterised `UPDATE` for a patch. Column names are fixed
/// literals; every value goes through a bind.
fn patch_statement(id: i64, patch: &AssetPatch) -> MetadataResult<QueryBuilder<'static, Sqlite>> {
    if patch.is_empty() {
        return Err(MetadataError::NoOp);
    }

    let mut builder = QueryBuilder::<Sqlite>::new("UPDATE images SET ");
    {
        let mut columns = builder.separated(", ");
        if let Some(name) = &patch.name {
            columns.push("name = ");
            columns.push_bind_unseparated(name.clone());
        }
        if let Some(category_id) = patch.category_id {
            columns.push("category_id = ");
            columns.push_bind_unseparated(category_id);
        }
        if let Some(description) = &patch.description {
            columns.push("description = ");
            columns.push_bind_unseparated(description.clone());
        }
    }
    builder.push(" WHERE id = ");
    builder.push_bind(id);
    Ok(builder)
}

/// `LIKE` pattern matching every value that starts with `prefix` literally.
fn like_prefix(prefix: &str) -> String {
    let mut pattern = String::with_capacity(prefix.len() + 1);
    for c in prefix.chars() {
        if matches!(c, '%' | '_' | '\\') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('%');
    pattern
}

/// Return true if SQLx error indicates a unique constraint violation.
fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(
        err,
        sqlx::Error::Database(db_err)
            if matches!(db_err.kind(), ErrorKind::UniqueViolation)
                || db_err.message().to_ascii_lowercase().contains("unique")
    )
}

/// Return true if SQLx error indicates a foreign key violation.
pub fn is_foreign_key_violation(err: &sqlx::Error) -> bool {
    matches!(
        err,
        sqlx::Error::Database(db_err)
            if matches!(db_err.kind(), ErrorKind::ForeignKeyViolation)
                || db_err.message().to_ascii_lowercase().contains("foreign key")
    )
}
