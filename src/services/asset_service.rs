//! AssetService: image lifecycle across the metadata and object stores.
//!
//! This is the only component that talks to both stores, and every
//! create/update/delete runs inside one metadata transaction that stays open
//! across the object store call:
//!
//! - **create**: insert row → put object → commit. If the commit fails after
//!   the put, the object is deleted again under [`OrphanPolicy::Compensate`]
//!   or left behind under [`OrphanPolicy::Retain`].
//! - **update**: lock row → patch supplied fields → commit → re-read. The
//!   object key never changes, so the object store is not touched.
//! - **delete**: lock row → delete row → delete object → commit. A failed
//!   object delete rolls the row back, leaving both stores as they were.
//!
//! Nothing is retried; the first failure aborts the transaction.

use crate::{
    models::asset::{AssetPatch, ImageAsset, NewAsset, SignedAsset, SignedListing},
    services::{
        metadata_store::{MetadataError, MetadataStore, MetadataTx, is_foreign_key_violation},
        object_store::{ObjectStore, ObjectStoreError},
    },
};
use bytes::Bytes;
use std::{path::Path, str::FromStr, sync::Arc, time::Duration};
use thiserror::Error;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Logical prefix every catalog object key lives under.
pub const IMAGE_KEY_PREFIX: &str = "images/";

/// Lifetime of read URLs handed out with assets.
pub const SIGNED_URL_TTL: Duration = Duration::from_secs(15 * 60);

/// Content types accepted for upload.
pub const ALLOWED_CONTENT_TYPES: [&str; 3] = ["image/jpeg", "image/png", "image/webp"];

const MAX_EXTENSION_LEN: usize = 8;

/// What happens to an already-stored object when the create transaction
/// fails to commit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OrphanPolicy {
    /// Delete the object again.
    #[default]
    Compensate,
    /// Leave the object in place and log its key.
    Retain,
}

#[derive(Debug, Error)]
#[error("unknown orphan policy `{0}` (expected `compensate` or `retain`)")]
pub struct UnknownOrphanPolicy(String);

impl FromStr for OrphanPolicy {
    type Err = UnknownOrphanPolicy;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "compensate" => Ok(Self::Compensate),
            "retain" => Ok(Self::Retain),
            _ => Err(UnknownOrphanPolicy(s.to_string())),
        }
    }
}

#[derive(Debug, Error)]
pub enum AssetError {
    #[error("{0}")]
    Validation(String),
    #[error("image `{0}` not found")]
    NotFound(i64),
    #[error("metadata store failure: {0}")]
    MetadataStore(#[source] MetadataError),
    #[error("object store failure: {0}")]
    ObjectStore(#[from] ObjectStoreError),
}

impl From<MetadataError> for AssetError {
    fn from(err: MetadataError) -> Self {
        match err {
            MetadataError::AssetNotFound(id) => AssetError::NotFound(id),
            MetadataError::NoOp => {
                AssetError::Validation("at least one field must be provided for update".into())
            }
            other => AssetError::MetadataStore(other),
        }
    }
}

pub type AssetResult<T> = Result<T, AssetError>;

#[derive(Clone)]
pub struct AssetService {
    metadata: MetadataStore,
    objects: Arc<dyn ObjectStore>,
    orphan_policy: OrphanPolicy,
}

impl AssetService {
    pub fn new(
        metadata: MetadataStore,
        objects: Arc<dyn ObjectStore>,
        orphan_policy: OrphanPolicy,
    ) -> Self {
        Self {
            metadata,
            objects,
            orphan_policy,
        }
    }

    pub fn metadata(&self) -> &MetadataStore {
        &self.metadata
    }

    pub fn objects(&self) -> &Arc<dyn ObjectStore> {
        &self.objects
    }

    /// Store a new image and its catalog row.
    pub async fn create(&self, new: NewAsset, data: Bytes) -> AssetResult<ImageAsset> {
        if !ALLOWED_CONTENT_TYPES.contains(&new.content_type.as_str()) {
            return Err(AssetError::Validation(
                "invalid image format, only PNG, JPEG and WebP are allowed".into(),
            ));
        }
        if data.is_empty() {
            return Err(AssetError::Validation("image file is empty".into()));
        }

        let object_key = generate_object_key(&new.file_name);
        let mut tx = self.metadata.begin().await?;

        let id = match self
            .metadata
            .insert_asset(&mut tx, &new.name, new.category_id, &new.description, &object_key)
            .await
        {
            Ok(id) => id,
            Err(err) => {
                rollback(tx, "create").await;
                return Err(err.into());
            }
        };

        if let Err(err) = self.objects.put(&object_key, data, &new.content_type).await {
            warn!(%object_key, error = %err, "object put failed, rolling back image row");
            rollback(tx, "create").await;
            return Err(err.into());
        }

        if let Err(err) = tx.commit().await {
            self.handle_orphan(&object_key).await;
            return Err(commit_error(err));
        }

        info!(id, %object_key, "image created");
        Ok(ImageAsset {
            id,
            name: new.name,
            category_id: new.category_id,
            description: new.description,
            object_key,
        })
    }

    /// Apply the supplied fields to an existing image.
    pub async fn update(&self, id: i64, patch: AssetPatch) -> AssetResult<ImageAsset> {
        if patch.is_empty() {
            return Err(MetadataError::NoOp.into());
        }

        let mut tx = self.metadata.begin().await?;

        if let Err(err) = self.metadata.lock_asset_for_update(&mut tx, id).await {
            rollback(tx, "update").await;
            return Err(err.into());
        }

        match self.metadata.update_asset_fields(&mut tx, id, &patch).await {
            Ok(0) => {
                rollback(tx, "update").await;
                return Err(AssetError::NotFound(id));
            }
            Ok(rows) => debug!(id, rows, fields = patch.len(), "image row patched"),
            Err(err) => {
                rollback(tx, "update").await;
                return Err(err.into());
            }
        }

        tx.commit().await.map_err(commit_error)?;
        info!(id, "image updated");

        Ok(self.metadata.fetch_asset(id).await?)
    }

    /// Remove an image row and its object.
    pub async fn delete(&self, id: i64) -> AssetResult<ImageAsset> {
        let mut tx = self.metadata.begin().await?;

        let locked = match self.metadata.lock_asset_for_update(&mut tx, id).await {
            Ok(asset) => asset,
            Err(err) => {
                rollback(tx, "delete").await;
                return Err(err.into());
            }
        };

        if let Err(err) = self.metadata.delete_asset(&mut tx, id).await {
            rollback(tx, "delete").await;
            return Err(err.into());
        }

        if let Err(err) = self.objects.delete(&locked.object_key).await {
            warn!(id, object_key = %locked.object_key, error = %err,
                "object delete failed, restoring image row");
            rollback(tx, "delete").await;
            return Err(err.into());
        }

        if let Err(err) = tx.commit().await {
            error!(id, object_key = %locked.object_key, error = %err,
                "commit failed after object delete; row restored without its object");
            return Err(commit_error(err));
        }

        info!(id, object_key = %locked.object_key, "image deleted");
        Ok(locked)
    }

    /// Fetch one image with a fresh read URL.
    pub async fn get(&self, id: i64) -> AssetResult<SignedAsset> {
        let asset = self.metadata.fetch_asset(id).await?;
        let url = self
            .objects
            .signed_read_url(&asset.object_key, SIGNED_URL_TTL)
            .await?;
        Ok(SignedAsset { asset, url })
    }

    /// List catalog images under the image prefix, each with a read URL.
    pub async fn list(&self) -> AssetResult<Vec<SignedListing>> {
        let rows = self.metadata.list_assets(IMAGE_KEY_PREFIX).await?;
        let mut out = Vec::with_capacity(rows.len());
        for listing in rows {
            let url = self
                .objects
                .signed_read_url(&listing.object_key, SIGNED_URL_TTL)
                .await?;
            out.push(SignedListing { listing, url });
        }
        Ok(out)
    }

    async fn handle_orphan(&self, object_key: &str) {
        match self.orphan_policy {
            OrphanPolicy::Compensate => match self.objects.delete(object_key).await {
                Ok(()) => info!(%object_key, "commit failed, removed uploaded object"),
                Err(err) => error!(%object_key, error = %err,
                    "commit failed and compensating delete failed; object orphaned"),
            },
            OrphanPolicy::Retain => {
                warn!(%object_key, "commit failed, uploaded object retained as orphan")
            }
        }
    }
}

async fn rollback(tx: MetadataTx, operation: &'static str) {
    if let Err(err) = tx.rollback().await {
        warn!(operation, error = %err, "transaction rollback failed");
    }
}

fn commit_error(err: sqlx::Error) -> AssetError {
    if is_foreign_key_violation(&err) {
        AssetError::Validation("unknown category".into())
    } else {
        AssetError::MetadataStore(MetadataError::Sqlx(err))
    }
}

/// Build a fresh key under [`IMAGE_KEY_PREFIX`], keeping a sanitized copy of
/// the uploaded file's extension.
pub fn generate_object_key(file_name: &str) -> String {
    let extension = Path::new(file_name)
        .extension()
        .and_then(|ext| ext.to_str())
        .filter(|ext| {
            !ext.is_empty()
                && ext.len() <= MAX_EXTENSION_LEN
                && ext.chars().all(|c| c.is_ascii_alphanumeric())
        })
        .map(|ext| format!(".{}", ext.to_ascii_lowercase()))
        .unwrap_or_default();
    format!("{}{}{}", IMAGE_KEY_PREFIX, Uuid::new_v4(), extension)
}
