//! Image assets: catalog rows whose bytes live in the object store.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A catalog entry for one uploaded image.
///
/// `object_key` is fixed at creation. The row exists exactly as long as the
/// object under that key does.
#[derive(Serialize, Deserialize, Clone, FromRow, Debug, PartialEq, Eq)]
pub struct ImageAsset {
    /// Identifier assigned by the metadata store.
    pub id: i64,

    pub name: String,

    /// Reference to the owning category.
    pub category_id: i64,

    pub description: String,

    /// Object store key, e.g. `images/<uuid>.png`.
    pub object_key: String,
}

/// A listing row with the category resolved to its display name.
#[derive(Serialize, Deserialize, Clone, FromRow, Debug)]
pub struct AssetListing {
    pub id: i64,
    pub name: String,
    pub object_key: String,
    #[serde(rename = "category")]
    pub category_name: String,
    pub description: String,
}

/// Fields an update may change. `None` leaves the column untouched.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AssetPatch {
    pub name: Option<String>,
    pub category_id: Option<i64>,
    pub description: Option<String>,
}

impl AssetPatch {
    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.category_id.is_none() && self.description.is_none()
    }

    /// Number of columns this patch writes.
    pub fn len(&self) -> usize {
        [
            self.name.is_some(),
            self.category_id.is_some(),
            self.description.is_some(),
        ]
        .into_iter()
        .filter(|set| *set)
        .count()
    }
}

/// Input for creating an asset; the bytes travel separately.
#[derive(Clone, Debug)]
pub struct NewAsset {
    pub name: String,
    pub category_id: i64,
    pub description: String,
    /// Client-supplied file name, used only for its extension.
    pub file_name: String,
    pub content_type: String,
}

/// An asset paired with a time-limited read URL.
#[derive(Serialize, Clone, Debug)]
pub struct SignedAsset {
    #[serde(flatten)]
    pub asset: ImageAsset,
    pub url: String,
}

/// A listing row paired with a time-limited read URL.
#[derive(Serialize, Clone, Debug)]
pub struct SignedListing {
    #[serde(flatten)]
    pub listing: AssetListing,
    pub url: String,
}
