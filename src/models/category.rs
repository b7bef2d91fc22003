use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A named grouping of images.
#[derive(Serialize, Deserialize, Clone, FromRow, Debug, PartialEq, Eq)]
pub struct Category {
    pub id: i64,
    pub name: String,
}
