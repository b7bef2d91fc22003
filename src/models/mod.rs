//! Core data models for the image catalog.
//!
//! These entities map to database tables via `sqlx::FromRow` and serialize
//! as JSON via `serde`.

pub mod asset;
pub mod category;
pub mod credential;
