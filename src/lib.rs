//! Categorized image catalog.
//!
//! Image bytes live in an object store and their catalog rows in SQLite;
//! `services::asset_service` keeps the two consistent. Sessions are HS256
//! cookie tokens managed by `services::session_manager`.

pub mod config;
pub mod db;
pub mod errors;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;
pub mod state;
