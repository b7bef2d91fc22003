//! Service layer: the two stores, the sessions, and the asset orchestrator
//! that keeps them consistent.

pub mod asset_service;
pub mod credential_store;
pub mod metadata_store;
pub mod object_store;
pub mod session_manager;
