//! Local, filesystem-backed bucket/object storage.
//!
//! [`services::storage_service::StorageService`] is the engine: bucket
//! lifecycle, object put/get/copy/delete/list and the JSON metadata
//! sidecars. It runs over any [`storage::backend::StorageBackend`]; the
//! HTTP layer in [`routes`] and [`handlers`] only consumes it.

pub mod config;
pub mod errors;
pub mod handlers;
pub mod models;
pub mod routes;
pub mod services;
pub mod storage;
