pub mod metadata_store;
pub mod storage_service;
pub mod validation;
