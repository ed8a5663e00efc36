//! Storage backends.
//!
//! The [`backend::StorageBackend`] trait abstracts over where bytes
//! physically live. Implementations cover the local filesystem and process
//! memory.

pub mod backend;
pub mod local;
pub mod memory;
pub mod traversal;
