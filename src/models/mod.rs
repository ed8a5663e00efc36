//! Core data models for the local object store.
//!
//! These types describe buckets, objects and the sidecar metadata record.
//! They serialize naturally as JSON via `serde`, which is also the on-disk
//! format of the metadata sidecars.

pub mod bucket;
pub mod metadata;
pub mod object;
