//! Object storage for finished music videos.
//!
//! This crate provides:
//! - Uploads to any S3-compatible bucket
//! - Public URL resolution for uploaded keys
//! - Deterministic artifact keys per requester and time

pub mod client;
pub mod error;
pub mod keys;

pub use client::{BucketClient, ObjectStore, StorageConfig};
pub use error::{StorageError, StorageResult};
pub use keys::ArtifactKeys;
