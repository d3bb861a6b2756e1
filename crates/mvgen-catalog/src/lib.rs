//! Catalog of finished music videos, stored in Firestore.
//!
//! Records are written once per pipeline. Field limits are checked locally
//! before the write, and a rejected write surfaces as
//! [`CatalogError::Validation`] so callers can tell it apart from outages.

pub mod client;
pub mod error;
pub mod metrics;
pub mod repository;
pub mod retry;
pub mod token_cache;
pub mod types;

pub use client::{CatalogConfig, FirestoreClient};
pub use error::{CatalogError, CatalogResult};
pub use repository::{CatalogStore, MusicVideoRepository};
pub use retry::RetryConfig;
pub use token_cache::{TokenCache, TokenSource};
pub use types::{Document, ToFirestoreValue, Value};
