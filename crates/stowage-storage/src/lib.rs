//! Stowage Storage Library
//!
//! This crate provides the storage abstraction and its three backends: the
//! S3-compatible primary, the managed storage service and the local filesystem
//! (both usable as the fallback).
//!
//! # Storage key format
//!
//! Keys are folder-scoped: `{folder}/{unix_millis}-{suffix}-{sanitized_name}`,
//! e.g. `resources/1718000000000-a1b2c3-report.pdf` or
//! `avatars/{user_id}/1718000000000-a1b2c3-me.png`.
//!
//! Keys must not be empty, contain `..` or start with `/`. Key generation lives
//! in the `keys` module so every backend sees the same layout.

pub mod factory;
pub mod keys;
pub mod local;
pub mod managed;
pub mod s3;
pub mod traits;

// Re-export commonly used types
pub use factory::{create_secondary, ClientBuilder, ProviderClientFactory};
pub use local::LocalStorage;
pub use managed::ManagedStorage;
pub use s3::S3Storage;
pub use stowage_core::StorageBackend;
pub use traits::{Storage, StorageError, StorageResult};
