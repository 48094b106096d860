//! Stowage Core Library
//!
//! This crate provides the domain models, configuration resolution and the
//! collaborator traits shared by the storage backends, the metadata store and
//! the gateway.

pub mod config;
pub mod constants;
pub mod hooks;
pub mod models;
pub mod storage_types;

// Re-export commonly used types
pub use config::{
    BuildTimeSource, ConfigResolver, ConfigSource, Credentials, GatewayConfig, ProcessEnv,
    RuntimeTable, SecondaryConfig,
};
pub use hooks::{MetadataRecorder, NoOpMetadataRecorder, NoOpProfileStore, ProfileStore, RecordError};
pub use storage_types::{Provider, StorageBackend};
