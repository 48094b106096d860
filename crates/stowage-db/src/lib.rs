//! Stowage metadata store
//!
//! Postgres-backed implementations of the collaborator traits in
//! `stowage_core::hooks`, plus pool setup and migrations.

pub mod db;
pub mod setup;

pub use db::{ProfileRepository, ResourceFileRepository};
pub use setup::setup_database;
