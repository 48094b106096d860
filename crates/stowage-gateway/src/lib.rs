//! Stowage Gateway
//!
//! The only component callers talk to. [`StorageGateway`] picks the primary or
//! the fallback provider once per process, falls back per call when the primary
//! fails, signs URLs for private objects and records metadata in the
//! background. Public methods never return errors: failures are reported in
//! [`UploadResult`](stowage_core::models::UploadResult) or as `false`/`None`.

pub mod context;
pub mod gateway;
pub mod setup;
pub mod signing;
pub mod telemetry;

pub use context::StorageGatewayContext;
pub use gateway::{GatewayState, StorageGateway};
pub use setup::{build_context, build_gateway};
pub use signing::SignedUrlResolver;
pub use tokio_util::sync::CancellationToken;
