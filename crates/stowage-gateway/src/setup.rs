//! Gateway setup from resolved configuration

use std::sync::Arc;

use anyhow::{Context, Result};
use stowage_core::GatewayConfig;
use stowage_db::{setup_database, ProfileRepository, ResourceFileRepository};
use stowage_storage::{create_secondary, ProviderClientFactory};

use crate::context::StorageGatewayContext;
use crate::gateway::StorageGateway;

/// Build the collaborators described by `config`.
///
/// A missing `DATABASE_URL` disables metadata recording; it is not an error.
pub async fn build_context(config: &GatewayConfig) -> Result<StorageGatewayContext> {
    let factory = Arc::new(ProviderClientFactory::new(config.credentials.clone()));
    if !factory.is_configured() {
        tracing::warn!("Primary storage credentials missing; uploads will use the secondary provider");
    }

    let secondary = create_secondary(&config.secondary)
        .await
        .with_context(|| format!("Failed to create {} secondary storage", config.secondary.backend()))?;

    let ctx = StorageGatewayContext::new(factory, secondary, config.signed_url_ttl);

    let Some(database_url) = config.database_url.as_deref() else {
        tracing::warn!("DATABASE_URL not set; metadata recording disabled");
        return Ok(ctx);
    };

    let pool = setup_database(database_url, config.db_max_connections).await?;
    Ok(ctx
        .with_recorder(Arc::new(ResourceFileRepository::new(pool.clone())))
        .with_profiles(Arc::new(ProfileRepository::new(pool))))
}

pub async fn build_gateway(config: &GatewayConfig) -> Result<StorageGateway> {
    let ctx = build_context(config).await?;
    Ok(StorageGateway::new(ctx))
}
