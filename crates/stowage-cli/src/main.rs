//! Stowage CLI: drive the storage gateway from the shell.
//!
//! Primary credentials come from STORAGE_* / MANAGED_STORAGE_* variables (or a
//! `.env` file). Without them everything lands on the secondary provider.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use serde::Serialize;
use stowage_core::models::{UploadOptions, UploadRequest};
use stowage_core::GatewayConfig;
use stowage_gateway::telemetry::init_telemetry;
use stowage_gateway::{build_gateway, CancellationToken, StorageGateway};
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "stowage", about = "Hybrid object-storage gateway")]
struct Cli {
    /// Emit logs as JSON lines on stderr
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Upload a file and record its metadata
    Upload {
        /// Path to the file to upload
        file: PathBuf,
        /// Destination folder (default: resources)
        #[arg(long)]
        folder: Option<String>,
        /// Title stored in the metadata record
        #[arg(long)]
        title: Option<String>,
        /// UUID of the uploading user
        #[arg(long, value_name = "UUID")]
        uploader: Option<Uuid>,
        /// MIME type (default: application/octet-stream)
        #[arg(long)]
        content_type: Option<String>,
    },
    /// Upload a profile picture and point the user's profile at it
    Avatar {
        /// Path to the image
        file: PathBuf,
        /// Profile UUID
        #[arg(long, value_name = "UUID")]
        user: Uuid,
        #[arg(long)]
        content_type: Option<String>,
    },
    /// Delete an object from every provider holding it
    Delete {
        /// Storage path as returned by upload
        path: String,
    },
    /// List objects on the preferred provider
    List {
        #[arg(long, default_value = "")]
        prefix: String,
        #[arg(long, default_value = "100")]
        max_keys: usize,
    },
    /// Print a time-limited URL for an object on the primary provider
    Sign {
        path: String,
        /// Lifetime in seconds
        #[arg(long)]
        ttl: Option<u64>,
    },
    /// Sign a stored primary URL; other URLs are echoed back
    Resolve { url: String },
    /// Show provider readiness and counters
    Status,
}

fn print_json(value: &impl Serialize) -> anyhow::Result<()> {
    let out = serde_json::to_string_pretty(value).context("Serialize output")?;
    println!("{}", out);
    Ok(())
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "file".to_string())
}

async fn read_upload(
    path: &Path,
    content_type: Option<String>,
    folder: Option<String>,
) -> anyhow::Result<UploadRequest> {
    let data = tokio::fs::read(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))?;
    Ok(UploadRequest::new(data, file_name(path), content_type, folder))
}

async fn run(gateway: &StorageGateway, command: Commands, cancel: &CancellationToken) -> anyhow::Result<()> {
    match command {
        Commands::Upload {
            file,
            folder,
            title,
            uploader,
            content_type,
        } => {
            let request = read_upload(&file, content_type, folder).await?;
            let options = UploadOptions {
                title,
                uploader_id: uploader,
                ..Default::default()
            };
            let result = gateway.upload(request, options, cancel).await;
            print_json(&result)?;
        }
        Commands::Avatar {
            file,
            user,
            content_type,
        } => {
            let request = read_upload(&file, content_type, None).await?;
            let result = gateway.upload_avatar(request, user, cancel).await;
            print_json(&result)?;
        }
        Commands::Delete { path } => {
            let deleted = gateway.delete(&path, cancel).await;
            print_json(&serde_json::json!({ "path": path, "deleted": deleted }))?;
        }
        Commands::List { prefix, max_keys } => {
            let objects = gateway.list(&prefix, Some(max_keys), cancel).await;
            print_json(&objects)?;
        }
        Commands::Sign { path, ttl } => {
            let url = gateway
                .get_signed_url(&path, ttl.map(Duration::from_secs))
                .await;
            print_json(&serde_json::json!({ "path": path, "signedUrl": url }))?;
        }
        Commands::Resolve { url } => {
            let resolved = gateway.resolve_signed_url(&url).await;
            print_json(&serde_json::json!({ "url": url, "resolvedUrl": resolved }))?;
        }
        Commands::Status => {
            gateway.initialize().await;
            print_json(&serde_json::json!({
                "state": gateway.state(),
                "providers": gateway.provider_status(),
                "stats": gateway.stats(),
            }))?;
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_telemetry(cli.json_logs);

    let config = GatewayConfig::from_env();
    let gateway = build_gateway(&config)
        .await
        .context("Failed to set up storage gateway")?;

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Interrupted, cancelling");
            on_interrupt.cancel();
        }
    });

    let outcome = run(&gateway, cli.command, &cancel).await;
    gateway.drain_metadata().await;
    outcome
}
