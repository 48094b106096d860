use std::collections::HashMap;

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncReadExt};
use uuid::Uuid;

use crate::constants::{DEFAULT_CONTENT_TYPE, DEFAULT_FOLDER};
use crate::storage_types::Provider;

pub const CANCELLED_MESSAGE: &str = "Upload cancelled";

/// A file to be stored, fully buffered in memory.
#[derive(Debug, Clone)]
pub struct UploadRequest {
    pub data: Bytes,
    /// Name the caller gave the file; sanitized before it becomes part of a path.
    pub file_name: String,
    pub content_type: String,
    /// Destination folder, without leading or trailing slashes.
    pub folder: String,
}

impl UploadRequest {
    pub fn new(
        data: impl Into<Bytes>,
        file_name: impl Into<String>,
        content_type: Option<String>,
        folder: Option<String>,
    ) -> Self {
        let content_type = content_type
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty())
            .unwrap_or_else(|| DEFAULT_CONTENT_TYPE.to_string());
        let folder = folder
            .map(|f| f.trim_matches('/').to_string())
            .filter(|f| !f.is_empty())
            .unwrap_or_else(|| DEFAULT_FOLDER.to_string());

        Self {
            data: data.into(),
            file_name: file_name.into(),
            content_type,
            folder,
        }
    }

    /// Read the whole stream into memory.
    pub async fn from_reader<R>(
        mut reader: R,
        file_name: impl Into<String>,
        content_type: Option<String>,
        folder: Option<String>,
    ) -> std::io::Result<Self>
    where
        R: AsyncRead + Unpin,
    {
        let mut buf = Vec::new();
        reader.read_to_end(&mut buf).await?;
        Ok(Self::new(buf, file_name, content_type, folder))
    }

    pub fn size(&self) -> u64 {
        self.data.len() as u64
    }

    pub fn with_folder(mut self, folder: impl Into<String>) -> Self {
        self.folder = folder.into().trim_matches('/').to_string();
        self
    }
}

/// Descriptive fields copied into the metadata record.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadOptions {
    pub title: Option<String>,
    pub description: Option<String>,
    pub uploader_id: Option<Uuid>,
    pub thumbnail_url: Option<String>,
    pub extracted_text: Option<String>,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

/// Outcome of an upload. Gateway methods never return errors; failures are
/// reported here with `success == false`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadResult {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    /// The backend that actually holds the bytes.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider: Option<Provider>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl UploadResult {
    pub fn stored(
        provider: Provider,
        url: String,
        path: String,
        size: u64,
        content_type: String,
    ) -> Self {
        Self {
            success: true,
            url: Some(url),
            path: Some(path),
            provider: Some(provider),
            size: Some(size),
            content_type: Some(content_type),
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            url: None,
            path: None,
            provider: None,
            size: None,
            content_type: None,
            error: Some(error.into()),
        }
    }

    pub fn cancelled() -> Self {
        Self::failed(CANCELLED_MESSAGE)
    }
}
