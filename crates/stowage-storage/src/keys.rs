//! Shared key generation for storage backends.
//!
//! Key format: `{folder}/{unix_millis}-{6 lowercase alphanumerics}-{sanitized name}`.

use chrono::Utc;
use rand::distr::Alphanumeric;
use rand::Rng;
use std::fmt::Display;
use stowage_core::constants::AVATAR_FOLDER;

use crate::{StorageError, StorageResult};

const MAX_FILENAME_LENGTH: usize = 200;
const SUFFIX_LENGTH: usize = 6;

/// Reject keys that are empty, absolute or contain `..`.
pub fn validate_key(key: &str) -> StorageResult<()> {
    if key.trim().is_empty() {
        return Err(StorageError::InvalidKey("Storage key is empty".to_string()));
    }
    if key.contains("..") || key.starts_with('/') {
        return Err(StorageError::InvalidKey(
            "Storage key contains invalid characters".to_string(),
        ));
    }
    Ok(())
}

/// Lowercased final path component with anything outside `[a-z0-9._-]` replaced by `_`.
///
/// Never fails: an unusable name becomes `file`.
pub fn sanitize_filename(filename: &str) -> String {
    let filename_only = filename
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(filename);

    let mut sanitized: String = filename_only
        .chars()
        .take(MAX_FILENAME_LENGTH)
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '.' || c == '-' || c == '_' {
                c.to_ascii_lowercase()
            } else {
                '_'
            }
        })
        .collect();

    while sanitized.contains("..") {
        sanitized = sanitized.replace("..", ".");
    }

    let sanitized = sanitized.trim_start_matches('.');
    if sanitized.is_empty() {
        "file".to_string()
    } else {
        sanitized.to_string()
    }
}

fn random_suffix() -> String {
    rand::rng()
        .sample_iter(&Alphanumeric)
        .take(SUFFIX_LENGTH)
        .map(|b| char::from(b).to_ascii_lowercase())
        .collect()
}

/// Generate a collision-resistant key for `filename` inside `folder`.
pub fn generate_storage_key(folder: &str, filename: &str) -> String {
    let name = format!(
        "{}-{}-{}",
        Utc::now().timestamp_millis(),
        random_suffix(),
        sanitize_filename(filename)
    );

    let folder = folder.trim_matches('/');
    if folder.is_empty() {
        name
    } else {
        format!("{}/{}", folder, name)
    }
}

/// Folder holding a user's profile pictures.
pub fn avatar_folder(user_id: impl Display) -> String {
    format!("{}/{}", AVATAR_FOLDER, user_id)
}
