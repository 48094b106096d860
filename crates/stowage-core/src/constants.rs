//! Application-wide constants.

/// Bucket used by both providers when none is configured.
pub const DEFAULT_BUCKET: &str = "resources";

/// Folder used when the caller gives none; `upload_auto` always uses it.
pub const DEFAULT_FOLDER: &str = "resources";

/// Folder prefix for profile pictures: `avatars/{user_id}/...`.
pub const AVATAR_FOLDER: &str = "avatars";

pub const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

pub const DEFAULT_REGION: &str = "us-east-1";

/// Lifetime of signed URLs when the caller does not pass one.
pub const DEFAULT_SIGNED_URL_TTL_SECS: u64 = 3600;

pub const DEFAULT_LIST_MAX_KEYS: usize = 100;

pub const DEFAULT_LOCAL_STORAGE_PATH: &str = "./data/storage";
pub const DEFAULT_LOCAL_STORAGE_BASE_URL: &str = "http://localhost:3000/storage";

/// Environment variable naming a `KEY=VALUE` file loaded as the runtime configuration table.
pub const RUNTIME_CONFIG_ENV: &str = "STOWAGE_RUNTIME_CONFIG";
