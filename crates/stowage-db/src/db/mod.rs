//! Database repositories
//!
//! `records` owns the `resource_files` table; `profiles` only touches the
//! avatar column of the `profiles` table.

pub mod profiles;
pub mod records;

pub use profiles::ProfileRepository;
pub use records::ResourceFileRepository;

use stowage_core::RecordError;

/// Connection-level failures are transient; everything else is a rejected write.
pub(crate) fn to_record_error(err: sqlx::Error) -> RecordError {
    match err {
        sqlx::Error::Io(_)
        | sqlx::Error::PoolTimedOut
        | sqlx::Error::PoolClosed
        | sqlx::Error::WorkerCrashed
        | sqlx::Error::Tls(_) => RecordError::Unavailable(err.to_string()),
        other => RecordError::Rejected(other.to_string()),
    }
}
