//! Data models shared by the gateway, the storage backends and the metadata store.

mod object;
mod record;
mod upload;

pub use object::*;
pub use record::*;
pub use upload::*;
