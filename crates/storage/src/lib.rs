//! Storage layer for the bike-share usage services.
//!
//! Provides:
//! - Object storage (S3-compatible) access for the snapshot file
//! - Snapshot provisioning (download once, reuse on restart)
//! - Read-only analytical queries over the local snapshot

pub mod object_store;
pub mod snapshot;
pub mod usage_store;

pub use self::object_store::{ObjectStorage, ObjectStorageConfig};
pub use snapshot::{ensure_local_copy, is_present, SnapshotSource};
pub use usage_store::{StoreOptions, UsageStore};
