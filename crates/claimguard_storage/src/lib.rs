#![forbid(unsafe_code)]

pub mod claim_world;
pub mod error;
pub mod permission_store;
pub mod repo;

pub use claim_world::{ClaimRegistry, ClaimWorldManager};
pub use error::StorageError;
pub use permission_store::{FlagStores, PermissionSnapshotRow, PermissionStore, PermissionStoreKind};
