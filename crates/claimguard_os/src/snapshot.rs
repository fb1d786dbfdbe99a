#![forbid(unsafe_code)]

use claimguard_kernel_contracts::context::ContextSet;
use claimguard_kernel_contracts::flag::FlagKey;
use claimguard_kernel_contracts::Validate;
use claimguard_storage::repo::FlagPermissionRepo;
use claimguard_storage::{PermissionSnapshotRow, PermissionStoreKind};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::ClaimFlagError;
use crate::service::ClaimGuardService;

pub const FLAG_SNAPSHOT_VERSION: u32 = 1;

/// Persistent-store export handed to the durable-storage collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlagStoreSnapshot {
    pub schema_version: u32,
    pub rows: Vec<PermissionSnapshotRow>,
}

impl FlagStoreSnapshot {
    /// Every row needs a namespaced flag key and valid contexts that hash to
    /// its recorded digest.
    pub fn verify(&self) -> Result<(), ClaimFlagError> {
        if self.schema_version != FLAG_SNAPSHOT_VERSION {
            return Err(ClaimFlagError::SnapshotRejected {
                reason: format!("unsupported schema_version {}", self.schema_version),
            });
        }
        for row in &self.rows {
            if FlagKey::new(row.key.as_str()).is_err() {
                return Err(ClaimFlagError::SnapshotRejected {
                    reason: format!("invalid flag key {:?}", row.key),
                });
            }
            for context in &row.contexts {
                context.validate()?;
            }
            let contexts: ContextSet = row.contexts.iter().cloned().collect();
            if contexts.digest_hex() != row.context_digest {
                return Err(ClaimFlagError::SnapshotRejected {
                    reason: format!("context digest mismatch for key {}", row.key),
                });
            }
        }
        Ok(())
    }
}

impl ClaimGuardService {
    pub fn export_persistent_flags(&self) -> Result<String, ClaimFlagError> {
        let snapshot = FlagStoreSnapshot {
            schema_version: FLAG_SNAPSHOT_VERSION,
            rows: self.stores.snapshot_rows(PermissionStoreKind::Persistent),
        };
        Ok(serde_json::to_string_pretty(&snapshot)?)
    }

    /// Loads an export into the persistent store. Nothing is written unless
    /// the whole snapshot verifies.
    pub fn import_persistent_flags(&self, json: &str) -> Result<usize, ClaimFlagError> {
        let snapshot: FlagStoreSnapshot = serde_json::from_str(json)?;
        snapshot.verify()?;
        let restored = self.stores.persistent().restore(&snapshot.rows);
        info!(rows = restored, "persistent flags imported");
        Ok(restored)
    }
}
