#![forbid(unsafe_code)]

use std::collections::BTreeMap;

use claimguard_kernel_contracts::claim::{BlockPos, Claim, ClaimId, PlayerId, WorldId};
use claimguard_kernel_contracts::context::ContextSet;
use claimguard_kernel_contracts::Tristate;

use crate::claim_world::ClaimRegistry;
use crate::permission_store::{FlagStores, PermissionSnapshotRow, PermissionStoreKind};
use crate::StorageError;

/// Typed repository interface for the transient and persistent flag stores.
pub trait FlagPermissionRepo {
    fn query_scope(
        &self,
        kind: PermissionStoreKind,
        contexts: &ContextSet,
    ) -> BTreeMap<String, bool>;
    fn scope_value(&self, kind: PermissionStoreKind, contexts: &ContextSet, key: &str) -> Tristate;
    fn set_scope_value(
        &self,
        kind: PermissionStoreKind,
        contexts: &ContextSet,
        key: &str,
        value: Tristate,
    ) -> Result<Tristate, StorageError>;
    fn clear_scope(&self, kind: PermissionStoreKind, contexts: &ContextSet) -> usize;
    fn snapshot_rows(&self, kind: PermissionStoreKind) -> Vec<PermissionSnapshotRow>;
}

/// Typed repository interface for per-world claim trees.
pub trait ClaimTreeRepo {
    fn register_world_row(&self, world_id: &WorldId);
    fn insert_claim_row(&self, claim: Claim) -> Result<Claim, StorageError>;
    fn claim_row(&self, claim_id: ClaimId) -> Option<Claim>;
    fn claim_row_at(
        &self,
        world_id: &WorldId,
        pos: BlockPos,
        include_subdivisions: bool,
    ) -> Option<Claim>;
    fn claim_row_by_identifier_or_name(&self, identifier: &str) -> Option<Claim>;
    fn transfer_claim_owner_row(
        &self,
        claim_id: ClaimId,
        new_owner: Option<PlayerId>,
    ) -> Result<Claim, StorageError>;
    fn remove_claim_rows(&self, claim_id: ClaimId) -> Result<Vec<Claim>, StorageError>;
}

impl FlagPermissionRepo for FlagStores {
    fn query_scope(
        &self,
        kind: PermissionStoreKind,
        contexts: &ContextSet,
    ) -> BTreeMap<String, bool> {
        self.store(kind).query(contexts)
    }

    fn scope_value(&self, kind: PermissionStoreKind, contexts: &ContextSet, key: &str) -> Tristate {
        self.store(kind).get_value(contexts, key)
    }

    fn set_scope_value(
        &self,
        kind: PermissionStoreKind,
        contexts: &ContextSet,
        key: &str,
        value: Tristate,
    ) -> Result<Tristate, StorageError> {
        self.store(kind).set_value(contexts, key, value)
    }

    fn clear_scope(&self, kind: PermissionStoreKind, contexts: &ContextSet) -> usize {
        self.store(kind).clear_contexts(contexts)
    }

    fn snapshot_rows(&self, kind: PermissionStoreKind) -> Vec<PermissionSnapshotRow> {
        self.store(kind).snapshot()
    }
}

impl ClaimTreeRepo for ClaimRegistry {
    fn register_world_row(&self, world_id: &WorldId) {
        self.register_world(world_id);
    }

    fn insert_claim_row(&self, claim: Claim) -> Result<Claim, StorageError> {
        let world = self.register_world(&claim.world_id);
        world.insert_claim(claim)
    }

    fn claim_row(&self, claim_id: ClaimId) -> Option<Claim> {
        self.find_claim(claim_id)
    }

    fn claim_row_at(
        &self,
        world_id: &WorldId,
        pos: BlockPos,
        include_subdivisions: bool,
    ) -> Option<Claim> {
        self.world(world_id)
            .map(|world| world.get_claim_at(pos, include_subdivisions))
    }

    fn claim_row_by_identifier_or_name(&self, identifier: &str) -> Option<Claim> {
        self.find_by_identifier_or_name(identifier)
    }

    fn transfer_claim_owner_row(
        &self,
        claim_id: ClaimId,
        new_owner: Option<PlayerId>,
    ) -> Result<Claim, StorageError> {
        let world = self
            .world_of(claim_id)
            .ok_or(StorageError::ClaimNotFound { claim_id })?;
        world.transfer_claim_owner(claim_id, new_owner)
    }

    fn remove_claim_rows(&self, claim_id: ClaimId) -> Result<Vec<Claim>, StorageError> {
        let world = self
            .world_of(claim_id)
            .ok_or(StorageError::ClaimNotFound { claim_id })?;
        world.remove_claim(claim_id)
    }
}
