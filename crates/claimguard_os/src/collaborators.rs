#![forbid(unsafe_code)]

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, PoisonError, RwLock};

use claimguard_engines::flag_authority::{CapabilityOracle, ClaimAclPolicy};
use claimguard_kernel_contracts::claim::{Claim, PlayerId};
use claimguard_kernel_contracts::flag::capabilities;
use claimguard_kernel_contracts::subject::Subject;

/// Resolves player ids to display names for logs and claim info.
pub trait OwnerDirectory: Send + Sync {
    fn display_name(&self, player_id: &PlayerId) -> Option<String>;
}

/// Durable-storage hand-off. Calls are notifications only; the in-memory
/// state stays authoritative for the session.
pub trait ClaimPersistence: Send + Sync {
    fn claim_updated(&self, claim: &Claim);
    fn claims_removed(&self, claims: &[Claim]);
    fn flush(&self) {}
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoopPersistence;

impl ClaimPersistence for NoopPersistence {
    fn claim_updated(&self, _claim: &Claim) {}
    fn claims_removed(&self, _claims: &[Claim]) {}
}

/// Capability grants held in memory. The console holds every capability.
#[derive(Debug, Default)]
pub struct InMemoryCapabilities {
    grants: RwLock<BTreeMap<PlayerId, BTreeSet<String>>>,
}

impl InMemoryCapabilities {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn grant(&self, player_id: PlayerId, capability: &str) {
        self.grants
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(player_id)
            .or_default()
            .insert(capability.to_string());
    }

    pub fn revoke(&self, player_id: &PlayerId, capability: &str) {
        if let Some(held) = self
            .grants
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .get_mut(player_id)
        {
            held.remove(capability);
        }
    }
}

impl CapabilityOracle for InMemoryCapabilities {
    fn has_capability(&self, subject: &Subject, capability: &str) -> bool {
        match subject {
            Subject::Console => true,
            Subject::Player(player_id) => self
                .grants
                .read()
                .unwrap_or_else(PoisonError::into_inner)
                .get(player_id)
                .map(|held| held.contains(capability))
                .unwrap_or(false),
        }
    }
}

#[derive(Debug, Default)]
pub struct InMemoryOwnerDirectory {
    names: RwLock<BTreeMap<PlayerId, String>>,
}

impl InMemoryOwnerDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, player_id: PlayerId, name: impl Into<String>) {
        self.names
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(player_id, name.into());
    }
}

impl OwnerDirectory for InMemoryOwnerDirectory {
    fn display_name(&self, player_id: &PlayerId) -> Option<String> {
        self.names
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(player_id)
            .cloned()
    }
}

pub const EDIT_DENIED_REASON: &str = "You don't have permission to edit this claim.";
pub const ADMIN_CLAIM_DENIED_REASON: &str =
    "This claim belongs to an administrator and cannot be edited.";
pub const WILDERNESS_DENIED_REASON: &str = "You cannot edit the wilderness.";

/// Edit ACL from ownership and the manager trust list. Admin-owned claims and
/// the wilderness need the admin-claims capability.
pub struct TrustListAcl {
    capabilities: Arc<dyn CapabilityOracle>,
}

impl TrustListAcl {
    pub fn new(capabilities: Arc<dyn CapabilityOracle>) -> Self {
        Self { capabilities }
    }
}

impl ClaimAclPolicy for TrustListAcl {
    fn allow_edit(&self, player_id: &PlayerId, claim: &Claim) -> Option<String> {
        let admin = self
            .capabilities
            .has_capability(&Subject::Player(*player_id), capabilities::COMMAND_ADMIN_CLAIMS);
        if claim.is_wilderness() {
            return (!admin).then(|| WILDERNESS_DENIED_REASON.to_string());
        }
        match claim.owner_id {
            None if admin => None,
            None => Some(ADMIN_CLAIM_DENIED_REASON.to_string()),
            Some(owner) if owner == *player_id => None,
            Some(_) if claim.trust.is_manager(player_id) => None,
            Some(_) => Some(EDIT_DENIED_REASON.to_string()),
        }
    }
}
