#![forbid(unsafe_code)]

use std::collections::BTreeSet;

use claimguard_kernel_contracts::claim::{BlockPos, Claim, ClaimId, ClaimType, PlayerId, WorldId};
use claimguard_kernel_contracts::flag::capabilities;
use claimguard_kernel_contracts::subject::Subject;
use claimguard_storage::repo::ClaimTreeRepo;
use tracing::{debug, info};

use crate::error::ClaimFlagError;
use crate::service::ClaimGuardService;

pub const ADMIN_OWNER_NAME: &str = "administrator";
pub const UNKNOWN_OWNER_NAME: &str = "someone";
pub const INFO_DENIED_REASON: &str =
    "You do not have permission to view information in this claim.";
pub const ADMIN_TRANSFER_DENIED_REASON: &str =
    "You do not have permission to transfer administrative claims.";

/// Horizontal corners at the claim's lower bound. North is -z, west is -x.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClaimCorners {
    pub north_west: BlockPos,
    pub north_east: BlockPos,
    pub south_west: BlockPos,
    pub south_east: BlockPos,
}

impl ClaimCorners {
    pub fn of(claim: &Claim) -> Self {
        let l = claim.lesser_corner;
        let g = claim.greater_corner;
        Self {
            north_west: BlockPos::new(l.x, l.y, l.z),
            north_east: BlockPos::new(g.x, l.y, l.z),
            south_west: BlockPos::new(l.x, l.y, g.z),
            south_east: BlockPos::new(g.x, l.y, g.z),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClaimInfo {
    pub claim_id: ClaimId,
    pub claim_name: Option<String>,
    pub world_id: WorldId,
    pub owner_name: String,
    pub claim_type: ClaimType,
    pub cuboid: bool,
    pub area: i64,
    /// Only reported for subdivisions.
    pub inherit_parent: Option<bool>,
    pub accessors: Vec<String>,
    pub builders: Vec<String>,
    pub containers: Vec<String>,
    pub managers: Vec<String>,
    pub corners: ClaimCorners,
}

impl ClaimGuardService {
    /// Never fails: points outside every claim, or in unregistered worlds,
    /// resolve to that world's wilderness.
    pub fn resolve_claim_at(
        &self,
        world_id: &WorldId,
        pos: BlockPos,
        include_subdivisions: bool,
    ) -> Claim {
        self.claims
            .claim_row_at(world_id, pos, include_subdivisions)
            .unwrap_or_else(|| Claim::wilderness(world_id.clone()))
    }

    /// UUID or claim name, case-insensitive, across all worlds. Never the wilderness.
    pub fn resolve_claim_by_id(&self, identifier: &str) -> Result<Claim, ClaimFlagError> {
        let found = self.claims.claim_row_by_identifier_or_name(identifier);
        debug!(identifier, found = found.is_some(), "claim lookup");
        found.ok_or_else(|| ClaimFlagError::ClaimNotFound {
            query: identifier.to_string(),
        })
    }

    pub fn claim(&self, claim_id: ClaimId) -> Result<Claim, ClaimFlagError> {
        self.claims
            .claim_row(claim_id)
            .ok_or_else(|| ClaimFlagError::ClaimNotFound {
                query: claim_id.to_string(),
            })
    }

    /// Registers a claim built by the claim-creation workflow. Unknown worlds
    /// are registered (and seeded) first.
    pub fn insert_claim(&self, claim: Claim) -> Result<Claim, ClaimFlagError> {
        if self.claims.world(&claim.world_id).is_none() {
            self.register_world(&claim.world_id)?;
        }
        let stored = self.claims.insert_claim_row(claim)?;
        self.collaborators.persistence.claim_updated(&stored);
        info!(
            claim = %stored.claim_id,
            claim_type = %stored.claim_type,
            world = %stored.world_id,
            "claim registered"
        );
        Ok(stored)
    }

    /// Deletes the claim and all of its descendants, purging their CLAIM-layer
    /// flags. Returns the removed claims, the target first.
    pub fn delete_claim(&self, claim_id: ClaimId) -> Result<Vec<Claim>, ClaimFlagError> {
        let removed = self.claims.remove_claim_rows(claim_id)?;
        let purged: usize = removed
            .iter()
            .map(|claim| self.purge_claim_flags(claim))
            .sum();
        self.collaborators.persistence.claims_removed(&removed);
        info!(
            claim = %claim_id,
            removed = removed.len(),
            purged_flags = purged,
            "claim deleted"
        );
        Ok(removed)
    }

    /// Storage-level transfer with no acting subject.
    pub fn transfer_owner(
        &self,
        claim_id: ClaimId,
        new_owner: Option<PlayerId>,
    ) -> Result<Claim, ClaimFlagError> {
        self.transfer_owner_as(&Subject::Console, claim_id, new_owner)
    }

    /// Moves a top-level claim to `new_owner` (`None` = administrator).
    /// Subdivisions and the wilderness are rejected; ADMIN claims need the
    /// admin-claims capability.
    pub fn transfer_owner_as(
        &self,
        actor: &Subject,
        claim_id: ClaimId,
        new_owner: Option<PlayerId>,
    ) -> Result<Claim, ClaimFlagError> {
        let claim = self.claim(claim_id)?;
        if claim.is_wilderness() {
            return Err(ClaimFlagError::NoTransferableOwner {
                claim_id,
                reason: "wilderness cannot change owner",
            });
        }
        if claim.is_admin()
            && !self
                .collaborators
                .capabilities
                .has_capability(actor, capabilities::COMMAND_ADMIN_CLAIMS)
        {
            return Err(ClaimFlagError::permission_denied(
                ADMIN_TRANSFER_DENIED_REASON,
            ));
        }

        let updated = self.claims.transfer_claim_owner_row(claim_id, new_owner)?;
        self.collaborators.persistence.claim_updated(&updated);
        info!(
            "{} transferred a claim at {} to {}",
            self.subject_name(actor),
            updated.lesser_corner,
            self.owner_name(updated.owner_id.as_ref())
        );
        Ok(updated)
    }

    /// Owner, trusted container/builder/manager, or the info-others capability.
    pub fn claim_info(
        &self,
        subject: &Subject,
        claim_id: ClaimId,
    ) -> Result<ClaimInfo, ClaimFlagError> {
        let claim = self.claim(claim_id)?;
        let allowed = match subject {
            Subject::Console => true,
            Subject::Player(player_id) => {
                claim.owner_id.as_ref() == Some(player_id)
                    || claim.trust.has_inspect_role(player_id)
                    || self
                        .collaborators
                        .capabilities
                        .has_capability(subject, capabilities::COMMAND_CLAIM_INFO_OTHERS)
            }
        };
        if !allowed {
            return Err(ClaimFlagError::permission_denied(INFO_DENIED_REASON));
        }

        let names = |ids: &BTreeSet<PlayerId>| -> Vec<String> {
            ids.iter().map(|id| self.player_name(id)).collect()
        };
        Ok(ClaimInfo {
            claim_id: claim.claim_id,
            claim_name: claim.claim_name.clone(),
            world_id: claim.world_id.clone(),
            owner_name: self.owner_name(claim.owner_id.as_ref()),
            claim_type: claim.claim_type,
            cuboid: claim.cuboid,
            area: claim.area(),
            inherit_parent: claim.is_subdivision().then_some(claim.inherit_parent),
            accessors: names(&claim.trust.accessors),
            builders: names(&claim.trust.builders),
            containers: names(&claim.trust.containers),
            managers: names(&claim.trust.managers),
            corners: ClaimCorners::of(&claim),
        })
    }

    fn owner_name(&self, owner: Option<&PlayerId>) -> String {
        match owner {
            None => ADMIN_OWNER_NAME.to_string(),
            Some(player_id) => self
                .collaborators
                .owners
                .display_name(player_id)
                .unwrap_or_else(|| UNKNOWN_OWNER_NAME.to_string()),
        }
    }

    fn subject_name(&self, subject: &Subject) -> String {
        match subject {
            Subject::Console => "console".to_string(),
            Subject::Player(player_id) => self.player_name(player_id),
        }
    }

    fn player_name(&self, player_id: &PlayerId) -> String {
        self.collaborators
            .owners
            .display_name(player_id)
            .unwrap_or_else(|| player_id.to_string())
    }
}
