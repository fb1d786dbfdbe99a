#![forbid(unsafe_code)]

use std::collections::{BTreeMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use claimguard_kernel_contracts::claim::{BlockPos, Claim, ClaimId, PlayerId, WorldId};
use claimguard_kernel_contracts::Validate;
use tracing::debug;

use crate::StorageError;

type ClaimCell = Arc<Mutex<Claim>>;

#[derive(Debug, Default)]
struct ClaimTree {
    claims: BTreeMap<ClaimId, ClaimCell>,
    top_level: Vec<ClaimId>,
}

fn lock_claim(cell: &Mutex<Claim>) -> MutexGuard<'_, Claim> {
    cell.lock().unwrap_or_else(PoisonError::into_inner)
}

impl ClaimTree {
    fn root_of(&self, claim_id: ClaimId) -> Option<ClaimId> {
        let mut current = claim_id;
        // Parents must exist before children, so the walk is bounded by tree size.
        for _ in 0..=self.claims.len() {
            let parent = lock_claim(self.claims.get(&current)?).parent_id;
            match parent {
                Some(parent_id) => current = parent_id,
                None => return Some(current),
            }
        }
        None
    }

    fn owner_of(&self, claim_id: ClaimId) -> Option<PlayerId> {
        let root = self.root_of(claim_id)?;
        lock_claim(self.claims.get(&root)?).owner_id
    }

    /// Copy of the claim with subdivision ownership resolved from the topmost ancestor.
    fn snapshot(&self, claim_id: ClaimId) -> Option<Claim> {
        let mut claim = lock_claim(self.claims.get(&claim_id)?).clone();
        if claim.parent_id.is_some() {
            claim.owner_id = self.owner_of(claim_id);
        }
        Some(claim)
    }

    fn contains(&self, claim_id: ClaimId, world_id: &WorldId, pos: BlockPos) -> bool {
        self.claims
            .get(&claim_id)
            .map(|cell| lock_claim(cell).contains_point(world_id, pos))
            .unwrap_or(false)
    }

    fn deepest_at(&self, start: ClaimId, world_id: &WorldId, pos: BlockPos) -> ClaimId {
        let mut current = start;
        'descend: loop {
            let children = match self.claims.get(&current) {
                Some(cell) => lock_claim(cell).child_ids.clone(),
                None => return current,
            };
            for child in children {
                if self.contains(child, world_id, pos) {
                    current = child;
                    continue 'descend;
                }
            }
            return current;
        }
    }

    /// `claim_id` followed by its descendants, breadth-first in child-list order.
    fn subtree(&self, claim_id: ClaimId) -> Vec<ClaimId> {
        let mut out = Vec::new();
        let mut queue = VecDeque::from([claim_id]);
        while let Some(id) = queue.pop_front() {
            if let Some(cell) = self.claims.get(&id) {
                out.push(id);
                queue.extend(lock_claim(cell).child_ids.iter().copied());
            }
        }
        out
    }
}

/// Claim tree for one world. Structure sits behind one lock; each claim behind
/// its own, so owner changes on different claims never contend.
#[derive(Debug)]
pub struct ClaimWorldManager {
    world_id: WorldId,
    wilderness: Claim,
    tree: RwLock<ClaimTree>,
}

impl ClaimWorldManager {
    pub fn new(world_id: WorldId) -> Self {
        Self {
            wilderness: Claim::wilderness(world_id.clone()),
            world_id,
            tree: RwLock::new(ClaimTree::default()),
        }
    }

    fn read_tree(&self) -> RwLockReadGuard<'_, ClaimTree> {
        self.tree.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_tree(&self) -> RwLockWriteGuard<'_, ClaimTree> {
        self.tree.write().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn world_id(&self) -> &WorldId {
        &self.world_id
    }

    pub fn wilderness_claim(&self) -> &Claim {
        &self.wilderness
    }

    pub fn claim_count(&self) -> usize {
        self.read_tree().claims.len()
    }

    /// Registers a claim. Subdivisions must name a registered parent in this
    /// world and lie inside it; they are appended to the parent's child list.
    pub fn insert_claim(&self, claim: Claim) -> Result<Claim, StorageError> {
        claim.validate()?;
        let claim_id = claim.claim_id;
        if claim.world_id != self.world_id {
            return Err(StorageError::HierarchyViolation {
                claim_id,
                reason: "claim belongs to another world",
            });
        }
        if claim.is_wilderness() || claim_id == self.wilderness.claim_id {
            return Err(StorageError::HierarchyViolation {
                claim_id,
                reason: "wilderness is synthetic and cannot be registered",
            });
        }
        if !claim.child_ids.is_empty() {
            return Err(StorageError::HierarchyViolation {
                claim_id,
                reason: "children are registered after their parent",
            });
        }

        let mut tree = self.write_tree();
        if tree.claims.contains_key(&claim_id) {
            return Err(StorageError::DuplicateKey {
                table: "claims.claim_id",
                key: claim_id.to_string(),
            });
        }

        let mut claim = claim;
        match claim.parent_id {
            Some(parent_id) => {
                let parent_cell = tree.claims.get(&parent_id).cloned().ok_or(
                    StorageError::ForeignKeyViolation {
                        table: "claims.parent_id",
                        key: parent_id.to_string(),
                    },
                )?;
                if !lock_claim(&parent_cell).contains_bounds(&claim) {
                    return Err(StorageError::HierarchyViolation {
                        claim_id,
                        reason: "subdivision must lie inside its parent",
                    });
                }
                let root_owner = tree.owner_of(parent_id);
                if claim.owner_id.is_some() && claim.owner_id != root_owner {
                    return Err(StorageError::HierarchyViolation {
                        claim_id,
                        reason: "subdivision owner must match its topmost ancestor",
                    });
                }
                // Ownership of subdivisions is always read through the root.
                claim.owner_id = None;
                lock_claim(&parent_cell).child_ids.push(claim_id);
            }
            None => tree.top_level.push(claim_id),
        }
        tree.claims.insert(claim_id, Arc::new(Mutex::new(claim)));
        debug!(world = %self.world_id, claim = %claim_id, "claim registered");

        tree.snapshot(claim_id).ok_or(StorageError::ClaimNotFound { claim_id })
    }

    pub fn get_claim(&self, claim_id: ClaimId) -> Option<Claim> {
        if claim_id == self.wilderness.claim_id {
            return Some(self.wilderness.clone());
        }
        self.read_tree().snapshot(claim_id)
    }

    /// Top-level claims are tested in registration order. With
    /// `include_subdivisions` the deepest containing subdivision wins. Falls
    /// back to the wilderness, never `None`.
    pub fn get_claim_at(&self, pos: BlockPos, include_subdivisions: bool) -> Claim {
        let tree = self.read_tree();
        for &top_id in &tree.top_level {
            if !tree.contains(top_id, &self.world_id, pos) {
                continue;
            }
            let found = if include_subdivisions {
                tree.deepest_at(top_id, &self.world_id, pos)
            } else {
                top_id
            };
            if let Some(claim) = tree.snapshot(found) {
                return claim;
            }
        }
        self.wilderness.clone()
    }

    pub fn top_level_claims(&self) -> Vec<Claim> {
        let tree = self.read_tree();
        tree.top_level
            .iter()
            .filter_map(|id| tree.snapshot(*id))
            .collect()
    }

    /// Every registered claim, each top-level claim followed by its subtree.
    pub fn claims_in_tree_order(&self) -> Vec<Claim> {
        let tree = self.read_tree();
        tree.top_level
            .iter()
            .flat_map(|id| tree.subtree(*id))
            .filter_map(|id| tree.snapshot(id))
            .collect()
    }

    pub fn children_of(&self, claim_id: ClaimId) -> Vec<Claim> {
        let tree = self.read_tree();
        let children = match tree.claims.get(&claim_id) {
            Some(cell) => lock_claim(cell).child_ids.clone(),
            None => return Vec::new(),
        };
        children
            .into_iter()
            .filter_map(|id| tree.snapshot(id))
            .collect()
    }

    pub fn root_of(&self, claim_id: ClaimId) -> Option<Claim> {
        let tree = self.read_tree();
        let root = tree.root_of(claim_id)?;
        tree.snapshot(root)
    }

    /// Replaces the owner of a top-level claim. The tree read lock is held
    /// until the claim is locked, so a concurrent removal either happens
    /// first (`ClaimNotFound`) or waits for the transfer. Flags, bounds and
    /// hierarchy are untouched.
    pub fn transfer_claim_owner(
        &self,
        claim_id: ClaimId,
        new_owner: Option<PlayerId>,
    ) -> Result<Claim, StorageError> {
        if claim_id == self.wilderness.claim_id {
            return Err(StorageError::NoTransferableOwner {
                claim_id,
                reason: "wilderness cannot change owner",
            });
        }
        let tree = self.read_tree();
        let mut claim = lock_claim(
            tree.claims
                .get(&claim_id)
                .ok_or(StorageError::ClaimNotFound { claim_id })?,
        );
        if claim.parent_id.is_some() {
            return Err(StorageError::NoTransferableOwner {
                claim_id,
                reason: "only top-level claims can change owner",
            });
        }
        claim.owner_id = new_owner;
        Ok(claim.clone())
    }

    /// Removes a claim and, cascading, all of its descendants. Returns the
    /// removed claims, the target first.
    pub fn remove_claim(&self, claim_id: ClaimId) -> Result<Vec<Claim>, StorageError> {
        if claim_id == self.wilderness.claim_id {
            return Err(StorageError::HierarchyViolation {
                claim_id,
                reason: "wilderness cannot be deleted",
            });
        }
        let mut tree = self.write_tree();
        if !tree.claims.contains_key(&claim_id) {
            return Err(StorageError::ClaimNotFound { claim_id });
        }

        let doomed = tree.subtree(claim_id);
        let removed: Vec<Claim> = doomed.iter().filter_map(|id| tree.snapshot(*id)).collect();

        let parent_id = tree
            .claims
            .get(&claim_id)
            .and_then(|cell| lock_claim(cell).parent_id);
        match parent_id {
            Some(parent_id) => {
                if let Some(parent) = tree.claims.get(&parent_id) {
                    lock_claim(parent).child_ids.retain(|id| *id != claim_id);
                }
            }
            None => tree.top_level.retain(|id| *id != claim_id),
        }
        for id in &doomed {
            tree.claims.remove(id);
        }
        debug!(
            world = %self.world_id,
            claim = %claim_id,
            removed = removed.len(),
            "claim subtree removed"
        );
        Ok(removed)
    }
}

/// All per-world claim trees, keyed by world.
#[derive(Debug, Default)]
pub struct ClaimRegistry {
    worlds: RwLock<BTreeMap<WorldId, Arc<ClaimWorldManager>>>,
}

impl ClaimRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the world's manager, creating an empty one on first use.
    pub fn register_world(&self, world_id: &WorldId) -> Arc<ClaimWorldManager> {
        if let Some(existing) = self.world(world_id) {
            return existing;
        }
        let mut worlds = self.worlds.write().unwrap_or_else(PoisonError::into_inner);
        worlds
            .entry(world_id.clone())
            .or_insert_with(|| Arc::new(ClaimWorldManager::new(world_id.clone())))
            .clone()
    }

    pub fn world(&self, world_id: &WorldId) -> Option<Arc<ClaimWorldManager>> {
        self.worlds
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(world_id)
            .cloned()
    }

    pub fn worlds(&self) -> Vec<Arc<ClaimWorldManager>> {
        self.worlds
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect()
    }

    pub fn world_ids(&self) -> Vec<WorldId> {
        self.worlds
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect()
    }

    /// Finds a claim by id in any world, wilderness claims included.
    pub fn find_claim(&self, claim_id: ClaimId) -> Option<Claim> {
        self.worlds()
            .iter()
            .find_map(|world| world.get_claim(claim_id))
    }

    pub fn world_of(&self, claim_id: ClaimId) -> Option<Arc<ClaimWorldManager>> {
        self.worlds()
            .into_iter()
            .find(|world| world.get_claim(claim_id).is_some())
    }

    /// Matches a UUID string or a claim name, case-insensitively, in world
    /// order. Never yields a wilderness claim.
    pub fn find_by_identifier_or_name(&self, identifier: &str) -> Option<Claim> {
        let needle = identifier.trim();
        if needle.is_empty() {
            return None;
        }
        for world in self.worlds() {
            let hit = world.claims_in_tree_order().into_iter().find(|claim| {
                claim.claim_id.to_string().eq_ignore_ascii_case(needle)
                    || claim
                        .claim_name
                        .as_deref()
                        .map(|name| name.eq_ignore_ascii_case(needle))
                        .unwrap_or(false)
            });
            if hit.is_some() {
                return hit;
            }
        }
        None
    }
}
