#![forbid(unsafe_code)]

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::common::{validate_text, validate_token};
use crate::context::Context;
use crate::{ContractViolation, SchemaVersion, Validate};

pub const CLAIM_CONTRACT_VERSION: SchemaVersion = SchemaVersion(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ClaimId(Uuid);

impl ClaimId {
    pub fn new_v4() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_uuid(id: Uuid) -> Self {
        Self(id)
    }

    pub fn parse(s: &str) -> Result<Self, ContractViolation> {
        Uuid::parse_str(s.trim())
            .map(Self)
            .map_err(|_| ContractViolation::InvalidValue {
                field: "claim_id",
                reason: "must be a UUID",
            })
    }

    /// Stable id of the synthetic wilderness claim for `world_id`.
    pub fn wilderness_for(world_id: &WorldId) -> Self {
        let name = format!("wilderness:{}", world_id.as_str());
        Self(Uuid::new_v5(&Uuid::NAMESPACE_OID, name.as_bytes()))
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl fmt::Display for ClaimId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.hyphenated())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PlayerId(Uuid);

impl PlayerId {
    pub fn from_uuid(id: Uuid) -> Self {
        Self(id)
    }

    pub fn parse(s: &str) -> Result<Self, ContractViolation> {
        Uuid::parse_str(s.trim())
            .map(Self)
            .map_err(|_| ContractViolation::InvalidValue {
                field: "player_id",
                reason: "must be a UUID",
            })
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl fmt::Display for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.hyphenated())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct WorldId(String);

impl WorldId {
    pub fn new(id: impl Into<String>) -> Result<Self, ContractViolation> {
        let v = Self(id.into());
        v.validate()?;
        Ok(v)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Validate for WorldId {
    fn validate(&self) -> Result<(), ContractViolation> {
        validate_token("world_id", &self.0, 64)
    }
}

impl fmt::Display for WorldId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct BlockPos {
    pub x: i32,
    pub y: i32,
    pub z: i32,
}

impl BlockPos {
    pub const fn new(x: i32, y: i32, z: i32) -> Self {
        Self { x, y, z }
    }
}

impl fmt::Display for BlockPos {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {}, {})", self.x, self.y, self.z)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ClaimType {
    Wilderness,
    Admin,
    Basic,
    Subdivision,
}

impl ClaimType {
    pub fn as_str(self) -> &'static str {
        match self {
            ClaimType::Wilderness => "wilderness",
            ClaimType::Admin => "admin",
            ClaimType::Basic => "basic",
            ClaimType::Subdivision => "subdivision",
        }
    }
}

impl fmt::Display for ClaimType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-claim role membership. Consulted by the claim ACL, never by flag resolution.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClaimTrust {
    pub accessors: BTreeSet<PlayerId>,
    pub builders: BTreeSet<PlayerId>,
    pub containers: BTreeSet<PlayerId>,
    pub managers: BTreeSet<PlayerId>,
}

impl ClaimTrust {
    pub fn is_manager(&self, player_id: &PlayerId) -> bool {
        self.managers.contains(player_id)
    }

    /// Accessors alone do not count; they cannot inspect a claim.
    pub fn has_inspect_role(&self, player_id: &PlayerId) -> bool {
        self.containers.contains(player_id)
            || self.builders.contains(player_id)
            || self.managers.contains(player_id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claim {
    pub schema_version: SchemaVersion,
    pub claim_id: ClaimId,
    pub claim_type: ClaimType,
    pub world_id: WorldId,
    pub cuboid: bool,
    pub lesser_corner: BlockPos,
    pub greater_corner: BlockPos,
    /// `None` means administrator-owned.
    pub owner_id: Option<PlayerId>,
    pub parent_id: Option<ClaimId>,
    pub child_ids: Vec<ClaimId>,
    pub inherit_parent: bool,
    pub claim_name: Option<String>,
    pub trust: ClaimTrust,
}

impl Claim {
    /// Builds a top-level ADMIN or BASIC claim. Corners are normalized so that
    /// `lesser <= greater` component-wise.
    pub fn top_level(
        claim_id: ClaimId,
        claim_type: ClaimType,
        world_id: WorldId,
        corner_a: BlockPos,
        corner_b: BlockPos,
        owner_id: Option<PlayerId>,
        cuboid: bool,
    ) -> Result<Self, ContractViolation> {
        if !matches!(claim_type, ClaimType::Admin | ClaimType::Basic) {
            return Err(ContractViolation::InvalidValue {
                field: "claim.claim_type",
                reason: "top-level claims must be ADMIN or BASIC",
            });
        }
        let (lesser_corner, greater_corner) = normalize_corners(corner_a, corner_b);
        let claim = Self {
            schema_version: CLAIM_CONTRACT_VERSION,
            claim_id,
            claim_type,
            world_id,
            cuboid,
            lesser_corner,
            greater_corner,
            owner_id,
            parent_id: None,
            child_ids: Vec::new(),
            inherit_parent: false,
            claim_name: None,
            trust: ClaimTrust::default(),
        };
        claim.validate()?;
        Ok(claim)
    }

    /// Builds a subdivision of `parent`. The owner is copied from the parent; the
    /// registry keeps it in step with the topmost ancestor.
    pub fn subdivision(
        claim_id: ClaimId,
        parent: &Claim,
        corner_a: BlockPos,
        corner_b: BlockPos,
        cuboid: bool,
    ) -> Result<Self, ContractViolation> {
        if parent.is_wilderness() {
            return Err(ContractViolation::InvalidValue {
                field: "claim.parent_id",
                reason: "wilderness cannot be subdivided",
            });
        }
        let (lesser_corner, greater_corner) = normalize_corners(corner_a, corner_b);
        let claim = Self {
            schema_version: CLAIM_CONTRACT_VERSION,
            claim_id,
            claim_type: ClaimType::Subdivision,
            world_id: parent.world_id.clone(),
            cuboid,
            lesser_corner,
            greater_corner,
            owner_id: parent.owner_id,
            parent_id: Some(parent.claim_id),
            child_ids: Vec::new(),
            inherit_parent: true,
            claim_name: None,
            trust: ClaimTrust::default(),
        };
        claim.validate()?;
        Ok(claim)
    }

    /// The synthetic per-world claim covering everything no other claim covers.
    pub fn wilderness(world_id: WorldId) -> Self {
        Self {
            schema_version: CLAIM_CONTRACT_VERSION,
            claim_id: ClaimId::wilderness_for(&world_id),
            claim_type: ClaimType::Wilderness,
            world_id,
            cuboid: false,
            lesser_corner: BlockPos::new(i32::MIN, i32::MIN, i32::MIN),
            greater_corner: BlockPos::new(i32::MAX, i32::MAX, i32::MAX),
            owner_id: None,
            parent_id: None,
            child_ids: Vec::new(),
            inherit_parent: false,
            claim_name: None,
            trust: ClaimTrust::default(),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Result<Self, ContractViolation> {
        let name = name.into();
        validate_text("claim.claim_name", &name, 64)?;
        self.claim_name = Some(name);
        Ok(self)
    }

    pub fn with_inherit_parent(mut self, inherit_parent: bool) -> Self {
        self.inherit_parent = inherit_parent;
        self
    }

    pub fn with_trust(mut self, trust: ClaimTrust) -> Self {
        self.trust = trust;
        self
    }

    pub fn context(&self) -> Context {
        Context::claim(self.claim_id)
    }

    pub fn is_wilderness(&self) -> bool {
        self.claim_type == ClaimType::Wilderness
    }

    pub fn is_admin(&self) -> bool {
        self.claim_type == ClaimType::Admin
    }

    pub fn is_basic(&self) -> bool {
        self.claim_type == ClaimType::Basic
    }

    pub fn is_subdivision(&self) -> bool {
        self.claim_type == ClaimType::Subdivision
    }

    /// Cuboid claims test the full box; flat claims ignore the vertical axis.
    pub fn contains_point(&self, world_id: &WorldId, pos: BlockPos) -> bool {
        if &self.world_id != world_id {
            return false;
        }
        let horizontal = pos.x >= self.lesser_corner.x
            && pos.x <= self.greater_corner.x
            && pos.z >= self.lesser_corner.z
            && pos.z <= self.greater_corner.z;
        if !horizontal {
            return false;
        }
        !self.cuboid || (pos.y >= self.lesser_corner.y && pos.y <= self.greater_corner.y)
    }

    /// True when `other`'s bounds fit inside this claim's bounds.
    pub fn contains_bounds(&self, other: &Claim) -> bool {
        self.world_id == other.world_id
            && self.contains_point(&other.world_id, other.lesser_corner)
            && self.contains_point(&other.world_id, other.greater_corner)
    }

    /// Horizontal footprint in blocks. Saturates for the wilderness.
    pub fn area(&self) -> i64 {
        let dx = i64::from(self.greater_corner.x) - i64::from(self.lesser_corner.x) + 1;
        let dz = i64::from(self.greater_corner.z) - i64::from(self.lesser_corner.z) + 1;
        dx.saturating_mul(dz)
    }
}

impl Validate for Claim {
    fn validate(&self) -> Result<(), ContractViolation> {
        if self.schema_version.0 == 0 {
            return Err(ContractViolation::InvalidValue {
                field: "claim.schema_version",
                reason: "must be > 0",
            });
        }
        self.world_id.validate()?;
        let l = self.lesser_corner;
        let g = self.greater_corner;
        if l.x > g.x || l.y > g.y || l.z > g.z {
            return Err(ContractViolation::InvalidValue {
                field: "claim.lesser_corner",
                reason: "must be <= greater_corner component-wise",
            });
        }
        match self.claim_type {
            ClaimType::Wilderness => {
                if self.parent_id.is_some() || self.owner_id.is_some() {
                    return Err(ContractViolation::InvalidValue {
                        field: "claim.claim_type",
                        reason: "wilderness has no parent and no owner",
                    });
                }
            }
            ClaimType::Subdivision => {
                if self.parent_id.is_none() {
                    return Err(ContractViolation::InvalidValue {
                        field: "claim.parent_id",
                        reason: "must be present when claim_type=SUBDIVISION",
                    });
                }
            }
            ClaimType::Admin | ClaimType::Basic => {
                if self.parent_id.is_some() {
                    return Err(ContractViolation::InvalidValue {
                        field: "claim.parent_id",
                        reason: "must be absent for top-level claims",
                    });
                }
            }
        }
        if Some(self.claim_id) == self.parent_id || self.child_ids.contains(&self.claim_id) {
            return Err(ContractViolation::InvalidValue {
                field: "claim.claim_id",
                reason: "claim cannot reference itself",
            });
        }
        if let Some(name) = &self.claim_name {
            validate_text("claim.claim_name", name, 64)?;
        }
        Ok(())
    }
}

fn normalize_corners(a: BlockPos, b: BlockPos) -> (BlockPos, BlockPos) {
    (
        BlockPos::new(a.x.min(b.x), a.y.min(b.y), a.z.min(b.z)),
        BlockPos::new(a.x.max(b.x), a.y.max(b.y), a.z.max(b.z)),
    )
}
