#![forbid(unsafe_code)]

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::common::validate_token;
use crate::{ContractViolation, Tristate, Validate};

/// Namespace every flag permission key lives under.
pub const FLAG_BASE: &str = "claimguard.flag";
/// Source/target wildcard.
pub const ANY_SOURCE: &str = "any";

pub mod capabilities {
    pub const MANAGE_FLAG_DEFAULTS: &str = "claimguard.admin.flag-defaults";
    pub const MANAGE_FLAG_OVERRIDES: &str = "claimguard.admin.flag-overrides";
    pub const COMMAND_LIST_CLAIM_FLAGS: &str = "claimguard.command.claim.flag.list";
    pub const COMMAND_ADMIN_CLAIMS: &str = "claimguard.admin.claims";
    pub const COMMAND_CLAIM_INFO_OTHERS: &str = "claimguard.command.claim.info.others";
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FlagLayer {
    Default,
    Claim,
    Override,
}

impl FlagLayer {
    pub fn as_str(self) -> &'static str {
        match self {
            FlagLayer::Default => "default",
            FlagLayer::Claim => "claim",
            FlagLayer::Override => "override",
        }
    }
}

impl fmt::Display for FlagLayer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Full permission key, always prefixed by [`FLAG_BASE`].
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct FlagKey(String);

impl FlagKey {
    pub fn new(key: impl Into<String>) -> Result<Self, ContractViolation> {
        let v = Self(key.into());
        v.validate()?;
        Ok(v)
    }

    /// `claimguard.flag.<flag>[.<target>]`; the target segment is dropped for `any`.
    pub fn compose(flag: &str, target: Option<&str>) -> Result<Self, ContractViolation> {
        validate_token("flag_key.flag", flag, 64)?;
        let mut key = format!("{FLAG_BASE}.{flag}");
        if let Some(target) = target.map(str::trim) {
            if !target.is_empty() && !target.eq_ignore_ascii_case(ANY_SOURCE) {
                validate_token("flag_key.target", target, 96)?;
                key.push('.');
                key.push_str(target);
            }
        }
        Self::new(key)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Key with the namespace prefix removed.
    pub fn display_name(&self) -> &str {
        display_name(&self.0)
    }
}

impl Validate for FlagKey {
    fn validate(&self) -> Result<(), ContractViolation> {
        validate_token("flag_key", &self.0, 192)?;
        let Some(rest) = self.0.strip_prefix(FLAG_BASE) else {
            return Err(ContractViolation::InvalidValue {
                field: "flag_key",
                reason: "must start with the flag namespace",
            });
        };
        if rest.len() < 2 || !rest.starts_with('.') {
            return Err(ContractViolation::InvalidValue {
                field: "flag_key",
                reason: "must name a flag after the namespace",
            });
        }
        Ok(())
    }
}

impl fmt::Display for FlagKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Strips the namespace prefix from any stored permission key; keys outside the
/// namespace are returned unchanged.
pub fn display_name(permission_key: &str) -> &str {
    permission_key
        .strip_prefix(FLAG_BASE)
        .and_then(|rest| rest.strip_prefix('.'))
        .unwrap_or(permission_key)
}

/// Registered catalog of valid default flag names (without namespace).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlagCatalog {
    names: BTreeSet<String>,
}

impl FlagCatalog {
    pub fn from_names<I, S>(names: I) -> Result<Self, ContractViolation>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let names: BTreeSet<String> = names.into_iter().map(Into::into).collect();
        let v = Self { names };
        v.validate()?;
        Ok(v)
    }

    pub fn mvp_v1() -> Self {
        let names = [
            "block-break",
            "block-place",
            "build",
            "command-execute",
            "entity-damage",
            "entity-spawn",
            "explosion",
            "fire-spread",
            "interact-block-primary",
            "interact-block-secondary",
            "interact-entity-primary",
            "interact-entity-secondary",
            "interact-inventory",
            "item-drop",
            "item-pickup",
            "item-use",
            "liquid-flow",
            "portal-use",
            "projectile-impact-block",
            "projectile-impact-entity",
            "pvp",
        ];
        Self {
            names: names.iter().map(|n| n.to_string()).collect(),
        }
    }

    pub fn contains(&self, flag: &str) -> bool {
        self.names.contains(flag)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.names.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

impl Validate for FlagCatalog {
    fn validate(&self) -> Result<(), ContractViolation> {
        if self.names.is_empty() {
            return Err(ContractViolation::InvalidValue {
                field: "flag_catalog.names",
                reason: "must not be empty",
            });
        }
        for name in &self.names {
            validate_token("flag_catalog.names[]", name, 64)?;
            if name.contains('.') {
                return Err(ContractViolation::InvalidValue {
                    field: "flag_catalog.names[]",
                    reason: "must not contain '.'",
                });
            }
        }
        Ok(())
    }
}

/// Outcome of the edit-permission check for one layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlagEditPermission {
    Allowed,
    Denied { reason: String },
}

impl FlagEditPermission {
    pub fn is_allowed(&self) -> bool {
        matches!(self, FlagEditPermission::Allowed)
    }

    pub fn denial_reason(&self) -> Option<&str> {
        match self {
            FlagEditPermission::Allowed => None,
            FlagEditPermission::Denied { reason } => Some(reason.as_str()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DefaultValueOrigin {
    Transient,
    /// A persistent value shadowing the transient default.
    PersistentOverride,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlagCell {
    pub value: Tristate,
    pub edit: FlagEditPermission,
}

/// One listed permission key. A `claim_cell` holding `Undefined` is a settable
/// slot offered for a default the claim has not set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlagListingRow {
    pub key: String,
    pub flag_name: String,
    pub default_cell: Option<FlagCell>,
    pub default_origin: Option<DefaultValueOrigin>,
    pub claim_cell: Option<FlagCell>,
    pub override_cell: Option<FlagCell>,
    /// Key has no DEFAULT-layer entry.
    pub custom: bool,
}

impl FlagListingRow {
    pub fn layers_set(&self) -> Vec<FlagLayer> {
        let mut out = Vec::new();
        if self.default_cell.is_some() {
            out.push(FlagLayer::Default);
        }
        if self
            .claim_cell
            .as_ref()
            .map(|c| c.value.is_defined())
            .unwrap_or(false)
        {
            out.push(FlagLayer::Claim);
        }
        if self.override_cell.is_some() {
            out.push(FlagLayer::Override);
        }
        out
    }
}

/// Answer to "is this flag set, and by which layer".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EffectiveFlagValue {
    pub value: Tristate,
    pub decided_by: Option<FlagLayer>,
}

impl EffectiveFlagValue {
    pub fn undefined() -> Self {
        Self {
            value: Tristate::Undefined,
            decided_by: None,
        }
    }

    /// Falls back to the action's own default when no layer decided.
    pub fn allowed_or(&self, fallback: bool) -> bool {
        self.value.as_bool().unwrap_or(fallback)
    }
}
