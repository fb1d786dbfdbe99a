#![forbid(unsafe_code)]

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::claim::{ClaimId, ClaimType, WorldId};
use crate::common::validate_token;
use crate::{ContractViolation, Validate};

pub const CLAIM_CONTEXT_KEY: &str = "gp_claim";
pub const CLAIM_DEFAULT_CONTEXT_KEY: &str = "gp_claim-default";
pub const CLAIM_OVERRIDE_CONTEXT_KEY: &str = "gp_claim-override";
pub const WORLD_CONTEXT_KEY: &str = "gp_world";
pub const SOURCE_CONTEXT_KEY: &str = "gp_source";

/// An immutable `(key, value)` scoping tag.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Context {
    key: String,
    value: String,
}

impl Context {
    pub fn new(
        key: impl Into<String>,
        value: impl Into<String>,
    ) -> Result<Self, ContractViolation> {
        let v = Self {
            key: key.into(),
            value: value.into(),
        };
        v.validate()?;
        Ok(v)
    }

    pub fn claim(claim_id: ClaimId) -> Self {
        Self {
            key: CLAIM_CONTEXT_KEY.to_string(),
            value: claim_id.to_string(),
        }
    }

    pub fn claim_default(claim_type: ClaimType) -> Self {
        Self {
            key: CLAIM_DEFAULT_CONTEXT_KEY.to_string(),
            value: claim_type.as_str().to_string(),
        }
    }

    pub fn claim_override(claim_type: ClaimType) -> Self {
        Self {
            key: CLAIM_OVERRIDE_CONTEXT_KEY.to_string(),
            value: claim_type.as_str().to_string(),
        }
    }

    pub fn world(world_id: &WorldId) -> Self {
        Self {
            key: WORLD_CONTEXT_KEY.to_string(),
            value: world_id.as_str().to_string(),
        }
    }

    /// Named source context a feature module registers at startup.
    pub fn source(name: &str) -> Result<Self, ContractViolation> {
        Self::new(SOURCE_CONTEXT_KEY, name.to_ascii_lowercase())
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn value(&self) -> &str {
        &self.value
    }
}

impl Validate for Context {
    fn validate(&self) -> Result<(), ContractViolation> {
        validate_token("context.key", &self.key, 64)?;
        validate_token("context.value", &self.value, 128)?;
        if self.key.contains('=') {
            return Err(ContractViolation::InvalidValue {
                field: "context.key",
                reason: "must not contain '='",
            });
        }
        Ok(())
    }
}

impl fmt::Display for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.key, self.value)
    }
}

/// Unordered, duplicate-free set of contexts; the lookup key into a permission store.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ContextSet(BTreeSet<Context>);

impl ContextSet {
    pub fn empty() -> Self {
        Self(BTreeSet::new())
    }

    pub fn singleton(context: Context) -> Self {
        let mut set = BTreeSet::new();
        set.insert(context);
        Self(set)
    }

    pub fn with(mut self, context: Context) -> Self {
        self.0.insert(context);
        self
    }

    pub fn insert(&mut self, context: Context) -> bool {
        self.0.insert(context)
    }

    pub fn contains(&self, context: &Context) -> bool {
        self.0.contains(context)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Context> {
        self.0.iter()
    }

    /// `key=value` pairs in sorted order joined by `;`.
    pub fn canonical_text(&self) -> String {
        self.0
            .iter()
            .map(Context::to_string)
            .collect::<Vec<_>>()
            .join(";")
    }

    /// Hex sha256 of the canonical text. Equal sets always share a digest.
    pub fn digest_hex(&self) -> String {
        let digest = Sha256::digest(self.canonical_text().as_bytes());
        digest.iter().map(|b| format!("{b:02x}")).collect()
    }
}

impl FromIterator<Context> for ContextSet {
    fn from_iter<T: IntoIterator<Item = Context>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}
