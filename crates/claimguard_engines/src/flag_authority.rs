#![forbid(unsafe_code)]

use claimguard_kernel_contracts::claim::{Claim, PlayerId};
use claimguard_kernel_contracts::flag::{capabilities, FlagEditPermission, FlagLayer};
use claimguard_kernel_contracts::subject::Subject;
use claimguard_kernel_contracts::ReasonCodeId;

pub mod reason_codes {
    use claimguard_kernel_contracts::ReasonCodeId;

    // Flag authority reason-code namespace ("FA").
    pub const FLAG_EDIT_ALLOWED: ReasonCodeId = ReasonCodeId(0x4641_0001);
    pub const FLAG_EDIT_PRIVILEGED_SUBJECT: ReasonCodeId = ReasonCodeId(0x4641_0002);

    pub const FLAG_DEFAULTS_CAPABILITY_MISSING: ReasonCodeId = ReasonCodeId(0x4641_00F1);
    pub const FLAG_OVERRIDES_CAPABILITY_MISSING: ReasonCodeId = ReasonCodeId(0x4641_00F2);
    pub const FLAG_CLAIM_ACL_DENIED: ReasonCodeId = ReasonCodeId(0x4641_00F3);
}

pub const DEFAULTS_DENIED_REASON: &str = "You do not have permission to change flag defaults.";
pub const OVERRIDE_DENIED_REASON: &str =
    "This flag has been forced by an admin and cannot be changed.";

/// Global capability predicate supplied by the host's permission service.
pub trait CapabilityOracle: Send + Sync {
    fn has_capability(&self, subject: &Subject, capability: &str) -> bool;
}

/// Per-claim edit check (ownership, trust roles). `None` means allowed,
/// otherwise the denial text shown to the player.
pub trait ClaimAclPolicy: Send + Sync {
    fn allow_edit(&self, player_id: &PlayerId, claim: &Claim) -> Option<String>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlagAuthorityConfig {
    /// Console bypasses the claim ACL; capability checks still apply.
    pub console_is_privileged: bool,
}

impl FlagAuthorityConfig {
    pub fn mvp_v1() -> Self {
        Self {
            console_is_privileged: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlagAuthorityDecision {
    pub reason_code: ReasonCodeId,
    pub permission: FlagEditPermission,
}

impl FlagAuthorityDecision {
    fn allowed(reason_code: ReasonCodeId) -> Self {
        Self {
            reason_code,
            permission: FlagEditPermission::Allowed,
        }
    }

    fn denied(reason_code: ReasonCodeId, reason: impl Into<String>) -> Self {
        Self {
            reason_code,
            permission: FlagEditPermission::Denied {
                reason: reason.into(),
            },
        }
    }

    pub fn is_allowed(&self) -> bool {
        self.permission.is_allowed()
    }
}

#[derive(Debug, Clone)]
pub struct FlagAuthorityRuntime {
    config: FlagAuthorityConfig,
}

impl FlagAuthorityRuntime {
    pub fn new(config: FlagAuthorityConfig) -> Self {
        Self { config }
    }

    /// Pure predicate. Layer capability first, then the claim ACL for
    /// non-privileged subjects.
    pub fn can_edit_flag(
        &self,
        subject: &Subject,
        claim: &Claim,
        layer: FlagLayer,
        oracle: &dyn CapabilityOracle,
        acl: &dyn ClaimAclPolicy,
    ) -> FlagAuthorityDecision {
        match layer {
            FlagLayer::Default
                if !oracle.has_capability(subject, capabilities::MANAGE_FLAG_DEFAULTS) =>
            {
                return FlagAuthorityDecision::denied(
                    reason_codes::FLAG_DEFAULTS_CAPABILITY_MISSING,
                    DEFAULTS_DENIED_REASON,
                );
            }
            FlagLayer::Override
                if !oracle.has_capability(subject, capabilities::MANAGE_FLAG_OVERRIDES) =>
            {
                return FlagAuthorityDecision::denied(
                    reason_codes::FLAG_OVERRIDES_CAPABILITY_MISSING,
                    OVERRIDE_DENIED_REASON,
                );
            }
            _ => {}
        }

        match subject {
            Subject::Console if self.config.console_is_privileged => {
                FlagAuthorityDecision::allowed(reason_codes::FLAG_EDIT_PRIVILEGED_SUBJECT)
            }
            Subject::Console => FlagAuthorityDecision::denied(
                reason_codes::FLAG_CLAIM_ACL_DENIED,
                "The console is not allowed to edit claim flags.",
            ),
            Subject::Player(player_id) => match acl.allow_edit(player_id, claim) {
                None => FlagAuthorityDecision::allowed(reason_codes::FLAG_EDIT_ALLOWED),
                Some(reason) => {
                    FlagAuthorityDecision::denied(reason_codes::FLAG_CLAIM_ACL_DENIED, reason)
                }
            },
        }
    }
}
