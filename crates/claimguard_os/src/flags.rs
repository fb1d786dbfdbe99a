#![forbid(unsafe_code)]

use claimguard_engines::flag_resolver::{
    FlagContextSelection, FlagLayerSnapshot, FlagLayerValues, LayerEditPermissions,
};
use claimguard_engines::flag_toggle::next_toggle_value;
use claimguard_kernel_contracts::claim::Claim;
use claimguard_kernel_contracts::context::ContextSet;
use claimguard_kernel_contracts::flag::{
    capabilities, EffectiveFlagValue, FlagEditPermission, FlagKey, FlagLayer, FlagListingRow,
};
use claimguard_kernel_contracts::subject::Subject;
use claimguard_kernel_contracts::Tristate;
use claimguard_storage::repo::{ClaimTreeRepo, FlagPermissionRepo};
use claimguard_storage::PermissionStoreKind;
use tracing::{debug, info, warn};

use crate::error::ClaimFlagError;
use crate::service::ClaimGuardService;

fn store_for(layer: FlagLayer) -> PermissionStoreKind {
    match layer {
        FlagLayer::Default => PermissionStoreKind::Transient,
        FlagLayer::Claim | FlagLayer::Override => PermissionStoreKind::Persistent,
    }
}

/// Audit tag recorded with a toggle; never part of the stored context set.
fn write_tag(layer: FlagLayer) -> &'static str {
    match layer {
        FlagLayer::Default => "default",
        FlagLayer::Claim => "",
        FlagLayer::Override => "forced",
    }
}

impl ClaimGuardService {
    /// Unregistered source names are ignored, leaving the effective source `any`.
    fn selection(&self, claim: &Claim, source: Option<&str>) -> FlagContextSelection {
        let source = source.and_then(|name| self.source_context(name));
        self.resolver.select_contexts(claim, source.as_ref())
    }

    /// Registry copy of `claim`. Edits are checked against the current owner
    /// and a deleted claim is never written to. Wilderness claims of worlds
    /// that were never registered pass through unchanged.
    fn registered(&self, claim: &Claim) -> Result<Claim, ClaimFlagError> {
        match self.claims.claim_row(claim.claim_id) {
            Some(current) => Ok(current),
            None if claim.is_wilderness() => Ok(claim.clone()),
            None => Err(ClaimFlagError::ClaimNotFound {
                query: claim.claim_id.to_string(),
            }),
        }
    }

    pub fn can_edit_flag(
        &self,
        subject: &Subject,
        claim: &Claim,
        layer: FlagLayer,
    ) -> FlagEditPermission {
        self.authority
            .can_edit_flag(
                subject,
                claim,
                layer,
                self.collaborators.capabilities.as_ref(),
                self.collaborators.acl.as_ref(),
            )
            .permission
    }

    fn authorize(
        &self,
        subject: &Subject,
        claim: &Claim,
        layer: FlagLayer,
        key: &str,
    ) -> Result<(), ClaimFlagError> {
        match self.can_edit_flag(subject, claim, layer) {
            FlagEditPermission::Allowed => Ok(()),
            FlagEditPermission::Denied { reason } => {
                warn!(
                    subject = %subject,
                    claim = %claim.claim_id,
                    layer = %layer,
                    key,
                    reason = %reason,
                    "flag edit denied"
                );
                Err(ClaimFlagError::PermissionDenied { reason })
            }
        }
    }

    /// Boundary check for flag listing; [`Self::list_flags`] does not enforce it.
    pub fn can_list_flags(&self, subject: &Subject) -> bool {
        self.collaborators
            .capabilities
            .has_capability(subject, capabilities::COMMAND_LIST_CLAIM_FLAGS)
    }

    /// Every flag key set in any layer for `claim`, sorted by key, with the
    /// listing subject's edit outcome on each cell.
    pub fn list_flags(
        &self,
        claim: &Claim,
        subject: &Subject,
        source: Option<&str>,
    ) -> Vec<FlagListingRow> {
        let selection = self.selection(claim, source);
        let snapshot = FlagLayerSnapshot {
            defaults: self
                .stores
                .query_scope(PermissionStoreKind::Transient, &selection.default_contexts),
            default_overrides: self
                .stores
                .query_scope(PermissionStoreKind::Persistent, &selection.default_contexts),
            overrides: selection
                .override_contexts
                .as_ref()
                .map(|contexts| {
                    self.stores
                        .query_scope(PermissionStoreKind::Persistent, contexts)
                })
                .unwrap_or_default(),
            claim_values: self
                .stores
                .query_scope(PermissionStoreKind::Persistent, &selection.claim_contexts),
        };
        let edit = LayerEditPermissions {
            default: self.can_edit_flag(subject, claim, FlagLayer::Default),
            claim: self.can_edit_flag(subject, claim, FlagLayer::Claim),
            override_: self.can_edit_flag(subject, claim, FlagLayer::Override),
        };
        let rows = self.resolver.merge_listing(&snapshot, &edit);
        debug!(
            claim = %claim.claim_id,
            source = %selection.effective_source,
            rows = rows.len(),
            "flags listed"
        );
        rows
    }

    /// Advances `current` one step through TRUE -> FALSE -> UNDEFINED and
    /// writes it to `layer`. DEFAULT writes are session-only.
    pub fn toggle_flag(
        &self,
        subject: &Subject,
        claim: &Claim,
        key: &str,
        current: Tristate,
        layer: FlagLayer,
        source: Option<&str>,
    ) -> Result<Tristate, ClaimFlagError> {
        let key = FlagKey::new(key).map_err(|_| ClaimFlagError::InvalidFlag {
            flag: key.to_string(),
        })?;
        let claim = self.registered(claim)?;
        let selection = self.selection(&claim, source);
        let contexts = selection
            .contexts_for(layer)
            .ok_or(ClaimFlagError::LayerUnavailable {
                layer,
                claim_type: claim.claim_type,
            })?;
        self.authorize(subject, &claim, layer, key.as_str())?;

        let next = next_toggle_value(current);
        self.stores
            .set_scope_value(store_for(layer), contexts, key.as_str(), next)?;
        info!(
            subject = %subject,
            claim = %claim.claim_id,
            layer = %layer,
            key = %key,
            from = %current,
            to = %next,
            tag = write_tag(layer),
            "flag toggled"
        );
        Ok(next)
    }

    /// Writes `value` to the CLAIM layer under the claim's identity (and the
    /// optional source context). `Undefined` clears the entry.
    pub fn set_flag(
        &self,
        subject: &Subject,
        claim: &Claim,
        flag: &str,
        target: Option<&str>,
        value: Tristate,
        context: Option<&str>,
    ) -> Result<(), ClaimFlagError> {
        if !self.catalog.contains(flag) {
            return Err(ClaimFlagError::InvalidFlag {
                flag: flag.to_string(),
            });
        }
        let custom = match context {
            Some(name) => Some(self.source_context(name).ok_or_else(|| {
                ClaimFlagError::UnknownSourceContext {
                    name: name.to_string(),
                }
            })?),
            None => None,
        };
        let key = FlagKey::compose(flag, target).map_err(|_| ClaimFlagError::InvalidFlag {
            flag: flag.to_string(),
        })?;
        let claim = self.registered(claim)?;
        self.authorize(subject, &claim, FlagLayer::Claim, key.as_str())?;

        let mut contexts = ContextSet::singleton(claim.context());
        if let Some(custom) = custom {
            contexts.insert(custom);
        }
        self.stores.set_scope_value(
            PermissionStoreKind::Persistent,
            &contexts,
            key.as_str(),
            value,
        )?;
        info!(
            subject = %subject,
            claim = %claim.claim_id,
            key = %key,
            value = %value,
            contexts = %contexts.canonical_text(),
            "flag set"
        );
        Ok(())
    }

    /// Decision value for `key` on `claim`: OVERRIDE, then the CLAIM layer
    /// (walking inheriting parents), then DEFAULT persistent over transient.
    pub fn effective_value(
        &self,
        claim: &Claim,
        key: &str,
        source: Option<&str>,
    ) -> Result<EffectiveFlagValue, ClaimFlagError> {
        let key = FlagKey::new(key).map_err(|_| ClaimFlagError::InvalidFlag {
            flag: key.to_string(),
        })?;
        let selection = self.selection(claim, source);
        let persistent = |contexts: &ContextSet| {
            self.stores
                .scope_value(PermissionStoreKind::Persistent, contexts, key.as_str())
        };

        let values = FlagLayerValues {
            override_value: selection
                .override_contexts
                .as_ref()
                .map(|contexts| persistent(contexts))
                .unwrap_or(Tristate::Undefined),
            claim_chain: self
                .inheritance_chain(claim)
                .iter()
                .map(|c| persistent(&ContextSet::singleton(c.context())))
                .collect(),
            default_persistent: persistent(&selection.default_contexts),
            default_transient: self.stores.scope_value(
                PermissionStoreKind::Transient,
                &selection.default_contexts,
                key.as_str(),
            ),
        };
        Ok(self.resolver.resolve_effective(&values))
    }

    /// Allow/deny for an action, using `fallback` when no layer decides.
    pub fn is_flag_allowed(
        &self,
        claim: &Claim,
        key: &str,
        source: Option<&str>,
        fallback: bool,
    ) -> Result<bool, ClaimFlagError> {
        Ok(self.effective_value(claim, key, source)?.allowed_or(fallback))
    }

    /// `claim`, then each ancestor reached while `inherit_parent` holds.
    fn inheritance_chain(&self, claim: &Claim) -> Vec<Claim> {
        let max_hops = usize::from(self.resolver.config().max_inherit_depth);
        let mut chain = vec![claim.clone()];
        let mut current = claim.clone();
        while chain.len() <= max_hops && current.inherit_parent {
            let Some(parent) = current
                .parent_id
                .and_then(|parent_id| self.claims.claim_row(parent_id))
            else {
                break;
            };
            chain.push(parent.clone());
            current = parent;
        }
        chain
    }

    /// Drops every CLAIM-layer entry of `claim`, including ones written with a
    /// registered source context.
    pub(crate) fn purge_claim_flags(&self, claim: &Claim) -> usize {
        let identity = ContextSet::singleton(claim.context());
        let mut purged = self
            .stores
            .clear_scope(PermissionStoreKind::Persistent, &identity);
        for source in self.registered_source_contexts() {
            let scoped: ContextSet = identity.clone().with(source);
            purged += self
                .stores
                .clear_scope(PermissionStoreKind::Persistent, &scoped);
        }
        purged
    }
}
