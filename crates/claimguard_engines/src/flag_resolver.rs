#![forbid(unsafe_code)]

use std::collections::{BTreeMap, BTreeSet};

use claimguard_kernel_contracts::claim::{Claim, ClaimType};
use claimguard_kernel_contracts::context::{Context, ContextSet};
use claimguard_kernel_contracts::flag::{
    display_name, DefaultValueOrigin, EffectiveFlagValue, FlagCell, FlagEditPermission, FlagLayer,
    FlagListingRow, ANY_SOURCE,
};
use claimguard_kernel_contracts::Tristate;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlagResolverConfig {
    /// Upper bound on parent hops followed for inherited CLAIM values.
    pub max_inherit_depth: u8,
}

impl FlagResolverConfig {
    pub fn mvp_v1() -> Self {
        Self {
            max_inherit_depth: 16,
        }
    }
}

/// Context sets used to read and write each layer for one claim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlagContextSelection {
    pub default_contexts: ContextSet,
    /// `None` for the wilderness, which has no OVERRIDE layer.
    pub override_contexts: Option<ContextSet>,
    pub claim_contexts: ContextSet,
    /// Name of the applied source context, or `"any"`.
    pub effective_source: String,
}

impl FlagContextSelection {
    pub fn contexts_for(&self, layer: FlagLayer) -> Option<&ContextSet> {
        match layer {
            FlagLayer::Default => Some(&self.default_contexts),
            FlagLayer::Claim => Some(&self.claim_contexts),
            FlagLayer::Override => self.override_contexts.as_ref(),
        }
    }
}

/// Subdivisions share the BASIC default and override scopes.
pub fn flag_scope_type(claim_type: ClaimType) -> ClaimType {
    match claim_type {
        ClaimType::Subdivision => ClaimType::Basic,
        other => other,
    }
}

/// Raw layer contents for one claim, as read from the stores.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FlagLayerSnapshot {
    pub defaults: BTreeMap<String, bool>,
    pub default_overrides: BTreeMap<String, bool>,
    pub overrides: BTreeMap<String, bool>,
    pub claim_values: BTreeMap<String, bool>,
}

/// Edit outcome per layer for the listing subject; flag keys do not affect it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LayerEditPermissions {
    pub default: FlagEditPermission,
    pub claim: FlagEditPermission,
    pub override_: FlagEditPermission,
}

impl LayerEditPermissions {
    pub fn all_allowed() -> Self {
        Self {
            default: FlagEditPermission::Allowed,
            claim: FlagEditPermission::Allowed,
            override_: FlagEditPermission::Allowed,
        }
    }

    pub fn for_layer(&self, layer: FlagLayer) -> &FlagEditPermission {
        match layer {
            FlagLayer::Default => &self.default,
            FlagLayer::Claim => &self.claim,
            FlagLayer::Override => &self.override_,
        }
    }
}

/// Stored values seen by one key, ordered by layer, for a yes/no decision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlagLayerValues {
    pub override_value: Tristate,
    /// The claim's own value first, then each inheriting ancestor's.
    pub claim_chain: Vec<Tristate>,
    pub default_persistent: Tristate,
    pub default_transient: Tristate,
}

#[derive(Debug, Clone)]
pub struct FlagResolverRuntime {
    config: FlagResolverConfig,
}

impl FlagResolverRuntime {
    pub fn new(config: FlagResolverConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> FlagResolverConfig {
        self.config
    }

    /// DEFAULT and OVERRIDE contexts follow the claim type. A source context
    /// only ever joins the DEFAULT set.
    pub fn select_contexts(&self, claim: &Claim, source: Option<&Context>) -> FlagContextSelection {
        let world = Context::world(&claim.world_id);
        let scope = flag_scope_type(claim.claim_type);

        let mut default_contexts = ContextSet::empty()
            .with(Context::claim_default(scope))
            .with(world.clone());
        let effective_source = match source {
            Some(source) => {
                default_contexts.insert(source.clone());
                source.value().to_string()
            }
            None => ANY_SOURCE.to_string(),
        };

        let override_contexts = if claim.is_wilderness() {
            None
        } else {
            Some(
                ContextSet::empty()
                    .with(Context::claim_override(scope))
                    .with(world),
            )
        };

        FlagContextSelection {
            default_contexts,
            override_contexts,
            claim_contexts: ContextSet::singleton(claim.context()),
            effective_source,
        }
    }

    /// One row per key seen in any layer, sorted by key. DEFAULT keys the
    /// claim has not set get an `Undefined` CLAIM slot so they can be set.
    pub fn merge_listing(
        &self,
        snapshot: &FlagLayerSnapshot,
        edit: &LayerEditPermissions,
    ) -> Vec<FlagListingRow> {
        let cell = |value: Tristate, layer: FlagLayer| FlagCell {
            value,
            edit: edit.for_layer(layer).clone(),
        };

        let keys: BTreeSet<&String> = snapshot
            .defaults
            .keys()
            .chain(snapshot.default_overrides.keys())
            .chain(snapshot.claim_values.keys())
            .chain(snapshot.overrides.keys())
            .collect();

        keys.into_iter()
            .map(|key| {
                let default_value = snapshot
                    .default_overrides
                    .get(key)
                    .map(|v| (*v, DefaultValueOrigin::PersistentOverride))
                    .or_else(|| {
                        snapshot
                            .defaults
                            .get(key)
                            .map(|v| (*v, DefaultValueOrigin::Transient))
                    });
                let claim_value = snapshot.claim_values.get(key).copied();

                let claim_cell = match (claim_value, default_value) {
                    (Some(v), _) => Some(cell(Tristate::from_bool(v), FlagLayer::Claim)),
                    (None, Some(_)) => Some(cell(Tristate::Undefined, FlagLayer::Claim)),
                    (None, None) => None,
                };

                FlagListingRow {
                    key: key.clone(),
                    flag_name: display_name(key).to_string(),
                    default_cell: default_value
                        .map(|(v, _)| cell(Tristate::from_bool(v), FlagLayer::Default)),
                    default_origin: default_value.map(|(_, origin)| origin),
                    claim_cell,
                    override_cell: snapshot
                        .overrides
                        .get(key)
                        .map(|v| cell(Tristate::from_bool(*v), FlagLayer::Override)),
                    custom: default_value.is_none(),
                }
            })
            .collect()
    }

    /// OVERRIDE, then the CLAIM chain nearest first, then DEFAULT persistent
    /// over transient. Undefined when no layer holds a value.
    pub fn resolve_effective(&self, values: &FlagLayerValues) -> EffectiveFlagValue {
        if values.override_value.is_defined() {
            return EffectiveFlagValue {
                value: values.override_value,
                decided_by: Some(FlagLayer::Override),
            };
        }
        let depth = usize::from(self.config.max_inherit_depth) + 1;
        if let Some(value) = values
            .claim_chain
            .iter()
            .take(depth)
            .find(|v| v.is_defined())
        {
            return EffectiveFlagValue {
                value: *value,
                decided_by: Some(FlagLayer::Claim),
            };
        }
        for value in [values.default_persistent, values.default_transient] {
            if value.is_defined() {
                return EffectiveFlagValue {
                    value,
                    decided_by: Some(FlagLayer::Default),
                };
            }
        }
        EffectiveFlagValue::undefined()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use claimguard_kernel_contracts::claim::{BlockPos, ClaimId, WorldId};
    use claimguard_kernel_contracts::context::{
        CLAIM_DEFAULT_CONTEXT_KEY, CLAIM_OVERRIDE_CONTEXT_KEY,
    };
    use proptest::prelude::*;

    fn runtime() -> FlagResolverRuntime {
        FlagResolverRuntime::new(FlagResolverConfig::mvp_v1())
    }

    fn world() -> WorldId {
        WorldId::new("overworld").unwrap()
    }

    fn basic_claim() -> Claim {
        Claim::top_level(
            ClaimId::new_v4(),
            ClaimType::Basic,
            world(),
            BlockPos::new(0, 0, 0),
            BlockPos::new(10, 10, 10),
            None,
            true,
        )
        .unwrap()
    }

    fn map(entries: &[(&str, bool)]) -> BTreeMap<String, bool> {
        entries.iter().map(|(k, v)| (k.to_string(), *v)).collect()
    }

    #[test]
    fn at_resolver_01_wilderness_has_no_override_contexts() {
        let out = runtime().select_contexts(&Claim::wilderness(world()), None);
        assert!(out.override_contexts.is_none());
        assert!(out
            .default_contexts
            .contains(&Context::claim_default(ClaimType::Wilderness)));
        assert!(out.default_contexts.contains(&Context::world(&world())));
        assert_eq!(out.effective_source, "any");
    }

    #[test]
    fn at_resolver_02_subdivision_uses_basic_scopes() {
        let parent = basic_claim();
        let sub = Claim::subdivision(
            ClaimId::new_v4(),
            &parent,
            BlockPos::new(1, 1, 1),
            BlockPos::new(2, 2, 2),
            true,
        )
        .unwrap();
        let out = runtime().select_contexts(&sub, None);
        let keys: Vec<(&str, &str)> = out
            .default_contexts
            .iter()
            .map(|c| (c.key(), c.value()))
            .collect();
        assert!(keys.contains(&(CLAIM_DEFAULT_CONTEXT_KEY, "basic")));
        let overrides = out.override_contexts.unwrap();
        assert!(overrides.contains(&Context::claim_override(ClaimType::Basic)));
        assert_eq!(out.claim_contexts, ContextSet::singleton(sub.context()));
    }

    #[test]
    fn at_resolver_03_source_joins_default_contexts_only() {
        let source = Context::new("gp_source", "pixelmon").unwrap();
        let out = runtime().select_contexts(&basic_claim(), Some(&source));
        assert!(out.default_contexts.contains(&source));
        assert!(!out.override_contexts.as_ref().unwrap().contains(&source));
        assert!(out
            .override_contexts
            .unwrap()
            .iter()
            .any(|c| c.key() == CLAIM_OVERRIDE_CONTEXT_KEY));
        assert_eq!(out.effective_source, "pixelmon");
    }

    #[test]
    fn at_resolver_04_default_row_offers_settable_claim_slot() {
        let snapshot = FlagLayerSnapshot {
            defaults: map(&[("claimguard.flag.build", true)]),
            ..FlagLayerSnapshot::default()
        };
        let rows = runtime().merge_listing(&snapshot, &LayerEditPermissions::all_allowed());
        assert_eq!(rows.len(), 1);
        let row = &rows[0];
        assert_eq!(row.flag_name, "build");
        assert_eq!(row.default_cell.as_ref().unwrap().value, Tristate::True);
        assert_eq!(row.default_origin, Some(DefaultValueOrigin::Transient));
        assert_eq!(row.claim_cell.as_ref().unwrap().value, Tristate::Undefined);
        assert!(row.override_cell.is_none());
        assert!(!row.custom);
        assert_eq!(row.layers_set(), vec![FlagLayer::Default]);
    }

    #[test]
    fn at_resolver_05_persistent_default_shadows_transient() {
        let snapshot = FlagLayerSnapshot {
            defaults: map(&[("claimguard.flag.pvp", true)]),
            default_overrides: map(&[("claimguard.flag.pvp", false)]),
            ..FlagLayerSnapshot::default()
        };
        let rows = runtime().merge_listing(&snapshot, &LayerEditPermissions::all_allowed());
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].default_cell.as_ref().unwrap().value, Tristate::False);
        assert_eq!(
            rows[0].default_origin,
            Some(DefaultValueOrigin::PersistentOverride)
        );
    }

    #[test]
    fn at_resolver_06_claim_only_and_override_only_keys_are_custom_rows() {
        let snapshot = FlagLayerSnapshot {
            defaults: map(&[("claimguard.flag.build", true)]),
            claim_values: map(&[
                ("claimguard.flag.build", false),
                ("claimguard.flag.block-break.minecraft:tnt", false),
            ]),
            overrides: map(&[("claimguard.flag.pvp", false)]),
            ..FlagLayerSnapshot::default()
        };
        let rows = runtime().merge_listing(&snapshot, &LayerEditPermissions::all_allowed());
        let keys: Vec<&str> = rows.iter().map(|r| r.key.as_str()).collect();
        assert_eq!(
            keys,
            vec![
                "claimguard.flag.block-break.minecraft:tnt",
                "claimguard.flag.build",
                "claimguard.flag.pvp",
            ]
        );
        assert!(rows[0].custom);
        assert!(rows[0].default_cell.is_none());
        assert_eq!(rows[1].claim_cell.as_ref().unwrap().value, Tristate::False);
        assert_eq!(
            rows[1].layers_set(),
            vec![FlagLayer::Default, FlagLayer::Claim]
        );
        assert!(rows[2].custom);
        assert!(rows[2].claim_cell.is_none());
        assert_eq!(rows[2].override_cell.as_ref().unwrap().value, Tristate::False);
    }

    #[test]
    fn at_resolver_07_cells_carry_layer_edit_outcome() {
        let snapshot = FlagLayerSnapshot {
            defaults: map(&[("claimguard.flag.build", true)]),
            overrides: map(&[("claimguard.flag.build", false)]),
            ..FlagLayerSnapshot::default()
        };
        let edit = LayerEditPermissions {
            default: FlagEditPermission::Denied {
                reason: "no defaults".to_string(),
            },
            claim: FlagEditPermission::Allowed,
            override_: FlagEditPermission::Denied {
                reason: "forced".to_string(),
            },
        };
        let rows = runtime().merge_listing(&snapshot, &edit);
        let row = &rows[0];
        assert_eq!(
            row.default_cell.as_ref().unwrap().edit.denial_reason(),
            Some("no defaults")
        );
        assert!(row.claim_cell.as_ref().unwrap().edit.is_allowed());
        assert_eq!(
            row.override_cell.as_ref().unwrap().edit.denial_reason(),
            Some("forced")
        );
    }

    #[test]
    fn at_resolver_08_claim_chain_beats_defaults_nearest_first() {
        let out = runtime().resolve_effective(&FlagLayerValues {
            override_value: Tristate::Undefined,
            claim_chain: vec![Tristate::Undefined, Tristate::False, Tristate::True],
            default_persistent: Tristate::True,
            default_transient: Tristate::True,
        });
        assert_eq!(out.value, Tristate::False);
        assert_eq!(out.decided_by, Some(FlagLayer::Claim));

        let out = runtime().resolve_effective(&FlagLayerValues {
            override_value: Tristate::Undefined,
            claim_chain: vec![],
            default_persistent: Tristate::Undefined,
            default_transient: Tristate::Undefined,
        });
        assert_eq!(out, EffectiveFlagValue::undefined());
        assert!(out.allowed_or(true));
    }

    fn any_tristate() -> impl Strategy<Value = Tristate> {
        prop_oneof![
            Just(Tristate::True),
            Just(Tristate::False),
            Just(Tristate::Undefined),
        ]
    }

    proptest! {
        #[test]
        fn at_resolver_09_override_always_wins(
            forced in any::<bool>(),
            chain in proptest::collection::vec(any_tristate(), 0..4),
            persistent in any_tristate(),
            transient in any_tristate(),
        ) {
            let out = runtime().resolve_effective(&FlagLayerValues {
                override_value: Tristate::from_bool(forced),
                claim_chain: chain,
                default_persistent: persistent,
                default_transient: transient,
            });
            prop_assert_eq!(out.value, Tristate::from_bool(forced));
            prop_assert_eq!(out.decided_by, Some(FlagLayer::Override));
        }

        #[test]
        fn at_resolver_10_listing_has_each_key_once_sorted(
            defaults in proptest::collection::btree_map("[a-c]{1,2}", any::<bool>(), 0..5),
            claim_values in proptest::collection::btree_map("[b-d]{1,2}", any::<bool>(), 0..5),
            overrides in proptest::collection::btree_map("[c-e]{1,2}", any::<bool>(), 0..5),
        ) {
            let snapshot = FlagLayerSnapshot {
                defaults: defaults.clone(),
                default_overrides: BTreeMap::new(),
                overrides: overrides.clone(),
                claim_values: claim_values.clone(),
            };
            let rows = runtime().merge_listing(&snapshot, &LayerEditPermissions::all_allowed());
            let listed: Vec<&String> = rows.iter().map(|r| &r.key).collect();
            let expected: BTreeSet<&String> = defaults
                .keys()
                .chain(claim_values.keys())
                .chain(overrides.keys())
                .collect();
            prop_assert_eq!(listed, expected.into_iter().collect::<Vec<_>>());
        }
    }
}
