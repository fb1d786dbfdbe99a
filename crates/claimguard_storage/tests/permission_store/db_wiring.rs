#![forbid(unsafe_code)]

use std::sync::Arc;
use std::thread;

use claimguard_kernel_contracts::claim::{ClaimId, ClaimType, WorldId};
use claimguard_kernel_contracts::context::{Context, ContextSet};
use claimguard_kernel_contracts::Tristate;
use claimguard_storage::repo::FlagPermissionRepo;
use claimguard_storage::{FlagStores, PermissionStoreKind};

fn world() -> WorldId {
    WorldId::new("overworld").unwrap()
}

fn basic_defaults() -> ContextSet {
    ContextSet::empty()
        .with(Context::claim_default(ClaimType::Basic))
        .with(Context::world(&world()))
}

#[test]
fn at_perm_db_01_transient_and_persistent_are_isolated() {
    let stores = FlagStores::new_in_memory();
    stores
        .set_scope_value(
            PermissionStoreKind::Transient,
            &basic_defaults(),
            "claimguard.flag.build",
            Tristate::True,
        )
        .unwrap();

    assert_eq!(
        stores.scope_value(
            PermissionStoreKind::Transient,
            &basic_defaults(),
            "claimguard.flag.build"
        ),
        Tristate::True
    );
    assert_eq!(
        stores.scope_value(
            PermissionStoreKind::Persistent,
            &basic_defaults(),
            "claimguard.flag.build"
        ),
        Tristate::Undefined
    );
}

#[test]
fn at_perm_db_02_clear_scope_only_touches_exact_set() {
    let stores = FlagStores::new_in_memory();
    let claim_scope = ContextSet::singleton(Context::claim(ClaimId::new_v4()));
    let other_scope = ContextSet::singleton(Context::claim(ClaimId::new_v4()));
    for scope in [&claim_scope, &other_scope] {
        stores
            .set_scope_value(
                PermissionStoreKind::Persistent,
                scope,
                "claimguard.flag.pvp",
                Tristate::False,
            )
            .unwrap();
    }

    assert_eq!(
        stores.clear_scope(PermissionStoreKind::Persistent, &claim_scope),
        1
    );
    assert!(stores
        .query_scope(PermissionStoreKind::Persistent, &claim_scope)
        .is_empty());
    assert_eq!(
        stores
            .query_scope(PermissionStoreKind::Persistent, &other_scope)
            .len(),
        1
    );
}

#[test]
fn at_perm_db_03_concurrent_writers_to_distinct_keys_all_land() {
    let stores = Arc::new(FlagStores::new_in_memory());
    let handles: Vec<_> = (0..8)
        .map(|i| {
            let stores = Arc::clone(&stores);
            thread::spawn(move || {
                stores
                    .set_scope_value(
                        PermissionStoreKind::Persistent,
                        &basic_defaults(),
                        &format!("claimguard.flag.flag-{i}"),
                        Tristate::from_bool(i % 2 == 0),
                    )
                    .unwrap();
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let values = stores.query_scope(PermissionStoreKind::Persistent, &basic_defaults());
    assert_eq!(values.len(), 8);
    assert_eq!(values.get("claimguard.flag.flag-2"), Some(&true));
    assert_eq!(values.get("claimguard.flag.flag-3"), Some(&false));
}

#[test]
fn at_perm_db_04_snapshot_rows_carry_context_digest() {
    let stores = FlagStores::new_in_memory();
    stores
        .set_scope_value(
            PermissionStoreKind::Persistent,
            &basic_defaults(),
            "claimguard.flag.build",
            Tristate::False,
        )
        .unwrap();
    let rows = stores.snapshot_rows(PermissionStoreKind::Persistent);
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].context_digest, basic_defaults().digest_hex());
    assert_eq!(rows[0].key, "claimguard.flag.build");
    assert!(!rows[0].value);
    assert!(stores
        .snapshot_rows(PermissionStoreKind::Transient)
        .is_empty());
}
