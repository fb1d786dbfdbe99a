#![forbid(unsafe_code)]

use std::sync::Arc;
use std::thread;

use claimguard_kernel_contracts::claim::{BlockPos, Claim, ClaimId, ClaimType, PlayerId, WorldId};
use claimguard_storage::repo::ClaimTreeRepo;
use claimguard_storage::{ClaimRegistry, StorageError};
use uuid::Uuid;

fn world() -> WorldId {
    WorldId::new("overworld").unwrap()
}

fn player() -> PlayerId {
    PlayerId::from_uuid(Uuid::new_v4())
}

fn basic_claim(owner: PlayerId, a: BlockPos, b: BlockPos) -> Claim {
    Claim::top_level(
        ClaimId::new_v4(),
        ClaimType::Basic,
        world(),
        a,
        b,
        Some(owner),
        true,
    )
    .unwrap()
}

fn registry_with_parent() -> (ClaimRegistry, Claim) {
    let registry = ClaimRegistry::new();
    registry.register_world_row(&world());
    let parent = registry
        .insert_claim_row(basic_claim(
            player(),
            BlockPos::new(0, 0, 0),
            BlockPos::new(10, 10, 10),
        ))
        .unwrap();
    (registry, parent)
}

#[test]
fn at_world_db_01_point_lookup_inside_and_outside() {
    let (registry, parent) = registry_with_parent();

    let inside = registry
        .claim_row_at(&world(), BlockPos::new(5, 5, 5), false)
        .unwrap();
    assert_eq!(inside.claim_id, parent.claim_id);

    let outside = registry
        .claim_row_at(&world(), BlockPos::new(11, 5, 5), false)
        .unwrap();
    assert!(outside.is_wilderness());
}

#[test]
fn at_world_db_02_subdivision_wins_only_when_requested() {
    let (registry, parent) = registry_with_parent();
    let sub = Claim::subdivision(
        ClaimId::new_v4(),
        &parent,
        BlockPos::new(2, 2, 2),
        BlockPos::new(4, 4, 4),
        true,
    )
    .unwrap();
    let sub = registry.insert_claim_row(sub).unwrap();

    let deep = registry
        .claim_row_at(&world(), BlockPos::new(3, 3, 3), true)
        .unwrap();
    assert_eq!(deep.claim_id, sub.claim_id);
    assert_eq!(deep.parent_id, Some(parent.claim_id));

    let shallow = registry
        .claim_row_at(&world(), BlockPos::new(3, 3, 3), false)
        .unwrap();
    assert_eq!(shallow.claim_id, parent.claim_id);
    assert_eq!(shallow.child_ids, vec![sub.claim_id]);
}

#[test]
fn at_world_db_03_subdivision_outside_parent_is_rejected() {
    let (registry, parent) = registry_with_parent();
    let stray = Claim::subdivision(
        ClaimId::new_v4(),
        &parent,
        BlockPos::new(8, 8, 8),
        BlockPos::new(14, 9, 9),
        true,
    )
    .unwrap();
    assert!(matches!(
        registry.insert_claim_row(stray),
        Err(StorageError::HierarchyViolation { .. })
    ));
    assert!(registry
        .claim_row(parent.claim_id)
        .unwrap()
        .child_ids
        .is_empty());
}

#[test]
fn at_world_db_04_unknown_parent_is_a_foreign_key_violation() {
    let (registry, parent) = registry_with_parent();
    let mut orphan = Claim::subdivision(
        ClaimId::new_v4(),
        &parent,
        BlockPos::new(1, 1, 1),
        BlockPos::new(2, 2, 2),
        true,
    )
    .unwrap();
    orphan.parent_id = Some(ClaimId::new_v4());
    assert!(matches!(
        registry.insert_claim_row(orphan),
        Err(StorageError::ForeignKeyViolation { .. })
    ));
}

#[test]
fn at_world_db_05_duplicate_claim_id_is_rejected() {
    let (registry, parent) = registry_with_parent();
    let mut dup = basic_claim(player(), BlockPos::new(20, 0, 20), BlockPos::new(30, 5, 30));
    dup.claim_id = parent.claim_id;
    assert!(matches!(
        registry.insert_claim_row(dup),
        Err(StorageError::DuplicateKey { .. })
    ));
}

#[test]
fn at_world_db_06_transfer_guard_rejects_subdivision_and_wilderness() {
    let (registry, parent) = registry_with_parent();
    let sub = registry
        .insert_claim_row(
            Claim::subdivision(
                ClaimId::new_v4(),
                &parent,
                BlockPos::new(1, 1, 1),
                BlockPos::new(2, 2, 2),
                true,
            )
            .unwrap(),
        )
        .unwrap();

    let err = registry
        .transfer_claim_owner_row(sub.claim_id, Some(player()))
        .unwrap_err();
    assert!(matches!(err, StorageError::NoTransferableOwner { .. }));

    let wilderness = ClaimId::wilderness_for(&world());
    let err = registry
        .transfer_claim_owner_row(wilderness, Some(player()))
        .unwrap_err();
    assert!(matches!(err, StorageError::NoTransferableOwner { .. }));

    let next = player();
    let moved = registry
        .transfer_claim_owner_row(parent.claim_id, Some(next))
        .unwrap();
    assert_eq!(moved.owner_id, Some(next));
    assert_eq!(moved.lesser_corner, parent.lesser_corner);
    assert_eq!(moved.child_ids, vec![sub.claim_id]);
}

#[test]
fn at_world_db_07_remove_cascades_to_descendants() {
    let (registry, parent) = registry_with_parent();
    let sub = registry
        .insert_claim_row(
            Claim::subdivision(
                ClaimId::new_v4(),
                &parent,
                BlockPos::new(1, 1, 1),
                BlockPos::new(6, 6, 6),
                true,
            )
            .unwrap(),
        )
        .unwrap();
    let nested = registry
        .insert_claim_row(
            Claim::subdivision(
                ClaimId::new_v4(),
                &sub,
                BlockPos::new(2, 2, 2),
                BlockPos::new(3, 3, 3),
                true,
            )
            .unwrap(),
        )
        .unwrap();

    let removed = registry.remove_claim_rows(parent.claim_id).unwrap();
    let removed_ids: Vec<ClaimId> = removed.iter().map(|c| c.claim_id).collect();
    assert_eq!(
        removed_ids,
        vec![parent.claim_id, sub.claim_id, nested.claim_id]
    );
    assert!(registry.claim_row(nested.claim_id).is_none());
    assert!(registry
        .claim_row_at(&world(), BlockPos::new(2, 2, 2), true)
        .unwrap()
        .is_wilderness());
}

#[test]
fn at_world_db_08_lookup_by_name_is_case_insensitive_and_skips_wilderness() {
    let registry = ClaimRegistry::new();
    let named = basic_claim(player(), BlockPos::new(0, 0, 0), BlockPos::new(4, 4, 4))
        .with_name("Home")
        .unwrap();
    let named = registry.insert_claim_row(named).unwrap();

    assert_eq!(
        registry
            .claim_row_by_identifier_or_name("home")
            .map(|c| c.claim_id),
        Some(named.claim_id)
    );
    assert_eq!(
        registry
            .claim_row_by_identifier_or_name(&named.claim_id.to_string())
            .map(|c| c.claim_id),
        Some(named.claim_id)
    );
    let wilderness = ClaimId::wilderness_for(&world()).to_string();
    assert!(registry
        .claim_row_by_identifier_or_name(&wilderness)
        .is_none());
}

#[test]
fn at_world_db_09_parallel_transfers_on_distinct_claims() {
    let registry = Arc::new(ClaimRegistry::new());
    let claims: Vec<Claim> = (0..6)
        .map(|i| {
            registry
                .insert_claim_row(basic_claim(
                    player(),
                    BlockPos::new(i * 100, 0, 0),
                    BlockPos::new(i * 100 + 10, 10, 10),
                ))
                .unwrap()
        })
        .collect();
    let handles: Vec<_> = claims
        .iter()
        .map(|claim| {
            let registry = Arc::clone(&registry);
            let claim_id = claim.claim_id;
            thread::spawn(move || {
                let owner = player();
                registry
                    .transfer_claim_owner_row(claim_id, Some(owner))
                    .unwrap();
                (claim_id, owner)
            })
        })
        .collect();
    for handle in handles {
        let (claim_id, owner) = handle.join().unwrap();
        assert_eq!(registry.claim_row(claim_id).unwrap().owner_id, Some(owner));
    }
}

#[test]
fn at_world_db_10_transfer_racing_removal_never_reports_a_lost_write() {
    for _ in 0..32 {
        let (registry, parent) = registry_with_parent();
        let registry = Arc::new(registry);
        let claim_id = parent.claim_id;
        let heir = player();

        let transfer = {
            let registry = Arc::clone(&registry);
            thread::spawn(move || registry.transfer_claim_owner_row(claim_id, Some(heir)))
        };
        let removal = {
            let registry = Arc::clone(&registry);
            thread::spawn(move || registry.remove_claim_rows(claim_id))
        };
        let transferred = transfer.join().unwrap();
        let removed = removal.join().unwrap().unwrap();

        match transferred {
            Ok(claim) => {
                assert_eq!(claim.owner_id, Some(heir));
                assert_eq!(removed[0].owner_id, Some(heir));
            }
            Err(StorageError::ClaimNotFound { claim_id: missing }) => {
                assert_eq!(missing, claim_id);
                assert_ne!(removed[0].owner_id, Some(heir));
            }
            Err(other) => panic!("unexpected transfer error: {other:?}"),
        }
        assert!(registry.claim_row(claim_id).is_none());
    }
}
