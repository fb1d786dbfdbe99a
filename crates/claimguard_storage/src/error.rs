#![forbid(unsafe_code)]

use claimguard_kernel_contracts::claim::ClaimId;
use claimguard_kernel_contracts::ContractViolation;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StorageError {
    #[error("claim not found: {claim_id}")]
    ClaimNotFound { claim_id: ClaimId },
    #[error("duplicate key in {table}: {key}")]
    DuplicateKey { table: &'static str, key: String },
    #[error("foreign key violation in {table}: {key}")]
    ForeignKeyViolation { table: &'static str, key: String },
    #[error("claim {claim_id} violates the claim hierarchy: {reason}")]
    HierarchyViolation {
        claim_id: ClaimId,
        reason: &'static str,
    },
    #[error("claim {claim_id} has no transferable owner: {reason}")]
    NoTransferableOwner {
        claim_id: ClaimId,
        reason: &'static str,
    },
    #[error(transparent)]
    ContractViolation(#[from] ContractViolation),
}
