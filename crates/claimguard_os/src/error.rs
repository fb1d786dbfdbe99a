#![forbid(unsafe_code)]

use claimguard_kernel_contracts::claim::{ClaimId, ClaimType};
use claimguard_kernel_contracts::flag::FlagLayer;
use claimguard_kernel_contracts::ContractViolation;
use claimguard_storage::StorageError;
use thiserror::Error;

use crate::config::ConfigError;

/// Errors surfaced to the command layer. All are recoverable; none leave a
/// partial write behind.
#[derive(Debug, Error)]
pub enum ClaimFlagError {
    #[error("{reason}")]
    PermissionDenied { reason: String },
    #[error("invalid flag: {flag}")]
    InvalidFlag { flag: String },
    #[error("claim {claim_id} has no transferable owner: {reason}")]
    NoTransferableOwner {
        claim_id: ClaimId,
        reason: &'static str,
    },
    #[error("no claim found for '{query}'")]
    ClaimNotFound { query: String },
    #[error("unknown source context: {name}")]
    UnknownSourceContext { name: String },
    #[error("{claim_type} claims have no {layer} layer")]
    LayerUnavailable {
        layer: FlagLayer,
        claim_type: ClaimType,
    },
    #[error("flag snapshot rejected: {reason}")]
    SnapshotRejected { reason: String },
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Storage(StorageError),
    #[error(transparent)]
    Contract(#[from] ContractViolation),
}

impl ClaimFlagError {
    pub fn permission_denied(reason: impl Into<String>) -> Self {
        Self::PermissionDenied {
            reason: reason.into(),
        }
    }
}

impl From<StorageError> for ClaimFlagError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::NoTransferableOwner { claim_id, reason } => {
                Self::NoTransferableOwner { claim_id, reason }
            }
            StorageError::ClaimNotFound { claim_id } => Self::ClaimNotFound {
                query: claim_id.to_string(),
            },
            StorageError::ContractViolation(violation) => Self::Contract(violation),
            other => Self::Storage(other),
        }
    }
}
