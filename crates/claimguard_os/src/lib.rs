#![forbid(unsafe_code)]

pub mod claims;
pub mod collaborators;
pub mod config;
pub mod error;
pub mod flags;
pub mod service;
pub mod snapshot;
pub mod telemetry;

pub use claims::{ClaimCorners, ClaimInfo};
pub use config::{ClaimGuardConfig, ConfigError, DefaultFlagsConfig, LoggingConfig};
pub use error::ClaimFlagError;
pub use service::{ClaimGuardCollaborators, ClaimGuardService};
pub use snapshot::FlagStoreSnapshot;
