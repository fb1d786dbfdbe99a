#![forbid(unsafe_code)]

pub mod claim;
pub mod common;
pub mod context;
pub mod flag;
pub mod subject;
pub mod tristate;

pub use common::{ContractViolation, ReasonCodeId, SchemaVersion, Validate};
pub use tristate::Tristate;
