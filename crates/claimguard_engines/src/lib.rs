#![forbid(unsafe_code)]

pub mod flag_authority;
pub mod flag_resolver;
pub mod flag_toggle;
