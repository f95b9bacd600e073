//! Mission configuration
//!
//! The configuration tree mirrors the parameter namespaces the vehicle stack
//! uses (`drone`, `locations`, `mission_init`, `mission_goals`, ...). It is
//! loaded from TOML, optionally overridden from `SARMC_*` environment
//! variables, and checked before any supervisor or executor is built.

pub mod types;

pub use types::*;

#[cfg(test)]
pub(crate) mod fixtures;
